//! Label-aware application of change events to a store transaction.
//!
//! One applicator serves both labelled and plain stores; which rules apply
//! follows from whether the transaction it is handed carries a label index.
//! Label assignments from the labels graph are buffered and only written at
//! a commit point, inside the same store transaction as the data, so both
//! become visible in the same published version.

use graphsync_core::config::LabelsGraphPolicy;
use graphsync_core::{vocab, Quad, SecurityLabel};
use graphsync_patch::{Patch, PatchHandler};
use graphsync_store::{Savepoint, Store, WriteTxn};
use serde::Serialize;

use crate::error::{IngestError, Result};
use crate::labels_graph::ScratchLabels;

/// Who owns the store transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TxnScope {
    /// A surrounding batch holds the transaction. Patch `TC` marks a commit
    /// point for labels but does not publish.
    External,
    /// The applicator publishes at every patch `TC`.
    Owned,
}

/// What one application did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ApplyCounts {
    pub adds: usize,
    pub deletes: usize,
    /// Data statements that received header labels.
    pub labelled: usize,
    /// Named-graph statements dropped on a labelled store.
    pub ignored_named_graph: usize,
    /// Labels written from the labels graph.
    pub label_assignments: usize,
}

impl ApplyCounts {
    pub fn merge(&mut self, other: &ApplyCounts) {
        self.adds += other.adds;
        self.deletes += other.deletes;
        self.labelled += other.labelled;
        self.ignored_named_graph += other.ignored_named_graph;
        self.label_assignments += other.label_assignments;
    }
}

pub struct Applicator<'t> {
    txn: &'t mut WriteTxn,
    scope: TxnScope,
    header_labels: Option<Vec<SecurityLabel>>,
    policy: LabelsGraphPolicy,
    scratch: ScratchLabels,
    savepoint: Option<Savepoint>,
    named_graph_warned: bool,
    counts: ApplyCounts,
}

impl<'t> Applicator<'t> {
    pub fn new(txn: &'t mut WriteTxn, scope: TxnScope) -> Self {
        Self {
            txn,
            scope,
            header_labels: None,
            policy: LabelsGraphPolicy::default(),
            scratch: ScratchLabels::new(),
            savepoint: None,
            named_graph_warned: false,
            counts: ApplyCounts::default(),
        }
    }

    /// Labels to attach to every default-graph statement added. A plain
    /// store accepts no labels.
    pub fn with_labels(mut self, labels: Option<Vec<SecurityLabel>>) -> Result<Self> {
        if labels.is_some() && !self.txn.is_labelled() {
            return Err(IngestError::Authz(format!(
                "security label supplied for unlabelled store '{}'",
                self.txn.store().name()
            )));
        }
        self.header_labels = labels;
        Ok(self)
    }

    pub fn with_policy(mut self, policy: LabelsGraphPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Carry the named-graph warning state over from earlier messages so
    /// the warning appears once per batch.
    pub fn with_named_graph_warned(mut self, warned: bool) -> Self {
        self.named_graph_warned = warned;
        self
    }

    pub fn named_graph_warned(&self) -> bool {
        self.named_graph_warned
    }

    pub fn counts(&self) -> ApplyCounts {
        self.counts
    }

    fn labels_graph_target(&self, quad: &Quad) -> Result<bool> {
        if !quad.graph.is_iri(vocab::LABELS_GRAPH) {
            return Ok(false);
        }
        if !self.txn.is_labelled() {
            return Err(IngestError::Authz(format!(
                "labels graph sent to unlabelled store '{}'",
                self.txn.store().name()
            )));
        }
        if self.policy == LabelsGraphPolicy::Reject {
            return Err(IngestError::Authz("attempt to patch the labels graph".into()));
        }
        Ok(true)
    }

    /// True when the quad is in a named graph a labelled store cannot hold.
    fn skip_named_graph(&mut self, quad: &Quad) -> bool {
        if !self.txn.is_labelled() || quad.is_default_graph() {
            return false;
        }
        if !self.named_graph_warned {
            tracing::warn!(
                store = %self.txn.store().name(),
                graph = ?quad.graph,
                "Named graphs are not supported on labelled stores; ignoring statements"
            );
            self.named_graph_warned = true;
        }
        self.counts.ignored_named_graph += 1;
        true
    }

    /// Write buffered labels-graph assignments into the label index.
    fn flush_labels(&mut self) -> Result<()> {
        if self.scratch.is_empty() {
            return Ok(());
        }
        for (triple, labels) in self.scratch.interpret()? {
            self.counts.label_assignments += self.txn.add_labels(&triple, &labels)?;
        }
        self.scratch.clear();
        Ok(())
    }
}

impl PatchHandler for Applicator<'_> {
    type Error = IngestError;

    fn add(&mut self, quad: &Quad) -> Result<()> {
        if self.labels_graph_target(quad)? {
            self.scratch.add(quad.triple());
            return Ok(());
        }
        if self.skip_named_graph(quad) {
            return Ok(());
        }
        if self.txn.add(quad) {
            self.counts.adds += 1;
        }
        if let Some(labels) = &self.header_labels {
            self.txn.add_labels(&quad.triple(), labels)?;
            self.counts.labelled += 1;
        }
        Ok(())
    }

    fn delete(&mut self, quad: &Quad) -> Result<()> {
        if self.labels_graph_target(quad)? {
            self.scratch.delete(&quad.triple());
            return Ok(());
        }
        if self.skip_named_graph(quad) {
            return Ok(());
        }
        if self.txn.delete(quad) {
            self.counts.deletes += 1;
        }
        Ok(())
    }

    fn txn_begin(&mut self) -> Result<()> {
        self.savepoint = Some(self.txn.savepoint());
        Ok(())
    }

    fn txn_commit(&mut self) -> Result<()> {
        self.flush_labels()?;
        self.savepoint = None;
        if self.scope == TxnScope::Owned {
            self.txn.publish();
        }
        Ok(())
    }

    fn txn_abort(&mut self) -> Result<()> {
        self.scratch.clear();
        if let Some(savepoint) = self.savepoint.take() {
            self.txn.rollback_to(&savepoint);
        }
        tracing::debug!(store = %self.txn.store().name(), "Patch transaction aborted");
        Ok(())
    }

    fn finish(&mut self) -> Result<()> {
        self.flush_labels()?;
        if self.scope == TxnScope::Owned && self.txn.is_dirty() {
            self.txn.publish();
        }
        Ok(())
    }
}

/// Apply a whole patch to a store in its own write transaction.
///
/// Every patch `TC` publishes; the rest is published when the patch ends.
/// On error nothing after the last published commit point is kept.
pub fn apply_patch(
    store: &Store,
    patch: &Patch,
    labels: Option<Vec<SecurityLabel>>,
    policy: LabelsGraphPolicy,
) -> Result<ApplyCounts> {
    let mut txn = store.begin_write();
    let counts = {
        let mut applicator = Applicator::new(&mut txn, TxnScope::Owned)
            .with_labels(labels)?
            .with_policy(policy);
        patch.apply(&mut applicator)?;
        applicator.counts()
    };
    txn.commit();
    tracing::info!(
        store = %store.name(),
        digest = %patch.digest(),
        adds = counts.adds,
        deletes = counts.deletes,
        label_assignments = counts.label_assignments,
        "Patch applied"
    );
    Ok(counts)
}
