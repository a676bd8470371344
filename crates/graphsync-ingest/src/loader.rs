//! Bulk RDF data loading into an open write transaction.
//!
//! Triples-only payloads on a labelled store are streamed: each triple is
//! written and labelled as it is read. Quad payloads stream through the
//! applicator: data quads are written as they are read, labels-graph
//! statements are held back and applied after the whole payload.

use graphsync_core::config::LabelsGraphPolicy;
use graphsync_core::{vocab, RdfSyntax, SecurityLabel};
use graphsync_patch::PatchHandler;
use graphsync_store::WriteTxn;

use crate::applicator::{ApplyCounts, Applicator, TxnScope};
use crate::error::{IngestError, Result};
use crate::parser;

/// Per-load inputs besides the payload itself.
#[derive(Debug, Clone, Default)]
pub struct LoadOptions {
    pub base: String,
    pub labels: Option<Vec<SecurityLabel>>,
    /// Named-graph warning already emitted earlier in this batch.
    pub named_graph_warned: bool,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct LoadOutcome {
    pub counts: ApplyCounts,
    pub statements: usize,
    pub named_graph_warned: bool,
}

pub fn load(
    txn: &mut WriteTxn,
    syntax: RdfSyntax,
    body: &[u8],
    options: LoadOptions,
) -> Result<LoadOutcome> {
    if !txn.is_labelled() {
        return load_plain(txn, syntax, body, options);
    }
    if syntax.is_triples_only() {
        load_streaming(txn, syntax, body, options)
    } else {
        load_buffered(txn, syntax, body, options)
    }
}

fn load_plain(
    txn: &mut WriteTxn,
    syntax: RdfSyntax,
    body: &[u8],
    options: LoadOptions,
) -> Result<LoadOutcome> {
    if options.labels.is_some() {
        return Err(IngestError::Authz(format!(
            "security label supplied for unlabelled store '{}'",
            txn.store().name()
        )));
    }
    let mut counts = ApplyCounts::default();
    let statements = parser::for_each_quad(syntax, &options.base, body, |quad| {
        if quad.graph.is_iri(vocab::LABELS_GRAPH) {
            return Err(IngestError::Authz(format!(
                "labels graph sent to unlabelled store '{}'",
                txn.store().name()
            )));
        }
        if txn.add(&quad) {
            counts.adds += 1;
        }
        Ok(())
    })?;
    Ok(LoadOutcome {
        counts,
        statements,
        named_graph_warned: options.named_graph_warned,
    })
}

fn load_streaming(
    txn: &mut WriteTxn,
    syntax: RdfSyntax,
    body: &[u8],
    options: LoadOptions,
) -> Result<LoadOutcome> {
    let mut counts = ApplyCounts::default();
    let labels = options.labels.unwrap_or_default();
    let statements = parser::for_each_quad(syntax, &options.base, body, |quad| {
        if txn.add(&quad) {
            counts.adds += 1;
        }
        if !labels.is_empty() {
            txn.add_labels(&quad.triple(), &labels)?;
            counts.labelled += 1;
        }
        Ok(())
    })?;
    Ok(LoadOutcome {
        counts,
        statements,
        named_graph_warned: options.named_graph_warned,
    })
}

fn load_buffered(
    txn: &mut WriteTxn,
    syntax: RdfSyntax,
    body: &[u8],
    options: LoadOptions,
) -> Result<LoadOutcome> {
    let mut applicator = Applicator::new(txn, TxnScope::External)
        .with_labels(options.labels)?
        .with_policy(LabelsGraphPolicy::Buffer)
        .with_named_graph_warned(options.named_graph_warned);
    let statements =
        parser::for_each_quad(syntax, &options.base, body, |quad| applicator.add(&quad))?;
    applicator.finish()?;
    Ok(LoadOutcome {
        counts: applicator.counts(),
        statements,
        named_graph_warned: applicator.named_graph_warned(),
    })
}
