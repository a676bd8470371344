//! Batch dispatch: many messages, one store transaction.
//!
//! A batch begins one write transaction. Each message runs under a
//! savepoint; a message that fails is rolled back to its savepoint, logged
//! and counted, and the batch carries on. The batch commits once, so the
//! whole batch becomes visible to readers in one step.

use graphsync_core::config::LabelsGraphPolicy;
use graphsync_core::labels::labels_from_header;
use graphsync_core::{BusMessage, PayloadKind};
use graphsync_patch::Patch;
use graphsync_store::{Store, WriteTxn};
use serde::Serialize;

use crate::applicator::{ApplyCounts, Applicator, TxnScope};
use crate::error::{IngestError, Result};
use crate::loader::{self, LoadOptions};
use crate::parser;

/// Result of one message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MessageOutcome {
    Applied(ApplyCounts),
    /// Recognised but not applied here (SPARQL update markers).
    Ignored,
    Failed(String),
}

/// Summary of a committed batch.
#[derive(Debug, Clone, Default, Serialize)]
pub struct BatchReport {
    pub store: String,
    pub start_offset: u64,
    pub finish_offset: u64,
    pub messages: usize,
    pub applied: usize,
    pub ignored: usize,
    pub failed: usize,
    pub counts: ApplyCounts,
    /// Store version published by the commit.
    pub seq: u64,
}

/// Creates batches against one store.
#[derive(Debug, Clone)]
pub struct BatchDispatcher {
    store: Store,
    policy: LabelsGraphPolicy,
}

impl BatchDispatcher {
    pub fn new(store: Store, policy: LabelsGraphPolicy) -> Self {
        Self { store, policy }
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    /// Begin a batch. Blocks until the store's writer lock is free.
    pub fn start_batch(&self, size: usize, start_offset: u64) -> BatchScope {
        tracing::debug!(
            store = %self.store.name(),
            size,
            start_offset,
            "Batch started"
        );
        BatchScope {
            txn: self.store.begin_write(),
            policy: self.policy,
            named_graph_warned: false,
            report: BatchReport {
                store: self.store.name().to_string(),
                start_offset,
                ..Default::default()
            },
        }
    }
}

/// An open batch. Dropping it without [`BatchScope::finish`] discards
/// every message processed so far.
pub struct BatchScope {
    txn: WriteTxn,
    policy: LabelsGraphPolicy,
    named_graph_warned: bool,
    report: BatchReport,
}

impl BatchScope {
    pub fn process(&mut self, message: &BusMessage) -> MessageOutcome {
        self.report.messages += 1;
        let savepoint = self.txn.savepoint();
        match self.dispatch(message) {
            Ok(Some(counts)) => {
                self.report.applied += 1;
                self.report.counts.merge(&counts);
                tracing::debug!(
                    message = %message.id(),
                    adds = counts.adds,
                    deletes = counts.deletes,
                    "Message applied"
                );
                MessageOutcome::Applied(counts)
            }
            Ok(None) => {
                self.report.ignored += 1;
                MessageOutcome::Ignored
            }
            Err(e) => {
                self.txn.rollback_to(&savepoint);
                self.report.failed += 1;
                tracing::error!(
                    store = %self.report.store,
                    message = %message.id(),
                    offset = message.offset,
                    error = %e,
                    "Message failed; rolled back"
                );
                MessageOutcome::Failed(e.to_string())
            }
        }
    }

    fn dispatch(&mut self, message: &BusMessage) -> Result<Option<ApplyCounts>> {
        let kind = message.payload_kind()?;
        let labels = labels_from_header(message.security_label())?;
        if labels.is_some() && !self.txn.is_labelled() {
            return Err(IngestError::Authz(format!(
                "security label sent to unlabelled store '{}'",
                self.report.store
            )));
        }

        match kind {
            PayloadKind::SparqlUpdate => {
                tracing::info!(
                    message = %message.id(),
                    "SPARQL update message ignored by this consumer"
                );
                Ok(None)
            }
            PayloadKind::Patch => {
                let patch = Patch::parse_bytes(&message.body)?;
                let mut applicator = Applicator::new(&mut self.txn, TxnScope::External)
                    .with_labels(labels)?
                    .with_policy(self.policy)
                    .with_named_graph_warned(self.named_graph_warned);
                patch.apply(&mut applicator)?;
                self.named_graph_warned = applicator.named_graph_warned();
                Ok(Some(applicator.counts()))
            }
            PayloadKind::Data(syntax) => {
                let outcome = loader::load(
                    &mut self.txn,
                    syntax,
                    &message.body,
                    LoadOptions {
                        base: parser::base_iri(&message.topic),
                        labels,
                        named_graph_warned: self.named_graph_warned,
                    },
                )?;
                self.named_graph_warned = outcome.named_graph_warned;
                Ok(Some(outcome.counts))
            }
        }
    }

    /// Commit the batch and report on it.
    pub fn finish(mut self, count: usize, finish_offset: u64) -> BatchReport {
        if count != self.report.messages {
            tracing::warn!(
                store = %self.report.store,
                expected = count,
                processed = self.report.messages,
                "Batch size mismatch"
            );
        }
        self.report.finish_offset = finish_offset;
        self.report.seq = self.txn.commit();
        tracing::info!(
            store = %self.report.store,
            start_offset = self.report.start_offset,
            finish_offset,
            applied = self.report.applied,
            ignored = self.report.ignored,
            failed = self.report.failed,
            seq = self.report.seq,
            "Batch committed"
        );
        self.report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use graphsync_core::{Headers, SecurityLabel, Term, Triple, UserAttributes};

    fn message(offset: u64, content_type: &str, label: Option<&str>, body: &str) -> BusMessage {
        let mut headers = Headers::new().with("Content-Type", content_type);
        if let Some(label) = label {
            headers.insert("Security-Label", label);
        }
        BusMessage {
            topic: "RDF".into(),
            offset,
            headers,
            body: body.as_bytes().to_vec(),
        }
    }

    fn triple(o: &str) -> Triple {
        Triple::new(
            Term::iri("http://e/s"),
            Term::iri("http://e/p"),
            Term::literal(o),
        )
    }

    #[test]
    fn failed_message_does_not_abort_batch() {
        let store = Store::labelled("kb", None);
        let dispatcher = BatchDispatcher::new(store.clone(), LabelsGraphPolicy::Buffer);
        let mut batch = dispatcher.start_batch(3, 10);

        let ok = message(10, "text/turtle", Some("a"), "<http://e/s> <http://e/p> \"one\" .");
        let bad = message(11, "text/turtle", None, "<http://e/s> <http://e/p> \"two\" . garbage");
        let ok2 = message(12, "application/rdf-patch", None, "A <http://e/s> <http://e/p> \"three\" .");
        assert!(matches!(batch.process(&ok), MessageOutcome::Applied(_)));
        assert!(matches!(batch.process(&bad), MessageOutcome::Failed(_)));
        assert!(matches!(batch.process(&ok2), MessageOutcome::Applied(_)));

        assert!(store.read().is_empty());
        let report = batch.finish(3, 12);
        assert_eq!((report.applied, report.failed), (2, 1));
        assert_eq!(report.finish_offset, 12);

        let view = store.read();
        assert_eq!(view.len(), 2);
        assert!(!view.contains(&triple("two").in_default_graph()));
        assert_eq!(view.labels_for(&triple("one")), Some(vec![SecurityLabel::parse("a").unwrap()]));
    }

    #[test]
    fn redelivered_messages_leave_store_unchanged() {
        let store = Store::labelled("kb", None);
        let dispatcher = BatchDispatcher::new(store.clone(), LabelsGraphPolicy::Buffer);
        let messages = vec![
            message(0, "text/turtle", Some("a"), "<http://e/s> <http://e/p> \"one\" ."),
            message(
                1,
                "application/rdf-patch",
                Some("b"),
                "TX .\nA <http://e/s> <http://e/p> \"two\" .\nD <http://e/s> <http://e/p> \"one\" .\nTC .\n",
            ),
            message(
                2,
                "application/trig",
                None,
                r#"<http://graphsync.dev/security#labels> {
  _:n <http://graphsync.dev/security#pattern> "<http://e/s> <http://e/p> \"three\"" ;
      <http://graphsync.dev/security#label> "c" .
}
<http://e/s> <http://e/p> "three" ."#,
            ),
        ];

        let deliver = || {
            let mut batch = dispatcher.start_batch(messages.len(), 0);
            for msg in &messages {
                assert!(matches!(batch.process(msg), MessageOutcome::Applied(_)));
            }
            batch.finish(messages.len(), 2);
            let view = store.read();
            (view.quads().cloned().collect::<Vec<_>>(), view.label_entries())
        };

        let first = deliver();
        assert_eq!(first.0.len(), 2);
        assert_eq!(first.1.len(), 3);
        assert_eq!(deliver(), first);
    }

    #[test]
    fn sparql_update_is_ignored() {
        let store = Store::plain("p");
        let dispatcher = BatchDispatcher::new(store.clone(), LabelsGraphPolicy::Buffer);
        let mut batch = dispatcher.start_batch(1, 0);
        let msg = message(0, "application/sparql-update", None, "INSERT DATA {}");
        assert_eq!(batch.process(&msg), MessageOutcome::Ignored);
        assert_eq!(batch.finish(1, 0).ignored, 1);
    }

    #[test]
    fn missing_or_unknown_content_type_fails() {
        let store = Store::plain("p");
        let dispatcher = BatchDispatcher::new(store, LabelsGraphPolicy::Buffer);
        let mut batch = dispatcher.start_batch(2, 0);
        let mut no_type = message(0, "text/turtle", None, "");
        no_type.headers = Headers::new();
        assert!(matches!(batch.process(&no_type), MessageOutcome::Failed(_)));
        let unknown = message(1, "image/png", None, "");
        assert!(matches!(batch.process(&unknown), MessageOutcome::Failed(_)));
    }

    #[test]
    fn label_on_plain_store_fails_message() {
        let store = Store::plain("p");
        let dispatcher = BatchDispatcher::new(store.clone(), LabelsGraphPolicy::Buffer);
        let mut batch = dispatcher.start_batch(1, 0);
        let msg = message(0, "text/turtle", Some("a"), "<http://e/s> <http://e/p> \"v\" .");
        assert!(matches!(batch.process(&msg), MessageOutcome::Failed(_)));
        batch.finish(1, 0);
        assert!(store.read().is_empty());
    }

    #[test]
    fn invalid_label_fails_message() {
        let store = Store::labelled("kb", None);
        let dispatcher = BatchDispatcher::new(store.clone(), LabelsGraphPolicy::Buffer);
        let mut batch = dispatcher.start_batch(1, 0);
        let msg = message(0, "text/turtle", Some("(a"), "<http://e/s> <http://e/p> \"v\" .");
        assert!(matches!(batch.process(&msg), MessageOutcome::Failed(_)));
    }

    #[test]
    fn dropped_batch_publishes_nothing() {
        let store = Store::labelled("kb", None);
        let dispatcher = BatchDispatcher::new(store.clone(), LabelsGraphPolicy::Buffer);
        {
            let mut batch = dispatcher.start_batch(1, 0);
            let msg = message(0, "application/n-triples", Some("a"), "<http://e/s> <http://e/p> \"v\" .");
            batch.process(&msg);
        }
        assert!(store.read().is_empty());
        assert!(store.read().label_entries().is_empty());
    }

    #[test]
    fn example_scenario_secret_label() {
        let store = Store::labelled("kb", Some(SecurityLabel::deny_all()));
        let dispatcher = BatchDispatcher::new(store.clone(), LabelsGraphPolicy::Buffer);
        let mut batch = dispatcher.start_batch(1, 0);
        let msg = message(
            0,
            "text/turtle",
            Some("clearance=secret"),
            "@prefix : <http://e/> . :s :p \"v\" .",
        );
        batch.process(&msg);
        batch.finish(1, 0);

        let view = store.read();
        assert_eq!(view.len(), 1);
        let secret = UserAttributes::parse("clearance=secret").unwrap();
        assert_eq!(view.visible_triples(&secret).len(), 1);
        let public = UserAttributes::parse("clearance=public").unwrap();
        assert!(view.visible_triples(&public).is_empty());
    }
}
