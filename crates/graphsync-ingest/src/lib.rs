//! graphsync-ingest: applies bus messages to stores.
//!
//! Messages are patches, RDF data payloads or SPARQL-update markers. A
//! batch of messages shares one store write transaction; each message runs
//! under its own savepoint, so a failing message is rolled back without
//! aborting the batch. Label assignments travel either in the
//! `Security-Label` header or inline in the reserved labels graph, and are
//! always published together with the data they protect.

pub mod applicator;
pub mod consumer;
pub mod dispatcher;
pub mod error;
pub mod labels_graph;
pub mod loader;
pub mod parser;

pub use applicator::{apply_patch, ApplyCounts, Applicator, TxnScope};
pub use consumer::IngestConsumer;
pub use dispatcher::{BatchDispatcher, BatchReport, BatchScope, MessageOutcome};
pub use error::{IngestError, Result};
