//! Error types for the graphsync-ingest crate.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum IngestError {
    /// The message tried to do something its target store does not permit.
    #[error("Not authorized: {0}")]
    Authz(String),

    #[error("Invalid labels graph: {0}")]
    BadLabelsGraph(String),

    #[error("RDF parse error: {0}")]
    Parse(String),

    #[error("Invalid message: {0}")]
    Message(#[from] graphsync_core::CoreError),

    #[error("Patch error: {0}")]
    Patch(#[from] graphsync_patch::PatchError),

    #[error("Store error: {0}")]
    Store(#[from] graphsync_store::StoreError),

    #[error("Bus error: {0}")]
    Bus(#[from] graphsync_bus::BusError),
}

pub type Result<T> = std::result::Result<T, IngestError>;
