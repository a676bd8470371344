use graphsync_bus::BusError;
use graphsync_core::CoreError;
use graphsync_ingest::IngestError;
use graphsync_patch::PatchError;
use graphsync_store::StoreError;

#[derive(Debug, thiserror::Error)]
pub enum CqrsError {
    #[error("Not authorized: {0}")]
    Authz(String),

    #[error("Update failed: {0}")]
    Update(String),

    #[error("Publish failed: {0}")]
    Publish(#[source] BusError),

    #[error("Local sink error: {0}")]
    Sink(#[from] std::io::Error),

    #[error(transparent)]
    Message(#[from] CoreError),

    #[error(transparent)]
    Patch(#[from] PatchError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Ingest(#[from] IngestError),
}

pub type Result<T> = std::result::Result<T, CqrsError>;
