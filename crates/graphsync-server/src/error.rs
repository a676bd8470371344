use graphsync_backup::BackupError;
use graphsync_bus::BusError;
use graphsync_core::CoreError;
use graphsync_cqrs::CqrsError;
use graphsync_ingest::IngestError;
use graphsync_store::StoreError;

#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error("Config error: {0}")]
    Config(#[from] CoreError),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Bus error: {0}")]
    Bus(#[from] BusError),

    #[error("Ingest error: {0}")]
    Ingest(#[from] IngestError),

    #[error("Update error: {0}")]
    Cqrs(#[from] CqrsError),

    #[error("Backup error: {0}")]
    Backup(#[from] BackupError),

    #[error("Backup {0} belongs to no configured store")]
    NoStoreForBackup(String),

    #[error("Background task failed: {0}")]
    Task(String),
}

pub type Result<T> = std::result::Result<T, ServerError>;
