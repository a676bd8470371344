//! graphsync-backup: point-in-time store snapshots.
//!
//! A backup is a gzip-compressed N-Quads file holding every quad of one
//! store version followed by its label index, rendered as labels-graph
//! quads. Restoring replays the file through the ingest loader, so data
//! and labels come back together in one write transaction.

pub mod catalog;
pub mod restore;
pub mod snapshot;

use std::path::PathBuf;

use graphsync_bus::BusError;
use graphsync_ingest::IngestError;
use graphsync_store::StoreError;

pub use catalog::{
    delete, details, find, latest, list, prune, resolve_dir, verify, BackupDetails, BackupEntry,
};
pub use restore::{restore, restore_offsets, RestoreReport};
pub use snapshot::{BackupFile, InFlight, SnapshotOutcome, Snapshotter};

#[derive(Debug, thiserror::Error)]
pub enum BackupError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("No checksum file for backup {0}")]
    MissingChecksum(PathBuf),

    #[error("Checksum mismatch for backup {0}")]
    ChecksumMismatch(PathBuf),

    #[error("No backup named {0}")]
    NotFound(String),

    #[error("Not a backup file: {0}")]
    NotABackup(PathBuf),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Bus(#[from] BusError),

    #[error(transparent)]
    Ingest(#[from] IngestError),
}

pub type Result<T> = std::result::Result<T, BackupError>;
