//! graphsync-server: wires configured stores to the bus.
//!
//! The [`daemon::Daemon`] owns the store registry, the file-backed bus and
//! the offset store. It runs one consumer per store and, when configured,
//! takes periodic and shutdown backups.

pub mod daemon;
pub mod error;

pub use daemon::Daemon;
pub use error::{Result, ServerError};
