//! graphsync-bus: the durable topic between capture and apply.
//!
//! Producers append through [`Publisher`], which returns the offset only
//! once the message is durable. Consumers read with [`TopicSource`] from
//! an offset they track themselves in an [`OffsetStore`].

pub mod file;
pub mod memory;
pub mod offsets;

use std::future::Future;
use std::pin::Pin;

use graphsync_core::{BusMessage, OutboundMessage};

pub use file::{FileBus, FileTopic};
pub use memory::MemoryBus;
pub use offsets::OffsetStore;

#[derive(Debug, thiserror::Error)]
pub enum BusError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Message body for topic '{topic}' is not UTF-8")]
    NonUtf8Body { topic: String },

    #[error("Corrupt record in topic '{topic}' at offset {offset}: {message}")]
    Corrupt {
        topic: String,
        offset: u64,
        message: String,
    },

    #[error("Bus unavailable: {0}")]
    Unavailable(String),
}

pub type Result<T> = std::result::Result<T, BusError>;

pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Appends messages to a topic.
pub trait Publisher: Send + Sync {
    /// Resolves to the message's offset once it is durable.
    fn publish<'a>(&'a self, message: OutboundMessage) -> BoxFuture<'a, Result<u64>>;
}

/// Reads messages from a topic by offset.
pub trait TopicSource: Send + Sync {
    /// Up to `max` messages starting at offset `from`.
    fn fetch(&self, topic: &str, from: u64, max: usize) -> Result<Vec<BusMessage>>;

    /// Offset the next appended message will get.
    fn end_offset(&self, topic: &str) -> Result<u64>;
}
