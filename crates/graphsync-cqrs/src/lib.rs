//! graphsync-cqrs: updates become patches on the bus.
//!
//! A write request runs against a private overlay of a store snapshot. The
//! changes it makes are recorded as an RDF patch and published; the store
//! itself only changes later, when the consumer applies the patch.

pub mod dataset;
pub mod error;
pub mod pipeline;

pub use dataset::{BufferingDataset, CaptureDataset};
pub use error::{CqrsError, Result};
pub use pipeline::{CqrsOutcome, CqrsPipeline, UpdateContext};
