//! graphsync-store: transactional quad stores with security labels.
//!
//! Each store publishes immutable versions. A version holds both the quads
//! and, for labelled stores, the label index, so one pointer swap makes a
//! write's data and labels visible together. Readers hold a version for as
//! long as they need it; a single writer at a time builds the next one.

pub mod labels;
pub mod mutations;
pub mod queries;
pub mod registry;
pub mod store;

pub use labels::LabelIndex;
pub use mutations::{QuadSink, Savepoint, WriteTxn};
pub use queries::{ReadView, TripleLabels};
pub use registry::StoreRegistry;
pub use store::{Store, StoreError, StoreId, StoreOptions, StoreVersion};
