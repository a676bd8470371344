//! The change-listener seam between patches and stores.

use graphsync_core::{Quad, Term};

/// Receives patch operations in order.
///
/// Implemented by the label-aware applicator (patch → store), by
/// [`crate::PatchWriter`] (change events → patch) and by capture datasets.
/// Header and prefix hooks default to no-ops; stores keep no prefix table.
pub trait PatchHandler {
    type Error;

    fn header(&mut self, _key: &str, _value: &Term) -> Result<(), Self::Error> {
        Ok(())
    }

    fn add_prefix(&mut self, _prefix: &str, _uri: &str) -> Result<(), Self::Error> {
        Ok(())
    }

    fn delete_prefix(&mut self, _prefix: &str, _uri: &str) -> Result<(), Self::Error> {
        Ok(())
    }

    fn add(&mut self, quad: &Quad) -> Result<(), Self::Error>;

    fn delete(&mut self, quad: &Quad) -> Result<(), Self::Error>;

    fn txn_begin(&mut self) -> Result<(), Self::Error>;

    fn txn_commit(&mut self) -> Result<(), Self::Error>;

    fn txn_abort(&mut self) -> Result<(), Self::Error>;

    /// Called once after the last operation.
    fn finish(&mut self) -> Result<(), Self::Error> {
        Ok(())
    }
}
