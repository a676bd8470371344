//! Write transactions.
//!
//! A [`WriteTxn`] holds the store's writer lock and a private working copy
//! of the latest version. Nothing is visible to readers until
//! [`WriteTxn::publish`] or [`WriteTxn::commit`] swaps the working copy in.
//! Working copies are persistent collections, so taking savepoints and
//! starting transactions costs O(1).

use graphsync_core::{Quad, SecurityLabel, Triple};
use im::OrdSet;
use parking_lot::{ArcMutexGuard, RawMutex};

use crate::labels::LabelIndex;
use crate::queries::ReadView;
use crate::store::{Result, Store, StoreError, StoreVersion};

/// Something quads can be written into.
pub trait QuadSink {
    /// Returns true when the sink changed.
    fn add_quad(&mut self, quad: &Quad) -> bool;

    /// Returns true when the sink changed.
    fn delete_quad(&mut self, quad: &Quad) -> bool;
}

/// A captured working state to roll back to.
#[derive(Debug, Clone)]
pub struct Savepoint {
    version: StoreVersion,
    dirty: bool,
}

/// An open write transaction. Dropping it without committing aborts.
pub struct WriteTxn {
    store: Store,
    _guard: ArcMutexGuard<RawMutex, ()>,
    working: StoreVersion,
    dirty: bool,
}

impl WriteTxn {
    pub(crate) fn new(store: Store, guard: ArcMutexGuard<RawMutex, ()>) -> Self {
        let working = (*store.current()).clone();
        Self {
            store,
            _guard: guard,
            working,
            dirty: false,
        }
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    pub fn is_labelled(&self) -> bool {
        self.working.labels.is_some()
    }

    /// True when there are unpublished changes.
    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub fn add(&mut self, quad: &Quad) -> bool {
        let changed = self.working.quads.insert(quad.clone()).is_none();
        self.dirty |= changed;
        changed
    }

    pub fn delete(&mut self, quad: &Quad) -> bool {
        let changed = self.working.quads.remove(quad).is_some();
        self.dirty |= changed;
        changed
    }

    pub fn contains(&self, quad: &Quad) -> bool {
        self.working.quads.contains(quad)
    }

    /// Union labels into the index entry for `triple`. Returns how many
    /// labels were new.
    pub fn add_labels(&mut self, triple: &Triple, labels: &[SecurityLabel]) -> Result<usize> {
        let index = self
            .working
            .labels
            .as_mut()
            .ok_or_else(|| StoreError::NoLabelStore {
                store: self.store.name().to_string(),
            })?;
        let added = index.add(triple, labels.iter().cloned());
        self.dirty |= added > 0;
        Ok(added)
    }

    pub fn savepoint(&self) -> Savepoint {
        Savepoint {
            version: self.working.clone(),
            dirty: self.dirty,
        }
    }

    pub fn rollback_to(&mut self, savepoint: &Savepoint) {
        self.working = savepoint.version.clone();
        self.dirty = savepoint.dirty;
    }

    /// Remove all data and labels. Used when restoring from a backup.
    pub fn clear(&mut self) {
        let has_labels = self.working.labels.as_ref().is_some_and(|l| !l.is_empty());
        if !self.working.quads.is_empty() || has_labels {
            self.dirty = true;
        }
        self.working.quads = OrdSet::new();
        if let Some(labels) = self.working.labels.as_mut() {
            *labels = LabelIndex::new();
        }
    }

    /// Read the transaction's own uncommitted state.
    pub fn view(&self) -> ReadView {
        self.store.view_of(self.working.clone())
    }

    /// Make the working state visible and keep the transaction open.
    /// Returns the published sequence number.
    pub fn publish(&mut self) -> u64 {
        if !self.dirty {
            return self.working.seq;
        }
        self.working.seq += 1;
        self.store.install(self.working.clone());
        self.dirty = false;
        tracing::debug!(
            store = %self.store.name(),
            seq = self.working.seq,
            quads = self.working.quads.len(),
            "Version published"
        );
        self.working.seq
    }

    /// Publish and release the writer lock.
    pub fn commit(mut self) -> u64 {
        self.publish()
    }

    /// Discard unpublished changes and release the writer lock.
    pub fn abort(self) {
        if self.dirty {
            tracing::debug!(store = %self.store.name(), "Write transaction aborted");
        }
    }
}

impl QuadSink for WriteTxn {
    fn add_quad(&mut self, quad: &Quad) -> bool {
        self.add(quad)
    }

    fn delete_quad(&mut self, quad: &Quad) -> bool {
        self.delete(quad)
    }
}
