//! Overlay datasets for capture.
//!
//! [`BufferingDataset`] layers pending adds and deletes over a pinned
//! snapshot; reads see the overlay, the snapshot is never touched.
//! [`CaptureDataset`] additionally records every change call as a patch.

use std::collections::BTreeSet;

use graphsync_core::{GraphName, Quad, Term};
use graphsync_patch::{Patch, PatchHandler, PatchWriter};
use graphsync_store::{QuadSink, ReadView};

use crate::error::Result;

#[derive(Debug, Clone)]
pub struct BufferingDataset {
    base: ReadView,
    added: BTreeSet<Quad>,
    deleted: BTreeSet<Quad>,
}

impl BufferingDataset {
    pub fn new(base: ReadView) -> Self {
        Self {
            base,
            added: BTreeSet::new(),
            deleted: BTreeSet::new(),
        }
    }

    pub fn base(&self) -> &ReadView {
        &self.base
    }

    pub fn contains(&self, quad: &Quad) -> bool {
        self.added.contains(quad) || (self.base.contains(quad) && !self.deleted.contains(quad))
    }

    /// Returns true when the overlay's visible content changed.
    pub fn add(&mut self, quad: &Quad) -> bool {
        if self.contains(quad) {
            return false;
        }
        if !self.deleted.remove(quad) {
            self.added.insert(quad.clone());
        }
        true
    }

    /// Returns true when the overlay's visible content changed.
    pub fn delete(&mut self, quad: &Quad) -> bool {
        if !self.contains(quad) {
            return false;
        }
        if !self.added.remove(quad) {
            self.deleted.insert(quad.clone());
        }
        true
    }

    /// Pending additions not present in the snapshot.
    pub fn added(&self) -> impl Iterator<Item = &Quad> {
        self.added.iter()
    }

    /// Pending removals of snapshot quads.
    pub fn deleted(&self) -> impl Iterator<Item = &Quad> {
        self.deleted.iter()
    }

    pub fn len(&self) -> usize {
        self.base.len() + self.added.len() - self.deleted.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Visible quads matching a pattern; `None` matches anything.
    pub fn find(
        &self,
        subject: Option<&Term>,
        predicate: Option<&Term>,
        object: Option<&Term>,
        graph: Option<&GraphName>,
    ) -> Vec<Quad> {
        let mut found: BTreeSet<Quad> = self
            .base
            .find(subject, predicate, object, graph)
            .into_iter()
            .filter(|q| !self.deleted.contains(q))
            .collect();
        found.extend(
            self.added
                .iter()
                .filter(|q| subject.map_or(true, |s| &q.subject == s))
                .filter(|q| predicate.map_or(true, |p| &q.predicate == p))
                .filter(|q| object.map_or(true, |o| &q.object == o))
                .filter(|q| graph.map_or(true, |g| &q.graph == g))
                .cloned(),
        );
        found.into_iter().collect()
    }
}

impl QuadSink for BufferingDataset {
    fn add_quad(&mut self, quad: &Quad) -> bool {
        self.add(quad)
    }

    fn delete_quad(&mut self, quad: &Quad) -> bool {
        self.delete(quad)
    }
}

/// Overlay plus a patch recording of every change call.
#[derive(Debug)]
pub struct CaptureDataset {
    overlay: BufferingDataset,
    writer: PatchWriter,
}

impl CaptureDataset {
    pub fn new(base: ReadView) -> Self {
        Self {
            overlay: BufferingDataset::new(base),
            writer: PatchWriter::with_id(),
        }
    }

    pub fn overlay(&self) -> &BufferingDataset {
        &self.overlay
    }

    /// Record an add. Set semantics apply to the overlay; the patch keeps
    /// the call either way.
    pub fn add(&mut self, quad: &Quad) -> Result<bool> {
        self.writer.add(quad)?;
        Ok(self.overlay.add(quad))
    }

    pub fn delete(&mut self, quad: &Quad) -> Result<bool> {
        self.writer.delete(quad)?;
        Ok(self.overlay.delete(quad))
    }

    pub fn contains(&self, quad: &Quad) -> bool {
        self.overlay.contains(quad)
    }

    pub fn find(
        &self,
        subject: Option<&Term>,
        predicate: Option<&Term>,
        object: Option<&Term>,
        graph: Option<&GraphName>,
    ) -> Vec<Quad> {
        self.overlay.find(subject, predicate, object, graph)
    }

    /// Data operations recorded so far.
    pub fn recorded(&self) -> usize {
        self.writer.data_ops()
    }

    pub(crate) fn begin(&mut self) -> Result<()> {
        Ok(self.writer.txn_begin()?)
    }

    pub(crate) fn commit(mut self) -> Result<Patch> {
        self.writer.txn_commit()?;
        Ok(self.writer.into_patch()?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use graphsync_core::Triple;
    use graphsync_store::Store;

    fn quad(o: &str) -> Quad {
        Triple::new(
            Term::iri("http://e/s"),
            Term::iri("http://e/p"),
            Term::literal(o),
        )
        .in_default_graph()
    }

    fn store_with(o: &str) -> Store {
        let store = Store::plain("kb");
        let mut txn = store.begin_write();
        txn.add(&quad(o));
        txn.commit();
        store
    }

    #[test]
    fn overlay_hides_and_adds_without_touching_base() {
        let store = store_with("old");
        let mut overlay = BufferingDataset::new(store.read());

        assert!(overlay.delete(&quad("old")));
        assert!(overlay.add(&quad("new")));
        assert!(!overlay.add(&quad("new")));
        assert!(!overlay.contains(&quad("old")));
        assert_eq!(overlay.len(), 1);
        assert_eq!(overlay.find(None, None, None, None), vec![quad("new")]);

        // Re-adding a deleted base quad just cancels the delete.
        assert!(overlay.add(&quad("old")));
        assert_eq!(overlay.deleted().count(), 0);
        assert_eq!(overlay.len(), 2);

        assert_eq!(store.read().len(), 1);
        assert!(store.read().contains(&quad("old")));
    }

    #[test]
    fn delete_of_pending_add_leaves_nothing() {
        let store = Store::plain("kb");
        let mut overlay = BufferingDataset::new(store.read());
        overlay.add(&quad("x"));
        assert!(overlay.delete(&quad("x")));
        assert!(overlay.is_empty());
        assert_eq!(overlay.added().count(), 0);
        assert_eq!(overlay.deleted().count(), 0);
    }

    #[test]
    fn capture_records_every_call() {
        let store = store_with("old");
        let mut capture = CaptureDataset::new(store.read());
        capture.begin().unwrap();
        capture.add(&quad("new")).unwrap();
        capture.add(&quad("new")).unwrap();
        capture.delete(&quad("old")).unwrap();
        assert_eq!(capture.recorded(), 3);

        let patch = capture.commit().unwrap();
        let summary = patch.summary();
        assert_eq!((summary.adds, summary.deletes, summary.commits), (2, 1, 1));
        assert!(patch.id().is_some());
    }
}
