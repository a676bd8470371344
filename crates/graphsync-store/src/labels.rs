//! The label index: statement → set of security labels.

use graphsync_core::{SecurityLabel, Triple};
use im::{OrdMap, OrdSet};

/// Persistent map from triples to their labels.
///
/// Adding labels is a set union, so replaying the same assignment is a
/// no-op. There is no removal: deleting data never deletes its labels.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LabelIndex {
    entries: OrdMap<Triple, OrdSet<SecurityLabel>>,
}

impl LabelIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Union `labels` into the entry for `triple`. Returns how many labels
    /// were new.
    pub fn add<I>(&mut self, triple: &Triple, labels: I) -> usize
    where
        I: IntoIterator<Item = SecurityLabel>,
    {
        let mut set = self.entries.get(triple).cloned().unwrap_or_default();
        let before = set.len();
        for label in labels {
            set.insert(label);
        }
        let added = set.len() - before;
        if added > 0 {
            self.entries.insert(triple.clone(), set);
        }
        added
    }

    pub fn get(&self, triple: &Triple) -> Option<&OrdSet<SecurityLabel>> {
        self.entries.get(triple)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&Triple, &OrdSet<SecurityLabel>)> {
        self.entries.iter()
    }

    /// Number of labelled triples.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
