//! Read operations over a store snapshot.
//!
//! A [`ReadView`] pins one published version. Label filtering happens here:
//! a triple is visible when every label on it admits the reader, and a
//! triple with no label entry is judged by the store's default label.

use std::sync::Arc;

use graphsync_core::{GraphName, Quad, SecurityLabel, Term, Triple, UserAttributes};
use serde::{Deserialize, Serialize};

use crate::store::StoreVersion;

/// Labels attached to one triple, as returned by the labels query.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TripleLabels {
    /// N-Triples text of the triple.
    pub triple: String,
    /// Explicit labels, empty when none were assigned.
    pub labels: Vec<SecurityLabel>,
    /// True when `labels` came from the store default.
    pub defaulted: bool,
}

/// An immutable snapshot of a store. Clone is cheap.
#[derive(Debug, Clone)]
pub struct ReadView {
    version: Arc<StoreVersion>,
    default_label: Option<SecurityLabel>,
    store: Arc<str>,
}

impl ReadView {
    pub(crate) fn new(
        version: Arc<StoreVersion>,
        default_label: Option<SecurityLabel>,
        store: Arc<str>,
    ) -> Self {
        Self {
            version,
            default_label,
            store,
        }
    }

    pub fn store_name(&self) -> &str {
        &self.store
    }

    pub fn seq(&self) -> u64 {
        self.version.seq
    }

    pub fn is_labelled(&self) -> bool {
        self.version.labels.is_some()
    }

    pub fn len(&self) -> usize {
        self.version.quads.len()
    }

    pub fn is_empty(&self) -> bool {
        self.version.quads.is_empty()
    }

    pub fn contains(&self, quad: &Quad) -> bool {
        self.version.quads.contains(quad)
    }

    /// All quads in term order.
    pub fn quads(&self) -> impl Iterator<Item = &Quad> {
        self.version.quads.iter()
    }

    /// Quads matching a pattern; `None` matches anything.
    pub fn find(
        &self,
        subject: Option<&Term>,
        predicate: Option<&Term>,
        object: Option<&Term>,
        graph: Option<&GraphName>,
    ) -> Vec<Quad> {
        self.version
            .quads
            .iter()
            .filter(|q| subject.map_or(true, |s| &q.subject == s))
            .filter(|q| predicate.map_or(true, |p| &q.predicate == p))
            .filter(|q| object.map_or(true, |o| &q.object == o))
            .filter(|q| graph.map_or(true, |g| &q.graph == g))
            .cloned()
            .collect()
    }

    // ── Labels ───────────────────────────────────────────────────

    /// Explicit labels for a triple. `None` on plain stores and for
    /// unlabelled triples.
    pub fn labels_for(&self, triple: &Triple) -> Option<Vec<SecurityLabel>> {
        let index = self.version.labels.as_ref()?;
        index.get(triple).map(|set| set.iter().cloned().collect())
    }

    /// Labels that govern a triple: explicit labels, else the default.
    pub fn effective_labels(&self, triple: &Triple) -> Vec<SecurityLabel> {
        match self.labels_for(triple) {
            Some(labels) => labels,
            None => self.default_label.iter().cloned().collect(),
        }
    }

    /// Plain stores show everything.
    pub fn is_visible(&self, triple: &Triple, attrs: &UserAttributes) -> bool {
        if !self.is_labelled() {
            return true;
        }
        self.effective_labels(triple)
            .iter()
            .all(|label| label.evaluate(attrs))
    }

    /// Default-graph triples the reader may see.
    pub fn visible_triples(&self, attrs: &UserAttributes) -> Vec<Triple> {
        self.version
            .quads
            .iter()
            .filter(|q| q.is_default_graph())
            .map(Quad::triple)
            .filter(|t| self.is_visible(t, attrs))
            .collect()
    }

    /// Every explicit label entry, in triple order.
    pub fn label_entries(&self) -> Vec<(Triple, Vec<SecurityLabel>)> {
        match &self.version.labels {
            Some(index) => index
                .iter()
                .map(|(t, set)| (t.clone(), set.iter().cloned().collect()))
                .collect(),
            None => Vec::new(),
        }
    }

    pub fn triple_labels(&self, triple: &Triple) -> TripleLabels {
        match self.labels_for(triple) {
            Some(labels) => TripleLabels {
                triple: triple.to_string(),
                labels,
                defaulted: false,
            },
            None => TripleLabels {
                triple: triple.to_string(),
                labels: self.default_label.iter().cloned().collect(),
                defaulted: self.default_label.is_some(),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::Store;

    fn triple(o: &str) -> Triple {
        Triple::new(
            Term::iri("http://e/s"),
            Term::iri("http://e/p"),
            Term::literal(o),
        )
    }

    fn label(text: &str) -> SecurityLabel {
        SecurityLabel::parse(text).unwrap()
    }

    fn attrs(text: &str) -> UserAttributes {
        UserAttributes::parse(text).unwrap()
    }

    fn seeded() -> Store {
        let store = Store::labelled("kb", Some(label("employee")));
        let mut txn = store.begin_write();
        txn.add(&triple("secret").in_default_graph());
        txn.add(&triple("open").in_default_graph());
        txn.add_labels(&triple("secret"), &[label("clearance=secret")])
            .unwrap();
        txn.commit();
        store
    }

    #[test]
    fn explicit_label_filters() {
        let view = seeded().read();
        let cleared = attrs("clearance=secret");
        assert!(view.is_visible(&triple("secret"), &cleared));
        assert!(!view.is_visible(&triple("secret"), &attrs("employee")));
    }

    #[test]
    fn default_label_applies_to_unlabelled() {
        let view = seeded().read();
        assert!(view.is_visible(&triple("open"), &attrs("employee")));
        assert!(!view.is_visible(&triple("open"), &attrs("clearance=secret")));
        assert_eq!(view.visible_triples(&attrs("employee")), vec![triple("open")]);
    }

    #[test]
    fn all_labels_must_admit() {
        let store = Store::labelled("kb", None);
        let mut txn = store.begin_write();
        txn.add(&triple("x").in_default_graph());
        txn.add_labels(&triple("x"), &[label("a"), label("b")]).unwrap();
        txn.commit();
        let view = store.read();
        assert!(!view.is_visible(&triple("x"), &attrs("a")));
        assert!(view.is_visible(&triple("x"), &attrs("a, b")));
    }

    #[test]
    fn plain_store_shows_everything() {
        let store = Store::plain("p");
        let mut txn = store.begin_write();
        txn.add(&triple("x").in_default_graph());
        txn.commit();
        assert_eq!(store.read().visible_triples(&UserAttributes::new()).len(), 1);
    }

    #[test]
    fn find_by_pattern() {
        let view = seeded().read();
        let object = Term::literal("open");
        assert_eq!(view.find(None, None, Some(&object), None).len(), 1);
        assert_eq!(view.find(Some(&Term::iri("http://e/s")), None, None, None).len(), 2);
        let named = GraphName::named("http://e/g");
        assert!(view.find(None, None, None, Some(&named)).is_empty());
    }

    #[test]
    fn snapshots_do_not_move() {
        let store = seeded();
        let before = store.read();
        let mut txn = store.begin_write();
        txn.add(&triple("later").in_default_graph());
        txn.commit();
        assert_eq!(before.len(), 2);
        assert_eq!(store.read().len(), 3);
    }

    #[test]
    fn labels_query_reports_default() {
        let view = seeded().read();
        let explicit = view.triple_labels(&triple("secret"));
        assert!(!explicit.defaulted);
        assert_eq!(explicit.labels, vec![label("clearance=secret")]);

        let defaulted = view.triple_labels(&triple("open"));
        assert!(defaulted.defaulted);
        let json = serde_json::to_value(&defaulted).unwrap();
        assert_eq!(json["labels"][0], "employee");
    }
}
