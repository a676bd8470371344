//! The labels graph: label assignments carried inline with data.
//!
//! Each assignment is a node with one `pattern` literal (the N-Triples text
//! of the labelled triple) and one or more `label` literals:
//!
//! ```text
//! _:l0 <http://graphsync.dev/security#pattern> "<http://e/s> <http://e/p> \"v\"" <http://graphsync.dev/security#labels> .
//! _:l0 <http://graphsync.dev/security#label> "clearance=secret" <http://graphsync.dev/security#labels> .
//! ```
//!
//! Statements aimed at this graph are never stored as data.

use std::collections::{BTreeMap, BTreeSet};

use graphsync_core::{vocab, GraphName, Quad, SecurityLabel, Term, Triple};

use crate::error::{IngestError, Result};

/// Labels-graph statements collected during one unit of work.
#[derive(Debug, Clone, Default)]
pub struct ScratchLabels {
    triples: BTreeSet<Triple>,
}

impl ScratchLabels {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, triple: Triple) {
        self.triples.insert(triple);
    }

    pub fn delete(&mut self, triple: &Triple) {
        self.triples.remove(triple);
    }

    pub fn clear(&mut self) {
        self.triples.clear();
    }

    pub fn is_empty(&self) -> bool {
        self.triples.is_empty()
    }

    pub fn len(&self) -> usize {
        self.triples.len()
    }

    /// Turn the collected statements into (triple, labels) assignments.
    ///
    /// Every assignment node needs exactly one pattern and at least one
    /// label; anything else makes the whole graph invalid.
    pub fn interpret(&self) -> Result<Vec<(Triple, Vec<SecurityLabel>)>> {
        let mut nodes: BTreeMap<&Term, (Vec<&Term>, Vec<&Term>)> = BTreeMap::new();
        for t in &self.triples {
            let entry = nodes.entry(&t.subject).or_default();
            match t.predicate.as_iri() {
                Some(vocab::LABEL_PATTERN) => entry.0.push(&t.object),
                Some(vocab::LABEL_VALUE) => entry.1.push(&t.object),
                _ => {
                    return Err(IngestError::BadLabelsGraph(format!(
                        "unexpected predicate {}",
                        t.predicate
                    )))
                }
            }
        }

        let mut assignments = Vec::with_capacity(nodes.len());
        for (node, (patterns, labels)) in nodes {
            let pattern = match patterns.as_slice() {
                [one] => literal_text(one, node)?,
                [] => {
                    return Err(IngestError::BadLabelsGraph(format!("{node} has no pattern")))
                }
                _ => {
                    return Err(IngestError::BadLabelsGraph(format!(
                        "{node} has more than one pattern"
                    )))
                }
            };
            if labels.is_empty() {
                return Err(IngestError::BadLabelsGraph(format!("{node} has no label")));
            }
            let triple = Triple::parse(pattern).map_err(|e| {
                IngestError::BadLabelsGraph(format!("bad pattern on {node}: {e}"))
            })?;
            let labels = labels
                .into_iter()
                .map(|l| {
                    let text = literal_text(l, node)?;
                    SecurityLabel::parse(text).map_err(IngestError::from)
                })
                .collect::<Result<Vec<_>>>()?;
            assignments.push((triple, labels));
        }
        Ok(assignments)
    }
}

fn literal_text<'a>(term: &'a Term, node: &Term) -> Result<&'a str> {
    term.literal_value()
        .ok_or_else(|| IngestError::BadLabelsGraph(format!("{node} has a non-literal value")))
}

/// Render label entries as labels-graph quads, one blank node per entry.
pub fn label_quads<'a, I>(entries: I) -> Vec<Quad>
where
    I: IntoIterator<Item = (&'a Triple, &'a [SecurityLabel])>,
{
    let graph = GraphName::named(vocab::LABELS_GRAPH);
    let mut quads = Vec::new();
    for (i, (triple, labels)) in entries.into_iter().enumerate() {
        let node = Term::blank(format!("label{i}"));
        quads.push(
            Triple::new(
                node.clone(),
                Term::iri(vocab::LABEL_PATTERN),
                Term::literal(triple.to_string()),
            )
            .in_graph(graph.clone()),
        );
        for label in labels {
            quads.push(
                Triple::new(
                    node.clone(),
                    Term::iri(vocab::LABEL_VALUE),
                    Term::literal(label.as_str()),
                )
                .in_graph(graph.clone()),
            );
        }
    }
    quads
}
