//! Core statement types for the graphsync stores.
//!
//! Statements use structural identity: two triples are the same statement
//! when their terms are equal. `Display` renders N-Triples syntax, the form
//! used inside patches, labels-graph patterns and backups.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{CoreError, Result};
use crate::syntax::{self, Token};

pub const XSD_STRING: &str = "http://www.w3.org/2001/XMLSchema#string";

// ── Terms ─────────────────────────────────────────────────────────

/// An RDF term.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Term {
    Iri(String),
    BlankNode(String),
    /// A literal. `datatype` is `None` for plain `xsd:string` and for
    /// language-tagged literals.
    Literal {
        value: String,
        datatype: Option<String>,
        language: Option<String>,
    },
}

impl Term {
    pub fn iri(iri: impl Into<String>) -> Self {
        Self::Iri(iri.into())
    }

    pub fn blank(label: impl Into<String>) -> Self {
        Self::BlankNode(label.into())
    }

    pub fn literal(value: impl Into<String>) -> Self {
        Self::Literal {
            value: value.into(),
            datatype: None,
            language: None,
        }
    }

    pub fn typed_literal(value: impl Into<String>, datatype: impl Into<String>) -> Self {
        let datatype = datatype.into();
        Self::Literal {
            value: value.into(),
            datatype: (datatype != XSD_STRING).then_some(datatype),
            language: None,
        }
    }

    pub fn lang_literal(value: impl Into<String>, language: impl Into<String>) -> Self {
        Self::Literal {
            value: value.into(),
            datatype: None,
            language: Some(language.into().to_ascii_lowercase()),
        }
    }

    pub fn is_iri(&self) -> bool {
        matches!(self, Self::Iri(_))
    }

    pub fn is_blank_node(&self) -> bool {
        matches!(self, Self::BlankNode(_))
    }

    pub fn is_literal(&self) -> bool {
        matches!(self, Self::Literal { .. })
    }

    pub fn as_iri(&self) -> Option<&str> {
        match self {
            Self::Iri(iri) => Some(iri),
            _ => None,
        }
    }

    /// Lexical form of a literal.
    pub fn literal_value(&self) -> Option<&str> {
        match self {
            Self::Literal { value, .. } => Some(value),
            _ => None,
        }
    }

    /// Parse a single term in N-Triples syntax.
    pub fn parse(text: &str) -> Result<Self> {
        match syntax::tokenize(text)?.as_slice() {
            [Token::Term(term)] => Ok(term.clone()),
            _ => Err(CoreError::Syntax(format!("expected a single term: {text}"))),
        }
    }
}

impl fmt::Display for Term {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Iri(iri) => write!(f, "<{iri}>"),
            Self::BlankNode(label) => write!(f, "_:{label}"),
            Self::Literal {
                value,
                datatype,
                language,
            } => {
                write!(f, "\"{}\"", syntax::escape_literal(value))?;
                if let Some(lang) = language {
                    write!(f, "@{lang}")
                } else if let Some(dt) = datatype {
                    write!(f, "^^<{dt}>")
                } else {
                    Ok(())
                }
            }
        }
    }
}

// ── Graph names ───────────────────────────────────────────────────

/// The graph a quad belongs to.
#[derive(
    Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub enum GraphName {
    #[default]
    Default,
    Named(Term),
}

impl GraphName {
    pub fn named(iri: impl Into<String>) -> Self {
        Self::Named(Term::iri(iri))
    }

    pub fn is_default(&self) -> bool {
        matches!(self, Self::Default)
    }

    /// True when this is the named graph with the given IRI.
    pub fn is_iri(&self, iri: &str) -> bool {
        matches!(self, Self::Named(Term::Iri(g)) if g == iri)
    }
}

// ── Statements ────────────────────────────────────────────────────

/// A subject–predicate–object statement.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Triple {
    pub subject: Term,
    pub predicate: Term,
    pub object: Term,
}

impl Triple {
    pub fn new(subject: Term, predicate: Term, object: Term) -> Self {
        Self {
            subject,
            predicate,
            object,
        }
    }

    pub fn in_default_graph(self) -> Quad {
        self.in_graph(GraphName::Default)
    }

    pub fn in_graph(self, graph: GraphName) -> Quad {
        Quad {
            subject: self.subject,
            predicate: self.predicate,
            object: self.object,
            graph,
        }
    }

    /// Parse `s p o` with an optional trailing `.`.
    pub fn parse(text: &str) -> Result<Self> {
        let tokens = syntax::tokenize(text)?;
        let (terms, rest) = syntax::leading_terms(&tokens);
        match rest {
            [] | [Token::Dot] => syntax::triple_from_terms(&terms),
            _ => Err(CoreError::Syntax(format!("trailing tokens in triple: {text}"))),
        }
    }
}

impl fmt::Display for Triple {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} {}", self.subject, self.predicate, self.object)
    }
}

/// A triple placed in a graph.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Quad {
    pub subject: Term,
    pub predicate: Term,
    pub object: Term,
    pub graph: GraphName,
}

impl Quad {
    pub fn triple(&self) -> Triple {
        Triple::new(
            self.subject.clone(),
            self.predicate.clone(),
            self.object.clone(),
        )
    }

    pub fn is_default_graph(&self) -> bool {
        self.graph.is_default()
    }

    /// Render as one N-Quads line, including the terminating ` .`.
    pub fn to_nquads_line(&self) -> String {
        format!("{self} .")
    }
}

impl fmt::Display for Quad {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} {}", self.subject, self.predicate, self.object)?;
        if let GraphName::Named(g) = &self.graph {
            write!(f, " {g}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn xsd_string_is_normalised() {
        assert_eq!(Term::typed_literal("v", XSD_STRING), Term::literal("v"));
    }

    #[test]
    fn triple_display_parses_back() {
        let triple = Triple::new(
            Term::iri("http://example/s"),
            Term::iri("http://example/p"),
            Term::lang_literal("chat", "FR"),
        );
        let text = triple.to_string();
        assert_eq!(text, "<http://example/s> <http://example/p> \"chat\"@fr");
        assert_eq!(Triple::parse(&text).unwrap(), triple);
    }

    #[test]
    fn quad_line_includes_graph() {
        let quad = Triple::new(
            Term::blank("b0"),
            Term::iri("http://example/p"),
            Term::iri("http://example/o"),
        )
        .in_graph(GraphName::named("http://example/g"));
        assert_eq!(
            quad.to_nquads_line(),
            "_:b0 <http://example/p> <http://example/o> <http://example/g> ."
        );
    }

    #[test]
    fn structural_identity() {
        let a = Triple::parse("<http://e/s> <http://e/p> \"x\" .").unwrap();
        let b = Triple::parse("<http://e/s>   <http://e/p> \"x\"").unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn triple_parse_rejects_extra_terms() {
        assert!(Triple::parse("<http://e/s> <http://e/p> <http://e/o> <http://e/g>").is_err());
    }
}
