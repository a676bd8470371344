//! RDF syntax parsing via `oxrdfio`.
//!
//! Parsed statements are mapped term by term into the core model.

use graphsync_core::{GraphName, Quad, RdfSyntax, Term};
use oxrdf::{GraphName as OxGraphName, Literal, Subject, Term as OxTerm};
use oxrdfio::{RdfFormat, RdfParser};

use crate::error::{IngestError, Result};

/// Base IRI for relative references in payloads read from `topic`.
pub fn base_iri(topic: &str) -> String {
    format!("kafka://{topic}/")
}

fn format_of(syntax: RdfSyntax) -> RdfFormat {
    match syntax {
        RdfSyntax::Turtle => RdfFormat::Turtle,
        RdfSyntax::NTriples => RdfFormat::NTriples,
        RdfSyntax::NQuads => RdfFormat::NQuads,
        RdfSyntax::TriG => RdfFormat::TriG,
        RdfSyntax::RdfXml => RdfFormat::RdfXml,
    }
}

/// Stream the statements of `body`, calling `on_quad` for each in order.
///
/// Stops at the first parse or callback error.
pub fn for_each_quad<F>(syntax: RdfSyntax, base: &str, body: &[u8], mut on_quad: F) -> Result<usize>
where
    F: FnMut(Quad) -> Result<()>,
{
    let parser = RdfParser::from_format(format_of(syntax))
        .with_base_iri(base)
        .map_err(|e| IngestError::Parse(format!("invalid base IRI {base}: {e}")))?;

    let mut count = 0;
    for parsed in parser.for_reader(body) {
        let parsed = parsed.map_err(|e| IngestError::Parse(e.to_string()))?;
        on_quad(convert(parsed)?)?;
        count += 1;
    }
    Ok(count)
}

/// Parse all statements into memory.
pub fn parse_all(syntax: RdfSyntax, base: &str, body: &[u8]) -> Result<Vec<Quad>> {
    let mut quads = Vec::new();
    for_each_quad(syntax, base, body, |q| {
        quads.push(q);
        Ok(())
    })?;
    Ok(quads)
}

fn convert(quad: oxrdf::Quad) -> Result<Quad> {
    let subject = match quad.subject {
        Subject::NamedNode(n) => Term::Iri(n.into_string()),
        Subject::BlankNode(b) => Term::BlankNode(b.as_str().to_owned()),
        #[allow(unreachable_patterns)]
        other => return Err(IngestError::Parse(format!("unsupported subject: {other}"))),
    };
    let object = match quad.object {
        OxTerm::NamedNode(n) => Term::Iri(n.into_string()),
        OxTerm::BlankNode(b) => Term::BlankNode(b.as_str().to_owned()),
        OxTerm::Literal(l) => literal(&l),
        #[allow(unreachable_patterns)]
        other => return Err(IngestError::Parse(format!("unsupported object: {other}"))),
    };
    let graph = match quad.graph_name {
        OxGraphName::DefaultGraph => GraphName::Default,
        OxGraphName::NamedNode(n) => GraphName::Named(Term::Iri(n.into_string())),
        OxGraphName::BlankNode(b) => GraphName::Named(Term::BlankNode(b.as_str().to_owned())),
    };
    Ok(Quad {
        subject,
        predicate: Term::Iri(quad.predicate.into_string()),
        object,
        graph,
    })
}

fn literal(literal: &Literal) -> Term {
    match literal.language() {
        Some(lang) => Term::lang_literal(literal.value(), lang),
        None => Term::typed_literal(literal.value(), literal.datatype().as_str()),
    }
}
