//! Bus message model shared by the ingest and CQRS sides.
//!
//! Messages are opaque byte bodies with string headers. Header lookup is
//! case-insensitive; the payload kind is resolved once from `Content-Type`.

use serde::{Deserialize, Serialize};

use crate::error::{CoreError, Result};
use crate::vocab;

pub const HEADER_CONTENT_TYPE: &str = "Content-Type";
pub const HEADER_SECURITY_LABEL: &str = "Security-Label";
pub const HEADER_REQUEST_ID: &str = "Request-Id";

// ── Headers ───────────────────────────────────────────────────────

/// Ordered header list. Duplicate names are allowed; `get` returns the first.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Headers(Vec<(String, String)>);

impl Headers {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, name: &str, value: impl Into<String>) -> Self {
        self.insert(name, value);
        self
    }

    pub fn insert(&mut self, name: &str, value: impl Into<String>) {
        self.0.push((name.to_string(), value.into()));
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.0
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(n, v)| (n.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

// ── Messages ──────────────────────────────────────────────────────

/// A message read from a topic.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BusMessage {
    pub topic: String,
    pub offset: u64,
    pub headers: Headers,
    pub body: Vec<u8>,
}

impl BusMessage {
    pub fn content_type(&self) -> Option<&str> {
        self.headers.get(HEADER_CONTENT_TYPE)
    }

    pub fn security_label(&self) -> Option<&str> {
        self.headers.get(HEADER_SECURITY_LABEL)
    }

    /// Identifier for logging: the `Request-Id` header, or `topic:offset`.
    pub fn id(&self) -> String {
        match self.headers.get(HEADER_REQUEST_ID) {
            Some(id) if !id.is_empty() => id.to_string(),
            _ => format!("{}:{}", self.topic, self.offset),
        }
    }

    pub fn payload_kind(&self) -> Result<PayloadKind> {
        let content_type = self.content_type().ok_or(CoreError::MissingContentType)?;
        PayloadKind::from_content_type(content_type)
    }
}

/// A message to be appended to a topic.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutboundMessage {
    pub topic: String,
    pub headers: Headers,
    pub body: Vec<u8>,
}

// ── Payload kinds ─────────────────────────────────────────────────

/// RDF data syntaxes accepted on the ingest path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RdfSyntax {
    Turtle,
    NTriples,
    NQuads,
    TriG,
    RdfXml,
}

impl RdfSyntax {
    /// True when the syntax cannot express named graphs.
    pub fn is_triples_only(&self) -> bool {
        !matches!(self, Self::NQuads | Self::TriG)
    }

    pub fn media_type(&self) -> &'static str {
        match self {
            Self::Turtle => vocab::MEDIA_TURTLE,
            Self::NTriples => vocab::MEDIA_NTRIPLES,
            Self::NQuads => vocab::MEDIA_NQUADS,
            Self::TriG => vocab::MEDIA_TRIG,
            Self::RdfXml => vocab::MEDIA_RDF_XML,
        }
    }

    pub fn from_media_type(media_type: &str) -> Option<Self> {
        match media_type {
            vocab::MEDIA_TURTLE | "application/x-turtle" => Some(Self::Turtle),
            vocab::MEDIA_NTRIPLES | "text/plain" => Some(Self::NTriples),
            vocab::MEDIA_NQUADS | "text/x-nquads" => Some(Self::NQuads),
            vocab::MEDIA_TRIG => Some(Self::TriG),
            vocab::MEDIA_RDF_XML => Some(Self::RdfXml),
            _ => None,
        }
    }
}

/// What a message body contains.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PayloadKind {
    SparqlUpdate,
    Patch,
    Data(RdfSyntax),
}

impl PayloadKind {
    /// Resolve from a `Content-Type` value. Parameters are ignored.
    pub fn from_content_type(content_type: &str) -> Result<Self> {
        let media_type = content_type
            .split(';')
            .next()
            .unwrap_or_default()
            .trim()
            .to_ascii_lowercase();
        match media_type.as_str() {
            vocab::MEDIA_SPARQL_UPDATE => Ok(Self::SparqlUpdate),
            vocab::MEDIA_RDF_PATCH | vocab::MEDIA_RDF_PATCH_TEXT => Ok(Self::Patch),
            other => RdfSyntax::from_media_type(other)
                .map(Self::Data)
                .ok_or_else(|| CoreError::UnsupportedContentType(content_type.to_string())),
        }
    }
}
