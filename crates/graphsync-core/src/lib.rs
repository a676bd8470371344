//! graphsync-core: shared model for the graphsync replication layer.
//!
//! This crate provides the foundational types used by every other crate:
//! - RDF terms, triples and quads with N-Triples rendering
//! - Security labels and the user attributes they are evaluated against
//! - The bus message model and payload classification
//! - Reserved vocabulary (labels graph, media types)
//! - Configuration management
//! - Common error type

pub mod attributes;
pub mod config;
pub mod error;
pub mod labels;
pub mod message;
pub mod syntax;
pub mod types;
pub mod vocab;

pub use attributes::UserAttributes;
pub use error::{CoreError, Result};
pub use labels::{LabelExpr, SecurityLabel};
pub use message::{BusMessage, Headers, OutboundMessage, PayloadKind, RdfSyntax};
pub use types::{GraphName, Quad, Term, Triple};
