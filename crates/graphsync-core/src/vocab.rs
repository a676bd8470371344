//! Reserved IRIs and media types.

/// Named graph carrying label assignments inside quad-format payloads and
/// backups. Never stored as data.
pub const LABELS_GRAPH: &str = "http://graphsync.dev/security#labels";

/// Links a labels-graph entry to the N-Triples text of the labelled triple.
pub const LABEL_PATTERN: &str = "http://graphsync.dev/security#pattern";

/// Links a labels-graph entry to one label expression.
pub const LABEL_VALUE: &str = "http://graphsync.dev/security#label";

pub const MEDIA_SPARQL_UPDATE: &str = "application/sparql-update";
pub const MEDIA_RDF_PATCH: &str = "application/rdf-patch";
pub const MEDIA_RDF_PATCH_TEXT: &str = "text/rdf-patch";
pub const MEDIA_TURTLE: &str = "text/turtle";
pub const MEDIA_NTRIPLES: &str = "application/n-triples";
pub const MEDIA_NQUADS: &str = "application/n-quads";
pub const MEDIA_TRIG: &str = "application/trig";
pub const MEDIA_RDF_XML: &str = "application/rdf+xml";
