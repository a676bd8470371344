use thiserror::Error;

/// Shared error type for the core model.
#[derive(Error, Debug)]
pub enum CoreError {
    #[error("Syntax error: {0}")]
    Syntax(String),

    #[error("Invalid security label '{label}': {reason}")]
    InvalidLabel { label: String, reason: String },

    #[error("Invalid attribute list: {0}")]
    InvalidAttributes(String),

    #[error("Message has no Content-Type header")]
    MissingContentType,

    #[error("Unsupported content type: {0}")]
    UnsupportedContentType(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, CoreError>;
