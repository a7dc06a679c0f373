//! Error types for the annotation mirror

use thiserror::Error;

/// Result type alias for shared operations
pub type Result<T> = std::result::Result<T, AnnoError>;

/// Main error type shared across crates
#[derive(Error, Debug)]
pub enum AnnoError {
    #[error("Invalid record {key}: {reason}")]
    InvalidRecord { key: String, reason: String },

    #[error("Unknown source database: {0}")]
    UnknownSource(String),

    #[error("Parse error: {0}")]
    Parse(String),
}

impl From<url::ParseError> for AnnoError {
    fn from(err: url::ParseError) -> Self {
        AnnoError::Parse(err.to_string())
    }
}
