//! Error types for remote probes

use reqwest::StatusCode;
use thiserror::Error;

/// Why a single remote probe produced no value.
///
/// These never abort a run; callers log them and treat the probe as absent.
#[derive(Debug, Error)]
pub enum ProbeError {
    #[error("Request error: {0}")]
    Request(#[from] reqwest::Error),

    #[error("HTTP {status} from {url}")]
    Status { url: String, status: StatusCode },

    #[error("Missing {0} header")]
    MissingHeader(&'static str),

    #[error("Unparsable {header} header: {value}")]
    BadHeader { header: &'static str, value: String },

    #[error("No annotation entry in manifest {0}")]
    NoManifestEntry(String),

    #[error("Invalid url {url}: {reason}")]
    InvalidUrl { url: String, reason: String },
}

impl ProbeError {
    /// Build a status error for a non-success response
    pub fn status(url: &str, status: StatusCode) -> Self {
        ProbeError::Status {
            url: url.to_string(),
            status,
        }
    }
}
