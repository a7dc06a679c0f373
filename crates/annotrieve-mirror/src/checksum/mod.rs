//! Content checksums for candidate annotation files
//!
//! Two strategies sit behind [`ChecksumProbe`]:
//!
//! - [`StreamingChecksum`]: downloads the compressed file and pipes it through
//!   a decompression stage into an MD5 accumulator, never holding the whole
//!   file in memory or on disk.
//! - [`ManifestChecksum`]: reads the MD5 of the uncompressed file from the
//!   `uncompressed_checksums.txt` manifest published next to it.
//!
//! Both yield the MD5 of the *uncompressed* content, so catalogs built with
//! either stay comparable.
//!
//! [`stream_decompressed`] is the shared download-decompress path; the
//! feature statistics in `crate::stats` read GFF files through it too.

pub mod decompress;
pub mod manifest;
pub mod stream;

use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;

use crate::probe::ProbeTarget;

pub use decompress::{Decompressor, GzipDecompressor, ProcessDecompressor};
pub use manifest::ManifestChecksum;
pub use stream::{stream_decompressed, StreamingChecksum};

/// Failure of one streaming attempt
#[derive(Debug, Error)]
pub enum ChecksumError {
    #[error("Request error: {0}")]
    Request(#[from] reqwest::Error),

    #[error("HTTP {0}")]
    Status(reqwest::StatusCode),

    #[error("Decompressor IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Decompressor failed: {0}")]
    Decompressor(String),
}

/// Fixed attempt ceiling with linear backoff capped at a maximum
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub backoff_step: Duration,
    pub backoff_cap: Duration,
}

impl RetryPolicy {
    /// Delay after the failed `attempt` (1-based): `min(step * attempt, cap)`
    pub fn delay(&self, attempt: u32) -> Duration {
        self.backoff_step
            .saturating_mul(attempt)
            .min(self.backoff_cap)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff_step: Duration::from_secs(2),
            backoff_cap: Duration::from_secs(10),
        }
    }
}

/// Checksum many targets; failed targets are omitted from the output.
///
/// Output pairs are `(key, md5_hex)`.
#[async_trait]
pub trait ChecksumProbe: Send + Sync {
    async fn checksum_many(&self, targets: Vec<ProbeTarget>) -> Vec<(String, String)>;
}
