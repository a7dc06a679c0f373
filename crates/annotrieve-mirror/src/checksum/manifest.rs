//! Checksum lookup in archive-published manifests
//!
//! NCBI assembly directories carry `uncompressed_checksums.txt`, a
//! tab-separated `file<TAB>md5` listing of the uncompressed members. The MD5
//! of the annotation file is read from there instead of downloading it.

use async_trait::async_trait;
use reqwest::Client;
use std::time::Duration;
use tracing::{debug, info};

use super::ChecksumProbe;
use crate::config::ProbeConfig;
use crate::error::ProbeError;
use crate::http::fetch_text;
use crate::probe::{run_bounded, ProbeTarget};

pub const MANIFEST_NAME: &str = "uncompressed_checksums.txt";

/// Substring identifying the genomic annotation row
pub const ANNOTATION_MARKER: &str = "genomic.gff";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManifestEntry {
    pub file_name: String,
    pub md5: String,
}

/// First manifest row naming the genomic annotation file
pub fn find_annotation_entry(text: &str) -> Option<ManifestEntry> {
    text.lines().find_map(|line| {
        let mut fields = line.split('\t');
        let file_name = fields.next()?.trim();
        let md5 = fields.next()?.trim();
        if !file_name.contains(ANNOTATION_MARKER) || md5.is_empty() {
            return None;
        }
        Some(ManifestEntry {
            file_name: file_name.trim_start_matches("./").to_string(),
            md5: md5.to_string(),
        })
    })
}

/// Name of the compressed file as published (`x.gff` -> `x.gff.gz`).
/// Any other name is taken as listed.
pub fn compressed_name(file_name: &str) -> String {
    if file_name.ends_with(".gff") {
        format!("{}.gz", file_name)
    } else {
        file_name.to_string()
    }
}

/// Manifest location for a file in the same directory
pub fn manifest_url_for(file_url: &str) -> Option<String> {
    let (dir, name) = file_url.rsplit_once('/')?;
    if name.is_empty() || !dir.contains("://") {
        return None;
    }
    Some(format!("{}/{}", dir, MANIFEST_NAME))
}

/// Checksum probe backed by the sibling manifest
#[derive(Clone)]
pub struct ManifestChecksum {
    client: Client,
    timeout: Duration,
    concurrency: usize,
}

impl ManifestChecksum {
    pub fn new(client: Client, config: &ProbeConfig) -> Self {
        Self {
            client,
            timeout: Duration::from_secs(config.manifest_timeout_secs),
            concurrency: config.manifest_concurrency,
        }
    }

    /// Fetch a manifest and pick the annotation row
    pub async fn fetch_entry(&self, manifest_url: &str) -> Result<ManifestEntry, ProbeError> {
        let text = fetch_text(&self.client, manifest_url, self.timeout).await?;
        find_annotation_entry(&text).ok_or_else(|| ProbeError::NoManifestEntry(manifest_url.to_string()))
    }

    /// MD5 of the uncompressed annotation next to `file_url`
    pub async fn lookup(&self, file_url: &str) -> Result<String, ProbeError> {
        let manifest_url = manifest_url_for(file_url).ok_or_else(|| ProbeError::InvalidUrl {
            url: file_url.to_string(),
            reason: "no parent directory".to_string(),
        })?;
        Ok(self.fetch_entry(&manifest_url).await?.md5)
    }
}

#[async_trait]
impl ChecksumProbe for ManifestChecksum {
    async fn checksum_many(&self, targets: Vec<ProbeTarget>) -> Vec<(String, String)> {
        info!(total = targets.len(), "Reading checksum manifests");
        run_bounded(targets, self.concurrency, |target| async move {
            match self.lookup(&target.url).await {
                Ok(md5) => Some(md5),
                Err(e) => {
                    debug!(url = %target.url, error = %e, "Manifest lookup failed");
                    None
                },
            }
        })
        .await
    }
}
