//! Feature statistics for remote GFF3 files
//!
//! Files are streamed through the same decompression stage as checksums and
//! folded line by line into a [`GffStatsBuilder`]; nothing touches the disk.

use reqwest::Client;
use serde_json::Value;
use std::sync::Arc;
use tracing::{info, instrument, warn};

use super::client::{StatsClient, StatsError};
use super::gff::{FeaturesStatistics, GffStatsBuilder};
use crate::checksum::{stream_decompressed, Decompressor};

/// `(annotation_id, source_file_info.url_path)` of an API annotation record
pub fn pending_job(annotation: &Value) -> Option<(&str, &str)> {
    let id = annotation.get("annotation_id")?.as_str()?;
    let url = annotation.get("source_file_info")?.get("url_path")?.as_str()?;
    Some((id, url))
}

/// Streams one annotation file and summarizes its gene model
pub struct FeatureStatsComputer {
    client: Client,
    decompressor: Arc<dyn Decompressor>,
    chunk_size: usize,
}

impl FeatureStatsComputer {
    pub fn new(client: Client, decompressor: Arc<dyn Decompressor>) -> Self {
        Self {
            client,
            decompressor,
            chunk_size: 1 << 20,
        }
    }

    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size.max(1);
        self
    }

    #[instrument(skip(self))]
    pub async fn compute(&self, url: &str) -> Result<FeaturesStatistics, StatsError> {
        let mut builder = GffStatsBuilder::new();
        let bytes = stream_decompressed(
            &self.client,
            url,
            self.decompressor.as_ref(),
            self.chunk_size,
            |chunk| builder.feed(chunk),
        )
        .await?;

        info!(bytes, features = builder.features(), "Parsed annotation file");
        Ok(builder.finish())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StatsRunSummary {
    pub pending: usize,
    pub pushed: usize,
    /// Records without an id or a file url
    pub skipped: usize,
    pub failed: usize,
}

/// Compute and upload statistics for every annotation still missing them.
///
/// A failing annotation is logged and left for the next run; only the
/// listing itself is fatal.
pub async fn compute_pending(
    api: &StatsClient,
    computer: &FeatureStatsComputer,
    limit: usize,
) -> Result<StatsRunSummary, StatsError> {
    let pending = api.pending(limit).await?;
    let mut summary = StatsRunSummary {
        pending: pending.len(),
        ..Default::default()
    };

    for annotation in &pending {
        let Some((annotation_id, url)) = pending_job(annotation) else {
            warn!(record = %annotation, "Annotation without id or file url");
            summary.skipped += 1;
            continue;
        };

        let stats = match computer.compute(url).await {
            Ok(stats) => stats,
            Err(e) => {
                warn!(%annotation_id, %url, error = %e, "Statistics computation failed");
                summary.failed += 1;
                continue;
            },
        };

        match api.push(annotation_id, &serde_json::to_value(&stats)?).await {
            Ok(()) => summary.pushed += 1,
            Err(e) => {
                warn!(%annotation_id, error = %e, "Statistics upload failed");
                summary.failed += 1;
            },
        }
    }

    info!(
        pending = summary.pending,
        pushed = summary.pushed,
        skipped = summary.skipped,
        failed = summary.failed,
        "Statistics run complete"
    );
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_pending_job() {
        let record = json!({
            "annotation_id": "a1",
            "source_file_info": {"url_path": "https://example.org/a1.gff.gz"}
        });
        assert_eq!(pending_job(&record), Some(("a1", "https://example.org/a1.gff.gz")));
        assert_eq!(pending_job(&json!({"annotation_id": "a2"})), None);
        assert_eq!(pending_job(&json!({"source_file_info": {"url_path": "x"}})), None);
    }
}
