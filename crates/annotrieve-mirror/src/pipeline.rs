//! One mirror run for one source
//!
//! load catalog -> fetch candidates -> keep recent -> freshness probe ->
//! checksum probe -> listing fallback -> merge -> write catalog

use anyhow::{bail, Context, Result};
use annotrieve_common::{AnnotationRecord, SourceDatabase};
use chrono::NaiveDate;
use reqwest::Client;
use std::collections::HashSet;
use std::path::Path;
use std::sync::Arc;
use tracing::{info, instrument};

use crate::catalog;
use crate::checksum::{
    ChecksumProbe, Decompressor, GzipDecompressor, ManifestChecksum, ProcessDecompressor, StreamingChecksum,
};
use crate::config::{ChecksumMode, DecompressorKind, MirrorConfig};
use crate::probe::{FreshnessProber, ProbeTarget};
use crate::reconcile::{CatalogSnapshot, ParsedSnapshot, ReconcileSummary, Reconciliation};
use crate::resolve::PathResolver;
use crate::sources::CandidateSource;

/// Build the decompression stage factory named by the configuration
pub fn build_decompressor(kind: &DecompressorKind, chunk_size: usize) -> Result<Arc<dyn Decompressor>> {
    Ok(match kind {
        DecompressorKind::Gzip => Arc::new(GzipDecompressor::new(chunk_size)),
        DecompressorKind::Command(command) => Arc::new(
            ProcessDecompressor::from_command(command).context("Empty decompressor command")?,
        ),
    })
}

pub struct MirrorPipeline {
    database: SourceDatabase,
    recent_days: i64,
    freshness: FreshnessProber,
    freshness_concurrency: usize,
    checksum: Box<dyn ChecksumProbe>,
    resolver: Option<PathResolver>,
    resolve_concurrency: usize,
}

impl MirrorPipeline {
    /// Wire probes for `database` from configuration
    pub fn new(database: SourceDatabase, config: &MirrorConfig, client: Client, mode: ChecksumMode) -> Result<Self> {
        let checksum: Box<dyn ChecksumProbe> = match mode {
            ChecksumMode::Manifest => Box::new(ManifestChecksum::new(client.clone(), &config.probe)),
            ChecksumMode::Stream => {
                let decompressor = build_decompressor(&config.checksum.decompressor, config.checksum.chunk_size)?;
                Box::new(
                    StreamingChecksum::new(client.clone(), decompressor)
                        .with_retry(config.checksum.retry_policy())
                        .with_chunk_size(config.checksum.chunk_size)
                        .with_limits(config.checksum.workers, config.checksum.concurrency),
                )
            },
        };

        let resolver = MirrorConfig::fallback_enabled(database).then(|| PathResolver::new(client.clone(), &config.probe));

        Ok(Self {
            database,
            recent_days: config.recent_days,
            freshness: FreshnessProber::new(client, &config.probe),
            freshness_concurrency: config.probe.freshness_concurrency,
            checksum,
            resolver,
            resolve_concurrency: config.probe.resolve_concurrency,
        })
    }

    /// Replace the checksum strategy
    pub fn with_checksum(mut self, checksum: Box<dyn ChecksumProbe>) -> Self {
        self.checksum = checksum;
        self
    }

    /// Decide the new catalog from the old one and this run's candidates
    #[instrument(skip_all, fields(source = %self.database))]
    pub async fn reconcile(
        &self,
        existing: CatalogSnapshot,
        parsed: ParsedSnapshot,
        today: NaiveDate,
    ) -> (Vec<AnnotationRecord>, ReconcileSummary) {
        let mut rec = Reconciliation::new(existing, parsed, today, self.recent_days);

        let recent = rec.keep_recent();
        info!(recent, "Kept recently verified entries");

        let targets = rec.freshness_targets();
        let dates = self.freshness.probe_many(targets.clone(), self.freshness_concurrency).await;
        info!(probed = targets.len(), confirmed = dates.len(), "Freshness probes done");
        rec.apply_freshness(&targets, dates);

        let targets = rec.checksum_targets();
        let checksums = if targets.is_empty() {
            Vec::new()
        } else {
            self.checksum.checksum_many(targets.clone()).await
        };
        info!(probed = targets.len(), hashed = checksums.len(), "Checksum probes done");

        if let Some(resolver) = &self.resolver {
            let hashed: HashSet<&str> = checksums.iter().map(|(key, _)| key.as_str()).collect();
            let failed: Vec<ProbeTarget> = targets
                .iter()
                .filter(|t| !hashed.contains(t.key.as_str()))
                .cloned()
                .collect();

            if !failed.is_empty() {
                let resolutions = resolver.resolve_many(failed).await;
                info!(resolved = resolutions.len(), "Listing fallback done");
                rec.apply_resolutions(&resolutions);

                let resolved_targets: Vec<ProbeTarget> = resolutions
                    .iter()
                    .map(|(key, r)| ProbeTarget::new(r.url.clone(), key.clone()))
                    .collect();
                if !resolved_targets.is_empty() {
                    let dates = self.freshness.probe_many(resolved_targets, self.resolve_concurrency).await;
                    rec.stamp_freshness(dates);
                }
            }
        }

        rec.apply_checksums(&targets, checksums);
        let (merged, summary) = rec.merge();

        info!(
            existing = summary.existing,
            candidates = summary.candidates,
            kept_recent = summary.kept_recent,
            kept_unchanged = summary.kept_unchanged,
            kept_unconfirmed = summary.kept_unconfirmed,
            kept_checksum_failed = summary.kept_checksum_failed,
            verified = summary.verified,
            dropped = summary.dropped,
            merged = summary.merged,
            "Reconciliation complete"
        );
        (merged, summary)
    }

    /// Full run: read `output`, fetch candidates, reconcile, rewrite `output`
    pub async fn run(&self, source: &dyn CandidateSource, output: &Path, today: NaiveDate) -> Result<ReconcileSummary> {
        if source.database() != self.database {
            bail!(
                "Source {} does not match pipeline {}",
                source.database(),
                self.database
            );
        }

        let existing = catalog::load(output, self.database.catalog_key())?;
        let parsed = source
            .fetch(today)
            .await
            .with_context(|| format!("Failed to fetch {} candidates", self.database))?;

        if parsed.is_empty() {
            bail!("No {} candidates found; leaving {} untouched", self.database, output.display());
        }

        let (merged, summary) = self.reconcile(existing, parsed, today).await;
        if merged.is_empty() {
            bail!("Merge produced no records; leaving {} untouched", output.display());
        }

        catalog::write(output, &merged)?;
        Ok(summary)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_build_decompressor() {
        let gzip = build_decompressor(&DecompressorKind::Gzip, 1024).unwrap();
        assert_eq!(gzip.name(), "gzip (in-process)");

        let bgzip = build_decompressor(
            &DecompressorKind::Command(vec!["bgzip".to_string(), "-dc".to_string()]),
            1024,
        )
        .unwrap();
        assert_eq!(bgzip.name(), "bgzip -dc");

        assert!(build_decompressor(&DecompressorKind::Command(Vec::new()), 1024).is_err());
    }
}
