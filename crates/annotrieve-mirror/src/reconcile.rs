//! Incremental verification and merge
//!
//! Given the persisted catalog and this run's candidates, decides per key
//! whether the old entry is kept as is, needs a freshness check, needs a new
//! checksum, or is dropped. Network work is done by the caller; this module
//! only consumes probe results, so it is fully deterministic.
//!
//! ```text
//! CANDIDATE -> KEEP (recent)
//!           -> freshness -> KEEP (unchanged | unconfirmed)
//!                        -> NEEDS_CHECKSUM -> stamped | KEEP (failed, cataloged) | DROP
//! ```

use annotrieve_common::AnnotationRecord;
use chrono::NaiveDate;
use indexmap::IndexMap;
use std::collections::{HashMap, HashSet};

use crate::probe::ProbeTarget;
use crate::resolve::Resolution;

/// Persisted catalog keyed by the source's catalog key
pub type CatalogSnapshot = IndexMap<String, AnnotationRecord>;

/// Candidates discovered this run
pub type ParsedSnapshot = IndexMap<String, AnnotationRecord>;

/// Why an existing catalog entry survives unchanged
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeepReason {
    /// Confirmed within the recent window; not probed
    Recent,
    /// Remote modification date matches the catalog
    Unchanged,
    /// Freshness probe failed; retried next run
    FreshnessUnconfirmed,
    /// Checksum probe failed; retried next run
    ChecksumFailed,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconcileSummary {
    pub existing: usize,
    pub candidates: usize,
    pub kept_recent: usize,
    pub kept_unchanged: usize,
    pub kept_unconfirmed: usize,
    pub kept_checksum_failed: usize,
    /// Candidates merged with fresh stamps
    pub verified: usize,
    /// Candidates left out for lack of stamps
    pub dropped: usize,
    pub merged: usize,
}

impl ReconcileSummary {
    pub fn kept(&self) -> usize {
        self.kept_recent + self.kept_unchanged + self.kept_unconfirmed + self.kept_checksum_failed
    }
}

pub struct Reconciliation {
    existing: CatalogSnapshot,
    parsed: ParsedSnapshot,
    today: NaiveDate,
    recent_days: i64,
    kept: IndexMap<String, KeepReason>,
    resolved: HashSet<String>,
}

impl Reconciliation {
    pub fn new(existing: CatalogSnapshot, parsed: ParsedSnapshot, today: NaiveDate, recent_days: i64) -> Self {
        Self {
            existing,
            parsed,
            today,
            recent_days,
            kept: IndexMap::new(),
            resolved: HashSet::new(),
        }
    }

    pub fn existing(&self) -> &CatalogSnapshot {
        &self.existing
    }

    pub fn parsed(&self) -> &ParsedSnapshot {
        &self.parsed
    }

    pub fn kept(&self) -> &IndexMap<String, KeepReason> {
        &self.kept
    }

    fn keep(&mut self, key: &str, reason: KeepReason) {
        if !self.kept.contains_key(key) {
            self.kept.insert(key.to_string(), reason);
        }
    }

    /// Keep entries present in both snapshots and retrieved within the
    /// recent window (strictly after `today - recent_days`).
    pub fn keep_recent(&mut self) -> usize {
        let cutoff = self.today - chrono::Duration::days(self.recent_days);

        let recent: Vec<String> = self
            .existing
            .iter()
            .filter(|(key, record)| self.parsed.contains_key(*key) && record.retrieval_date > cutoff)
            .map(|(key, _)| key.clone())
            .collect();

        for key in &recent {
            self.keep(key, KeepReason::Recent);
        }
        recent.len()
    }

    /// Candidates not yet kept, at their candidate URL
    fn pending_targets(&self) -> Vec<ProbeTarget> {
        self.parsed
            .iter()
            .filter(|(key, _)| !self.kept.contains_key(*key))
            .map(|(key, record)| ProbeTarget::new(record.access_url.clone(), key.clone()))
            .collect()
    }

    /// Candidates not yet kept. A cataloged key is probed at the URL on
    /// record, which differs from this run's prediction when an earlier
    /// run adopted a fallback-resolved location.
    pub fn freshness_targets(&self) -> Vec<ProbeTarget> {
        self.parsed
            .iter()
            .filter(|(key, _)| !self.kept.contains_key(*key))
            .map(|(key, record)| {
                let url = self
                    .existing
                    .get(key)
                    .map_or(&record.access_url, |old| &old.access_url);
                ProbeTarget::new(url.clone(), key.clone())
            })
            .collect()
    }

    /// Fold freshness results in. `targets` is what was probed; a target
    /// without a result failed.
    pub fn apply_freshness(&mut self, targets: &[ProbeTarget], results: Vec<(String, NaiveDate)>) {
        let results: HashMap<String, NaiveDate> = results.into_iter().collect();

        for target in targets {
            let key = target.key.as_str();
            let cataloged = self.existing.get(key).map(|record| record.last_modified_date);

            match (results.get(key), cataloged) {
                (None, Some(_)) => self.keep(key, KeepReason::FreshnessUnconfirmed),
                (None, None) => {},
                (Some(date), Some(Some(old))) if *date == old => self.keep(key, KeepReason::Unchanged),
                (Some(date), _) => {
                    if let Some(record) = self.parsed.get_mut(key) {
                        record.last_modified_date = Some(*date);
                    }
                },
            }
        }
    }

    pub fn checksum_targets(&self) -> Vec<ProbeTarget> {
        self.pending_targets()
    }

    /// Adopt checksums and corrected URLs found by the listing fallback
    pub fn apply_resolutions(&mut self, resolutions: &[(String, Resolution)]) {
        for (key, resolution) in resolutions {
            if let Some(record) = self.parsed.get_mut(key) {
                record.md5_checksum = Some(resolution.md5.clone());
                record.access_url = resolution.url.clone();
                self.resolved.insert(key.clone());
            }
        }
    }

    /// Stamp modification dates without keep decisions (used for URLs the
    /// first freshness pass never saw)
    pub fn stamp_freshness(&mut self, results: Vec<(String, NaiveDate)>) {
        for (key, date) in results {
            if let Some(record) = self.parsed.get_mut(&key) {
                record.last_modified_date = Some(date);
            }
        }
    }

    /// Fold checksum results in. Resolved keys count as successes.
    pub fn apply_checksums(&mut self, targets: &[ProbeTarget], results: Vec<(String, String)>) {
        let results: HashMap<String, String> = results.into_iter().collect();

        for target in targets {
            let key = target.key.as_str();
            match results.get(key) {
                Some(md5) => {
                    if let Some(record) = self.parsed.get_mut(key) {
                        record.md5_checksum = Some(md5.clone());
                    }
                },
                None if self.resolved.contains(key) => {},
                None if self.existing.contains_key(key) => self.keep(key, KeepReason::ChecksumFailed),
                None => {},
            }
        }
    }

    /// Kept old records in keep order, then verified candidates not kept
    pub fn merge(self) -> (Vec<AnnotationRecord>, ReconcileSummary) {
        let mut summary = ReconcileSummary {
            existing: self.existing.len(),
            candidates: self.parsed.len(),
            ..Default::default()
        };

        let mut merged = Vec::with_capacity(self.kept.len() + self.parsed.len());

        for (key, reason) in &self.kept {
            let Some(record) = self.existing.get(key) else {
                continue;
            };
            let mut record = record.clone();
            match reason {
                KeepReason::Recent => summary.kept_recent += 1,
                KeepReason::Unchanged => {
                    record.retrieval_date = self.today;
                    summary.kept_unchanged += 1;
                },
                KeepReason::FreshnessUnconfirmed => summary.kept_unconfirmed += 1,
                KeepReason::ChecksumFailed => summary.kept_checksum_failed += 1,
            }
            merged.push(record);
        }

        for (key, record) in self.parsed {
            if self.kept.contains_key(&key) {
                continue;
            }
            if record.is_verified() {
                summary.verified += 1;
                merged.push(record);
            } else {
                summary.dropped += 1;
            }
        }

        summary.merged = merged.len();
        (merged, summary)
    }
}
