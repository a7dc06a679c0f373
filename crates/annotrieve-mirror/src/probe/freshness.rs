//! Existence and freshness probe
//!
//! A HEAD request against the annotation file; the `Last-Modified` header is
//! reduced to a calendar date. Any failure means "cannot confirm", never
//! "deleted".

use chrono::{DateTime, NaiveDate, NaiveDateTime};
use reqwest::header::LAST_MODIFIED;
use reqwest::Client;
use std::time::Duration;
use tracing::debug;

use super::{run_bounded, ProbeTarget};
use crate::config::ProbeConfig;
use crate::error::ProbeError;

/// Parse an HTTP-date into a day, discarding time of day and zone.
///
/// Accepts the IMF-fixdate form servers send today plus the two obsolete
/// forms HTTP/1.1 still allows.
pub fn parse_last_modified(value: &str) -> Option<NaiveDate> {
    let value = value.trim();

    if let Ok(dt) = DateTime::parse_from_rfc2822(value) {
        return Some(dt.date_naive());
    }

    // RFC 850: Sunday, 06-Nov-94 08:49:37 GMT
    if let Ok(dt) = NaiveDateTime::parse_from_str(value, "%A, %d-%b-%y %H:%M:%S GMT") {
        return Some(dt.date());
    }

    // asctime: Sun Nov  6 08:49:37 1994
    NaiveDateTime::parse_from_str(value, "%a %b %e %H:%M:%S %Y")
        .ok()
        .map(|dt| dt.date())
}

/// HEAD-based last-modified prober
#[derive(Clone)]
pub struct FreshnessProber {
    client: Client,
    timeout: Duration,
}

impl FreshnessProber {
    pub fn new(client: Client, config: &ProbeConfig) -> Self {
        Self {
            client,
            timeout: Duration::from_secs(config.head_timeout_secs),
        }
    }

    /// Last-modified date of `url`, or why it could not be read
    pub async fn last_modified(&self, url: &str) -> Result<NaiveDate, ProbeError> {
        let response = self.client.head(url).timeout(self.timeout).send().await?;

        if !response.status().is_success() {
            return Err(ProbeError::status(url, response.status()));
        }

        let header = response
            .headers()
            .get(LAST_MODIFIED)
            .ok_or(ProbeError::MissingHeader("Last-Modified"))?;
        let value = String::from_utf8_lossy(header.as_bytes()).into_owned();

        parse_last_modified(&value).ok_or(ProbeError::BadHeader {
            header: "Last-Modified",
            value,
        })
    }

    /// Last-modified date of `url`, absent on any failure
    pub async fn probe(&self, url: &str) -> Option<NaiveDate> {
        match self.last_modified(url).await {
            Ok(date) => Some(date),
            Err(e) => {
                debug!(%url, error = %e, "Freshness probe failed");
                None
            },
        }
    }

    /// Probe every target; failed targets are omitted from the output
    pub async fn probe_many(
        &self,
        targets: Vec<ProbeTarget>,
        concurrency: usize,
    ) -> Vec<(String, NaiveDate)> {
        run_bounded(targets, concurrency, |target| async move { self.probe(&target.url).await }).await
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_parse_imf_fixdate() {
        assert_eq!(
            parse_last_modified("Wed, 01 May 2024 23:59:59 GMT"),
            Some(date(2024, 5, 1))
        );
    }

    #[test]
    fn test_parse_obsolete_forms() {
        assert_eq!(
            parse_last_modified("Sunday, 06-Nov-94 08:49:37 GMT"),
            Some(date(1994, 11, 6))
        );
        assert_eq!(
            parse_last_modified("Sun Nov  6 08:49:37 1994"),
            Some(date(1994, 11, 6))
        );
    }

    #[test]
    fn test_parse_garbage() {
        assert_eq!(parse_last_modified(""), None);
        assert_eq!(parse_last_modified("yesterday"), None);
        assert_eq!(parse_last_modified("2024-05-01"), None);
    }
}
