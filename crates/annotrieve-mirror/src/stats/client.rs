//! Client for the annotation statistics endpoints
//!
//! Lists annotations still missing feature statistics and uploads a
//! computed statistics document for one of them.

use reqwest::{Client, StatusCode};
use serde::Serialize;
use serde_json::Value;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info};

use crate::checksum::ChecksumError;
use crate::config::StatsConfig;

#[derive(Debug, Error)]
pub enum StatsError {
    #[error("Request error: {0}")]
    Request(#[from] reqwest::Error),

    #[error("Could not stream annotation file: {0}")]
    Stream(#[from] ChecksumError),

    #[error("Could not encode statistics: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("API returned {status}: {body}")]
    Api { status: StatusCode, body: String },

    #[error("Unexpected response shape: {0}")]
    Shape(String),
}

#[derive(Debug, Serialize)]
struct StatsPayload<'a> {
    features_statistics: &'a Value,
    auth_key: Option<&'a str>,
}

pub struct StatsClient {
    client: Client,
    api_url: String,
    auth_key: Option<String>,
    timeout: Duration,
}

impl StatsClient {
    pub fn new(client: Client, config: &StatsConfig) -> Self {
        Self {
            client,
            api_url: config.api_url.trim_end_matches('/').to_string(),
            auth_key: config.auth_key.clone(),
            timeout: Duration::from_secs(config.timeout_secs),
        }
    }

    /// Annotations that have no statistics yet, as returned by the API
    pub async fn pending(&self, limit: usize) -> Result<Vec<Value>, StatsError> {
        let url = format!("{}/annotations", self.api_url);
        let response = self
            .client
            .get(&url)
            .query(&[("has_stats", "false".to_string()), ("limit", limit.to_string())])
            .timeout(self.timeout)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(StatsError::Api { status, body });
        }

        let mut document: Value = response.json().await?;
        let results = match document.get_mut("results").map(Value::take) {
            Some(Value::Array(items)) => items,
            Some(Value::Null) | None => Vec::new(),
            Some(other) => return Err(StatsError::Shape(format!("results is not an array: {}", other))),
        };

        debug!(count = results.len(), "Fetched annotations without stats");
        Ok(results)
    }

    /// Upload statistics for one annotation. Anything but 200 is an error.
    pub async fn push(&self, annotation_id: &str, stats: &Value) -> Result<(), StatsError> {
        let url = format!("{}/annotations/{}/stats", self.api_url, annotation_id);
        let payload = StatsPayload {
            features_statistics: stats,
            auth_key: self.auth_key.as_deref(),
        };

        let response = self
            .client
            .put(&url)
            .json(&payload)
            .timeout(self.timeout)
            .send()
            .await?;

        let status = response.status();
        if status != StatusCode::OK {
            let body = response.text().await.unwrap_or_default();
            return Err(StatsError::Api { status, body });
        }

        info!(%annotation_id, "Uploaded feature statistics");
        Ok(())
    }
}
