//! Shared HTTP client construction and small fetch helpers

use reqwest::{Client, ClientBuilder};
use std::time::Duration;

use crate::error::ProbeError;

/// User agent sent with every request
pub const USER_AGENT: &str = concat!("annotrieve-mirror/", env!("CARGO_PKG_VERSION"));

fn client_builder(connect_timeout: Duration) -> ClientBuilder {
    Client::builder()
        .connect_timeout(connect_timeout)
        .user_agent(USER_AGENT)
}

/// Client used by every probe.
///
/// No overall timeout is set here: checksum streams of multi-gigabyte files
/// must not be cut off. Short probes set a per-request timeout instead.
pub fn build_client(connect_timeout: Duration) -> reqwest::Result<Client> {
    client_builder(connect_timeout).build()
}

/// Client for long body streams.
///
/// `read_timeout` bounds every single read (response head included) and
/// resets after each successful one, so a server that stops sending fails
/// the attempt while a slow but moving transfer runs to completion.
pub fn build_stream_client(connect_timeout: Duration, read_timeout: Duration) -> reqwest::Result<Client> {
    client_builder(connect_timeout).read_timeout(read_timeout).build()
}

/// GET `url` as text, failing on non-success status
pub async fn fetch_text(client: &Client, url: &str, timeout: Duration) -> Result<String, ProbeError> {
    let response = client.get(url).timeout(timeout).send().await?;

    if !response.status().is_success() {
        return Err(ProbeError::status(url, response.status()));
    }

    Ok(response.text().await?)
}
