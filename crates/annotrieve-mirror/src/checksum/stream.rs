//! Streaming checksum engine
//!
//! Each candidate is downloaded chunk by chunk, piped through a fresh
//! decompression stage, and the decompressed bytes are folded into an MD5
//! accumulator. Memory per stream is bounded by the chunk size.
//!
//! Throttling is two-level: the target list is split into static shards, each
//! drained sequentially by one worker, and every stream additionally holds a
//! permit from a global semaphore while it runs.

use annotrieve_common::checksum::Md5Accumulator;
use async_trait::async_trait;
use futures::future::join_all;
use futures::StreamExt;
use reqwest::Client;
use std::sync::Arc;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::sync::Semaphore;
use tracing::{debug, info, warn};

use super::decompress::{DecompressStage, Decompressor};
use super::{ChecksumError, ChecksumProbe, RetryPolicy};
use crate::probe::ProbeTarget;

/// Split `items` into at most `workers` contiguous shards of equal size
/// (the last may be shorter).
pub fn shards<T>(items: Vec<T>, workers: usize) -> Vec<Vec<T>> {
    if items.is_empty() {
        return Vec::new();
    }
    let size = items.len().div_ceil(workers.max(1));

    let mut shards = Vec::new();
    let mut items = items.into_iter().peekable();
    while items.peek().is_some() {
        shards.push(items.by_ref().take(size).collect());
    }
    shards
}

/// Download `url` and hand its decompressed bytes to `sink`, one chunk at a
/// time, through a fresh stage from `decompressor`.
///
/// Returns the number of decompressed bytes. The stage is killed on any
/// failure and must exit cleanly for the call to succeed.
pub async fn stream_decompressed<F>(
    client: &Client,
    url: &str,
    decompressor: &dyn Decompressor,
    chunk_size: usize,
    mut sink: F,
) -> Result<u64, ChecksumError>
where
    F: FnMut(&[u8]) + Send,
{
    let response = client.get(url).send().await?;
    if !response.status().is_success() {
        return Err(ChecksumError::Status(response.status()));
    }

    let DecompressStage {
        mut input,
        mut output,
        mut handle,
    } = decompressor.spawn()?;
    let chunk_size = chunk_size.max(1);

    let feed = async move {
        let mut body = response.bytes_stream();
        while let Some(chunk) = body.next().await {
            let chunk = chunk?;
            for piece in chunk.chunks(chunk_size) {
                input.write_all(piece).await?;
            }
        }
        input.shutdown().await?;
        // Closing stdin is what lets the stage flush and exit
        drop(input);
        Ok::<(), ChecksumError>(())
    };

    let drain = async {
        let mut total = 0u64;
        let mut buf = vec![0u8; chunk_size];
        loop {
            let n = output.read(&mut buf).await?;
            if n == 0 {
                break;
            }
            sink(&buf[..n]);
            total += n as u64;
        }
        Ok::<u64, ChecksumError>(total)
    };

    match tokio::try_join!(feed, drain) {
        Ok(((), total)) => {
            handle.wait().await?;
            Ok(total)
        },
        Err(e) => {
            handle.kill().await;
            Err(e)
        },
    }
}

/// Download-decompress-hash engine
pub struct StreamingChecksum {
    client: Client,
    decompressor: Arc<dyn Decompressor>,
    retry: RetryPolicy,
    chunk_size: usize,
    workers: usize,
    concurrency: usize,
}

impl StreamingChecksum {
    pub fn new(client: Client, decompressor: Arc<dyn Decompressor>) -> Self {
        Self {
            client,
            decompressor,
            retry: RetryPolicy::default(),
            chunk_size: 1 << 20,
            workers: 32,
            concurrency: 20,
        }
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size.max(1);
        self
    }

    /// Number of shards and global stream ceiling
    pub fn with_limits(mut self, workers: usize, concurrency: usize) -> Self {
        self.workers = workers.max(1);
        self.concurrency = concurrency.max(1);
        self
    }

    /// One download-decompress-hash attempt
    async fn attempt(&self, url: &str) -> Result<String, ChecksumError> {
        let mut md5 = Md5Accumulator::new();
        let bytes = stream_decompressed(
            &self.client,
            url,
            self.decompressor.as_ref(),
            self.chunk_size,
            |chunk| md5.update(chunk),
        )
        .await?;
        debug!(%url, bytes, "Stream hashed");
        Ok(md5.hex_digest())
    }

    /// MD5 of the decompressed content at `url`, absent once retries run out
    pub async fn stream_checksum(&self, url: &str) -> Option<String> {
        for attempt in 1..=self.retry.max_attempts {
            match self.attempt(url).await {
                Ok(md5) => return Some(md5),
                Err(e) => {
                    let delay = self.retry.delay(attempt);
                    warn!(
                        %url,
                        attempt,
                        max_attempts = self.retry.max_attempts,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "Checksum attempt failed"
                    );
                    tokio::time::sleep(delay).await;
                },
            }
        }
        None
    }

    /// Checksum every target; failed targets are omitted
    pub async fn checksum_all(&self, targets: Vec<ProbeTarget>) -> Vec<(String, String)> {
        let total = targets.len();
        let shards = shards(targets, self.workers);
        let semaphore = Semaphore::new(self.concurrency);

        info!(
            total,
            shards = shards.len(),
            concurrency = self.concurrency,
            decompressor = %self.decompressor.name(),
            "Streaming checksums"
        );

        let workers = shards.into_iter().map(|shard| {
            let semaphore = &semaphore;
            async move {
                let mut done = Vec::with_capacity(shard.len());
                for target in shard {
                    let Ok(_permit) = semaphore.acquire().await else {
                        break;
                    };
                    if let Some(md5) = self.stream_checksum(&target.url).await {
                        done.push((target.key, md5));
                    }
                }
                done
            }
        });

        let results: Vec<(String, String)> = join_all(workers).await.into_iter().flatten().collect();

        info!(total, succeeded = results.len(), "Streaming checksums complete");
        results
    }
}

#[async_trait]
impl ChecksumProbe for StreamingChecksum {
    async fn checksum_many(&self, targets: Vec<ProbeTarget>) -> Vec<(String, String)> {
        self.checksum_all(targets).await
    }
}
