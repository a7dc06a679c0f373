//! Decompression stages for the streaming checksum engine
//!
//! A stage is a byte-stream transform: compressed bytes are written into
//! `input`, decompressed bytes are read from `output`, and `handle` reports
//! whether the transform exited cleanly. The engine only sees this shape, so
//! an external process and an in-process decoder are interchangeable.

use async_trait::async_trait;
use flate2::write::MultiGzDecoder;
use std::io::Write;
use std::process::Stdio;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::process::{Child, Command};
use tokio::task::JoinHandle;
use tracing::debug;

use super::ChecksumError;

/// Exit status of a running stage
#[async_trait]
pub trait StageHandle: Send {
    /// Wait for the stage to finish; error unless it exited successfully
    async fn wait(&mut self) -> Result<(), ChecksumError>;

    /// Stop the stage if it is still running
    async fn kill(&mut self);
}

/// One running decompression stage
pub struct DecompressStage {
    pub input: Box<dyn AsyncWrite + Send + Unpin>,
    pub output: Box<dyn AsyncRead + Send + Unpin>,
    pub handle: Box<dyn StageHandle>,
}

/// Factory for decompression stages, one per streaming attempt
pub trait Decompressor: Send + Sync {
    fn spawn(&self) -> Result<DecompressStage, ChecksumError>;

    /// Short name for logs
    fn name(&self) -> String;
}

// ============================================================================
// External process
// ============================================================================

/// Runs a command such as `bgzip -dc` with piped stdin/stdout
#[derive(Debug, Clone)]
pub struct ProcessDecompressor {
    program: String,
    args: Vec<String>,
}

impl ProcessDecompressor {
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
        }
    }

    /// Build from a full command line split into words
    pub fn from_command(command: &[String]) -> Option<Self> {
        let (program, args) = command.split_first()?;
        Some(Self::new(program.clone(), args.to_vec()))
    }
}

struct ProcessHandle {
    program: String,
    child: Child,
}

#[async_trait]
impl StageHandle for ProcessHandle {
    async fn wait(&mut self) -> Result<(), ChecksumError> {
        let status = self.child.wait().await?;
        if status.success() {
            Ok(())
        } else {
            Err(ChecksumError::Decompressor(format!("{} exited with {}", self.program, status)))
        }
    }

    async fn kill(&mut self) {
        if let Err(e) = self.child.kill().await {
            debug!(program = %self.program, error = %e, "Decompressor already gone");
        }
    }
}

impl Decompressor for ProcessDecompressor {
    fn spawn(&self) -> Result<DecompressStage, ChecksumError> {
        let mut child = Command::new(&self.program)
            .args(&self.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()?;

        let input = child
            .stdin
            .take()
            .ok_or_else(|| ChecksumError::Decompressor("stdin was not captured".to_string()))?;
        let output = child
            .stdout
            .take()
            .ok_or_else(|| ChecksumError::Decompressor("stdout was not captured".to_string()))?;

        Ok(DecompressStage {
            input: Box::new(input),
            output: Box::new(output),
            handle: Box::new(ProcessHandle {
                program: self.program.clone(),
                child,
            }),
        })
    }

    fn name(&self) -> String {
        std::iter::once(self.program.as_str())
            .chain(self.args.iter().map(String::as_str))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

// ============================================================================
// In-process gzip
// ============================================================================

/// Multi-member gzip decoder running as a tokio task.
///
/// BGZF files are a series of gzip members, so a single-member decoder would
/// stop after the first block.
#[derive(Debug, Clone)]
pub struct GzipDecompressor {
    chunk_size: usize,
}

impl GzipDecompressor {
    pub fn new(chunk_size: usize) -> Self {
        Self {
            chunk_size: chunk_size.max(1),
        }
    }
}

struct TaskHandle {
    task: Option<JoinHandle<std::io::Result<()>>>,
}

#[async_trait]
impl StageHandle for TaskHandle {
    async fn wait(&mut self) -> Result<(), ChecksumError> {
        let task = self
            .task
            .take()
            .ok_or_else(|| ChecksumError::Decompressor("stage already finished".to_string()))?;

        match task.await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => Err(ChecksumError::Decompressor(e.to_string())),
            Err(e) => Err(ChecksumError::Decompressor(format!("decoder task failed: {}", e))),
        }
    }

    async fn kill(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

impl Decompressor for GzipDecompressor {
    fn spawn(&self) -> Result<DecompressStage, ChecksumError> {
        let chunk_size = self.chunk_size;
        let (input, mut compressed) = tokio::io::duplex(chunk_size);
        let (mut plain, output) = tokio::io::duplex(chunk_size);

        let task = tokio::spawn(async move {
            let mut decoder = MultiGzDecoder::new(Vec::with_capacity(chunk_size));
            let mut buf = vec![0u8; chunk_size];

            loop {
                let n = compressed.read(&mut buf).await?;
                if n == 0 {
                    break;
                }
                decoder.write_all(&buf[..n])?;
                let decoded = std::mem::take(decoder.get_mut());
                if !decoded.is_empty() {
                    plain.write_all(&decoded).await?;
                }
            }

            // Truncated input surfaces here as a corrupt-stream error
            decoder.try_finish()?;
            let tail = std::mem::take(decoder.get_mut());
            plain.write_all(&tail).await?;
            plain.shutdown().await?;
            Ok(())
        });

        Ok(DecompressStage {
            input: Box::new(input),
            output: Box::new(output),
            handle: Box::new(TaskHandle { task: Some(task) }),
        })
    }

    fn name(&self) -> String {
        "gzip (in-process)".to_string()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use flate2::write::GzEncoder;
    use flate2::Compression;

    fn gzip(data: &[u8]) -> Vec<u8> {
        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(data).unwrap();
        encoder.finish().unwrap()
    }

    async fn run_stage(
        decompressor: &dyn Decompressor,
        payload: Vec<u8>,
    ) -> (Vec<u8>, Result<(), ChecksumError>) {
        let DecompressStage {
            mut input,
            mut output,
            mut handle,
        } = decompressor.spawn().unwrap();

        let feed = async move {
            // A failed write means the stage died; its exit status tells why
            let _ = input.write_all(&payload).await;
            let _ = input.shutdown().await;
            drop(input);
        };
        let drain = async {
            let mut out = Vec::new();
            let _ = output.read_to_end(&mut out).await;
            out
        };
        let ((), out) = tokio::join!(feed, drain);
        (out, handle.wait().await)
    }

    #[tokio::test]
    async fn test_gzip_single_member() {
        let data = b"##gff-version 3\nchr1\tRefSeq\tgene\t1\t100\t.\t+\t.\tID=gene1\n".repeat(500);
        let (out, status) = run_stage(&GzipDecompressor::new(64), gzip(&data)).await;
        assert!(status.is_ok());
        assert_eq!(out, data);
    }

    #[tokio::test]
    async fn test_gzip_multi_member() {
        let mut payload = gzip(b"first member\n");
        payload.extend(gzip(b"second member\n"));
        let (out, status) = run_stage(&GzipDecompressor::new(1024), payload).await;
        assert!(status.is_ok());
        assert_eq!(out, b"first member\nsecond member\n");
    }

    #[tokio::test]
    async fn test_gzip_rejects_garbage() {
        let (_, status) =
            run_stage(&GzipDecompressor::new(1024), b"this is definitely not gzip data".to_vec()).await;
        assert!(status.is_err());
    }

    #[tokio::test]
    async fn test_gzip_rejects_truncated_stream() {
        let mut payload = gzip(&b"truncated annotation body\n".repeat(100));
        payload.truncate(payload.len() / 2);
        let (_, status) = run_stage(&GzipDecompressor::new(1024), payload).await;
        assert!(status.is_err());
    }

    #[tokio::test]
    async fn test_process_identity_transform() {
        let cat = ProcessDecompressor::new("cat", Vec::new());
        assert_eq!(cat.name(), "cat");
        let (out, status) = run_stage(&cat, b"plain bytes".to_vec()).await;
        assert!(status.is_ok());
        assert_eq!(out, b"plain bytes");
    }

    #[tokio::test]
    async fn test_process_nonzero_exit_is_an_error() {
        let failing = ProcessDecompressor::new("false", Vec::new());
        let (_, status) = run_stage(&failing, b"ignored".to_vec()).await;
        assert!(status.is_err());
    }

    #[test]
    fn test_from_command() {
        let command = vec!["bgzip".to_string(), "-dc".to_string()];
        let process = ProcessDecompressor::from_command(&command).unwrap();
        assert_eq!(process.name(), "bgzip -dc");
        assert!(ProcessDecompressor::from_command(&[]).is_none());
    }
}
