//! NCBI `datasets` command wrapper
//!
//! The tool prints one JSON document per line with `--as-json-lines`; lines
//! are handed to the caller as they arrive so large taxa never sit in memory
//! as one blob.

use anyhow::{bail, Context, Result};
use std::process::Stdio;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, BufReader};
use tokio::process::Command;
use tracing::{debug, info};

#[derive(Debug, Clone)]
pub struct DatasetsCli {
    bin: String,
    /// Leading arguments when the tool runs through a wrapper,
    /// e.g. `singularity exec ncbi.sif datasets`
    prefix: Vec<String>,
}

impl DatasetsCli {
    /// `command` is the executable, optionally followed by wrapper arguments
    pub fn new(command: impl AsRef<str>) -> Self {
        let mut words = command.as_ref().split_whitespace().map(str::to_string);
        Self {
            bin: words.next().unwrap_or_else(|| "datasets".to_string()),
            prefix: words.collect(),
        }
    }

    /// Arguments for annotated assemblies of one NCBI source
    pub fn annotated_args(taxon_id: &str, assembly_source: &str) -> Vec<String> {
        [
            "summary",
            "genome",
            "taxon",
            taxon_id,
            "--annotated",
            "--assembly-source",
            assembly_source,
            "--as-json-lines",
        ]
        .iter()
        .map(|s| s.to_string())
        .collect()
    }

    /// Arguments for chromosome- and complete-level accession ids
    pub fn accession_args(taxon_id: &str) -> Vec<String> {
        [
            "summary",
            "genome",
            "taxon",
            taxon_id,
            "--assembly-level",
            "chromosome,complete",
            "--report",
            "ids_only",
            "--as-json-lines",
        ]
        .iter()
        .map(|s| s.to_string())
        .collect()
    }

    /// Run with `args`, calling `on_line` for every non-empty stdout line.
    ///
    /// Fails if the command cannot be started or exits non-zero; stderr is
    /// included in the error.
    pub async fn for_each_line<F>(&self, args: &[String], mut on_line: F) -> Result<usize>
    where
        F: FnMut(&str),
    {
        info!(bin = %self.bin, args = %args.join(" "), "Running datasets");

        let mut child = Command::new(&self.bin)
            .args(&self.prefix)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .with_context(|| format!("Failed to start {}", self.bin))?;

        let stdout = child.stdout.take().context("datasets stdout was not captured")?;
        let mut stderr = child.stderr.take().context("datasets stderr was not captured")?;

        // Drain stderr alongside stdout so a chatty tool cannot block on a full pipe
        let stderr_task = tokio::spawn(async move {
            let mut text = String::new();
            let _ = stderr.read_to_string(&mut text).await;
            text
        });

        let mut lines = BufReader::new(stdout).lines();
        let mut count = 0usize;
        while let Some(line) = lines.next_line().await? {
            if line.trim().is_empty() {
                continue;
            }
            count += 1;
            on_line(&line);
        }

        let status = child.wait().await?;
        let stderr_text = stderr_task.await.unwrap_or_default();

        if !status.success() {
            bail!("{} exited with {}: {}", self.bin, status, stderr_text.trim());
        }

        debug!(lines = count, "datasets finished");
        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_annotated_args() {
        assert_eq!(
            DatasetsCli::annotated_args("2759", "RefSeq").join(" "),
            "summary genome taxon 2759 --annotated --assembly-source RefSeq --as-json-lines"
        );
    }

    #[test]
    fn test_accession_args() {
        assert_eq!(
            DatasetsCli::accession_args("7742").join(" "),
            "summary genome taxon 7742 --assembly-level chromosome,complete --report ids_only --as-json-lines"
        );
    }

    #[test]
    fn test_wrapper_command() {
        let cli = DatasetsCli::new("singularity exec ncbi.sif datasets");
        assert_eq!(cli.bin, "singularity");
        assert_eq!(cli.prefix, vec!["exec", "ncbi.sif", "datasets"]);

        let plain = DatasetsCli::new("  ");
        assert_eq!(plain.bin, "datasets");
        assert!(plain.prefix.is_empty());
    }

    #[tokio::test]
    async fn test_missing_binary_is_an_error() {
        let cli = DatasetsCli::new("annotrieve-no-such-datasets-binary");
        assert!(cli.for_each_line(&[], |_| {}).await.is_err());
    }
}
