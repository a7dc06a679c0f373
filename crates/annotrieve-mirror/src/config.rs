//! Mirror configuration
//!
//! Every component receives its settings as an explicit value at
//! construction. Defaults match the public archive layout; `from_env`
//! overlays environment variables (after `dotenvy` in the binary) and the CLI
//! can override individual fields on top of that.

use anyhow::{bail, Result};
use annotrieve_common::SourceDatabase;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::checksum::RetryPolicy;

/// How the checksum of a candidate's content is obtained
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum ChecksumMode {
    /// Stream the compressed file through a decompressor into MD5
    Stream,
    /// Read the archive-published `uncompressed_checksums.txt` manifest
    Manifest,
}

/// Decompression stage used by the streaming checksum engine
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DecompressorKind {
    /// In-process multi-member gzip decoder
    Gzip,
    /// External command reading stdin and writing stdout, e.g. `bgzip -dc`
    Command(Vec<String>),
}

impl FromStr for DecompressorKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let parts: Vec<String> = s.split_whitespace().map(str::to_string).collect();
        match parts.as_slice() {
            [] => bail!("Empty decompressor command"),
            [only] if only == "gzip" => Ok(DecompressorKind::Gzip),
            _ => Ok(DecompressorKind::Command(parts)),
        }
    }
}

/// Freshness probe, listing scrape and manifest fetch settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProbeConfig {
    /// In-flight HEAD requests
    pub freshness_concurrency: usize,
    /// In-flight manifest lookups (manifest checksum mode)
    pub manifest_concurrency: usize,
    /// In-flight directory-listing resolutions
    pub resolve_concurrency: usize,
    pub head_timeout_secs: u64,
    pub listing_timeout_secs: u64,
    pub manifest_timeout_secs: u64,
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            freshness_concurrency: 20,
            manifest_concurrency: 20,
            resolve_concurrency: 10,
            head_timeout_secs: 20,
            listing_timeout_secs: 30,
            manifest_timeout_secs: 60,
        }
    }
}

/// Streaming checksum engine settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChecksumConfig {
    /// Global ceiling on in-flight streams
    pub concurrency: usize,
    /// Number of static shards, one sequential worker each
    pub workers: usize,
    pub max_attempts: u32,
    pub backoff_step_secs: u64,
    pub backoff_cap_secs: u64,
    /// Read/write chunk size through the decompression stage
    pub chunk_size: usize,
    pub connect_timeout_secs: u64,
    /// Longest silence tolerated between two reads of a stream
    pub read_timeout_secs: u64,
    pub decompressor: DecompressorKind,
}

impl Default for ChecksumConfig {
    fn default() -> Self {
        Self {
            concurrency: 20,
            workers: 32,
            max_attempts: 3,
            backoff_step_secs: 2,
            backoff_cap_secs: 10,
            chunk_size: 1 << 20,
            connect_timeout_secs: 30,
            read_timeout_secs: 300,
            decompressor: DecompressorKind::Gzip,
        }
    }
}

impl ChecksumConfig {
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.max_attempts,
            backoff_step: Duration::from_secs(self.backoff_step_secs),
            backoff_cap: Duration::from_secs(self.backoff_cap_secs),
        }
    }
}

/// NCBI archive and inventory settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NcbiConfig {
    /// Base of the FTP-over-HTTPS tree holding `genomes/all/...`
    pub ftp_base: String,
    pub genbank_output: PathBuf,
    pub refseq_output: PathBuf,
}

impl Default for NcbiConfig {
    fn default() -> Self {
        Self {
            ftp_base: "https://ftp.ncbi.nlm.nih.gov".to_string(),
            genbank_output: PathBuf::from("data/genbank_annotations.tsv"),
            refseq_output: PathBuf::from("data/refseq_annotations.tsv"),
        }
    }
}

/// Ensembl organisms settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnsemblConfig {
    pub ftp_dir: String,
    /// Where `species.json` is cached for the duration of a run
    pub tmp_dir: PathBuf,
    pub output: PathBuf,
}

impl Default for EnsemblConfig {
    fn default() -> Self {
        Self {
            ftp_dir: "https://ftp.ebi.ac.uk/pub/ensemblorganisms".to_string(),
            tmp_dir: PathBuf::from("tmp"),
            output: PathBuf::from("data/ensembl_annotations.tsv"),
        }
    }
}

impl EnsemblConfig {
    pub fn species_url(&self) -> String {
        format!("{}/species.json", self.ftp_dir.trim_end_matches('/'))
    }
}

/// Statistics service client settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatsConfig {
    pub api_url: String,
    pub auth_key: Option<String>,
    pub timeout_secs: u64,
}

impl Default for StatsConfig {
    fn default() -> Self {
        Self {
            api_url: "http://localhost:94/annotrieve/api/v0".to_string(),
            auth_key: None,
            timeout_secs: 120,
        }
    }
}

/// Top-level configuration for one mirror run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MirrorConfig {
    /// NCBI taxon whose annotated assemblies are mirrored (2759 = Eukaryota)
    pub taxon_id: String,
    /// Path or name of the NCBI `datasets` executable
    pub datasets_bin: String,
    /// Catalog entries confirmed within this many days are kept unprobed
    pub recent_days: i64,
    pub probe: ProbeConfig,
    pub checksum: ChecksumConfig,
    pub ncbi: NcbiConfig,
    pub ensembl: EnsemblConfig,
    pub stats: StatsConfig,
}

impl Default for MirrorConfig {
    fn default() -> Self {
        Self {
            taxon_id: "2759".to_string(),
            datasets_bin: "datasets".to_string(),
            recent_days: 30,
            probe: ProbeConfig::default(),
            checksum: ChecksumConfig::default(),
            ncbi: NcbiConfig::default(),
            ensembl: EnsemblConfig::default(),
            stats: StatsConfig::default(),
        }
    }
}

fn env_string(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

fn env_parse<T: FromStr>(key: &str, default: T) -> T {
    env_string(key)
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}

impl MirrorConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        let defaults = Self::default();

        let decompressor = match env_string("MIRROR_DECOMPRESSOR") {
            Some(spec) => spec.parse()?,
            None => defaults.checksum.decompressor.clone(),
        };

        let config = Self {
            taxon_id: env_string("TAXON_ID").unwrap_or(defaults.taxon_id),
            datasets_bin: env_string("DATASETS_BIN").unwrap_or(defaults.datasets_bin),
            recent_days: env_parse("MIRROR_RECENT_DAYS", defaults.recent_days),
            probe: ProbeConfig {
                freshness_concurrency: env_parse(
                    "MIRROR_FRESHNESS_CONCURRENCY",
                    defaults.probe.freshness_concurrency,
                ),
                manifest_concurrency: env_parse(
                    "MIRROR_MANIFEST_CONCURRENCY",
                    defaults.probe.manifest_concurrency,
                ),
                resolve_concurrency: env_parse(
                    "MIRROR_RESOLVE_CONCURRENCY",
                    defaults.probe.resolve_concurrency,
                ),
                ..defaults.probe
            },
            checksum: ChecksumConfig {
                concurrency: env_parse("MIRROR_CHECKSUM_CONCURRENCY", defaults.checksum.concurrency),
                workers: env_parse("MIRROR_CHECKSUM_WORKERS", defaults.checksum.workers),
                read_timeout_secs: env_parse("MIRROR_READ_TIMEOUT_SECS", defaults.checksum.read_timeout_secs),
                decompressor,
                ..defaults.checksum
            },
            ncbi: NcbiConfig {
                ftp_base: env_string("NCBI_FTP_BASE").unwrap_or(defaults.ncbi.ftp_base),
                genbank_output: env_string("GENBANK_OUTPUT_FILE")
                    .map(PathBuf::from)
                    .unwrap_or(defaults.ncbi.genbank_output),
                refseq_output: env_string("REFSEQ_OUTPUT_FILE")
                    .map(PathBuf::from)
                    .unwrap_or(defaults.ncbi.refseq_output),
            },
            ensembl: EnsemblConfig {
                ftp_dir: env_string("ENSEMBL_FTP_DIR").unwrap_or(defaults.ensembl.ftp_dir),
                tmp_dir: env_string("ENSEMBL_TMP_DIR")
                    .map(PathBuf::from)
                    .unwrap_or(defaults.ensembl.tmp_dir),
                output: env_string("OUTPUT_FILE")
                    .map(PathBuf::from)
                    .unwrap_or(defaults.ensembl.output),
            },
            stats: StatsConfig {
                api_url: env_string("API_URL").unwrap_or(defaults.stats.api_url),
                auth_key: env_string("AUTH_KEY"),
                ..defaults.stats
            },
        };

        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.taxon_id.trim().is_empty() {
            bail!("TAXON_ID must not be empty");
        }
        if self.recent_days < 0 {
            bail!("MIRROR_RECENT_DAYS must not be negative");
        }
        if self.probe.freshness_concurrency == 0
            || self.probe.manifest_concurrency == 0
            || self.probe.resolve_concurrency == 0
        {
            bail!("Probe concurrency limits must be greater than 0");
        }
        if self.checksum.concurrency == 0 {
            bail!("MIRROR_CHECKSUM_CONCURRENCY must be greater than 0");
        }
        if self.checksum.workers == 0 {
            bail!("MIRROR_CHECKSUM_WORKERS must be greater than 0");
        }
        if self.checksum.max_attempts == 0 {
            bail!("Checksum retry ceiling must be at least 1 attempt");
        }
        if self.checksum.read_timeout_secs == 0 {
            bail!("MIRROR_READ_TIMEOUT_SECS must be greater than 0");
        }
        if self.checksum.chunk_size == 0 {
            bail!("Checksum chunk size must be greater than 0");
        }
        Ok(())
    }

    /// Set the taxon to mirror
    pub fn with_taxon(mut self, taxon_id: impl Into<String>) -> Self {
        self.taxon_id = taxon_id.into();
        self
    }

    /// Set the catalog path for one source
    pub fn with_output(mut self, source: SourceDatabase, path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        match source {
            SourceDatabase::GenBank => self.ncbi.genbank_output = path,
            SourceDatabase::RefSeq => self.ncbi.refseq_output = path,
            SourceDatabase::Ensembl => self.ensembl.output = path,
        }
        self
    }

    /// Catalog file for a source
    pub fn output_for(&self, source: SourceDatabase) -> &PathBuf {
        match source {
            SourceDatabase::GenBank => &self.ncbi.genbank_output,
            SourceDatabase::RefSeq => &self.ncbi.refseq_output,
            SourceDatabase::Ensembl => &self.ensembl.output,
        }
    }

    /// NCBI publishes checksum manifests next to every assembly; Ensembl does not
    pub fn default_checksum_mode(source: SourceDatabase) -> ChecksumMode {
        match source {
            SourceDatabase::GenBank | SourceDatabase::RefSeq => ChecksumMode::Manifest,
            SourceDatabase::Ensembl => ChecksumMode::Stream,
        }
    }

    /// Directory-listing fallback only understands the NCBI `genomes/all` layout
    pub fn fallback_enabled(source: SourceDatabase) -> bool {
        !matches!(source, SourceDatabase::Ensembl)
    }
}
