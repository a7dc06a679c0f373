//! Annotrieve Mirror - keeps annotation catalogs in step with their archives

use anyhow::{Context, Result};
use annotrieve_common::logging::{init_logging, LogConfig, LogLevel};
use annotrieve_common::SourceDatabase;
use annotrieve_mirror::config::{ChecksumMode, MirrorConfig};
use annotrieve_mirror::http::build_stream_client;
use annotrieve_mirror::pipeline::{build_decompressor, MirrorPipeline};
use annotrieve_mirror::sources::{CandidateSource, DatasetsCli, EnsemblSource, NcbiSource};
use annotrieve_mirror::stats::{compute_pending, FeatureStatsComputer, StatsClient};
use clap::{Parser, Subcommand, ValueEnum};
use reqwest::Client;
use std::path::PathBuf;
use std::time::Duration;
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "annotrieve-mirror")]
#[command(author, version, about = "Genome annotation catalog mirror")]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Refresh the catalog of one source
    Mirror {
        /// Archive to mirror
        #[arg(value_enum)]
        source: SourceArg,

        /// Catalog file (defaults to the source's configured output)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// NCBI taxon to mirror
        #[arg(short, long, env = "TAXON_ID")]
        taxon: Option<String>,

        /// How checksums are obtained (defaults per source)
        #[arg(long, value_enum)]
        checksum_mode: Option<ChecksumMode>,
    },

    /// Annotation statistics API
    Stats {
        #[command(subcommand)]
        action: StatsAction,
    },
}

#[derive(Subcommand, Debug)]
enum StatsAction {
    /// List annotations without statistics as JSON lines
    Pending {
        #[arg(short, long, default_value_t = 20000)]
        limit: usize,
    },

    /// Compute feature statistics from GFF3 files
    ///
    /// With `--url`, prints the statistics of that file as JSON. Otherwise
    /// every pending annotation is computed and uploaded.
    Compute {
        /// Single GFF3 file (gzip or BGZF) to summarize
        #[arg(long)]
        url: Option<String>,

        #[arg(short, long, default_value_t = 20000)]
        limit: usize,
    },

    /// Upload a statistics document for one annotation
    Push {
        #[arg(long)]
        annotation_id: String,

        /// JSON file holding the features statistics
        #[arg(long)]
        stats_file: PathBuf,
    },
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum SourceArg {
    Genbank,
    Refseq,
    Ensembl,
}

impl From<SourceArg> for SourceDatabase {
    fn from(arg: SourceArg) -> Self {
        match arg {
            SourceArg::Genbank => SourceDatabase::GenBank,
            SourceArg::Refseq => SourceDatabase::RefSeq,
            SourceArg::Ensembl => SourceDatabase::Ensembl,
        }
    }
}

fn http_client(config: &MirrorConfig) -> Result<Client> {
    build_stream_client(
        Duration::from_secs(config.checksum.connect_timeout_secs),
        Duration::from_secs(config.checksum.read_timeout_secs),
    )
    .context("Failed to build HTTP client")
}

async fn mirror(
    config: MirrorConfig,
    source: SourceDatabase,
    checksum_mode: Option<ChecksumMode>,
) -> Result<()> {
    let client = http_client(&config)?;
    let mode = checksum_mode.unwrap_or_else(|| MirrorConfig::default_checksum_mode(source));
    let datasets = DatasetsCli::new(&config.datasets_bin);

    let inventory: Box<dyn CandidateSource> = match source {
        SourceDatabase::GenBank | SourceDatabase::RefSeq => Box::new(NcbiSource::new(
            datasets,
            source,
            &config.taxon_id,
            &config.ncbi.ftp_base,
        )?),
        SourceDatabase::Ensembl => Box::new(EnsemblSource::new(
            client.clone(),
            datasets,
            &config.taxon_id,
            config.ensembl.clone(),
        )),
    };

    let pipeline = MirrorPipeline::new(source, &config, client, mode)?;
    let output = config.output_for(source);
    let today = chrono::Local::now().date_naive();

    info!(%source, taxon = %config.taxon_id, ?mode, output = %output.display(), "Starting mirror");
    let summary = pipeline.run(inventory.as_ref(), output, today).await?;
    info!(%source, merged = summary.merged, kept = summary.kept(), "Mirror complete");
    Ok(())
}

async fn stats(config: MirrorConfig, action: StatsAction) -> Result<()> {
    let client = http_client(&config)?;
    let api = StatsClient::new(client.clone(), &config.stats);

    match action {
        StatsAction::Pending { limit } => {
            let pending = api.pending(limit).await?;
            for annotation in &pending {
                println!("{}", serde_json::to_string(annotation)?);
            }
            info!(count = pending.len(), "Listed annotations without stats");
        },
        StatsAction::Compute { url, limit } => {
            let decompressor = build_decompressor(&config.checksum.decompressor, config.checksum.chunk_size)?;
            let computer = FeatureStatsComputer::new(client, decompressor).with_chunk_size(config.checksum.chunk_size);
            match url {
                Some(url) => {
                    let stats = computer.compute(&url).await?;
                    println!("{}", serde_json::to_string_pretty(&stats)?);
                },
                None => {
                    compute_pending(&api, &computer, limit).await?;
                },
            }
        },
        StatsAction::Push {
            annotation_id,
            stats_file,
        } => {
            let text = std::fs::read_to_string(&stats_file)
                .with_context(|| format!("Failed to read {}", stats_file.display()))?;
            let stats: serde_json::Value = serde_json::from_str(&text)
                .with_context(|| format!("Invalid JSON in {}", stats_file.display()))?;
            api.push(&annotation_id, &stats).await?;
        },
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let log_level = if cli.verbose {
        LogLevel::Debug
    } else {
        LogLevel::Info
    };

    let log_config = LogConfig::builder()
        .level(log_level)
        .log_file_prefix("annotrieve-mirror")
        .filter_directives("hyper=warn,reqwest=warn")
        .build()
        .merge_env()?;

    let _guard = init_logging(&log_config)?;

    let config = MirrorConfig::from_env()?;

    match cli.command {
        Command::Mirror {
            source,
            output,
            taxon,
            checksum_mode,
        } => {
            let source = SourceDatabase::from(source);
            let mut config = config;
            if let Some(taxon) = taxon {
                config = config.with_taxon(taxon);
            }
            if let Some(output) = output {
                config = config.with_output(source, output);
            }
            config.validate()?;
            mirror(config, source, checksum_mode).await?;
        },
        Command::Stats { action } => stats(config, action).await?,
    }

    Ok(())
}
