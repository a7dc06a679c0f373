//! Annotrieve Mirror Library
//!
//! Keeps a deduplicated TSV catalog of remote genome annotation files in
//! step with the archives that publish them, without downloading files that
//! have not changed.
//!
//! # Components
//!
//! - **probe**: bounded-concurrency dispatch and the HEAD freshness probe
//! - **checksum**: streaming download-decompress-MD5 engine and the
//!   manifest-based checksum lookup
//! - **resolve**: directory-listing fallback for mispredicted paths
//! - **reconcile**: keep / recheck / drop decisions and the final merge
//! - **sources**: NCBI (`datasets`) and Ensembl (`species.json`) candidates
//! - **catalog**: TSV load and atomic rewrite
//! - **pipeline**: one full run for one source
//! - **stats**: GFF3 feature statistics and the statistics API client
//!
//! # Example
//!
//! ```no_run
//! use annotrieve_common::SourceDatabase;
//! use annotrieve_mirror::config::MirrorConfig;
//! use annotrieve_mirror::http::build_client;
//! use annotrieve_mirror::pipeline::MirrorPipeline;
//! use annotrieve_mirror::sources::{DatasetsCli, NcbiSource};
//! use std::time::Duration;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = MirrorConfig::from_env()?;
//!     let client = build_client(Duration::from_secs(30))?;
//!     let source = SourceDatabase::RefSeq;
//!
//!     let pipeline = MirrorPipeline::new(
//!         source,
//!         &config,
//!         client,
//!         MirrorConfig::default_checksum_mode(source),
//!     )?;
//!     let inventory = NcbiSource::new(
//!         DatasetsCli::new(&config.datasets_bin),
//!         source,
//!         &config.taxon_id,
//!         &config.ncbi.ftp_base,
//!     )?;
//!
//!     let today = chrono::Local::now().date_naive();
//!     pipeline.run(&inventory, config.output_for(source), today).await?;
//!     Ok(())
//! }
//! ```

#![deny(clippy::unwrap_used, clippy::expect_used)]

pub mod catalog;
pub mod checksum;
pub mod config;
pub mod error;
pub mod http;
pub mod pipeline;
pub mod probe;
pub mod reconcile;
pub mod resolve;
pub mod sources;
pub mod stats;

pub use config::MirrorConfig;
pub use error::ProbeError;
pub use pipeline::MirrorPipeline;
