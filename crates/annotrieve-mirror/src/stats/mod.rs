//! Annotation statistics
//!
//! - [`client`]: REST client listing annotations without statistics and
//!   uploading computed ones
//! - [`gff`]: streaming GFF3 gene model and the per-class summaries
//! - [`compute`]: downloads annotation files and runs the batch upload

pub mod client;
pub mod compute;
pub mod gff;

pub use client::{StatsClient, StatsError};
pub use compute::{compute_pending, FeatureStatsComputer, StatsRunSummary};
pub use gff::{FeaturesStatistics, GffStatsBuilder};
