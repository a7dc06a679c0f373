//! Candidate sources
//!
//! A source turns a remote inventory into a snapshot of candidate records
//! keyed by its catalog key. Candidates carry no verification stamps yet.

pub mod datasets;
pub mod ensembl;
pub mod ncbi;

use anyhow::Result;
use annotrieve_common::SourceDatabase;
use async_trait::async_trait;
use chrono::NaiveDate;
use serde::{Deserialize, Deserializer};

use crate::reconcile::ParsedSnapshot;

pub use datasets::DatasetsCli;
pub use ensembl::EnsemblSource;
pub use ncbi::NcbiSource;

#[async_trait]
pub trait CandidateSource: Send + Sync {
    fn database(&self) -> SourceDatabase;

    /// Fetch this run's candidates, stamped with `today` as retrieval date
    async fn fetch(&self, today: NaiveDate) -> Result<ParsedSnapshot>;
}

/// Taxon ids arrive as numbers from one tool and strings from another
pub(crate) fn string_or_number<'de, D>(deserializer: D) -> std::result::Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Text(String),
        Int(i64),
        Float(f64),
    }

    Ok(match Raw::deserialize(deserializer)? {
        Raw::Text(s) => s,
        Raw::Int(n) => n.to_string(),
        Raw::Float(f) => f.to_string(),
    })
}
