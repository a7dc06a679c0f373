//! GenBank and RefSeq candidates from the NCBI genome inventory

use anyhow::{bail, Result};
use annotrieve_common::{AnnoError, AnnotationRecord, SourceDatabase};
use async_trait::async_trait;
use chrono::NaiveDate;
use serde::Deserialize;
use tracing::{info, warn};

use super::datasets::DatasetsCli;
use super::CandidateSource;
use crate::reconcile::ParsedSnapshot;

/// One line of `datasets summary genome ... --as-json-lines`
#[derive(Debug, Clone, Deserialize)]
pub struct GenomeReport {
    pub accession: String,
    #[serde(default)]
    pub organism: Organism,
    #[serde(default)]
    pub assembly_info: AssemblyInfo,
    #[serde(default)]
    pub annotation_info: AnnotationInfo,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Organism {
    #[serde(default, deserialize_with = "super::string_or_number")]
    pub tax_id: String,
    #[serde(default)]
    pub organism_name: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct AssemblyInfo {
    #[serde(default)]
    pub assembly_name: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct AnnotationInfo {
    pub provider: Option<String>,
    pub release_date: Option<String>,
    pub pipeline: Option<String>,
    pub method: Option<String>,
    pub software_version: Option<String>,
}

/// Predicted archive location of an assembly's GFF.
///
/// `GCF_000001405.40` + `GRCh38.p14` lives under
/// `genomes/all/GCF/000/001/405/GCF_000001405.40_GRCh38.p14/`.
pub fn predicted_url(base: &str, accession: &str, assembly_name: &str) -> Result<String, AnnoError> {
    let bad = |reason: &str| AnnoError::InvalidRecord {
        key: accession.to_string(),
        reason: reason.to_string(),
    };

    if !accession.is_ascii() || accession.len() < 13 {
        return Err(bad("accession too short for archive path"));
    }
    if assembly_name.trim().is_empty() {
        return Err(bad("missing assembly name"));
    }

    let name = assembly_name.replace(' ', "_");
    let folder = format!("{}_{}", accession, name);
    Ok(format!(
        "{}/genomes/all/{}/{}/{}/{}/{}/{}_genomic.gff.gz",
        base.trim_end_matches('/'),
        &accession[0..3],
        &accession[4..7],
        &accession[7..10],
        &accession[10..13],
        folder,
        folder
    ))
}

/// Build a validated candidate from one report
pub fn parse_report(
    report: GenomeReport,
    source: SourceDatabase,
    base: &str,
    today: NaiveDate,
) -> Result<AnnotationRecord, AnnoError> {
    let access_url = predicted_url(base, &report.accession, &report.assembly_info.assembly_name)?;
    let info = report.annotation_info;

    let record = AnnotationRecord {
        assembly_accession: report.accession,
        assembly_name: report.assembly_info.assembly_name,
        taxon_id: report.organism.tax_id,
        organism_name: report.organism.organism_name,
        source_database: source,
        annotation_provider: info.provider.unwrap_or_default(),
        access_url,
        file_format: AnnotationRecord::GFF.to_string(),
        release_date: info.release_date,
        retrieval_date: today,
        pipeline_name: info.pipeline,
        pipeline_method: info.method,
        pipeline_version: info.software_version,
        last_modified_date: None,
        md5_checksum: None,
    };
    record.validate()?;
    Ok(record)
}

/// Parse one JSON line into a candidate
pub fn parse_line(line: &str, source: SourceDatabase, base: &str, today: NaiveDate) -> Result<AnnotationRecord, AnnoError> {
    let report: GenomeReport = serde_json::from_str(line).map_err(|e| AnnoError::Parse(e.to_string()))?;
    parse_report(report, source, base, today)
}

/// Annotated assemblies of one NCBI source database
pub struct NcbiSource {
    datasets: DatasetsCli,
    database: SourceDatabase,
    taxon_id: String,
    ftp_base: String,
}

impl NcbiSource {
    pub fn new(datasets: DatasetsCli, database: SourceDatabase, taxon_id: impl Into<String>, ftp_base: impl Into<String>) -> Result<Self> {
        if database == SourceDatabase::Ensembl {
            bail!("Ensembl is not an NCBI assembly source");
        }
        Ok(Self {
            datasets,
            database,
            taxon_id: taxon_id.into(),
            ftp_base: ftp_base.into(),
        })
    }
}

#[async_trait]
impl CandidateSource for NcbiSource {
    fn database(&self) -> SourceDatabase {
        self.database
    }

    async fn fetch(&self, today: NaiveDate) -> Result<ParsedSnapshot> {
        let args = DatasetsCli::annotated_args(&self.taxon_id, self.database.as_str());
        let key = self.database.catalog_key();
        let mut parsed = ParsedSnapshot::new();
        let mut skipped = 0usize;

        self.datasets
            .for_each_line(&args, |line| match parse_line(line, self.database, &self.ftp_base, today) {
                Ok(record) => {
                    parsed.insert(key.of(&record).to_string(), record);
                },
                Err(e) => {
                    skipped += 1;
                    warn!(error = %e, line = %line.chars().take(200).collect::<String>(), "Skipping inventory line");
                },
            })
            .await?;

        info!(
            source = %self.database,
            candidates = parsed.len(),
            skipped,
            "Parsed genome inventory"
        );
        Ok(parsed)
    }
}
