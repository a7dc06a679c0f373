//! Shared fixtures for mirror integration tests
#![allow(dead_code)]

use annotrieve_common::{AnnotationRecord, SourceDatabase};
use annotrieve_mirror::reconcile::ParsedSnapshot;
use annotrieve_mirror::sources::CandidateSource;
use async_trait::async_trait;
use chrono::NaiveDate;
use flate2::write::GzEncoder;
use flate2::Compression;
use indexmap::IndexMap;
use std::io::Write;

pub const LAST_MODIFIED: &str = "Wed, 01 May 2024 10:00:00 GMT";

pub fn last_modified_day() -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 5, 1).unwrap()
}

pub fn today() -> NaiveDate {
    NaiveDate::from_ymd_opt(2025, 6, 30).unwrap()
}

pub fn days_ago(days: i64) -> NaiveDate {
    today() - chrono::Duration::days(days)
}

pub fn gzip(data: &[u8]) -> Vec<u8> {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(data).unwrap();
    encoder.finish().unwrap()
}

pub fn md5_hex(data: &[u8]) -> String {
    format!("{:x}", md5::compute(data))
}

/// Archive path of an NCBI-shaped annotation file below the mock server
pub fn ncbi_path(accession: &str, assembly: &str) -> String {
    format!(
        "/genomes/all/{}/{}/{}/{}/{}_{}/{}_{}_genomic.gff.gz",
        &accession[0..3],
        &accession[4..7],
        &accession[7..10],
        &accession[10..13],
        accession,
        assembly,
        accession,
        assembly
    )
}

/// Candidate as a source would emit it: no stamps yet
pub fn candidate(accession: &str, url: &str) -> AnnotationRecord {
    AnnotationRecord {
        assembly_accession: accession.to_string(),
        assembly_name: "ASM1v1".to_string(),
        taxon_id: "7227".to_string(),
        organism_name: "Drosophila melanogaster".to_string(),
        source_database: SourceDatabase::GenBank,
        annotation_provider: "FlyBase".to_string(),
        access_url: url.to_string(),
        file_format: AnnotationRecord::GFF.to_string(),
        release_date: Some("2024-04-01".to_string()),
        retrieval_date: today(),
        pipeline_name: None,
        pipeline_method: None,
        pipeline_version: None,
        last_modified_date: None,
        md5_checksum: None,
    }
}

/// Catalog entry verified on `retrieved`
pub fn cataloged(accession: &str, url: &str, retrieved: NaiveDate, md5: &str) -> AnnotationRecord {
    AnnotationRecord {
        retrieval_date: retrieved,
        last_modified_date: Some(last_modified_day()),
        md5_checksum: Some(md5.to_string()),
        ..candidate(accession, url)
    }
}

pub fn snapshot(records: Vec<AnnotationRecord>) -> IndexMap<String, AnnotationRecord> {
    records
        .into_iter()
        .map(|r| (r.assembly_accession.clone(), r))
        .collect()
}

/// In-memory inventory
pub struct StaticSource {
    pub database: SourceDatabase,
    pub records: Vec<AnnotationRecord>,
}

#[async_trait]
impl CandidateSource for StaticSource {
    fn database(&self) -> SourceDatabase {
        self.database
    }

    async fn fetch(&self, today: NaiveDate) -> anyhow::Result<ParsedSnapshot> {
        let key = self.database.catalog_key();
        Ok(self
            .records
            .iter()
            .cloned()
            .map(|mut r| {
                r.retrieval_date = today;
                (key.of(&r).to_string(), r)
            })
            .collect())
    }
}
