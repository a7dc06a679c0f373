//! Common types used across the annotation mirror

use crate::error::{AnnoError, Result};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Archive an annotation file was sourced from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SourceDatabase {
    GenBank,
    RefSeq,
    Ensembl,
}

impl SourceDatabase {
    /// Name used by the NCBI `datasets` tool for `--assembly-source`
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceDatabase::GenBank => "GenBank",
            SourceDatabase::RefSeq => "RefSeq",
            SourceDatabase::Ensembl => "Ensembl",
        }
    }

    /// Field that uniquely identifies a record in this source's catalog.
    ///
    /// Ensembl publishes several annotation builds per assembly, so the
    /// accession is not 1:1 with a file there.
    pub fn catalog_key(&self) -> CatalogKey {
        match self {
            SourceDatabase::GenBank | SourceDatabase::RefSeq => CatalogKey::AssemblyAccession,
            SourceDatabase::Ensembl => CatalogKey::AccessUrl,
        }
    }
}

impl std::str::FromStr for SourceDatabase {
    type Err = AnnoError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "genbank" => Ok(SourceDatabase::GenBank),
            "refseq" => Ok(SourceDatabase::RefSeq),
            "ensembl" => Ok(SourceDatabase::Ensembl),
            _ => Err(AnnoError::UnknownSource(s.to_string())),
        }
    }
}

impl std::fmt::Display for SourceDatabase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Column a catalog is keyed by
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CatalogKey {
    AccessUrl,
    AssemblyAccession,
}

impl CatalogKey {
    /// Extract this key from a record
    pub fn of<'a>(&self, record: &'a AnnotationRecord) -> &'a str {
        match self {
            CatalogKey::AccessUrl => &record.access_url,
            CatalogKey::AssemblyAccession => &record.assembly_accession,
        }
    }

    pub fn column(&self) -> &'static str {
        match self {
            CatalogKey::AccessUrl => "access_url",
            CatalogKey::AssemblyAccession => "assembly_accession",
        }
    }
}

/// One tracked remote annotation file.
///
/// Field order is the column order of the persisted TSV catalog.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnnotationRecord {
    pub assembly_accession: String,
    pub assembly_name: String,
    pub taxon_id: String,
    pub organism_name: String,
    pub source_database: SourceDatabase,
    /// Free-text name of the annotation pipeline vendor
    pub annotation_provider: String,
    pub access_url: String,
    pub file_format: String,
    pub release_date: Option<String>,
    /// Date the record was last confirmed against the remote archive
    pub retrieval_date: NaiveDate,
    pub pipeline_name: Option<String>,
    pub pipeline_method: Option<String>,
    pub pipeline_version: Option<String>,
    pub last_modified_date: Option<NaiveDate>,
    pub md5_checksum: Option<String>,
}

impl AnnotationRecord {
    /// Default file format for every tracked annotation
    pub const GFF: &'static str = "gff";

    /// Both verification stamps are present
    pub fn is_verified(&self) -> bool {
        self.last_modified_date.is_some() && self.md5_checksum.is_some()
    }

    /// Reject records that would poison the catalog.
    ///
    /// Runs at the parsing boundary so reconciliation only ever sees
    /// well-formed candidates.
    pub fn validate(&self) -> Result<()> {
        let invalid = |reason: &str| AnnoError::InvalidRecord {
            key: self.assembly_accession.clone(),
            reason: reason.to_string(),
        };

        if self.assembly_accession.trim().is_empty() {
            return Err(invalid("empty assembly accession"));
        }
        let url = url::Url::parse(&self.access_url)?;
        if !matches!(url.scheme(), "http" | "https" | "ftp") {
            return Err(invalid("unsupported access url scheme"));
        }
        if url.path().ends_with('/') {
            return Err(invalid("access url points at a directory"));
        }
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    fn record(accession: &str, url: &str) -> AnnotationRecord {
        AnnotationRecord {
            assembly_accession: accession.to_string(),
            assembly_name: "ASM1".to_string(),
            taxon_id: "9606".to_string(),
            organism_name: "Homo sapiens".to_string(),
            source_database: SourceDatabase::RefSeq,
            annotation_provider: "NCBI RefSeq".to_string(),
            access_url: url.to_string(),
            file_format: AnnotationRecord::GFF.to_string(),
            release_date: None,
            retrieval_date: NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
            pipeline_name: None,
            pipeline_method: None,
            pipeline_version: None,
            last_modified_date: None,
            md5_checksum: None,
        }
    }

    #[test]
    fn test_catalog_key_per_source() {
        assert_eq!(SourceDatabase::GenBank.catalog_key(), CatalogKey::AssemblyAccession);
        assert_eq!(SourceDatabase::RefSeq.catalog_key(), CatalogKey::AssemblyAccession);
        assert_eq!(SourceDatabase::Ensembl.catalog_key(), CatalogKey::AccessUrl);
    }

    #[test]
    fn test_catalog_key_extracts_field() {
        let rec = record("GCF_000001405.40", "https://example.org/a.gff.gz");
        assert_eq!(CatalogKey::AssemblyAccession.of(&rec), "GCF_000001405.40");
        assert_eq!(CatalogKey::AccessUrl.of(&rec), "https://example.org/a.gff.gz");
    }

    #[test]
    fn test_source_database_from_str() {
        assert_eq!("GenBank".parse::<SourceDatabase>().unwrap(), SourceDatabase::GenBank);
        assert_eq!("refseq".parse::<SourceDatabase>().unwrap(), SourceDatabase::RefSeq);
        assert_eq!("ENSEMBL".parse::<SourceDatabase>().unwrap(), SourceDatabase::Ensembl);
        assert!("uniprot".parse::<SourceDatabase>().is_err());
    }

    #[test]
    fn test_validate() {
        assert!(record("GCA_1", "https://example.org/a.gff.gz").validate().is_ok());
        assert!(record("", "https://example.org/a.gff.gz").validate().is_err());
        assert!(record("GCA_1", "not a url").validate().is_err());
        assert!(record("GCA_1", "file:///tmp/a.gff.gz").validate().is_err());
        assert!(record("GCA_1", "https://example.org/dir/").validate().is_err());
    }

    #[test]
    fn test_is_verified() {
        let mut rec = record("GCA_1", "https://example.org/a.gff.gz");
        assert!(!rec.is_verified());
        rec.last_modified_date = NaiveDate::from_ymd_opt(2024, 5, 1);
        assert!(!rec.is_verified());
        rec.md5_checksum = Some("abc".to_string());
        assert!(rec.is_verified());
    }
}
