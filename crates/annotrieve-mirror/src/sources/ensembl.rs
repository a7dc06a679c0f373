//! Ensembl organisms candidates
//!
//! `species.json` lists every species, its assemblies, and per assembly the
//! genebuilds of each provider. Only assemblies present in the NCBI
//! chromosome/complete accession list are mirrored, and builds imported
//! from GenBank or RefSeq are skipped since those sources are mirrored
//! directly.

use anyhow::{Context, Result};
use annotrieve_common::{AnnotationRecord, SourceDatabase};
use async_trait::async_trait;
use chrono::NaiveDate;
use indexmap::IndexMap;
use reqwest::Client;
use serde::Deserialize;
use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use tracing::{debug, info, warn};

use super::datasets::DatasetsCli;
use super::CandidateSource;
use crate::config::EnsemblConfig;
use crate::reconcile::ParsedSnapshot;

/// File under `paths.genebuild.files.annotations` that is mirrored
pub const GFF_ANNOTATION: &str = "genes.gff3.gz";

const SKIPPED_PROVIDERS: [&str; 2] = ["genbank", "refseq"];

#[derive(Debug, Default, Deserialize)]
pub struct SpeciesCatalog {
    #[serde(default)]
    pub species: IndexMap<String, Species>,
}

#[derive(Debug, Default, Deserialize)]
pub struct Species {
    #[serde(default, deserialize_with = "super::string_or_number")]
    pub taxid: String,
    #[serde(default)]
    pub scientific_name: String,
    #[serde(default)]
    pub assemblies: IndexMap<String, Assembly>,
}

#[derive(Debug, Default, Deserialize)]
pub struct Assembly {
    #[serde(default)]
    pub name: String,
    /// provider -> build id -> build; builds stay untyped until used so one
    /// odd entry cannot fail the whole catalog
    #[serde(default)]
    pub genebuild_providers: IndexMap<String, IndexMap<String, serde_json::Value>>,
}

#[derive(Debug, Default, Deserialize)]
pub struct Genebuild {
    pub release: Option<String>,
    #[serde(default)]
    pub paths: BuildPaths,
}

#[derive(Debug, Default, Deserialize)]
pub struct BuildPaths {
    #[serde(default)]
    pub genebuild: GenebuildPaths,
}

#[derive(Debug, Default, Deserialize)]
pub struct GenebuildPaths {
    #[serde(default)]
    pub files: GenebuildFiles,
}

#[derive(Debug, Default, Deserialize)]
pub struct GenebuildFiles {
    #[serde(default)]
    pub annotations: HashMap<String, String>,
}

impl Genebuild {
    pub fn gff_path(&self) -> Option<&str> {
        self.paths
            .genebuild
            .files
            .annotations
            .get(GFF_ANNOTATION)
            .map(String::as_str)
            .filter(|p| !p.is_empty())
    }
}

/// Human-readable pipeline for a provider key
pub fn pipeline_name(provider: &str) -> Option<String> {
    match provider {
        "ensembl" => Some("Ensembl Genebuild".to_string()),
        "braker" => Some("BRAKER".to_string()),
        _ => None,
    }
}

/// `2024_05` -> `2024-05-01`
pub fn release_date(release: &str) -> Option<String> {
    let (year, month) = release.split_once('_')?;
    let valid = year.len() == 4
        && month.len() == 2
        && year.bytes().all(|b| b.is_ascii_digit())
        && month.bytes().all(|b| b.is_ascii_digit());
    valid.then(|| format!("{}-{}-01", year, month))
}

/// Flatten a species catalog into candidates keyed by access url
pub fn parse_species(
    catalog: &SpeciesCatalog,
    accessions: &HashSet<String>,
    ftp_dir: &str,
    today: NaiveDate,
) -> ParsedSnapshot {
    let ftp_dir = ftp_dir.trim_end_matches('/');
    let mut parsed = ParsedSnapshot::new();

    for species in catalog.species.values() {
        for (accession, assembly) in &species.assemblies {
            if !accessions.contains(accession) {
                continue;
            }

            for (provider, builds) in &assembly.genebuild_providers {
                if SKIPPED_PROVIDERS.contains(&provider.as_str()) {
                    continue;
                }

                for (build_id, raw) in builds {
                    let build: Genebuild = match serde_json::from_value(raw.clone()) {
                        Ok(build) => build,
                        Err(e) => {
                            debug!(%accession, %provider, %build_id, error = %e, "Unreadable genebuild entry");
                            continue;
                        },
                    };
                    let Some(sub_path) = build.gff_path() else {
                        continue;
                    };

                    let record = AnnotationRecord {
                        assembly_accession: accession.clone(),
                        assembly_name: assembly.name.clone(),
                        taxon_id: species.taxid.clone(),
                        organism_name: species.scientific_name.clone(),
                        source_database: SourceDatabase::Ensembl,
                        annotation_provider: provider.clone(),
                        access_url: format!("{}/{}", ftp_dir, sub_path.trim_start_matches('/')),
                        file_format: AnnotationRecord::GFF.to_string(),
                        release_date: build.release.as_deref().and_then(release_date),
                        retrieval_date: today,
                        pipeline_name: pipeline_name(provider),
                        pipeline_method: None,
                        pipeline_version: None,
                        last_modified_date: None,
                        md5_checksum: None,
                    };

                    if let Err(e) = record.validate() {
                        warn!(%accession, error = %e, "Skipping genebuild");
                        continue;
                    }
                    parsed.insert(record.access_url.clone(), record);
                }
            }
        }
    }

    parsed
}

#[derive(Debug, Deserialize)]
struct AccessionLine {
    accession: String,
}

pub struct EnsemblSource {
    client: Client,
    datasets: DatasetsCli,
    taxon_id: String,
    config: EnsemblConfig,
}

impl EnsemblSource {
    pub fn new(client: Client, datasets: DatasetsCli, taxon_id: impl Into<String>, config: EnsemblConfig) -> Self {
        Self {
            client,
            datasets,
            taxon_id: taxon_id.into(),
            config,
        }
    }

    /// Chromosome- and complete-level accessions in the taxon
    pub async fn fetch_accessions(&self) -> Result<HashSet<String>> {
        let args = DatasetsCli::accession_args(&self.taxon_id);
        let mut accessions = HashSet::new();

        self.datasets
            .for_each_line(&args, |line| match serde_json::from_str::<AccessionLine>(line) {
                Ok(parsed) => {
                    accessions.insert(parsed.accession);
                },
                Err(e) => warn!(error = %e, "Skipping accession line"),
            })
            .await?;

        info!(accessions = accessions.len(), "Fetched assembly accessions");
        Ok(accessions)
    }

    /// Download `species.json` into the tmp dir and return its path
    pub async fn download_species(&self) -> Result<PathBuf> {
        let url = self.config.species_url();
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .with_context(|| format!("Failed to fetch {}", url))?
            .error_for_status()
            .with_context(|| format!("Bad status from {}", url))?;
        let body = response.bytes().await?;

        tokio::fs::create_dir_all(&self.config.tmp_dir)
            .await
            .with_context(|| format!("Failed to create {}", self.config.tmp_dir.display()))?;
        let path = self.config.tmp_dir.join("species.json");
        tokio::fs::write(&path, &body)
            .await
            .with_context(|| format!("Failed to write {}", path.display()))?;

        info!(%url, path = %path.display(), bytes = body.len(), "Downloaded species catalog");
        Ok(path)
    }

    pub async fn load_species(path: &std::path::Path) -> Result<SpeciesCatalog> {
        let bytes = tokio::fs::read(path)
            .await
            .with_context(|| format!("Failed to read {}", path.display()))?;
        serde_json::from_slice(&bytes).with_context(|| format!("Invalid species catalog {}", path.display()))
    }
}

#[async_trait]
impl CandidateSource for EnsemblSource {
    fn database(&self) -> SourceDatabase {
        SourceDatabase::Ensembl
    }

    async fn fetch(&self, today: NaiveDate) -> Result<ParsedSnapshot> {
        let accessions = self.fetch_accessions().await?;
        let path = self.download_species().await?;
        let catalog = Self::load_species(&path).await?;

        let parsed = parse_species(&catalog, &accessions, &self.config.ftp_dir, today);
        info!(
            species = catalog.species.len(),
            candidates = parsed.len(),
            "Parsed species catalog"
        );
        Ok(parsed)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const FTP: &str = "https://ftp.ebi.ac.uk/pub/ensemblorganisms";

    const SPECIES: &str = r#"{
      "species": {
        "Danio_rerio": {
          "taxid": 7955,
          "scientific_name": "Danio rerio",
          "assemblies": {
            "GCA_000002035.4": {
              "name": "GRCz11",
              "genebuild_providers": {
                "ensembl": {
                  "2024_05": {
                    "release": "2024_05",
                    "paths": {"genebuild": {"files": {"annotations": {
                      "genes.gff3.gz": "Danio_rerio/GCA_000002035.4/ensembl/geneset/2024_05/genes.gff3.gz",
                      "genes.gtf.gz": "Danio_rerio/GCA_000002035.4/ensembl/geneset/2024_05/genes.gtf.gz"
                    }}}}
                  },
                  "broken": "not an object"
                },
                "refseq": {
                  "2023_01": {
                    "release": "2023_01",
                    "paths": {"genebuild": {"files": {"annotations": {"genes.gff3.gz": "refseq/genes.gff3.gz"}}}}
                  }
                }
              }
            },
            "GCA_999999999.1": {
              "name": "unlisted",
              "genebuild_providers": {
                "braker": {"x": {"release": "2024_01", "paths": {"genebuild": {"files": {"annotations": {"genes.gff3.gz": "u/genes.gff3.gz"}}}}}}
              }
            }
          }
        },
        "Apis_mellifera": {
          "taxid": "7460",
          "scientific_name": "Apis mellifera",
          "assemblies": {
            "GCA_003254395.2": {
              "name": "Amel_HAv3.1",
              "genebuild_providers": {
                "braker": {
                  "2024_02": {
                    "release": "2024_02",
                    "paths": {"genebuild": {"files": {"annotations": {"genes.gff3.gz": "Apis_mellifera/GCA_003254395.2/braker/geneset/2024_02/genes.gff3.gz"}}}}
                  },
                  "no_gff": {"release": "2024_03", "paths": {}}
                }
              }
            }
          }
        }
      }
    }"#;

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 6, 30).unwrap()
    }

    #[test]
    fn test_release_date() {
        assert_eq!(release_date("2024_05").as_deref(), Some("2024-05-01"));
        assert_eq!(release_date("2024-05"), None);
        assert_eq!(release_date("24_5"), None);
    }

    #[test]
    fn test_pipeline_name() {
        assert_eq!(pipeline_name("ensembl").as_deref(), Some("Ensembl Genebuild"));
        assert_eq!(pipeline_name("braker").as_deref(), Some("BRAKER"));
        assert_eq!(pipeline_name("flybase"), None);
    }

    #[test]
    fn test_parse_species() {
        let catalog: SpeciesCatalog = serde_json::from_str(SPECIES).unwrap();
        let accessions: HashSet<String> = ["GCA_000002035.4", "GCA_003254395.2"]
            .iter()
            .map(|s| s.to_string())
            .collect();

        let parsed = parse_species(&catalog, &accessions, FTP, today());
        let urls: Vec<&str> = parsed.keys().map(String::as_str).collect();
        assert_eq!(
            urls,
            vec![
                "https://ftp.ebi.ac.uk/pub/ensemblorganisms/Danio_rerio/GCA_000002035.4/ensembl/geneset/2024_05/genes.gff3.gz",
                "https://ftp.ebi.ac.uk/pub/ensemblorganisms/Apis_mellifera/GCA_003254395.2/braker/geneset/2024_02/genes.gff3.gz",
            ]
        );

        let zebrafish = &parsed[urls[0]];
        assert_eq!(zebrafish.taxon_id, "7955");
        assert_eq!(zebrafish.assembly_name, "GRCz11");
        assert_eq!(zebrafish.annotation_provider, "ensembl");
        assert_eq!(zebrafish.pipeline_name.as_deref(), Some("Ensembl Genebuild"));
        assert_eq!(zebrafish.release_date.as_deref(), Some("2024-05-01"));
        assert_eq!(zebrafish.source_database, SourceDatabase::Ensembl);

        let bee = &parsed[urls[1]];
        assert_eq!(bee.taxon_id, "7460");
        assert_eq!(bee.pipeline_name.as_deref(), Some("BRAKER"));
    }

    #[test]
    fn test_every_genebuild_is_a_candidate() {
        let catalog: SpeciesCatalog = serde_json::from_str(
            r#"{"species": {"Gallus_gallus": {"taxid": 9031, "scientific_name": "Gallus gallus", "assemblies": {
              "GCA_016699485.1": {"name": "bGalGal1", "genebuild_providers": {"ensembl": {
                "2023_10": {"release": "2023_10", "paths": {"genebuild": {"files": {"annotations": {"genes.gff3.gz": "g/2023_10/genes.gff3.gz"}}}}},
                "2025_01": {"release": "2025_01", "paths": {"genebuild": {"files": {"annotations": {"genes.gff3.gz": "g/2025_01/genes.gff3.gz"}}}}}
              }}}
            }}}}"#,
        )
        .unwrap();
        let accessions: HashSet<String> = ["GCA_016699485.1".to_string()].into_iter().collect();

        let parsed = parse_species(&catalog, &accessions, FTP, today());
        let releases: Vec<Option<&str>> = parsed.values().map(|r| r.release_date.as_deref()).collect();
        assert_eq!(parsed.len(), 2);
        assert!(parsed.contains_key(&format!("{}/g/2023_10/genes.gff3.gz", FTP)));
        assert!(parsed.contains_key(&format!("{}/g/2025_01/genes.gff3.gz", FTP)));
        assert_eq!(releases, vec![Some("2023-10-01"), Some("2025-01-01")]);
    }
}
