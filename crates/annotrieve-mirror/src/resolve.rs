//! Path-resolution fallback
//!
//! Predicted NCBI paths embed the assembly name, which the archive sometimes
//! spells differently (punctuation, renamed assemblies). When the checksum
//! probe fails on a predicted path, the accession-split directory above it is
//! listed and its children are searched for the real assembly folder.

use reqwest::Client;
use scraper::{Html, Selector};
use std::time::Duration;
use tracing::{debug, info};

use crate::checksum::manifest::{compressed_name, find_annotation_entry, MANIFEST_NAME};
use crate::config::ProbeConfig;
use crate::http::fetch_text;
use crate::probe::{run_bounded, ProbeTarget};

/// Checksum and the corrected URL it was found under
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolution {
    pub md5: String,
    pub url: String,
}

/// Strip the assembly folder and file name from a predicted URL.
///
/// `.../all/GCF/000/001/405/GCF_000001405.40_X/file.gz` becomes
/// `.../all/GCF/000/001/405/`. Returns `None` when the URL is too short to
/// have both components below its host.
pub fn minimal_path(url: &str) -> Option<String> {
    let (scheme, rest) = url.split_once("://")?;
    let segments: Vec<&str> = rest.trim_end_matches('/').split('/').collect();

    // host, at least one directory, assembly folder, file
    if segments.len() < 4 || segments.iter().any(|s| s.is_empty()) {
        return None;
    }

    let parent = &segments[..segments.len() - 2];
    Some(format!("{}://{}/", scheme, parent.join("/")))
}

/// Child directory names linked from an HTML index, in listing order
pub fn child_directories(html: &str) -> Vec<String> {
    let document = Html::parse_document(html);
    let Ok(selector) = Selector::parse("a[href]") else {
        return Vec::new();
    };

    let mut dirs: Vec<String> = Vec::new();
    for link in document.select(&selector) {
        let Some(href) = link.value().attr("href") else {
            continue;
        };
        if !href.ends_with('/') {
            continue;
        }
        let name = href.trim_end_matches('/').rsplit('/').next().unwrap_or_default();
        if name.is_empty() || name == "." || name == ".." {
            continue;
        }
        if !dirs.iter().any(|d| d == name) {
            dirs.push(name.to_string());
        }
    }
    dirs
}

/// Children named after `key`, or every child when none is
pub fn candidate_directories(dirs: &[String], key: &str) -> Vec<String> {
    let prefix = format!("{}_", key);
    let matching: Vec<String> = dirs
        .iter()
        .filter(|d| d.as_str() == key || d.starts_with(&prefix))
        .cloned()
        .collect();

    if matching.is_empty() {
        dirs.to_vec()
    } else {
        matching
    }
}

/// Listing-scrape resolver
#[derive(Clone)]
pub struct PathResolver {
    client: Client,
    timeout: Duration,
    concurrency: usize,
}

impl PathResolver {
    pub fn new(client: Client, config: &ProbeConfig) -> Self {
        Self {
            client,
            timeout: Duration::from_secs(config.listing_timeout_secs),
            concurrency: config.resolve_concurrency,
        }
    }

    /// Find the checksum and real URL for a predicted path that failed
    pub async fn resolve(&self, predicted: &str, key: &str) -> Option<Resolution> {
        let minimal = minimal_path(predicted)?;

        let listing = match fetch_text(&self.client, &minimal, self.timeout).await {
            Ok(html) => html,
            Err(e) => {
                debug!(url = %minimal, error = %e, "Directory listing failed");
                return None;
            },
        };
        let dirs = child_directories(&listing);

        for dir in candidate_directories(&dirs, key) {
            let base = format!("{}{}/", minimal, dir);
            let manifest_url = format!("{}{}", base, MANIFEST_NAME);

            let manifest = match fetch_text(&self.client, &manifest_url, self.timeout).await {
                Ok(text) => text,
                Err(e) => {
                    debug!(url = %manifest_url, error = %e, "Candidate manifest unavailable");
                    continue;
                },
            };

            if let Some(entry) = find_annotation_entry(&manifest) {
                let url = format!("{}{}", base, compressed_name(&entry.file_name));
                debug!(%key, %url, "Resolved assembly folder");
                return Some(Resolution { md5: entry.md5, url });
            }
        }

        None
    }

    /// Resolve every target; unresolved targets are omitted
    pub async fn resolve_many(&self, targets: Vec<ProbeTarget>) -> Vec<(String, Resolution)> {
        info!(total = targets.len(), "Resolving paths via directory listings");
        run_bounded(targets, self.concurrency, |target| async move {
            self.resolve(&target.url, &target.key).await
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const LISTING: &str = r#"<html><body><h1>Index of /genomes/all/GCF/000/001/405</h1>
<pre>
<a href="../">Parent Directory</a>
<a href="GCF_000001405.39_GRCh38.p13/">GCF_000001405.39_GRCh38.p13/</a>
<a href="GCF_000001405.40_GRCh38.p14/">GCF_000001405.40_GRCh38.p14/</a>
<a href="/genomes/all/GCF/000/001/405/GCF_000001405.40_GRCh38.p14/">dup</a>
<a href="README.txt">README.txt</a>
</pre></body></html>"#;

    #[test]
    fn test_minimal_path() {
        assert_eq!(
            minimal_path(
                "https://ftp.ncbi.nlm.nih.gov/genomes/all/GCF/000/001/405/GCF_000001405.40_GRCh38.p14/GCF_000001405.40_GRCh38.p14_genomic.gff.gz"
            )
            .as_deref(),
            Some("https://ftp.ncbi.nlm.nih.gov/genomes/all/GCF/000/001/405/")
        );
        assert_eq!(minimal_path("https://host/a/b").as_deref(), None);
        assert_eq!(minimal_path("not a url"), None);
    }

    #[test]
    fn test_child_directories_skip_parent_files_and_duplicates() {
        assert_eq!(
            child_directories(LISTING),
            vec!["GCF_000001405.39_GRCh38.p13", "GCF_000001405.40_GRCh38.p14"]
        );
        assert!(child_directories("<html></html>").is_empty());
    }

    #[test]
    fn test_candidates_prefer_accession_match() {
        let dirs = child_directories(LISTING);
        assert_eq!(
            candidate_directories(&dirs, "GCF_000001405.40"),
            vec!["GCF_000001405.40_GRCh38.p14"]
        );
        // No match scans everything
        assert_eq!(candidate_directories(&dirs, "GCF_999999999.1"), dirs);
        // Exact name counts as a match
        let exact = vec!["GCA_1".to_string(), "GCA_10_x".to_string()];
        assert_eq!(candidate_directories(&exact, "GCA_1"), vec!["GCA_1"]);
    }
}
