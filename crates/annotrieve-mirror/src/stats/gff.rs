//! GFF3 feature statistics
//!
//! Rows are folded into a gene model as they stream in. Features without a
//! `Parent` are roots (genes, pseudogenes), their direct children are
//! transcripts, and exon/CDS rows hang off the transcript they name. Rows
//! that arrive before their parent are parked and retried once the stream
//! ends. Every root is then classed as coding, non-coding or pseudogene and
//! one summary is built per class.

use indexmap::IndexMap;
use serde::ser::SerializeMap;
use serde::{Serialize, Serializer};
use std::collections::HashMap;
use tracing::{debug, warn};

/// Assembly-level rows carry no gene model
const SKIPPED_TYPES: [&str; 3] = ["region", "chromosome", "scaffold"];
const BIOTYPE_KEYS: [&str; 3] = ["biotype", "gene_biotype", "transcript_biotype"];
const MAX_ORPHAN_PASSES: usize = 20;

/// One GFF3 feature row
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GffFeature {
    pub id: Option<String>,
    pub feature_type: String,
    pub start: i64,
    pub end: i64,
    pub parents: Vec<String>,
    pub biotype: Option<String>,
}

impl GffFeature {
    /// Inclusive length on the sequence
    pub fn length(&self) -> i64 {
        self.end - self.start + 1
    }
}

/// Parse one GFF3 line.
///
/// Comments, rows with fewer than nine columns, unparsable coordinates and
/// assembly-level features yield `None`. Attributes without `=` are ignored.
pub fn parse_line(line: &str) -> Option<GffFeature> {
    let line = line.trim();
    if line.is_empty() || line.starts_with('#') {
        return None;
    }

    let cols: Vec<&str> = line.split('\t').collect();
    if cols.len() < 9 || SKIPPED_TYPES.contains(&cols[2]) {
        return None;
    }

    let mut feature = GffFeature {
        id: None,
        feature_type: cols[2].to_string(),
        start: cols[3].trim().parse().ok()?,
        end: cols[4].trim().parse().ok()?,
        parents: Vec::new(),
        biotype: None,
    };

    for attr in cols[8].split(';') {
        let Some((key, value)) = attr.split_once('=') else {
            continue;
        };
        match key.trim() {
            "ID" => feature.id = Some(value.to_string()),
            "Parent" => feature.parents = value.split(',').map(str::to_string).collect(),
            key if BIOTYPE_KEYS.contains(&key) => feature.biotype = Some(value.to_string()),
            _ => {},
        }
    }

    Some(feature)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GeneCategory {
    Coding,
    NonCoding,
    Pseudogene,
}

#[derive(Debug)]
struct Root {
    feature_type: String,
    biotype: Option<String>,
    length: i64,
    has_cds: bool,
    has_exon: bool,
}

impl Root {
    fn new(feature: &GffFeature) -> Self {
        Self {
            feature_type: feature.feature_type.clone(),
            biotype: feature.biotype.clone(),
            length: feature.length(),
            has_cds: false,
            has_exon: false,
        }
    }

    fn category(&self) -> Option<GeneCategory> {
        let protein_coding = self
            .biotype
            .as_deref()
            .is_some_and(|b| b.to_lowercase().contains("protein_coding"));

        if self.feature_type == "pseudogene" {
            Some(GeneCategory::Pseudogene)
        } else if self.has_cds || protein_coding {
            Some(GeneCategory::Coding)
        } else if self.has_exon {
            Some(GeneCategory::NonCoding)
        } else {
            None
        }
    }
}

#[derive(Debug)]
struct Transcript {
    gene_id: String,
    kind: Option<String>,
    exons: Vec<(i64, i64)>,
    exon_len_sum: i64,
    cds_lens: Vec<i64>,
}

impl Transcript {
    fn new(gene_id: String, kind: Option<String>) -> Self {
        Self {
            gene_id,
            kind,
            exons: Vec::new(),
            exon_len_sum: 0,
            cds_lens: Vec::new(),
        }
    }
}

// ============================================================================
// Output document
// ============================================================================

/// Statistics document uploaded as `features_statistics`.
///
/// A class with no genes serializes as an empty object.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct FeaturesStatistics {
    #[serde(serialize_with = "object_or_empty")]
    pub coding_genes: Option<CategoryStats>,
    #[serde(serialize_with = "object_or_empty")]
    pub non_coding_genes: Option<CategoryStats>,
    #[serde(serialize_with = "object_or_empty")]
    pub pseudogenes: Option<CategoryStats>,
}

fn object_or_empty<S: Serializer>(value: &Option<CategoryStats>, serializer: S) -> Result<S::Ok, S::Error> {
    match value {
        Some(stats) => stats.serialize(serializer),
        None => serializer.serialize_map(Some(0))?.end(),
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CategoryStats {
    pub count: usize,
    pub length_stats: GeneLengthStats,
    pub transcripts: TranscriptStats,
    pub features: FeatureSummary,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GeneLengthStats {
    pub min: i64,
    pub max: i64,
    pub mean: f64,
    pub median: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LengthStats {
    pub mean: f64,
    pub median: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TranscriptStats {
    pub count: u64,
    pub per_gene: f64,
    pub types: IndexMap<String, TranscriptTypeStats>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TranscriptTypeStats {
    pub count: u64,
    pub per_gene: f64,
    pub exons_per_transcript: f64,
    /// Genomic span, first exon start to last exon end
    pub length_stats: LengthStats,
    /// Present unless every transcript of the type has exactly one exon
    #[serde(skip_serializing_if = "Option::is_none")]
    pub spliced_length_stats: Option<LengthStats>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exon_length_stats: Option<LengthStats>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FeatureSummary {
    pub exons: FeatureStats,
    pub introns: FeatureStats,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cds: Option<FeatureStats>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FeatureStats {
    pub count: usize,
    pub length_stats: LengthStats,
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

fn ratio(numerator: f64, denominator: f64) -> f64 {
    if denominator == 0.0 {
        0.0
    } else {
        round2(numerator / denominator)
    }
}

fn total(values: &[i64]) -> f64 {
    values.iter().sum::<i64>() as f64
}

fn median(values: &[i64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let mut sorted = values.to_vec();
    sorted.sort_unstable();
    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 1 {
        sorted[mid] as f64
    } else {
        (sorted[mid - 1] + sorted[mid]) as f64 / 2.0
    }
}

fn length_stats(values: &[i64], denominator: f64) -> LengthStats {
    LengthStats {
        mean: ratio(total(values), denominator),
        median: median(values),
    }
}

// ============================================================================
// Per-class tallies
// ============================================================================

#[derive(Debug, Default)]
struct TypeTally {
    transcripts: u64,
    exons: u64,
    span_lens: Vec<i64>,
    spliced_lens: Vec<i64>,
    exon_lens: Vec<i64>,
}

#[derive(Debug, Default)]
struct CategoryTally {
    gene_lengths: Vec<i64>,
    exon_lens: Vec<i64>,
    intron_lens: Vec<i64>,
    cds_lens: Vec<i64>,
    cds_len_sum: i64,
    cds_transcripts: u64,
    /// gene -> transcript type -> count
    per_gene_types: IndexMap<String, IndexMap<String, u64>>,
    types: IndexMap<String, TypeTally>,
}

impl CategoryTally {
    fn add_transcript(&mut self, transcript: &Transcript) {
        if !transcript.cds_lens.is_empty() {
            self.cds_lens.extend_from_slice(&transcript.cds_lens);
            self.cds_len_sum += transcript.cds_lens.iter().sum::<i64>();
            self.cds_transcripts += 1;
        }

        let exon_lens: Vec<i64> = transcript.exons.iter().map(|(start, end)| end - start + 1).collect();
        self.exon_lens.extend_from_slice(&exon_lens);

        if transcript.exons.len() > 1 {
            let mut sorted = transcript.exons.clone();
            sorted.sort_by_key(|(start, _)| *start);
            for pair in sorted.windows(2) {
                let intron = pair[1].0 - pair[0].1 - 1;
                if intron > 0 {
                    self.intron_lens.push(intron);
                }
            }
        }

        let Some(kind) = transcript.kind.as_ref().filter(|_| !transcript.exons.is_empty()) else {
            return;
        };

        *self
            .per_gene_types
            .entry(transcript.gene_id.clone())
            .or_default()
            .entry(kind.clone())
            .or_default() += 1;

        let first = transcript.exons.iter().map(|(start, _)| *start).min().unwrap_or(0);
        let last = transcript.exons.iter().map(|(_, end)| *end).max().unwrap_or(0);

        let tally = self.types.entry(kind.clone()).or_default();
        tally.transcripts += 1;
        tally.exons += transcript.exons.len() as u64;
        tally.span_lens.push(last - first + 1);
        tally.spliced_lens.push(transcript.exon_len_sum);
        tally.exon_lens.extend(exon_lens);
    }

    fn build(self) -> Option<CategoryStats> {
        if self.gene_lengths.is_empty() {
            return None;
        }
        let genes = self.gene_lengths.len();
        let transcripts: u64 = self.types.values().map(|t| t.transcripts).sum();

        let mut per_gene_counts: IndexMap<&str, Vec<u64>> = IndexMap::new();
        for counts in self.per_gene_types.values() {
            for (kind, count) in counts {
                per_gene_counts.entry(kind.as_str()).or_default().push(*count);
            }
        }

        let empty = TypeTally::default();
        let types = per_gene_counts
            .into_iter()
            .map(|(kind, counts)| {
                let tally = self.types.get(kind).unwrap_or(&empty);
                let count: u64 = counts.iter().sum();
                let one_exon_each = tally.transcripts > 0 && tally.exons == tally.transcripts;
                let per_transcript = tally.transcripts as f64;

                let stats = TranscriptTypeStats {
                    count,
                    per_gene: ratio(count as f64, counts.len() as f64),
                    exons_per_transcript: ratio(tally.exons as f64, per_transcript),
                    length_stats: length_stats(&tally.span_lens, per_transcript),
                    spliced_length_stats: (!one_exon_each)
                        .then(|| length_stats(&tally.spliced_lens, per_transcript)),
                    exon_length_stats: (!one_exon_each)
                        .then(|| length_stats(&tally.exon_lens, tally.exons as f64)),
                };
                (kind.to_string(), stats)
            })
            .collect();

        let cds = (!self.cds_lens.is_empty()).then(|| FeatureStats {
            count: self.cds_lens.len(),
            // Mean CDS length is per coding transcript, median per segment
            length_stats: LengthStats {
                mean: ratio(self.cds_len_sum as f64, self.cds_transcripts as f64),
                median: median(&self.cds_lens),
            },
        });

        Some(CategoryStats {
            count: genes,
            length_stats: GeneLengthStats {
                min: self.gene_lengths.iter().copied().min().unwrap_or(0),
                max: self.gene_lengths.iter().copied().max().unwrap_or(0),
                mean: ratio(total(&self.gene_lengths), genes as f64),
                median: median(&self.gene_lengths),
            },
            transcripts: TranscriptStats {
                count: transcripts,
                per_gene: ratio(transcripts as f64, genes as f64),
                types,
            },
            features: FeatureSummary {
                exons: FeatureStats {
                    count: self.exon_lens.len(),
                    length_stats: length_stats(&self.exon_lens, self.exon_lens.len() as f64),
                },
                introns: FeatureStats {
                    count: self.intron_lens.len(),
                    length_stats: length_stats(&self.intron_lens, self.intron_lens.len() as f64),
                },
                cds,
            },
        })
    }
}

// ============================================================================
// Streaming builder
// ============================================================================

/// Incremental gene model fed with decompressed GFF3 bytes
#[derive(Debug, Default)]
pub struct GffStatsBuilder {
    pending: Vec<u8>,
    roots: IndexMap<String, Root>,
    id_to_root: HashMap<String, String>,
    transcripts: IndexMap<String, Transcript>,
    orphans: Vec<GffFeature>,
    features: u64,
}

impl GffStatsBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rows that parsed into a feature so far
    pub fn features(&self) -> u64 {
        self.features
    }

    /// Feed raw bytes; a line may span several chunks
    pub fn feed(&mut self, chunk: &[u8]) {
        self.pending.extend_from_slice(chunk);
        let Some(last_newline) = self.pending.iter().rposition(|b| *b == b'\n') else {
            return;
        };

        let rest = self.pending.split_off(last_newline + 1);
        let complete = std::mem::replace(&mut self.pending, rest);
        for line in complete.split(|b| *b == b'\n') {
            self.push_line(&String::from_utf8_lossy(line));
        }
    }

    pub fn push_line(&mut self, line: &str) {
        if let Some(feature) = parse_line(line) {
            self.features += 1;
            self.add(feature);
        }
    }

    fn add(&mut self, feature: GffFeature) {
        if !self.attach(&feature) {
            self.orphans.push(feature);
        }
    }

    /// Place `feature` in the model; false if none of its parents is known yet
    fn attach(&mut self, feature: &GffFeature) -> bool {
        if feature.parents.is_empty() {
            if let Some(id) = &feature.id {
                self.roots.insert(id.clone(), Root::new(feature));
                self.id_to_root.insert(id.clone(), id.clone());
            }
            return true;
        }

        let is_exon = feature.feature_type == "exon";
        let is_cds = feature.feature_type == "CDS";
        let mut attached = false;

        for parent in &feature.parents {
            let Some(root_id) = self.id_to_root.get(parent).cloned() else {
                continue;
            };
            attached = true;
            if let Some(id) = &feature.id {
                self.id_to_root.insert(id.clone(), root_id.clone());
            }

            if *parent == root_id {
                if let (Some(id), false) = (&feature.id, is_exon || is_cds) {
                    let transcript = self
                        .transcripts
                        .entry(id.clone())
                        .or_insert_with(|| Transcript::new(root_id.clone(), None));
                    transcript.gene_id = root_id;
                    transcript.kind = Some(feature.feature_type.clone());
                }
                continue;
            }

            if !is_exon && !is_cds {
                continue;
            }

            let transcript = self
                .transcripts
                .entry(parent.clone())
                .or_insert_with(|| Transcript::new(root_id.clone(), None));
            if is_exon {
                transcript.exons.push((feature.start, feature.end));
                transcript.exon_len_sum += feature.length();
            } else {
                transcript.cds_lens.push(feature.length());
            }

            if let Some(root) = self.roots.get_mut(&root_id) {
                if is_exon {
                    root.has_exon = true;
                } else {
                    root.has_cds = true;
                }
            }
        }

        attached
    }

    fn resolve_orphans(&mut self) {
        if self.orphans.is_empty() {
            return;
        }
        debug!(orphans = self.orphans.len(), "Resolving features seen before their parents");

        for pass in 1..=MAX_ORPHAN_PASSES {
            let before = self.orphans.len();
            for orphan in std::mem::take(&mut self.orphans) {
                self.add(orphan);
            }

            let resolved = before - self.orphans.len();
            if resolved > 0 {
                debug!(pass, resolved, remaining = self.orphans.len(), "Orphan pass");
            }
            if resolved == 0 || self.orphans.is_empty() {
                break;
            }
        }

        if !self.orphans.is_empty() {
            warn!(unresolved = self.orphans.len(), "Features left without a known parent");
        }
    }

    /// Flush the last partial line, settle orphans and summarize
    pub fn finish(mut self) -> FeaturesStatistics {
        if !self.pending.is_empty() {
            let tail = std::mem::take(&mut self.pending);
            self.push_line(&String::from_utf8_lossy(&tail));
        }
        self.resolve_orphans();

        let mut tallies: HashMap<GeneCategory, CategoryTally> = HashMap::new();
        let mut categories: HashMap<&str, GeneCategory> = HashMap::new();

        for (id, root) in &self.roots {
            if let Some(category) = root.category() {
                categories.insert(id.as_str(), category);
                tallies.entry(category).or_default().gene_lengths.push(root.length);
            }
        }

        for transcript in self.transcripts.values() {
            if let Some(category) = categories.get(transcript.gene_id.as_str()) {
                tallies.entry(*category).or_default().add_transcript(transcript);
            }
        }

        let mut build = |category: GeneCategory| tallies.remove(&category).and_then(CategoryTally::build);

        FeaturesStatistics {
            coding_genes: build(GeneCategory::Coding),
            non_coding_genes: build(GeneCategory::NonCoding),
            pseudogenes: build(GeneCategory::Pseudogene),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use serde_json::json;

    const SAMPLE: &str = "##gff-version 3
chr1\tsrc\tregion\t1\t5000\t.\t+\t.\tID=chr1
chr1\tsrc\tgene\t1\t1000\t.\t+\t.\tID=g1;biotype=protein_coding
chr1\tsrc\tmRNA\t1\t1000\t.\t+\t.\tID=t1;Parent=g1
chr1\tsrc\texon\t1\t100\t.\t+\t.\tID=e1;Parent=t1
chr1\tsrc\texon\t501\t1000\t.\t+\t.\tID=e3;Parent=t1
chr1\tsrc\texon\t201\t300\t.\t+\t.\tID=e2;Parent=t1
chr1\tsrc\tCDS\t51\t100\t.\t+\t0\tID=c1;Parent=t1
chr1\tsrc\tCDS\t201\t300\t.\t+\t0\tID=c1;Parent=t1
chr1\tsrc\tgene\t2001\t2500\t.\t+\t.\tID=g2
chr1\tsrc\tncRNA\t2001\t2500\t.\t+\t.\tID=t2;Parent=g2
chr1\tsrc\texon\t2001\t2500\t.\t+\t.\tParent=t2
chr1\tsrc\tpseudogene\t3001\t3400\t.\t-\t.\tID=p1
chr1\tsrc\tgene\t4001\t4100\t.\t+\t.\tID=g3
";

    fn stats_of(text: &str) -> FeaturesStatistics {
        let mut builder = GffStatsBuilder::new();
        builder.feed(text.as_bytes());
        builder.finish()
    }

    #[test]
    fn test_parse_line_attributes() {
        let feature = parse_line("chr1\tsrc\texon\t10\t20\t.\t+\t.\tID=e1;Parent=t1,t2;gene_biotype=lncRNA;Note").unwrap();
        assert_eq!(feature.id.as_deref(), Some("e1"));
        assert_eq!(feature.parents, vec!["t1", "t2"]);
        assert_eq!(feature.biotype.as_deref(), Some("lncRNA"));
        assert_eq!(feature.length(), 11);
    }

    #[test]
    fn test_parse_line_skips() {
        assert!(parse_line("# comment").is_none());
        assert!(parse_line("").is_none());
        assert!(parse_line("chr1\tsrc\tgene\t1\t10").is_none());
        assert!(parse_line("chr1\tsrc\tregion\t1\t10\t.\t+\t.\tID=chr1").is_none());
        assert!(parse_line("chr1\tsrc\tgene\tone\t10\t.\t+\t.\tID=g").is_none());
    }

    #[test]
    fn test_coding_gene_summary() {
        let stats = stats_of(SAMPLE);
        let coding = stats.coding_genes.unwrap();

        assert_eq!(coding.count, 1);
        assert_eq!(coding.length_stats.min, 1000);
        assert_eq!(coding.length_stats.median, 1000.0);
        assert_eq!(coding.transcripts.count, 1);

        let exons = &coding.features.exons;
        assert_eq!(exons.count, 3);
        assert_eq!(exons.length_stats.mean, 233.33);
        assert_eq!(exons.length_stats.median, 100.0);

        let introns = &coding.features.introns;
        assert_eq!(introns.count, 2);
        assert_eq!(introns.length_stats.mean, 150.0);

        let cds = coding.features.cds.as_ref().unwrap();
        assert_eq!(cds.count, 2);
        assert_eq!(cds.length_stats.mean, 150.0);
        assert_eq!(cds.length_stats.median, 75.0);

        let mrna = &coding.transcripts.types["mRNA"];
        assert_eq!(mrna.exons_per_transcript, 3.0);
        assert_eq!(mrna.length_stats.mean, 1000.0);
        assert_eq!(mrna.spliced_length_stats.as_ref().unwrap().mean, 700.0);
    }

    #[test]
    fn test_categories() {
        let stats = stats_of(SAMPLE);

        let non_coding = stats.non_coding_genes.unwrap();
        assert_eq!(non_coding.count, 1);
        let ncrna = &non_coding.transcripts.types["ncRNA"];
        assert_eq!(ncrna.exons_per_transcript, 1.0);
        assert!(ncrna.spliced_length_stats.is_none());
        assert!(ncrna.exon_length_stats.is_none());

        // Pseudogene without children still counts; the bare gene g3 is unclassified
        let pseudo = stats.pseudogenes.unwrap();
        assert_eq!(pseudo.count, 1);
        assert_eq!(pseudo.length_stats.max, 400);
        assert!(pseudo.transcripts.types.is_empty());
        assert!(pseudo.features.cds.is_none());
    }

    #[test]
    fn test_children_before_parents_are_resolved() {
        let text = "chr2\tsrc\texon\t10\t60\t.\t+\t.\tParent=t9
chr2\tsrc\tmRNA\t10\t60\t.\t+\t.\tID=t9;Parent=g9
chr2\tsrc\tgene\t10\t60\t.\t+\t.\tID=g9
chr2\tsrc\texon\t1\t5\t.\t+\t.\tParent=nowhere
";
        let stats = stats_of(text);
        let non_coding = stats.non_coding_genes.unwrap();
        assert_eq!(non_coding.transcripts.types["mRNA"].count, 1);
        assert_eq!(non_coding.features.exons.count, 1);
    }

    #[test]
    fn test_chunk_boundaries_do_not_matter() {
        let mut builder = GffStatsBuilder::new();
        for chunk in SAMPLE.as_bytes().chunks(7) {
            builder.feed(chunk);
        }
        assert_eq!(builder.features(), 12);
        assert_eq!(builder.finish(), stats_of(SAMPLE));
    }

    #[test]
    fn test_missing_trailing_newline() {
        let text = "chr1\tsrc\tpseudogene\t1\t10\t.\t+\t.\tID=p";
        assert_eq!(stats_of(text).pseudogenes.unwrap().count, 1);
    }

    #[test]
    fn test_document_shape() {
        let value = serde_json::to_value(stats_of(SAMPLE)).unwrap();
        assert_eq!(value["pseudogenes"]["count"], json!(1));
        assert!(value["non_coding_genes"]["transcripts"]["types"]["ncRNA"]
            .get("spliced_length_stats")
            .is_none());
        assert!(value["pseudogenes"]["features"].get("cds").is_none());

        let empty = serde_json::to_value(FeaturesStatistics::default()).unwrap();
        assert_eq!(
            empty,
            json!({"coding_genes": {}, "non_coding_genes": {}, "pseudogenes": {}})
        );
    }
}
