//! TSV catalog persistence
//!
//! One file per source, header row first, columns in `AnnotationRecord`
//! field order. Writes go to a temporary file in the destination directory
//! which is then renamed over the old catalog.

use anyhow::{bail, Context, Result};
use annotrieve_common::{AnnotationRecord, CatalogKey};
use std::fs;
use std::path::Path;
use tempfile::NamedTempFile;
use tracing::info;

use crate::reconcile::CatalogSnapshot;

/// Load a catalog keyed by `key`. A missing file is an empty catalog.
///
/// A row that fails to parse aborts the load: dropping it silently would
/// shrink the catalog on the next write.
pub fn load(path: &Path, key: CatalogKey) -> Result<CatalogSnapshot> {
    if !path.exists() {
        info!(path = %path.display(), "No existing catalog, starting empty");
        return Ok(CatalogSnapshot::new());
    }

    let mut reader = csv::ReaderBuilder::new()
        .delimiter(b'\t')
        .has_headers(true)
        .from_path(path)
        .with_context(|| format!("Failed to open catalog {}", path.display()))?;

    let mut snapshot = CatalogSnapshot::new();
    for (line, row) in reader.deserialize::<AnnotationRecord>().enumerate() {
        let record = row.with_context(|| format!("Malformed catalog row {} in {}", line + 2, path.display()))?;
        snapshot.insert(key.of(&record).to_string(), record);
    }

    info!(path = %path.display(), records = snapshot.len(), key = key.column(), "Loaded catalog");
    Ok(snapshot)
}

/// Replace the catalog at `path` with `records`
pub fn write(path: &Path, records: &[AnnotationRecord]) -> Result<()> {
    if records.is_empty() {
        bail!("Refusing to write an empty catalog to {}", path.display());
    }

    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    fs::create_dir_all(dir).with_context(|| format!("Failed to create {}", dir.display()))?;

    let tmp = NamedTempFile::new_in(dir).with_context(|| format!("Failed to create temp file in {}", dir.display()))?;
    {
        let mut writer = csv::WriterBuilder::new()
            .delimiter(b'\t')
            .has_headers(true)
            .from_writer(tmp.as_file());
        for record in records {
            writer.serialize(record)?;
        }
        writer.flush()?;
    }

    tmp.persist(path)
        .with_context(|| format!("Failed to move catalog into place at {}", path.display()))?;

    info!(path = %path.display(), records = records.len(), "Wrote catalog");
    Ok(())
}
