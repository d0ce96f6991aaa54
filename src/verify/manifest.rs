use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::info;

use super::error::{VerifyError, VerifyResult};
use crate::storage::atomic_write;

/// One gallery image known to belong to `label`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GalleryRow {
    pub source: String,
    #[serde(default)]
    pub path: String,
    #[serde(default)]
    pub license: String,
    #[serde(default)]
    pub phash: String,
    pub label: String,
    #[serde(default)]
    pub lang: String,
}

/// Gallery rows plus per-label aggregates.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GalleryManifest {
    rows: Vec<GalleryRow>,
}

impl GalleryManifest {
    /// Reads a JSONL manifest. Blank lines are skipped; a bad line reports its 1-based number.
    pub fn load(path: &Path) -> VerifyResult<Self> {
        if !path.is_file() {
            return Err(VerifyError::ManifestNotFound {
                path: path.to_path_buf(),
            });
        }
        let text = fs::read_to_string(path)?;
        let mut rows = Vec::new();
        for (i, line) in text.lines().enumerate() {
            if line.trim().is_empty() {
                continue;
            }
            let row = serde_json::from_str(line).map_err(|source| VerifyError::ManifestLine {
                path: path.to_path_buf(),
                line: i + 1,
                source,
            })?;
            rows.push(row);
        }
        Ok(Self { rows })
    }

    /// Builds a manifest sorted by `(label, phash)` with duplicates of that pair removed.
    pub fn from_rows(mut rows: Vec<GalleryRow>) -> Self {
        rows.sort_by(|a, b| (&a.label, &a.phash).cmp(&(&b.label, &b.phash)));
        rows.dedup_by(|a, b| a.label == b.label && a.phash == b.phash);
        Self { rows }
    }

    pub fn rows(&self) -> &[GalleryRow] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Row count per label.
    pub fn label_counts(&self) -> BTreeMap<&str, usize> {
        let mut counts = BTreeMap::new();
        for row in &self.rows {
            *counts.entry(row.label.as_str()).or_insert(0) += 1;
        }
        counts
    }

    /// Distinct sources per label.
    pub fn label_sources(&self) -> BTreeMap<&str, BTreeSet<&str>> {
        let mut sources: BTreeMap<&str, BTreeSet<&str>> = BTreeMap::new();
        for row in &self.rows {
            sources
                .entry(row.label.as_str())
                .or_default()
                .insert(row.source.as_str());
        }
        sources
    }

    /// Writes one compact JSON object per line, atomically.
    pub fn write_jsonl(&self, path: &Path) -> VerifyResult<()> {
        let mut out = String::new();
        for row in &self.rows {
            out.push_str(&serde_json::to_string(row)?);
            out.push('\n');
        }
        atomic_write(path, out.as_bytes())?;
        info!(path = %path.display(), rows = self.rows.len(), "gallery manifest written");
        Ok(())
    }
}
