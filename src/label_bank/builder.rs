use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::fs;
use std::path::Path;

use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::{HnswInt8LabelBank, LabelBankConfig, LabelBankError, LabelBankResult};
use crate::constants::{DEFAULT_BANK_SEED, DEFAULT_EMBEDDING_DIM};
use crate::embedding::embed_text;
use crate::storage::atomic_write_json;

pub const MANIFEST_FILE: &str = "manifest.json";

/// One line of the seed JSONL.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SeedRow {
    pub label: String,
    #[serde(default)]
    pub aliases: Vec<String>,
    #[serde(default)]
    pub p31: Option<String>,
    #[serde(default)]
    pub lang: Option<String>,
}

#[derive(Debug, Clone)]
pub struct ShardBuildOptions {
    pub dim: usize,
    pub seed: u64,
    /// Maximum number of phrases indexed.
    pub max_n: usize,
    /// Accepted `p31` tags; rows with any other (or no) tag are skipped.
    pub p31_allow: BTreeSet<String>,
    pub bank: LabelBankConfig,
}

impl Default for ShardBuildOptions {
    fn default() -> Self {
        Self {
            dim: DEFAULT_EMBEDDING_DIM,
            seed: DEFAULT_BANK_SEED,
            max_n: 10_000,
            p31_allow: ["product_model", "product_line"]
                .into_iter()
                .map(String::from)
                .collect(),
            bank: LabelBankConfig::default(),
        }
    }
}

/// Summary written next to the shard as `manifest.json`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShardManifest {
    pub n_total: usize,
    pub dim: usize,
    pub seed: u64,
    pub p31_allow: Vec<String>,
    pub lang_counts: BTreeMap<String, usize>,
    pub created_utc: String,
    pub bytes_index: u64,
    pub bytes_vocab: u64,
}

/// Builds a shard from a seed JSONL file.
///
/// Canonical labels and aliases are trimmed and lowercased; every distinct phrase becomes one
/// row labelled with its canonical label, embedded with [`embed_text`].
pub fn build_shard(
    seed_path: &Path,
    out_dir: &Path,
    opts: &ShardBuildOptions,
) -> LabelBankResult<ShardManifest> {
    if !seed_path.is_file() {
        return Err(LabelBankError::SeedNotFound {
            path: seed_path.to_path_buf(),
        });
    }
    let text = fs::read_to_string(seed_path)?;

    let mut labels: Vec<String> = Vec::new();
    let mut vectors: Vec<Vec<f32>> = Vec::new();
    let mut seen: HashSet<String> = HashSet::new();
    let mut lang_counts: BTreeMap<String, usize> = BTreeMap::new();

    'rows: for line in text.lines() {
        if line.trim().is_empty() {
            continue;
        }
        let row: SeedRow = serde_json::from_str(line)?;
        if !row
            .p31
            .as_ref()
            .is_some_and(|tag| opts.p31_allow.contains(tag))
        {
            continue;
        }
        let lang = row.lang.clone().unwrap_or_else(|| "und".to_string());
        *lang_counts.entry(lang).or_default() += 1;

        let canonical = row.label.trim().to_lowercase();
        let aliases = row.aliases.iter().map(|a| a.trim().to_lowercase());
        for phrase in std::iter::once(canonical.clone()).chain(aliases) {
            if labels.len() >= opts.max_n {
                break 'rows;
            }
            if phrase.is_empty() || !seen.insert(phrase.clone()) {
                continue;
            }
            vectors.push(embed_text(&phrase, opts.dim, opts.seed));
            labels.push(canonical.clone());
        }
    }
    debug!(phrases = labels.len(), "collected seed phrases");

    let mut bank = HnswInt8LabelBank::with_config(LabelBankConfig {
        dim: opts.dim,
        seed: opts.seed,
        ..opts.bank.clone()
    })?;
    bank.add(&labels, &vectors)?;
    bank.save(out_dir)?;
    let stats = bank.stats();

    let manifest = ShardManifest {
        n_total: labels.len(),
        dim: opts.dim,
        seed: opts.seed,
        p31_allow: opts.p31_allow.iter().cloned().collect(),
        lang_counts,
        created_utc: Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true),
        bytes_index: stats.bytes_index,
        bytes_vocab: stats.bytes_vocab,
    };
    atomic_write_json(&out_dir.join(MANIFEST_FILE), &manifest, false)?;

    info!(
        n_total = manifest.n_total,
        dim = manifest.dim,
        bytes_index = manifest.bytes_index,
        bytes_vocab = manifest.bytes_vocab,
        "built label bank shard"
    );
    Ok(manifest)
}
