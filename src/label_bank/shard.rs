//! On-disk shard layout.
//!
//! ```text
//! <dir>/index.jsonl     one {"label": ..., "values": [...]} per row (normalized f32)
//! <dir>/labels.txt      newline-separated labels, index order
//! <dir>/vocab.int8.npy  int8 shadow, shape (n_items, dim)
//! <dir>/quant.json      {"scale":127}
//! <dir>/bank.json       construction parameters
//! ```
//!
//! `index.jsonl` is authoritative. Values are written with shortest round-trip formatting and
//! loaded without renormalization, so lookups after a reload are bit-identical.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::info;

use super::{BackendKind, HnswInt8LabelBank, LabelBankConfig, LabelBankError, LabelBankResult};
use crate::constants::QUANT_SCALE;
use crate::storage::{StorageError, atomic_write, atomic_write_json, read_npy_i8, write_npy_i8};

pub const INDEX_FILE: &str = "index.jsonl";
pub const LABELS_FILE: &str = "labels.txt";
pub const VOCAB_FILE: &str = "vocab.int8.npy";
pub const QUANT_FILE: &str = "quant.json";
pub const BANK_META_FILE: &str = "bank.json";

#[derive(Serialize)]
struct IndexRowRef<'a> {
    label: &'a str,
    values: &'a [f32],
}

#[derive(Deserialize)]
struct IndexRow {
    label: String,
    values: Vec<f32>,
}

#[derive(Debug, Serialize, Deserialize)]
struct QuantMeta {
    scale: u32,
}

#[derive(Debug, Serialize, Deserialize)]
struct BankMeta {
    config: LabelBankConfig,
    n_items: usize,
}

/// Loads a persisted shard.
///
/// Fails with [`LabelBankError::ShardNotFound`] when `dir` has no `index.jsonl`.
pub fn load_shard(dir: &Path) -> LabelBankResult<HnswInt8LabelBank> {
    load(dir, None)
}

/// Writes every shard file; returns the index payload size in bytes.
pub(super) fn save(bank: &HnswInt8LabelBank, dir: &Path) -> LabelBankResult<u64> {
    fs::create_dir_all(dir)?;

    let mut index = String::new();
    for (label, row) in bank.labels().iter().zip(bank.rows()) {
        let line = serde_json::to_string(&IndexRowRef {
            label,
            values: row,
        })?;
        index.push_str(&line);
        index.push('\n');
    }
    atomic_write(&dir.join(INDEX_FILE), index.as_bytes())?;

    let mut labels = bank.labels().join("\n");
    if !labels.is_empty() {
        labels.push('\n');
    }
    atomic_write(&dir.join(LABELS_FILE), labels.as_bytes())?;

    write_npy_i8(&dir.join(VOCAB_FILE), &bank.vocab())?;
    atomic_write_json(
        &dir.join(QUANT_FILE),
        &QuantMeta {
            scale: QUANT_SCALE as u32,
        },
        false,
    )?;
    atomic_write_json(
        &dir.join(BANK_META_FILE),
        &BankMeta {
            config: bank.config().clone(),
            n_items: bank.len(),
        },
        true,
    )?;

    info!(
        dir = %dir.display(),
        n_items = bank.len(),
        bytes_index = index.len(),
        bytes_vocab = bank.len() * bank.dim(),
        "saved label bank shard"
    );
    Ok(index.len() as u64)
}

pub(super) fn load(
    dir: &Path,
    backend: Option<BackendKind>,
) -> LabelBankResult<HnswInt8LabelBank> {
    let index_path = dir.join(INDEX_FILE);
    if !index_path.is_file() {
        return Err(LabelBankError::ShardNotFound {
            path: dir.to_path_buf(),
        });
    }
    let corrupt = |reason: String| LabelBankError::CorruptShard {
        path: dir.to_path_buf(),
        reason,
    };

    let text = fs::read_to_string(&index_path)?;
    let mut labels = Vec::new();
    let mut rows = Vec::new();
    for (lineno, line) in text.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        let row: IndexRow = serde_json::from_str(line)
            .map_err(|e| corrupt(format!("{INDEX_FILE} line {}: {e}", lineno + 1)))?;
        labels.push(row.label);
        rows.push(row.values);
    }

    let meta_path = dir.join(BANK_META_FILE);
    let meta: Option<BankMeta> = if meta_path.is_file() {
        let raw = fs::read_to_string(&meta_path)?;
        Some(serde_json::from_str(&raw).map_err(|e| corrupt(format!("{BANK_META_FILE}: {e}")))?)
    } else {
        None
    };

    let mut config = match (&meta, rows.first()) {
        (Some(meta), _) => meta.config.clone(),
        (None, Some(first)) => LabelBankConfig::with_dim(first.len()),
        (None, None) => return Err(corrupt(format!("{INDEX_FILE} is empty"))),
    };
    if let Some(backend) = backend {
        config.backend = backend;
    }
    if let Some(meta) = &meta
        && meta.n_items != rows.len()
    {
        return Err(corrupt(format!(
            "{BANK_META_FILE} records {} items, {INDEX_FILE} has {}",
            meta.n_items,
            rows.len()
        )));
    }
    if let Some(bad) = rows.iter().find(|r| r.len() != config.dim) {
        return Err(corrupt(format!(
            "row has dimension {}, expected {}",
            bad.len(),
            config.dim
        )));
    }

    let labels_path = dir.join(LABELS_FILE);
    if labels_path.is_file() {
        let listed = fs::read_to_string(&labels_path)?.lines().count();
        if listed != labels.len() {
            return Err(corrupt(format!(
                "{LABELS_FILE} lists {listed} labels, {INDEX_FILE} has {}",
                labels.len()
            )));
        }
    }

    let quant_path = dir.join(QUANT_FILE);
    if quant_path.is_file() {
        let quant: QuantMeta = serde_json::from_str(&fs::read_to_string(&quant_path)?)
            .map_err(|e| corrupt(format!("{QUANT_FILE}: {e}")))?;
        if quant.scale != QUANT_SCALE as u32 {
            return Err(corrupt(format!("unsupported quant scale {}", quant.scale)));
        }
    }

    let n_items = rows.len();
    let mut bank = HnswInt8LabelBank::with_config(config)?;
    bank.push_normalized(labels, rows);

    let vocab_path = dir.join(VOCAB_FILE);
    if vocab_path.is_file() && n_items > 0 {
        let vocab = read_npy_i8(&vocab_path).map_err(|e| match e {
            StorageError::InvalidNpy { reason, .. } => corrupt(format!("{VOCAB_FILE}: {reason}")),
            other => LabelBankError::Storage(other),
        })?;
        if vocab.rows != n_items || vocab.cols != bank.dim() {
            return Err(corrupt(format!(
                "{VOCAB_FILE} has shape ({}, {}), expected ({}, {})",
                vocab.rows,
                vocab.cols,
                n_items,
                bank.dim()
            )));
        }
        bank.set_vocab(vocab.data);
    }
    bank.set_persisted_index_bytes(text.len() as u64);

    info!(
        dir = %dir.display(),
        n_items,
        backend = bank.backend().as_str(),
        "loaded label bank shard"
    );
    Ok(bank)
}
