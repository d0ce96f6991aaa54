//! Knowledge-base promotion: compress a label's gallery to a few int8 medoids.
//!
//! Medoids are chosen by farthest-point sampling over L2-normalized rows, quantized to int8
//! and content-hashed. Artifacts under `<output_dir>/medoids/` and the promotion ledger only
//! change when the hash does.

mod error;

#[cfg(test)]
mod tests;

pub use error::{PromotionError, PromotionResult};

use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{debug, info, warn};

use crate::constants::{DEFAULT_MEDOID_CAP, QUANT_SCALE};
use crate::embedding::{dot, normalize_rows, quantize_rows};
use crate::hashing::sha256_hex;
use crate::ledger::{EvidenceLedger, JsonLedger};
use crate::storage::{Int8Matrix, atomic_write_json, read_npy_i8, write_npy_i8};

pub const MEDOID_DIR: &str = "medoids";
pub const PROMOTION_LEDGER_FILE: &str = "promotion_ledger.jsonl";
pub const PROMOTION_METHOD: &str = "farthest_point";

/// Result of one [`KbPromotion::promote`] call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PromotionOutcome {
    pub label: String,
    pub medoids: usize,
    pub bytes: usize,
    pub hash: String,
    /// Whether artifacts were (re)written.
    pub updated: bool,
}

pub trait KbPromotion: Send + Sync {
    fn promote(&self, label: &str, embeddings: &[Vec<f32>]) -> PromotionResult<PromotionOutcome>;
}

/// Filesystem-safe form of `label`.
///
/// Alphanumerics, `-` and `_` are kept, everything else becomes `_`; surrounding `_` are
/// trimmed. An empty result falls back to `"label"`.
pub fn safe_label(label: &str) -> String {
    let mapped: String = label
        .chars()
        .map(|c| {
            if c.is_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect();
    let trimmed = mapped.trim_matches('_');
    if trimmed.is_empty() {
        "label".to_owned()
    } else {
        trimmed.to_owned()
    }
}

/// Greedy k-center selection.
///
/// Starts from the row with the largest norm, then repeatedly adds the row whose highest
/// similarity to the selected set is lowest. Lower index wins ties.
pub fn farthest_point_indices<R: AsRef<[f32]>>(rows: &[R], cap: usize) -> Vec<usize> {
    let n = rows.len();
    let cap = cap.min(n);
    if cap == 0 {
        return Vec::new();
    }

    let mut first = 0;
    let mut best_norm = f32::NEG_INFINITY;
    for (i, row) in rows.iter().enumerate() {
        let norm_sq = dot(row.as_ref(), row.as_ref());
        if norm_sq > best_norm {
            best_norm = norm_sq;
            first = i;
        }
    }

    let mut selected = vec![first];
    let mut taken = vec![false; n];
    taken[first] = true;
    let mut max_sim: Vec<f32> = rows
        .iter()
        .map(|row| dot(row.as_ref(), rows[first].as_ref()))
        .collect();

    while selected.len() < cap {
        let Some(next) = (0..n)
            .filter(|&i| !taken[i])
            .min_by(|&a, &b| max_sim[a].total_cmp(&max_sim[b]).then(a.cmp(&b)))
        else {
            break;
        };
        selected.push(next);
        taken[next] = true;
        for (i, row) in rows.iter().enumerate() {
            max_sim[i] = max_sim[i].max(dot(row.as_ref(), rows[next].as_ref()));
        }
    }
    selected
}

#[derive(Debug, Serialize)]
struct QuantMeta {
    scale: u32,
    dtype: &'static str,
}

#[derive(Debug, Serialize)]
struct MedoidMeta<'a> {
    label: &'a str,
    medoids: usize,
    dim: usize,
    quant: QuantMeta,
    hash: &'a str,
}

/// [`KbPromotion`] that persists up to `medoid_cap` int8 medoids per label.
pub struct MedoidPromoter {
    output_dir: PathBuf,
    medoid_cap: usize,
    ledger: Arc<dyn EvidenceLedger>,
}

impl MedoidPromoter {
    /// Ledger defaults to `<output_dir>/promotion_ledger.jsonl`.
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        let output_dir = output_dir.into();
        let ledger = Arc::new(JsonLedger::new(output_dir.join(PROMOTION_LEDGER_FILE)));
        Self {
            output_dir,
            medoid_cap: DEFAULT_MEDOID_CAP,
            ledger,
        }
    }

    pub fn with_medoid_cap(mut self, cap: usize) -> Self {
        self.medoid_cap = cap;
        self
    }

    pub fn with_ledger(mut self, ledger: Arc<dyn EvidenceLedger>) -> Self {
        self.ledger = ledger;
        self
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    pub fn medoid_cap(&self) -> usize {
        self.medoid_cap
    }

    pub fn medoid_path(&self, label: &str) -> PathBuf {
        self.output_dir
            .join(MEDOID_DIR)
            .join(format!("{}.int8.npy", safe_label(label)))
    }

    pub fn meta_path(&self, label: &str) -> PathBuf {
        self.output_dir
            .join(MEDOID_DIR)
            .join(format!("{}.json", safe_label(label)))
    }

    fn existing_hash(path: &Path) -> Option<String> {
        if !path.exists() {
            return None;
        }
        match read_npy_i8(path) {
            Ok(matrix) => Some(sha256_hex(matrix.as_bytes())),
            Err(e) => {
                warn!(path = %path.display(), error = %e, "unreadable medoid file, rewriting");
                None
            }
        }
    }
}

impl KbPromotion for MedoidPromoter {
    fn promote(&self, label: &str, embeddings: &[Vec<f32>]) -> PromotionResult<PromotionOutcome> {
        let Some(first) = embeddings.first() else {
            return Ok(PromotionOutcome {
                label: label.to_owned(),
                medoids: 0,
                bytes: 0,
                hash: String::new(),
                updated: false,
            });
        };

        let dim = first.len();
        if dim == 0 {
            return Err(PromotionError::ZeroDimension);
        }
        if let Some((row, v)) = embeddings.iter().enumerate().find(|(_, v)| v.len() != dim) {
            return Err(PromotionError::RaggedRows {
                row,
                expected: dim,
                actual: v.len(),
            });
        }

        let mut normalized = embeddings.to_vec();
        normalize_rows(&mut normalized);
        let picked: Vec<&Vec<f32>> = farthest_point_indices(&normalized, self.medoid_cap)
            .into_iter()
            .map(|i| &normalized[i])
            .collect();

        let matrix = Int8Matrix {
            rows: picked.len(),
            cols: dim,
            data: quantize_rows(&picked),
        };
        let digest = sha256_hex(matrix.as_bytes());

        let npy_path = self.medoid_path(label);
        let updated = Self::existing_hash(&npy_path).as_deref() != Some(digest.as_str());

        if updated {
            write_npy_i8(&npy_path, &matrix)?;
            let meta = MedoidMeta {
                label,
                medoids: matrix.rows,
                dim,
                quant: QuantMeta {
                    scale: QUANT_SCALE as u32,
                    dtype: "int8",
                },
                hash: &digest,
            };
            atomic_write_json(&self.meta_path(label), &meta, true)?;
            self.ledger.append(&json!({
                "label": label,
                "medoids": matrix.rows,
                "bytes": matrix.nbytes(),
                "method": PROMOTION_METHOD,
                "quant": "int8",
                "hash": digest,
            }))?;
            info!(label, medoids = matrix.rows, hash = %digest, "promoted medoids");
        } else {
            debug!(label, hash = %digest, "medoids unchanged");
        }

        Ok(PromotionOutcome {
            label: label.to_owned(),
            medoids: matrix.rows,
            bytes: matrix.nbytes(),
            hash: digest,
            updated,
        })
    }
}
