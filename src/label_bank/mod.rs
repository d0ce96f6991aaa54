//! Label bank: nearest-neighbour lookup over labelled unit vectors.
//!
//! # Architecture
//!
//! ```text
//! add(labels, vectors) ──► normalize ──► SimilarityIndex (f32, inner product)
//!                                   └──► int8 vocab shadow (byte accounting, persistence)
//!
//! lookup_vecs(queries, k) ──► normalize ──► candidate pool ──► exact rescore
//!                                                          ──► sort (-score, label) ──► top-k
//! ```
//!
//! Two index backends satisfy one ranking contract:
//!
//! - [`ExactIndex`]: brute-force dot-product scan, exact results.
//! - [`HnswIndex`] (feature `ann`): HNSW graph over cosine distance, searched with
//!   `ef = max(64, 2k)`; candidates are rescored against the stored f32 rows. Approximate mode
//!   may omit true-but-distant neighbours.
//!
//! Scores are inner products of normalized vectors (cosine similarity).

mod bank;
/// Seed-file driven shard builder.
pub mod builder;
mod error;
mod exact;
#[cfg(feature = "ann")]
mod hnsw;
mod shard;


pub use bank::HnswInt8LabelBank;
pub use builder::{SeedRow, ShardBuildOptions, ShardManifest, build_shard};
pub use error::{LabelBankError, LabelBankResult};
pub use exact::ExactIndex;
#[cfg(feature = "ann")]
pub use hnsw::HnswIndex;
pub use shard::{BANK_META_FILE, INDEX_FILE, LABELS_FILE, QUANT_FILE, VOCAB_FILE, load_shard};

use serde::{Deserialize, Serialize};

use crate::constants::{
    DEFAULT_BANK_SEED, DEFAULT_EF_CONSTRUCTION, DEFAULT_EMBEDDING_DIM, DEFAULT_HNSW_M,
};

/// Default row count below which the HNSW backend scans exactly.
pub const DEFAULT_MIN_VECTORS_FOR_ANN: usize = 1000;

/// Top-k lookup result for one query, sorted by `(-score, label)`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TopK {
    pub scores: Vec<f32>,
    pub labels: Vec<String>,
}

impl TopK {
    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    /// Best `(label, score)` pair.
    pub fn top1(&self) -> Option<(&str, f32)> {
        Some((self.labels.first()?.as_str(), *self.scores.first()?))
    }

    /// Iterates `(label, score)` pairs in rank order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, f32)> {
        self.labels
            .iter()
            .map(String::as_str)
            .zip(self.scores.iter().copied())
    }
}

/// Capacity accounting for a bank.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LabelBankStats {
    pub n_items: usize,
    /// Size of the persisted index payload, or `n_items * dim * 4` before the first save.
    pub bytes_index: u64,
    /// Size of the int8 vocab shadow (`n_items * dim`).
    pub bytes_vocab: u64,
}

impl LabelBankStats {
    /// Total bytes per 1000 indexed phrases (0 for an empty bank).
    pub fn bytes_per_1k(&self) -> f64 {
        if self.n_items == 0 {
            return 0.0;
        }
        (self.bytes_index + self.bytes_vocab) as f64 * 1000.0 / self.n_items as f64
    }
}

/// Index backend selection.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    /// HNSW when compiled in, exact otherwise.
    #[default]
    Auto,
    Exact,
    Hnsw,
}

impl BackendKind {
    /// Resolves `Auto` (and an unavailable `Hnsw`) to a concrete backend.
    pub fn resolve(self) -> BackendKind {
        match self {
            BackendKind::Exact => BackendKind::Exact,
            BackendKind::Auto | BackendKind::Hnsw if cfg!(feature = "ann") => BackendKind::Hnsw,
            BackendKind::Hnsw => {
                tracing::warn!("hnsw backend requested but the `ann` feature is disabled");
                BackendKind::Exact
            }
            BackendKind::Auto => BackendKind::Exact,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            BackendKind::Auto => "auto",
            BackendKind::Exact => "exact",
            BackendKind::Hnsw => "hnsw",
        }
    }
}

/// Construction parameters for [`HnswInt8LabelBank`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LabelBankConfig {
    pub dim: usize,
    /// HNSW max connections per node.
    pub m: usize,
    pub ef_construction: usize,
    /// Seed the shard's phrase vectors were embedded with, recorded in `bank.json`.
    ///
    /// The HNSW graph does not consume it: `hnsw_rs` draws node levels from its own fixed
    /// seed, so graph builds are reproducible regardless of this value.
    pub seed: u64,
    pub backend: BackendKind,
    /// Below this many rows the HNSW backend scans exactly.
    pub min_vectors_for_ann: usize,
}

impl Default for LabelBankConfig {
    fn default() -> Self {
        Self {
            dim: DEFAULT_EMBEDDING_DIM,
            m: DEFAULT_HNSW_M,
            ef_construction: DEFAULT_EF_CONSTRUCTION,
            seed: DEFAULT_BANK_SEED,
            backend: BackendKind::Auto,
            min_vectors_for_ann: DEFAULT_MIN_VECTORS_FOR_ANN,
        }
    }
}

impl LabelBankConfig {
    pub fn with_dim(dim: usize) -> Self {
        Self {
            dim,
            ..Default::default()
        }
    }

    pub fn exact(dim: usize) -> Self {
        Self {
            dim,
            backend: BackendKind::Exact,
            ..Default::default()
        }
    }

    pub fn validate(&self) -> LabelBankResult<()> {
        if self.dim == 0 {
            return Err(LabelBankError::InvalidConfig {
                reason: "dim must be positive".to_string(),
            });
        }
        if self.m < 2 {
            return Err(LabelBankError::InvalidConfig {
                reason: format!("m must be at least 2, got {}", self.m),
            });
        }
        if self.ef_construction == 0 {
            return Err(LabelBankError::InvalidConfig {
                reason: "ef_construction must be positive".to_string(),
            });
        }
        Ok(())
    }
}

/// Candidate produced by a [`SimilarityIndex`]: row position and exact inner product.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Candidate {
    pub row: usize,
    pub score: f32,
}

/// Storage and candidate generation over normalized f32 rows.
///
/// Implementations return a candidate pool with exact scores; ranking and truncation to `k`
/// happen in the bank so every backend shares the same tie-break.
pub trait SimilarityIndex: Send + Sync {
    /// Appends already-normalized rows.
    fn add(&mut self, rows: &[Vec<f32>]);

    /// Returns at least the best `k` candidates (ties at the boundary included) when exact,
    /// or the best candidates the graph reaches when approximate.
    fn search(&self, query: &[f32], k: usize) -> Vec<Candidate>;

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Stored rows in insertion order.
    fn rows(&self) -> &[Vec<f32>];

    fn backend(&self) -> BackendKind;
}

/// The label bank contract shared by pipeline components.
pub trait LabelBank: Send + Sync {
    fn dim(&self) -> usize;

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Normalizes and appends `vectors` under `labels`.
    fn add(&mut self, labels: &[String], vectors: &[Vec<f32>]) -> LabelBankResult<()>;

    /// Top-k for the first query row.
    fn lookup_vecs(&self, queries: &[Vec<f32>], k: usize) -> LabelBankResult<TopK>;

    /// Top-k for every query row.
    fn lookup_batch(&self, queries: &[Vec<f32>], k: usize) -> LabelBankResult<Vec<TopK>>;

    fn stats(&self) -> LabelBankStats;

    /// Name of the resolved backend (`"exact"` or `"hnsw"`).
    fn backend_name(&self) -> &'static str;
}
