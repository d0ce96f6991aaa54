use std::cmp::Ordering;
use std::fmt;
use std::path::Path;

use tracing::debug;

use super::exact::ExactIndex;
#[cfg(feature = "ann")]
use super::hnsw::HnswIndex;
use super::{
    BackendKind, Candidate, LabelBank, LabelBankConfig, LabelBankError, LabelBankResult,
    LabelBankStats, SimilarityIndex, TopK, shard,
};
use crate::embedding::{l2_normalize, quantize_rows};
use crate::storage::Int8Matrix;

/// Label bank with an f32 similarity index and an int8 vocab shadow.
///
/// Invariant: index rows == vocab rows == labels.
pub struct HnswInt8LabelBank {
    config: LabelBankConfig,
    labels: Vec<String>,
    index: Box<dyn SimilarityIndex>,
    vocab: Vec<i8>,
    persisted_index_bytes: Option<u64>,
}

impl fmt::Debug for HnswInt8LabelBank {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HnswInt8LabelBank")
            .field("dim", &self.config.dim)
            .field("backend", &self.index.backend())
            .field("n_items", &self.labels.len())
            .finish()
    }
}

impl HnswInt8LabelBank {
    /// Creates an empty bank with default parameters.
    pub fn new(dim: usize) -> LabelBankResult<Self> {
        Self::with_config(LabelBankConfig::with_dim(dim))
    }

    /// Creates an empty bank; the backend is resolved once, here.
    pub fn with_config(config: LabelBankConfig) -> LabelBankResult<Self> {
        config.validate()?;
        let index = build_index(&config);
        debug!(
            dim = config.dim,
            backend = index.backend().as_str(),
            seed = config.seed,
            "created label bank"
        );
        Ok(Self {
            config,
            labels: Vec::new(),
            index,
            vocab: Vec::new(),
            persisted_index_bytes: None,
        })
    }

    pub fn config(&self) -> &LabelBankConfig {
        &self.config
    }

    pub fn dim(&self) -> usize {
        self.config.dim
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    pub fn labels(&self) -> &[String] {
        &self.labels
    }

    /// Stored (normalized) f32 rows in insertion order.
    pub fn rows(&self) -> &[Vec<f32>] {
        self.index.rows()
    }

    /// The int8 vocab shadow as a matrix.
    pub fn vocab(&self) -> Int8Matrix {
        Int8Matrix {
            rows: self.labels.len(),
            cols: self.config.dim,
            data: self.vocab.clone(),
        }
    }

    pub fn backend(&self) -> BackendKind {
        self.index.backend()
    }

    /// Normalizes and appends. Validation happens before any mutation.
    pub fn add<L, V>(&mut self, labels: &[L], vectors: &[V]) -> LabelBankResult<()>
    where
        L: AsRef<str>,
        V: AsRef<[f32]>,
    {
        for v in vectors {
            let actual = v.as_ref().len();
            if actual != self.config.dim {
                return Err(LabelBankError::DimensionMismatch {
                    expected: self.config.dim,
                    actual,
                });
            }
        }
        if labels.len() != vectors.len() {
            return Err(LabelBankError::LengthMismatch {
                labels: labels.len(),
                vectors: vectors.len(),
            });
        }
        if vectors.is_empty() {
            return Ok(());
        }

        let rows: Vec<Vec<f32>> = vectors.iter().map(|v| l2_normalize(v.as_ref())).collect();
        let labels: Vec<String> = labels.iter().map(|l| l.as_ref().to_string()).collect();
        self.push_normalized(labels, rows);
        Ok(())
    }

    /// Appends rows that are already normalized (used by shard loading, which must not
    /// renormalize persisted values).
    pub(super) fn push_normalized(&mut self, labels: Vec<String>, rows: Vec<Vec<f32>>) {
        self.vocab.extend(quantize_rows(&rows));
        self.index.add(&rows);
        self.labels.extend(labels);
        self.persisted_index_bytes = None;
        debug!(n_items = self.labels.len(), "label bank rows added");
    }

    pub(super) fn set_vocab(&mut self, vocab: Vec<i8>) {
        self.vocab = vocab;
    }

    pub(super) fn set_persisted_index_bytes(&mut self, bytes: u64) {
        self.persisted_index_bytes = Some(bytes);
    }

    /// Top-k for a single query.
    pub fn lookup(&self, query: &[f32], k: usize) -> LabelBankResult<TopK> {
        self.check_dim(query)?;
        if k == 0 || self.labels.is_empty() {
            return Ok(TopK::default());
        }

        let q = l2_normalize(query);
        let mut candidates = self.index.search(&q, k);
        self.rank(&mut candidates);
        candidates.truncate(k);

        Ok(TopK {
            scores: candidates.iter().map(|c| c.score).collect(),
            labels: candidates
                .iter()
                .map(|c| self.labels[c.row].clone())
                .collect(),
        })
    }

    fn check_dim(&self, query: &[f32]) -> LabelBankResult<()> {
        if query.len() != self.config.dim {
            return Err(LabelBankError::DimensionMismatch {
                expected: self.config.dim,
                actual: query.len(),
            });
        }
        Ok(())
    }

    /// Top-k for the first query row; no rows yields an empty result.
    ///
    /// Every row must match the bank dimension, not only the first.
    pub fn lookup_vecs<V: AsRef<[f32]>>(&self, queries: &[V], k: usize) -> LabelBankResult<TopK> {
        for q in queries {
            self.check_dim(q.as_ref())?;
        }
        match queries.first() {
            Some(q) => self.lookup(q.as_ref(), k),
            None => Ok(TopK::default()),
        }
    }

    /// Top-k for every query row.
    pub fn lookup_batch<V: AsRef<[f32]>>(
        &self,
        queries: &[V],
        k: usize,
    ) -> LabelBankResult<Vec<TopK>> {
        for q in queries {
            self.check_dim(q.as_ref())?;
        }
        queries.iter().map(|q| self.lookup(q.as_ref(), k)).collect()
    }

    /// Sorts by `(-score, label)`, then by insertion order.
    fn rank(&self, candidates: &mut [Candidate]) {
        candidates.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(Ordering::Equal)
                .then_with(|| self.labels[a.row].cmp(&self.labels[b.row]))
                .then_with(|| a.row.cmp(&b.row))
        });
    }

    /// Persists the shard to `dir` (see [`super::load_shard`] for the layout).
    pub fn save(&mut self, dir: &Path) -> LabelBankResult<()> {
        let index_bytes = shard::save(self, dir)?;
        self.persisted_index_bytes = Some(index_bytes);
        Ok(())
    }

    /// Loads a shard written by [`save`](Self::save).
    pub fn load(dir: &Path) -> LabelBankResult<Self> {
        shard::load(dir, None)
    }

    /// Loads a shard, overriding the persisted backend choice.
    pub fn load_with_backend(dir: &Path, backend: BackendKind) -> LabelBankResult<Self> {
        shard::load(dir, Some(backend))
    }

    pub fn stats(&self) -> LabelBankStats {
        let n = self.labels.len();
        let bytes_index = self
            .persisted_index_bytes
            .unwrap_or((n * self.config.dim * 4) as u64);
        LabelBankStats {
            n_items: n,
            bytes_index,
            bytes_vocab: self.vocab.len() as u64,
        }
    }
}

impl LabelBank for HnswInt8LabelBank {
    fn dim(&self) -> usize {
        HnswInt8LabelBank::dim(self)
    }

    fn len(&self) -> usize {
        HnswInt8LabelBank::len(self)
    }

    fn add(&mut self, labels: &[String], vectors: &[Vec<f32>]) -> LabelBankResult<()> {
        HnswInt8LabelBank::add(self, labels, vectors)
    }

    fn lookup_vecs(&self, queries: &[Vec<f32>], k: usize) -> LabelBankResult<TopK> {
        HnswInt8LabelBank::lookup_vecs(self, queries, k)
    }

    fn lookup_batch(&self, queries: &[Vec<f32>], k: usize) -> LabelBankResult<Vec<TopK>> {
        HnswInt8LabelBank::lookup_batch(self, queries, k)
    }

    fn stats(&self) -> LabelBankStats {
        HnswInt8LabelBank::stats(self)
    }

    fn backend_name(&self) -> &'static str {
        self.index.backend().as_str()
    }
}

fn build_index(config: &LabelBankConfig) -> Box<dyn SimilarityIndex> {
    match config.backend.resolve() {
        #[cfg(feature = "ann")]
        BackendKind::Hnsw => Box::new(HnswIndex::new(
            config.m,
            config.ef_construction,
            config.min_vectors_for_ann,
        )),
        _ => Box::new(ExactIndex::new()),
    }
}
