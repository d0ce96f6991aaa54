use std::path::PathBuf;
use thiserror::Error;

use crate::storage::StorageError;

#[derive(Debug, Error)]
pub enum LabelBankError {
    /// A vector (added or queried) does not match the bank dimension. Nothing was mutated.
    #[error("dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    /// `labels` and `vectors` have different lengths. Nothing was mutated.
    #[error("labels/vectors length mismatch: {labels} labels, {vectors} vectors")]
    LengthMismatch { labels: usize, vectors: usize },

    #[error("invalid label bank configuration: {reason}")]
    InvalidConfig { reason: String },

    /// No index payload exists in the shard directory.
    #[error("label bank shard not found: {path}")]
    ShardNotFound { path: PathBuf },

    /// The shard exists but cannot be parsed or is internally inconsistent.
    #[error("corrupt label bank shard {path}: {reason}")]
    CorruptShard { path: PathBuf, reason: String },

    #[error("seed file not found: {path}")]
    SeedNotFound { path: PathBuf },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type LabelBankResult<T> = Result<T, LabelBankError>;
