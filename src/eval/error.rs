use std::path::PathBuf;

use thiserror::Error;

use crate::constants::DimValidationError;
use crate::embedding::EmbeddingError;
use crate::label_bank::LabelBankError;
use crate::storage::StorageError;
use crate::verify::VerifyError;

#[derive(Debug, Error)]
pub enum EvalError {
    #[error("input directory not found: {path}")]
    InputNotFound { path: PathBuf },

    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("embedder returned {got} embeddings for {expected} tracks")]
    EmbeddingCount { expected: usize, got: usize },

    #[error("embedder output: {0}")]
    Dimension(#[from] DimValidationError),

    #[error(transparent)]
    Embedding(#[from] EmbeddingError),

    #[error(transparent)]
    LabelBank(#[from] LabelBankError),

    #[error(transparent)]
    Verify(#[from] VerifyError),

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error("failed to hash metrics: {0}")]
    Hash(#[from] serde_json::Error),
}

pub type EvalResult<T> = Result<T, EvalError>;
