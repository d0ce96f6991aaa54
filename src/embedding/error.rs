use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum EmbeddingError {
    #[error("embedding dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("embedding batch is empty")]
    EmptyBatch,

    #[error("embedder failed: {reason}")]
    EncodeFailed { reason: String },
}

pub type EmbeddingResult<T> = Result<T, EmbeddingError>;
