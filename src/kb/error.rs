use thiserror::Error;

use crate::ledger::LedgerError;
use crate::storage::StorageError;

#[derive(Debug, Error)]
pub enum PromotionError {
    #[error("row {row} has dimension {actual}, expected {expected}")]
    RaggedRows {
        row: usize,
        expected: usize,
        actual: usize,
    },

    #[error("embeddings have zero dimension")]
    ZeroDimension,

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("promotion ledger error: {0}")]
    Ledger(#[from] LedgerError),
}

pub type PromotionResult<T> = Result<T, PromotionError>;
