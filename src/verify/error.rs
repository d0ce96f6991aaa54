use std::path::PathBuf;
use thiserror::Error;

use crate::ledger::LedgerError;
use crate::storage::StorageError;

#[derive(Debug, Error)]
pub enum VerifyError {
    #[error("gallery manifest not found: {path}")]
    ManifestNotFound { path: PathBuf },

    #[error("verify calibration not found: {path}")]
    CalibrationNotFound { path: PathBuf },

    #[error("{path}:{line}: {source}")]
    ManifestLine {
        path: PathBuf,
        line: usize,
        #[source]
        source: serde_json::Error,
    },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("evidence ledger error: {0}")]
    Ledger(#[from] LedgerError),
}

pub type VerifyResult<T> = Result<T, VerifyError>;
