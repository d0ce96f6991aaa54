use std::path::PathBuf;
use thiserror::Error;

use crate::storage::mmap::MmapError;

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("mmap error: {0}")]
    Mmap(#[from] MmapError),

    #[error("serialization error: {0}")]
    Json(#[from] serde_json::Error),

    /// The temp file could not be renamed over the destination.
    #[error("failed to persist {path}: {source}")]
    PersistFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("file not found: {path}")]
    NotFound { path: PathBuf },

    #[error("invalid npy file {path}: {reason}")]
    InvalidNpy { path: PathBuf, reason: String },
}

pub type StorageResult<T> = Result<T, StorageError>;
