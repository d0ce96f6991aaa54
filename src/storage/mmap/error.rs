use std::io;
use std::path::PathBuf;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum MmapError {
    #[error("failed to map {path}: {source}")]
    Map {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// Zero-length files cannot be mapped; a persisted artifact is never empty.
    #[error("artifact is empty: {path}")]
    EmptyFile { path: PathBuf },
}

pub type MmapResult<T> = Result<T, MmapError>;
