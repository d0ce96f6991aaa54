use std::path::PathBuf;
use thiserror::Error;

use crate::storage::StorageError;

#[derive(Debug, Error)]
pub enum CalibrationError {
    #[error("no samples to fit")]
    EmptyInput,

    #[error("{logits} logit rows but {labels} labels")]
    LengthMismatch { logits: usize, labels: usize },

    #[error("row {row} has no logits")]
    EmptyRow { row: usize },

    #[error("row {row} has {actual} logits, expected {expected}")]
    RaggedRows {
        row: usize,
        expected: usize,
        actual: usize,
    },

    #[error("label {label} out of range for row {row} with {classes} classes")]
    LabelOutOfRange {
        row: usize,
        label: usize,
        classes: usize,
    },

    #[error("record {record} of kind known has no label")]
    MissingLabel { record: usize },

    /// The search produced a temperature that is not a finite positive number.
    #[error("temperature fit produced invalid value {value}")]
    InvalidTemperature { value: f64 },

    #[error("calibration queries not found: {path}")]
    QueriesNotFound { path: PathBuf },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("storage error: {0}")]
    Storage(#[from] StorageError),
}

pub type CalibrationResult<T> = Result<T, CalibrationError>;
