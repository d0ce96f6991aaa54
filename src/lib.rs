//! Latency-vision library crate (used by the `lvision` binary and integration tests).
//!
//! # Public API Surface
//!
//! ## Label bank
//! - [`HnswInt8LabelBank`], [`LabelBank`], [`TopK`] - Normalized vector index with an int8 shadow
//! - [`build_shard`], [`load_shard`] - Shard directories on disk
//!
//! ## Calibration & verification
//! - [`fit_temperature`], [`evaluate_labelbank_calibration`] - Temperature scaling and its report
//! - [`ManifestVerifyWorker`], [`calibrate_thresholds`] - Gallery-backed candidate verification
//!
//! ## Pipeline
//! - [`CandidateOracle`], [`InMemoryCandidateOracle`] - Bounded queue of unknowns
//! - [`MedoidPromoter`] - Capped per-label medoid sets
//! - [`DetectTrackEmbedPipeline`], [`run_eval`] - Offline evaluation with guardrails
//!
//! ## Utilities
//! - [`Settings`] - Layered configuration
//! - [`metrics_hash`], [`sha256_hex`] - Reproducibility hashes
//! - [`DimConfig`], [`validate_embedding_dim`] - Dimension validation

pub mod calibration;
pub mod config;
pub mod constants;
pub mod embedding;
pub mod eval;
pub mod hashing;
pub mod kb;
pub mod label_bank;
pub mod ledger;
pub mod oracle;
pub mod storage;
pub mod verify;

pub use calibration::{
    CalibrationError, CalibrationReport, evaluate_labelbank_calibration, fit_temperature,
};
pub use config::{ConfigError, Settings};
pub use constants::{DimConfig, DimValidationError, validate_embedding_dim};
pub use embedding::{Embedding, EmbeddingError, embed_text};
pub use eval::{DetectTrackEmbedPipeline, EvalError, EvalMetrics, EvalOutcome, run_eval};
pub use hashing::{metrics_hash, sha256_hex};
pub use kb::{KbPromotion, MedoidPromoter, PromotionError, PromotionOutcome};
pub use label_bank::{
    BackendKind, HnswInt8LabelBank, LabelBank, LabelBankConfig, LabelBankError, TopK, build_shard,
    load_shard,
};
pub use ledger::{EvidenceLedger, JsonLedger, LedgerError};
pub use oracle::{CandidateOracle, CandidateRecord, InMemoryCandidateOracle};
pub use storage::StorageError;
pub use verify::{
    CalibrationArtifact, GalleryManifest, ManifestVerifyWorker, VerifyError, VerifyOutcome,
    VerifyWorker, calibrate_thresholds,
};
