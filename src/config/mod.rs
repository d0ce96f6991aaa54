//! Layered configuration.
//!
//! Precedence: built-in defaults < `vision.toml` (or an explicit path) < `VISION__SECTION__KEY`
//! environment variables. Keys are case-insensitive.

pub mod error;


pub use error::ConfigError;

use std::path::{Path, PathBuf};
use std::sync::{Arc, OnceLock};

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::constants::{
    DEFAULT_EMBEDDING_DIM, DEFAULT_MEDOID_CAP, DEFAULT_ORACLE_MAXLEN, DimConfig,
};
use crate::label_bank::LabelBankConfig;

/// Default config file looked up in the working directory.
pub const DEFAULT_CONFIG_FILE: &str = "vision.toml";

/// Environment prefix; sections and keys are separated by `__`.
pub const ENV_PREFIX: &str = "VISION";

/// Label matching thresholds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MatcherSettings {
    /// Neighbours requested per lookup. Default: `5`.
    pub topk: usize,
    /// Minimum similarity for a neighbour to count. Default: `0.35`.
    pub threshold: f32,
    /// Neighbours at or above `threshold` needed for a known match. Default: `1`.
    pub min_neighbors: usize,
}

impl Default for MatcherSettings {
    fn default() -> Self {
        Self {
            topk: 5,
            threshold: 0.35,
            min_neighbors: 1,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OracleSettings {
    /// Queue capacity; `0` sheds everything. Default: `2048`.
    pub maxlen: usize,
}

impl Default for OracleSettings {
    fn default() -> Self {
        Self {
            maxlen: DEFAULT_ORACLE_MAXLEN,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VerifySettings {
    pub manifest_path: PathBuf,
    pub calibration_path: PathBuf,
    /// Evidence ledger; decisions are not recorded when unset.
    pub ledger_path: Option<PathBuf>,
}

impl Default for VerifySettings {
    fn default() -> Self {
        Self {
            manifest_path: PathBuf::from("bench/verify/gallery_manifest.jsonl"),
            calibration_path: PathBuf::from("bench/verify/calibration.json"),
            ledger_path: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct KbSettings {
    pub output_dir: PathBuf,
    pub medoid_cap: usize,
}

impl Default for KbSettings {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from("bench/kb"),
            medoid_cap: DEFAULT_MEDOID_CAP,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LatencySettings {
    /// Per-frame p95 budget. Default: `33`.
    pub budget_ms: u64,
}

impl Default for LatencySettings {
    fn default() -> Self {
        Self { budget_ms: 33 }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EvalSettings {
    /// Leading frames excluded from latency percentiles.
    pub warmup: usize,
    /// Accepted `[min, max]` unknown rate.
    pub unknown_rate_band: (f64, f64),
}

impl Default for EvalSettings {
    fn default() -> Self {
        Self {
            warmup: 0,
            unknown_rate_band: (0.10, 0.40),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbedderSettings {
    pub dim: usize,
    pub batch_size: usize,
    pub normalize: bool,
}

impl Default for EmbedderSettings {
    fn default() -> Self {
        Self {
            dim: DEFAULT_EMBEDDING_DIM,
            batch_size: 8,
            normalize: true,
        }
    }
}

/// Full application settings.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub label_bank: LabelBankConfig,
    pub matcher: MatcherSettings,
    pub oracle: OracleSettings,
    pub verify: VerifySettings,
    pub kb: KbSettings,
    pub latency: LatencySettings,
    pub eval: EvalSettings,
    pub embedder: EmbedderSettings,
}

impl Settings {
    /// Builds settings from defaults, an optional TOML file and the environment.
    ///
    /// With `path == None`, `vision.toml` in the working directory is used if present. An
    /// explicit path must exist.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let file = match path {
            Some(p) => {
                if !p.is_file() {
                    return Err(ConfigError::PathNotFound {
                        path: p.to_path_buf(),
                    });
                }
                ::config::File::from(p).required(true)
            }
            None => ::config::File::with_name(DEFAULT_CONFIG_FILE).required(false),
        };

        let builder = ::config::Config::builder()
            .add_source(file)
            .add_source(::config::Environment::with_prefix(ENV_PREFIX).separator("__"));

        let settings: Settings = builder.build()?.try_deserialize()?;
        settings.validate()?;

        tracing::debug!(
            dim = settings.label_bank.dim,
            backend = settings.label_bank.backend.as_str(),
            topk = settings.matcher.topk,
            "settings loaded"
        );
        Ok(settings)
    }

    /// Checks ranges and cross-field invariants.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.label_bank
            .validate()
            .map_err(|e| ConfigError::InvalidValue {
                key: "label_bank",
                reason: e.to_string(),
            })?;

        DimConfig::new(self.embedder.dim)
            .validate()
            .map_err(|e| ConfigError::InvalidValue {
                key: "embedder.dim",
                reason: e.to_string(),
            })?;
        if self.embedder.batch_size == 0 {
            return Err(ConfigError::InvalidValue {
                key: "embedder.batch_size",
                reason: "must be positive".to_string(),
            });
        }
        if self.matcher.topk == 0 {
            return Err(ConfigError::InvalidValue {
                key: "matcher.topk",
                reason: "must be positive".to_string(),
            });
        }
        if !(-1.0..=1.0).contains(&self.matcher.threshold) {
            return Err(ConfigError::InvalidValue {
                key: "matcher.threshold",
                reason: format!("{} outside [-1, 1]", self.matcher.threshold),
            });
        }
        if self.kb.medoid_cap == 0 {
            return Err(ConfigError::InvalidValue {
                key: "kb.medoid_cap",
                reason: "must be positive".to_string(),
            });
        }

        let (lo, hi) = self.eval.unknown_rate_band;
        if !(0.0..=1.0).contains(&lo) || !(0.0..=1.0).contains(&hi) || lo > hi {
            return Err(ConfigError::InvalidValue {
                key: "eval.unknown_rate_band",
                reason: format!("[{lo}, {hi}] is not an ordered range within [0, 1]"),
            });
        }
        Ok(())
    }
}

fn cache() -> &'static RwLock<Option<Arc<Settings>>> {
    static CACHE: OnceLock<RwLock<Option<Arc<Settings>>>> = OnceLock::new();
    CACHE.get_or_init(|| RwLock::new(None))
}

/// Process-wide settings, built with [`Settings::load`] on first use.
///
/// Later calls return the same instance until [`reset_global`].
pub fn global() -> Result<Arc<Settings>, ConfigError> {
    if let Some(settings) = cache().read().as_ref() {
        return Ok(Arc::clone(settings));
    }
    let mut slot = cache().write();
    if let Some(settings) = slot.as_ref() {
        return Ok(Arc::clone(settings));
    }
    let settings = Arc::new(Settings::load(None)?);
    *slot = Some(Arc::clone(&settings));
    Ok(settings)
}

/// Drops the cached settings so the next [`global`] call rebuilds them.
pub fn reset_global() {
    *cache().write() = None;
}
