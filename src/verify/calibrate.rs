use std::fs;
use std::path::Path;

use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::info;

use super::error::{VerifyError, VerifyResult};
use super::manifest::GalleryManifest;
use crate::calibration::percentile;
use crate::hashing::metrics_hash;
use crate::storage::atomic_write_json;

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Quantiles {
    pub p5: f64,
    pub p50: f64,
    pub p95: f64,
}

impl Quantiles {
    pub fn of(values: &[f64]) -> Self {
        Self {
            p5: percentile(values, 5.0),
            p50: percentile(values, 50.0),
            p95: percentile(values, 95.0),
        }
    }
}

/// Accept/reject thresholds on the evidence count.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct SprtThresholds {
    pub accept: f64,
    pub reject: f64,
}

/// Verify thresholds derived from a gallery manifest.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CalibrationArtifact {
    #[serde(rename = "E_q", default)]
    pub e_q: Quantiles,
    #[serde(rename = "Δ_q", default)]
    pub delta_q: Quantiles,
    #[serde(default)]
    pub r_q: Quantiles,
    #[serde(default)]
    pub diversity_min: usize,
    pub sprt: SprtThresholds,
    #[serde(default)]
    pub seed: u64,
    #[serde(default)]
    pub created_utc: String,
    #[serde(default)]
    pub calibration_hash: String,
}

impl CalibrationArtifact {
    /// Hash over the threshold fields and seed; the timestamp is excluded.
    pub fn compute_hash(&self) -> VerifyResult<String> {
        let core = json!({
            "E_q": self.e_q,
            "Δ_q": self.delta_q,
            "r_q": self.r_q,
            "diversity_min": self.diversity_min,
            "sprt": self.sprt,
            "seed": self.seed,
        });
        Ok(metrics_hash(&core))
    }

    pub fn load(path: &Path) -> VerifyResult<Self> {
        if !path.is_file() {
            return Err(VerifyError::CalibrationNotFound {
                path: path.to_path_buf(),
            });
        }
        Ok(serde_json::from_str(&fs::read_to_string(path)?)?)
    }

    pub fn write(&self, path: &Path) -> VerifyResult<()> {
        atomic_write_json(path, self, true)?;
        info!(
            path = %path.display(),
            calibration_hash = %self.calibration_hash,
            "verify calibration written"
        );
        Ok(())
    }
}

/// Derives thresholds from per-label evidence counts.
///
/// Per label: `r` rows, `E = r`, `Δ = r - max(other labels)`. The accept threshold is the
/// median `r`; the reject threshold is `0`.
pub fn calibrate_thresholds(
    manifest: &GalleryManifest,
    seed: u64,
) -> VerifyResult<CalibrationArtifact> {
    let counts = manifest.label_counts();
    let r_vals: Vec<f64> = counts.values().map(|&c| c as f64).collect();
    let deltas: Vec<f64> = counts
        .iter()
        .map(|(label, &r)| {
            let max_other = counts
                .iter()
                .filter(|(other, _)| *other != label)
                .map(|(_, &c)| c)
                .max()
                .unwrap_or(0);
            r as f64 - max_other as f64
        })
        .collect();
    let diversity_min = manifest
        .label_sources()
        .values()
        .map(|s| s.len())
        .min()
        .unwrap_or(0);

    let mut artifact = CalibrationArtifact {
        e_q: Quantiles::of(&r_vals),
        delta_q: Quantiles::of(&deltas),
        r_q: Quantiles::of(&r_vals),
        diversity_min,
        sprt: SprtThresholds {
            accept: percentile(&r_vals, 50.0),
            reject: 0.0,
        },
        seed,
        created_utc: Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true),
        calibration_hash: String::new(),
    };
    artifact.calibration_hash = artifact.compute_hash()?;
    Ok(artifact)
}
