//! Candidate verification against a static gallery manifest.
//!
//! A candidate label is accepted when the gallery holds enough rows for it, from enough
//! distinct sources, relative to thresholds calibrated from the same gallery.
//!
//! # Decision rule
//!
//! With `r` the candidate's row count, `diversity` its distinct sources and `max_other` the
//! largest count among other labels:
//!
//! - `E = r`, `D = r - max_other`
//! - reject when `r <= sprt.reject` or `diversity < diversity_min`
//! - otherwise accept iff `E >= sprt.accept`

mod calibrate;
mod error;
mod manifest;


pub use calibrate::{CalibrationArtifact, Quantiles, SprtThresholds, calibrate_thresholds};
pub use error::{VerifyError, VerifyResult};
pub use manifest::{GalleryManifest, GalleryRow};

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::debug;

use crate::ledger::EvidenceLedger;

/// Verify call counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerifyCounts {
    pub called: u64,
    pub accepted: u64,
    pub rejected: u64,
    pub known_wrong_after_verify: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VerifyOutcome {
    pub accepted: bool,
    pub evidence_path: String,
    #[serde(rename = "E")]
    pub e: f64,
    #[serde(rename = "D")]
    pub d: f64,
    pub r: usize,
    pub diversity: usize,
}

pub trait VerifyWorker: Send + Sync {
    fn verify(&self, embedding: &[f32], candidate_label: &str) -> VerifyResult<VerifyOutcome>;

    fn metrics_snapshot(&self) -> VerifyCounts;
}

#[derive(Debug)]
struct Gallery {
    counts: BTreeMap<String, usize>,
    sources: BTreeMap<String, BTreeSet<String>>,
    calibration: CalibrationArtifact,
}

impl Gallery {
    fn from_parts(manifest: &GalleryManifest, calibration: CalibrationArtifact) -> Self {
        let counts = manifest
            .label_counts()
            .into_iter()
            .map(|(k, v)| (k.to_owned(), v))
            .collect();
        let sources = manifest
            .label_sources()
            .into_iter()
            .map(|(k, v)| (k.to_owned(), v.into_iter().map(str::to_owned).collect()))
            .collect();
        Self {
            counts,
            sources,
            calibration,
        }
    }

    fn evaluate(&self, label: &str, evidence_path: String) -> VerifyOutcome {
        let r = self.counts.get(label).copied().unwrap_or(0);
        let diversity = self.sources.get(label).map_or(0, BTreeSet::len);
        let max_other = self
            .counts
            .iter()
            .filter(|(other, _)| other.as_str() != label)
            .map(|(_, &c)| c)
            .max()
            .unwrap_or(0);

        let e = r as f64;
        let d = r as f64 - max_other as f64;
        let sprt = self.calibration.sprt;

        let accepted = if r as f64 <= sprt.reject || diversity < self.calibration.diversity_min {
            false
        } else {
            e >= sprt.accept
        };
        VerifyOutcome {
            accepted,
            evidence_path,
            e,
            d,
            r,
            diversity,
        }
    }
}

/// [`VerifyWorker`] backed by a gallery manifest and a calibration artifact on disk.
///
/// Both files are read on the first call and memoized; a missing file surfaces then.
pub struct ManifestVerifyWorker {
    manifest_path: PathBuf,
    calibration_path: PathBuf,
    ledger: Option<Arc<dyn EvidenceLedger>>,
    gallery: Mutex<Option<Arc<Gallery>>>,
    called: AtomicU64,
    accepted: AtomicU64,
    rejected: AtomicU64,
}

impl ManifestVerifyWorker {
    pub fn new(manifest_path: impl Into<PathBuf>, calibration_path: impl Into<PathBuf>) -> Self {
        Self {
            manifest_path: manifest_path.into(),
            calibration_path: calibration_path.into(),
            ledger: None,
            gallery: Mutex::new(None),
            called: AtomicU64::new(0),
            accepted: AtomicU64::new(0),
            rejected: AtomicU64::new(0),
        }
    }

    /// Records every decision in `ledger`.
    pub fn with_ledger(mut self, ledger: Arc<dyn EvidenceLedger>) -> Self {
        self.ledger = Some(ledger);
        self
    }

    pub fn manifest_path(&self) -> &Path {
        &self.manifest_path
    }

    /// Row count of the manifest and its first row, loading it if needed.
    pub fn load_manifest(&self) -> VerifyResult<(usize, Option<GalleryRow>)> {
        let manifest = GalleryManifest::load(&self.manifest_path)?;
        Ok((manifest.len(), manifest.rows().first().cloned()))
    }

    fn gallery(&self) -> VerifyResult<Arc<Gallery>> {
        let mut slot = self.gallery.lock();
        if let Some(gallery) = slot.as_ref() {
            return Ok(Arc::clone(gallery));
        }
        let manifest = GalleryManifest::load(&self.manifest_path)?;
        let calibration = CalibrationArtifact::load(&self.calibration_path)?;
        let gallery = Arc::new(Gallery::from_parts(&manifest, calibration));
        debug!(
            manifest = %self.manifest_path.display(),
            rows = manifest.len(),
            labels = gallery.counts.len(),
            "verify gallery loaded"
        );
        *slot = Some(Arc::clone(&gallery));
        Ok(gallery)
    }

    fn evidence_path(&self) -> String {
        self.ledger
            .as_ref()
            .and_then(|l| l.location())
            .unwrap_or(self.manifest_path.as_path())
            .display()
            .to_string()
    }
}

impl VerifyWorker for ManifestVerifyWorker {
    fn verify(&self, _embedding: &[f32], candidate_label: &str) -> VerifyResult<VerifyOutcome> {
        let gallery = self.gallery()?;
        let outcome = gallery.evaluate(candidate_label, self.evidence_path());

        self.called.fetch_add(1, Ordering::Relaxed);
        if outcome.accepted {
            self.accepted.fetch_add(1, Ordering::Relaxed);
        } else {
            self.rejected.fetch_add(1, Ordering::Relaxed);
        }

        if let Some(ledger) = &self.ledger {
            ledger.append(&json!({
                "label": candidate_label,
                "accepted": outcome.accepted,
                "E": outcome.e,
                "D": outcome.d,
                "r": outcome.r,
                "diversity": outcome.diversity,
            }))?;
        }

        debug!(
            label = candidate_label,
            accepted = outcome.accepted,
            r = outcome.r,
            diversity = outcome.diversity,
            "verify decision"
        );
        Ok(outcome)
    }

    fn metrics_snapshot(&self) -> VerifyCounts {
        VerifyCounts {
            called: self.called.load(Ordering::Relaxed),
            accepted: self.accepted.load(Ordering::Relaxed),
            rejected: self.rejected.load(Ordering::Relaxed),
            known_wrong_after_verify: 0,
        }
    }
}
