//! Offline evaluation over a directory of frames.
//!
//! [`run_eval`] drives [`DetectTrackEmbedPipeline`] with the deterministic stub components,
//! verifies queued unknowns when a gallery is available, applies latency and unknown-rate
//! guardrails and writes a content-hashed `metrics.json`.

pub mod components;
mod error;
pub mod metrics;
mod pipeline;

#[cfg(test)]
mod tests;

pub use components::{
    BBox, Detector, Embedder, FakeDetector, Frame, HashEmbedder, SimpleTracker, Track, Tracker,
};
pub use error::{EvalError, EvalResult};
pub use metrics::{
    EvalMetrics, MetricsContext, OracleSummary, StageMeans, VerifySummary, metrics_json,
};
pub use pipeline::{DetectTrackEmbedPipeline, EvalCounters, TrackMatch};

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{info, warn};

use crate::calibration::percentile;
use crate::config::Settings;
use crate::label_bank::LabelBank;
use crate::ledger::JsonLedger;
use crate::oracle::{CandidateOracle, InMemoryCandidateOracle};
use crate::storage::atomic_write_json;
use crate::verify::{ManifestVerifyWorker, VerifyWorker};

pub const METRICS_FILE: &str = "metrics.json";

/// Candidate label verified when an unknown carries no proposal.
pub const UNKNOWN_LABEL: &str = "__unknown__";

/// Exit code reported when a guardrail trips.
pub const GUARDRAIL_EXIT_CODE: i32 = 2;

const FRAME_EXTENSIONS: [&str; 4] = ["jpg", "jpeg", "png", "bmp"];

#[derive(Debug, Clone, PartialEq)]
pub struct EvalOutcome {
    pub metrics: EvalMetrics,
    pub metrics_path: PathBuf,
    /// `0` when every guardrail holds, [`GUARDRAIL_EXIT_CODE`] otherwise.
    pub exit_code: i32,
}

/// Image files directly under `dir`, sorted by path. Extensions match case-insensitively.
pub fn discover_frames(dir: &Path) -> EvalResult<Vec<PathBuf>> {
    if !dir.is_dir() {
        return Err(EvalError::InputNotFound {
            path: dir.to_path_buf(),
        });
    }
    let entries = fs::read_dir(dir).map_err(|source| EvalError::Io {
        path: dir.to_path_buf(),
        source,
    })?;

    let mut frames = Vec::new();
    for entry in entries {
        let path = entry
            .map_err(|source| EvalError::Io {
                path: dir.to_path_buf(),
                source,
            })?
            .path();
        let is_frame = path.is_file()
            && path
                .extension()
                .and_then(|e| e.to_str())
                .is_some_and(|e| FRAME_EXTENSIONS.contains(&e.to_ascii_lowercase().as_str()));
        if is_frame {
            frames.push(path);
        }
    }
    frames.sort();
    Ok(frames)
}

/// Runs the pipeline over every frame in `input_dir` and writes `output_dir/metrics.json`.
///
/// The metrics file is written whether or not a guardrail trips; violations only change
/// [`EvalOutcome::exit_code`].
pub fn run_eval(
    input_dir: &Path,
    output_dir: &Path,
    settings: &Settings,
    bank: Arc<dyn LabelBank>,
) -> EvalResult<EvalOutcome> {
    let frames = discover_frames(input_dir)?;

    if settings.embedder.dim != bank.dim() {
        warn!(
            embedder_dim = settings.embedder.dim,
            bank_dim = bank.dim(),
            "embedder dim differs from the label bank, projecting"
        );
    }
    let embedder = HashEmbedder::new(settings.embedder.dim, settings.label_bank.seed)
        .with_normalize(settings.embedder.normalize);
    let oracle = Arc::new(InMemoryCandidateOracle::new(settings.oracle.maxlen));
    let mut pipeline = DetectTrackEmbedPipeline::new(
        Box::new(FakeDetector::default()),
        Box::new(SimpleTracker::default()),
        Box::new(embedder),
        Arc::clone(&bank),
        Arc::clone(&oracle) as Arc<dyn CandidateOracle>,
        settings.matcher.clone(),
    );

    info!(
        frames = frames.len(),
        input = %input_dir.display(),
        backend = bank.backend_name(),
        kb_size = bank.len(),
        "evaluation started"
    );
    for (index, path) in frames.iter().enumerate() {
        let bytes = fs::read(path).map_err(|source| EvalError::Io {
            path: path.clone(),
            source,
        })?;
        pipeline.process(&Frame::new(index, path, bytes))?;
    }

    let kb_size = pipeline.kb_size();
    let backend = pipeline.backend_selected();
    let counters = pipeline.into_counters();
    let budget_ms = settings.latency.budget_ms as f64;
    let mut metrics = metrics_json(
        &counters.per_frame_ms,
        &counters.per_stage_ms,
        &counters.unknown_flags,
        &MetricsContext {
            kb_size,
            backend_selected: backend,
            sdk_version: env!("CARGO_PKG_VERSION"),
            warmup: settings.eval.warmup,
            slo_budget_ms: budget_ms,
        },
    );

    metrics.oracle = OracleSummary {
        qsize: oracle.qsize(),
        shed_total: oracle.shed_total(),
    };
    metrics.verify = drain_and_verify(oracle.as_ref(), settings)?;

    let (band_min, band_max) = settings.eval.unknown_rate_band;
    metrics.unknown_rate_band = (band_min, band_max);
    let mut exit_code = 0;
    if metrics.p95_ms > budget_ms {
        warn!(
            p95_ms = metrics.p95_ms,
            budget_ms,
            "p95 latency over budget"
        );
        exit_code = GUARDRAIL_EXIT_CODE;
    }
    if !(band_min..=band_max).contains(&metrics.unknown_rate) {
        warn!(
            unknown_rate = metrics.unknown_rate,
            band_min,
            band_max,
            "unknown rate outside band"
        );
        metrics.unknown_rate_violation = Some(true);
        exit_code = GUARDRAIL_EXIT_CODE;
    }

    metrics.metrics_hash = metrics.compute_hash()?;
    let metrics_path = output_dir.join(METRICS_FILE);
    atomic_write_json(&metrics_path, &metrics, true)?;

    info!(
        path = %metrics_path.display(),
        frames = metrics.frames_total,
        p95_ms = metrics.p95_ms,
        unknown_rate = metrics.unknown_rate,
        exit_code,
        "evaluation finished"
    );
    Ok(EvalOutcome {
        metrics,
        metrics_path,
        exit_code,
    })
}

/// Pops every queued unknown and verifies its first candidate label.
///
/// Without both the gallery manifest and its calibration the queue is left as is and the
/// summary stays zeroed.
fn drain_and_verify(
    oracle: &dyn CandidateOracle,
    settings: &Settings,
) -> EvalResult<VerifySummary> {
    let verify = &settings.verify;
    if !verify.manifest_path.is_file() || !verify.calibration_path.is_file() {
        info!(
            manifest = %verify.manifest_path.display(),
            "verify gallery unavailable, skipping"
        );
        return Ok(VerifySummary::default());
    }

    let mut worker = ManifestVerifyWorker::new(&verify.manifest_path, &verify.calibration_path);
    if let Some(ledger_path) = &verify.ledger_path {
        worker = worker.with_ledger(Arc::new(JsonLedger::new(ledger_path)));
    }

    let mut e_vals = Vec::new();
    let mut d_vals = Vec::new();
    let mut r_vals = Vec::new();
    let mut diversity_min: Option<usize> = None;
    while let Some(record) = oracle.next() {
        let label = record
            .candidate_labels()
            .into_iter()
            .next()
            .unwrap_or_else(|| UNKNOWN_LABEL.to_owned());
        let outcome = worker.verify(&record.embedding, &label)?;
        e_vals.push(outcome.e);
        d_vals.push(outcome.d);
        r_vals.push(outcome.r as f64);
        let floor = diversity_min.map_or(outcome.diversity, |m| m.min(outcome.diversity));
        diversity_min = Some(floor);
    }

    let counts = worker.metrics_snapshot();
    Ok(VerifySummary {
        called: counts.called,
        accepted: counts.accepted,
        rejected: counts.rejected,
        e_p95: percentile(&e_vals, 95.0),
        delta_p95: percentile(&d_vals, 95.0),
        r_p95: percentile(&r_vals, 95.0),
        diversity_min: diversity_min.unwrap_or(0),
    })
}
