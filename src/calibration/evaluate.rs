use std::fs;
use std::path::Path;

use serde::{Deserialize, Deserializer, Serialize};
use tracing::info;

use super::metrics::{
    ECE_BINS, auroc, brier_score, expected_calibration_error, negative_log_likelihood, percentile,
};
use super::{
    CalibrationError, CalibrationResult, FitOptions, distances_to_logits, fit_temperature, softmax,
    temperature_scale,
};
use crate::hashing::metrics_hash;
use crate::storage::atomic_write_json;
use crate::verify::VerifyCounts;

pub const CALIBRATION_QUERIES_FILE: &str = "calibration_queries.json";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QueryKind {
    /// In-vocabulary query with a ground-truth label index.
    #[default]
    Known,
    /// Synthetic distractor.
    Synth,
    /// Alias distractor.
    Alias,
}

/// One labelled query from `calibration_queries.json`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CalibrationQuery {
    #[serde(default)]
    pub kind: QueryKind,
    /// Distances to the k neighbours, nearest first.
    pub distances: Vec<f64>,
    /// Index into `distances` of the correct neighbour (known queries only).
    #[serde(default)]
    pub label: Option<usize>,
    #[serde(default)]
    pub lookup_ms: Option<f64>,
    #[serde(default)]
    pub oracle_ms: Option<f64>,
    #[serde(default, deserialize_with = "count_or_flag")]
    pub verify_called: u64,
    #[serde(default, deserialize_with = "count_or_flag")]
    pub verify_accepted: u64,
    #[serde(default, deserialize_with = "count_or_flag")]
    pub verify_rejected: u64,
}

/// Accepts `true`/`false` as 1/0 as well as plain counts.
fn count_or_flag<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u64, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum CountOrFlag {
        Flag(bool),
        Count(u64),
    }
    Ok(match CountOrFlag::deserialize(deserializer)? {
        CountOrFlag::Flag(b) => u64::from(b),
        CountOrFlag::Count(n) => n,
    })
}

/// Calibration quality of a shard, content-hashed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CalibrationReport {
    pub temperature: f64,
    pub ece: f64,
    pub nll: f64,
    pub brier: f64,
    pub auroc_synth: f64,
    pub auroc_alias: f64,
    pub auroc_min: f64,
    pub lookup_p95_ms: f64,
    pub lookup_p95_delta: f64,
    pub oracle_p95_ms: f64,
    pub verify: VerifyCounts,
    pub k: usize,
    pub metrics_hash: String,
}

impl CalibrationReport {
    /// Recomputes the hash over every field except `metrics_hash`.
    pub fn compute_hash(&self) -> CalibrationResult<String> {
        let mut value = serde_json::to_value(self)?;
        if let Some(map) = value.as_object_mut() {
            map.remove("metrics_hash");
        }
        Ok(metrics_hash(&value))
    }
}

/// Evaluates `shard_dir/calibration_queries.json` and writes the report to `out_json`.
pub fn evaluate_labelbank_calibration(
    shard_dir: &Path,
    seed: u64,
    k: usize,
    out_json: &Path,
) -> CalibrationResult<CalibrationReport> {
    let path = shard_dir.join(CALIBRATION_QUERIES_FILE);
    if !path.is_file() {
        return Err(CalibrationError::QueriesNotFound { path });
    }
    let queries: Vec<CalibrationQuery> = serde_json::from_str(&fs::read_to_string(&path)?)?;

    let report = evaluate_queries(&queries, seed, k)?;
    atomic_write_json(out_json, &report, true)?;

    info!(
        queries = queries.len(),
        temperature = report.temperature,
        ece = report.ece,
        auroc_min = report.auroc_min,
        metrics_hash = %report.metrics_hash,
        out = %out_json.display(),
        "calibration report written"
    );
    Ok(report)
}

/// Computes the report for in-memory queries.
pub fn evaluate_queries(
    queries: &[CalibrationQuery],
    seed: u64,
    k: usize,
) -> CalibrationResult<CalibrationReport> {
    let mut known_logits = Vec::new();
    let mut known_labels = Vec::new();
    for (record, q) in queries.iter().enumerate() {
        if q.kind != QueryKind::Known {
            continue;
        }
        let label = q.label.ok_or(CalibrationError::MissingLabel { record })?;
        known_logits.push(distances_to_logits(&q.distances));
        known_labels.push(label);
    }

    let t = fit_temperature(&known_logits, &known_labels, &FitOptions::with_seed(seed))?;
    let known_probs: Vec<Vec<f64>> = known_logits
        .iter()
        .map(|l| softmax(&temperature_scale(l, t)))
        .collect();

    let confidence = |kind: QueryKind| -> Vec<f64> {
        queries
            .iter()
            .filter(|q| q.kind == kind)
            .map(|q| {
                softmax(&temperature_scale(&distances_to_logits(&q.distances), t))
                    .into_iter()
                    .fold(0.0, f64::max)
            })
            .collect()
    };
    let known_scores = confidence(QueryKind::Known);
    let synth_scores = confidence(QueryKind::Synth);
    let alias_scores = confidence(QueryKind::Alias);

    let auroc_synth = if synth_scores.is_empty() {
        1.0
    } else {
        auroc(&known_scores, &synth_scores)
    };
    let auroc_alias = if alias_scores.is_empty() {
        auroc_synth
    } else {
        auroc(&known_scores, &alias_scores)
    };

    let lookup: Vec<f64> = queries.iter().map(|q| q.lookup_ms.unwrap_or(0.0)).collect();
    let oracle: Vec<f64> = queries.iter().map(|q| q.oracle_ms.unwrap_or(0.0)).collect();

    let verify = VerifyCounts {
        called: queries.iter().map(|q| q.verify_called).sum(),
        accepted: queries.iter().map(|q| q.verify_accepted).sum(),
        rejected: queries.iter().map(|q| q.verify_rejected).sum(),
        known_wrong_after_verify: 0,
    };

    let mut report = CalibrationReport {
        temperature: t,
        ece: expected_calibration_error(&known_probs, &known_labels, ECE_BINS),
        nll: negative_log_likelihood(&known_probs, &known_labels),
        brier: brier_score(&known_probs, &known_labels),
        auroc_synth,
        auroc_alias,
        auroc_min: auroc_synth.min(auroc_alias),
        lookup_p95_ms: percentile(&lookup, 95.0),
        lookup_p95_delta: 0.0,
        oracle_p95_ms: percentile(&oracle, 95.0),
        verify,
        k,
        metrics_hash: String::new(),
    };
    report.metrics_hash = report.compute_hash()?;
    Ok(report)
}
