use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::calibration::percentile;
use crate::hashing::metrics_hash;

pub const METRICS_SCHEMA_VERSION: &str = "0.1";

pub const STAGES: [&str; 4] = ["detect", "track", "embed", "match"];

/// Per-stage mean latency in milliseconds.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StageMeans {
    pub detect: f64,
    pub track: f64,
    pub embed: f64,
    #[serde(rename = "match")]
    pub match_: f64,
    /// Frame time not attributed to a stage.
    pub overhead: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VerifySummary {
    pub called: u64,
    pub accepted: u64,
    pub rejected: u64,
    #[serde(rename = "E_p95")]
    pub e_p95: f64,
    #[serde(rename = "Δ_p95")]
    pub delta_p95: f64,
    pub r_p95: f64,
    pub diversity_min: usize,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OracleSummary {
    pub qsize: usize,
    pub shed_total: u64,
}

/// Aggregated evaluation metrics as written to `metrics.json`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EvalMetrics {
    pub stage_ms: StageMeans,
    pub fps: f64,
    pub p50_ms: f64,
    pub p95_ms: f64,
    pub p99_ms: f64,
    pub slo_budget_ms: f64,
    pub slo_within_budget_pct: f64,
    pub unknown_rate: f64,
    pub kb_size: usize,
    pub backend_selected: String,
    pub sdk_version: String,
    pub verify: VerifySummary,
    pub oracle: OracleSummary,
    pub unknown_rate_band: (f64, f64),
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unknown_rate_violation: Option<bool>,
    pub frames_total: usize,
    pub metrics_schema_version: String,
    #[serde(default)]
    pub metrics_hash: String,
}

impl EvalMetrics {
    /// Hash over every field except `metrics_hash`.
    pub fn compute_hash(&self) -> Result<String, serde_json::Error> {
        let mut value = serde_json::to_value(self)?;
        if let Some(map) = value.as_object_mut() {
            map.remove("metrics_hash");
        }
        Ok(metrics_hash(&value))
    }
}

fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        0.0
    } else {
        values.iter().sum::<f64>() / values.len() as f64
    }
}

/// Inputs to [`metrics_json`] beyond the raw samples.
#[derive(Debug, Clone)]
pub struct MetricsContext<'a> {
    pub kb_size: usize,
    pub backend_selected: &'a str,
    pub sdk_version: &'a str,
    /// Leading samples dropped from every series.
    pub warmup: usize,
    pub slo_budget_ms: f64,
}

/// Summarizes per-frame and per-stage latencies and unknown flags.
///
/// Only latency and rate fields are filled; verify, oracle and guardrail fields keep their
/// defaults for the caller to complete.
pub fn metrics_json(
    per_frame_ms: &[f64],
    per_stage_ms: &BTreeMap<String, Vec<f64>>,
    unknown_flags: &[bool],
    ctx: &MetricsContext<'_>,
) -> EvalMetrics {
    let skip = |n: usize| ctx.warmup.min(n);
    let frames = &per_frame_ms[skip(per_frame_ms.len())..];
    let flags = &unknown_flags[skip(unknown_flags.len())..];
    let stage = |name: &str| -> &[f64] {
        per_stage_ms
            .get(name)
            .map(|v| &v[skip(v.len())..])
            .unwrap_or(&[])
    };

    let overheads: Vec<f64> = frames
        .iter()
        .enumerate()
        .map(|(i, frame_ms)| {
            let attributed: f64 = STAGES
                .iter()
                .map(|s| stage(s).get(i).copied().unwrap_or(0.0))
                .sum();
            frame_ms - attributed
        })
        .collect();

    let mean_frame = mean(frames);
    let fps = if mean_frame > 0.0 {
        1000.0 / mean_frame
    } else {
        0.0
    };
    let slo_within_budget_pct = if frames.is_empty() {
        0.0
    } else {
        let within = frames.iter().filter(|ms| **ms <= ctx.slo_budget_ms).count();
        100.0 * within as f64 / frames.len() as f64
    };
    let unknown_rate = if flags.is_empty() {
        0.0
    } else {
        flags.iter().filter(|f| **f).count() as f64 / flags.len() as f64
    };

    EvalMetrics {
        stage_ms: StageMeans {
            detect: mean(stage("detect")),
            track: mean(stage("track")),
            embed: mean(stage("embed")),
            match_: mean(stage("match")),
            overhead: mean(&overheads),
        },
        fps,
        p50_ms: percentile(frames, 50.0),
        p95_ms: percentile(frames, 95.0),
        p99_ms: percentile(frames, 99.0),
        slo_budget_ms: ctx.slo_budget_ms,
        slo_within_budget_pct,
        unknown_rate,
        kb_size: ctx.kb_size,
        backend_selected: ctx.backend_selected.to_string(),
        sdk_version: ctx.sdk_version.to_string(),
        frames_total: per_frame_ms.len(),
        metrics_schema_version: METRICS_SCHEMA_VERSION.to_string(),
        ..Default::default()
    }
}
