//! Distance-to-probability calibration.
//!
//! Raw nearest-neighbour distances become logits (`-d`), are divided by a single scalar
//! temperature `T ∈ [0.5, 5.0]` and pushed through a softmax. `T` is fit on held-out labelled
//! queries by golden-section search over `log T ∈ [-3, 3]` minimizing mean negative
//! log-likelihood.

mod error;
/// Offline evaluation of a shard's calibration queries.
pub mod evaluate;
/// ECE, Brier, NLL, AUROC and percentile helpers.
pub mod metrics;


pub use error::{CalibrationError, CalibrationResult};
pub use evaluate::{
    CALIBRATION_QUERIES_FILE, CalibrationQuery, CalibrationReport, QueryKind,
    evaluate_labelbank_calibration, evaluate_queries,
};
pub use metrics::{
    ECE_BINS, auroc, brier_score, expected_calibration_error, negative_log_likelihood, percentile,
};

use rand::SeedableRng;
use rand::seq::SliceRandom;
use rand_chacha::ChaCha8Rng;
use tracing::debug;

use crate::constants::{T_MAX, T_MIN};

const LOG_T_LO: f64 = -3.0;
const LOG_T_HI: f64 = 3.0;
const TEMPERATURE_EPS: f64 = 1e-12;
const SOFTMAX_SUM_FLOOR: f64 = 1e-12;

/// `-d`, with non-finite results replaced by `0.0`.
pub fn distances_to_logits(distances: &[f64]) -> Vec<f64> {
    distances
        .iter()
        .map(|d| {
            let logit = -d;
            if logit.is_finite() { logit } else { 0.0 }
        })
        .collect()
}

/// Clamps `t` to `[T_MIN, T_MAX]`.
#[inline]
pub fn clamp_temperature(t: f64) -> f64 {
    if t.is_nan() {
        return T_MIN;
    }
    t.clamp(T_MIN, T_MAX)
}

/// `logits / clamp(T)`.
pub fn temperature_scale(logits: &[f64], t: f64) -> Vec<f64> {
    let t = clamp_temperature(t).max(TEMPERATURE_EPS);
    logits.iter().map(|x| x / t).collect()
}

/// Numerically stable softmax of one row.
pub fn softmax(logits: &[f64]) -> Vec<f64> {
    let Some(max) = logits.iter().copied().reduce(f64::max) else {
        return Vec::new();
    };
    let exp: Vec<f64> = logits.iter().map(|x| (x - max).exp()).collect();
    let sum = exp.iter().sum::<f64>().max(SOFTMAX_SUM_FLOOR);
    exp.into_iter().map(|e| e / sum).collect()
}

/// Row-wise [`softmax`].
pub fn softmax_rows<R: AsRef<[f64]>>(rows: &[R]) -> Vec<Vec<f64>> {
    rows.iter().map(|r| softmax(r.as_ref())).collect()
}

/// Fraction of `true` flags; `0.0` for no flags.
pub fn unknown_rate_guard(flags: &[bool]) -> f64 {
    if flags.is_empty() {
        return 0.0;
    }
    flags.iter().filter(|f| **f).count() as f64 / flags.len() as f64
}

/// Options for [`fit_temperature`].
#[derive(Debug, Clone, Copy)]
pub struct FitOptions {
    pub max_iter: usize,
    /// Shuffles sample order only; the optimum does not depend on it.
    pub seed: u64,
    /// Stop once the bracket in log-space is narrower than this.
    pub tolerance: f64,
}

impl Default for FitOptions {
    fn default() -> Self {
        Self {
            max_iter: 50,
            seed: 123,
            tolerance: 1e-4,
        }
    }
}

impl FitOptions {
    pub fn with_seed(seed: u64) -> Self {
        Self {
            seed,
            ..Default::default()
        }
    }
}

/// Fits the temperature minimizing mean NLL of `labels` under `softmax(logits / T)`.
///
/// The result always lies in `[0.5, 5.0]`.
pub fn fit_temperature<R: AsRef<[f64]>>(
    logits: &[R],
    labels: &[usize],
    opts: &FitOptions,
) -> CalibrationResult<f64> {
    if logits.is_empty() {
        return Err(CalibrationError::EmptyInput);
    }
    if logits.len() != labels.len() {
        return Err(CalibrationError::LengthMismatch {
            logits: logits.len(),
            labels: labels.len(),
        });
    }
    let width = logits[0].as_ref().len();
    for (row, (l, &label)) in logits.iter().zip(labels).enumerate() {
        let classes = l.as_ref().len();
        if classes == 0 {
            return Err(CalibrationError::EmptyRow { row });
        }
        if classes != width {
            return Err(CalibrationError::RaggedRows {
                row,
                expected: width,
                actual: classes,
            });
        }
        if label >= classes {
            return Err(CalibrationError::LabelOutOfRange {
                row,
                label,
                classes,
            });
        }
    }

    let mut order: Vec<usize> = (0..logits.len()).collect();
    let mut rng = ChaCha8Rng::seed_from_u64(opts.seed);
    order.shuffle(&mut rng);
    let samples: Vec<(&[f64], usize)> = order
        .iter()
        .map(|&i| (logits[i].as_ref(), labels[i]))
        .collect();

    let objective = |log_t: f64| mean_nll(&samples, log_t.exp());

    let inv_phi = (5f64.sqrt() - 1.0) / 2.0;
    let (mut a, mut b) = (LOG_T_LO, LOG_T_HI);
    let mut c = b - inv_phi * (b - a);
    let mut d = a + inv_phi * (b - a);
    let mut fc = objective(c);
    let mut fd = objective(d);

    let mut iterations = 0;
    while iterations < opts.max_iter && (b - a).abs() >= opts.tolerance {
        if fc < fd {
            b = d;
            d = c;
            fd = fc;
            c = b - inv_phi * (b - a);
            fc = objective(c);
        } else {
            a = c;
            c = d;
            fc = fd;
            d = a + inv_phi * (b - a);
            fd = objective(d);
        }
        iterations += 1;
    }

    let raw = ((a + b) / 2.0).exp();
    if !raw.is_finite() || raw <= 0.0 {
        return Err(CalibrationError::InvalidTemperature { value: raw });
    }
    let t = raw.clamp(T_MIN, T_MAX);
    debug!(
        samples = samples.len(),
        iterations,
        raw_temperature = raw,
        temperature = t,
        "fit temperature"
    );
    Ok(t)
}

fn mean_nll(samples: &[(&[f64], usize)], t: f64) -> f64 {
    let total: f64 = samples
        .iter()
        .map(|(row, label)| {
            // Unclamped so the objective stays strictly shaped over the whole bracket.
            let scaled: Vec<f64> = row.iter().map(|x| x / t).collect();
            let max = scaled.iter().copied().fold(f64::NEG_INFINITY, f64::max);
            let lse = max + scaled.iter().map(|x| (x - max).exp()).sum::<f64>().ln();
            lse - scaled[*label]
        })
        .sum();
    total / samples.len() as f64
}
