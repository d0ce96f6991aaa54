use std::cmp::Ordering;

/// Equal-width confidence bins used for ECE.
pub const ECE_BINS: usize = 15;

const PROB_FLOOR: f64 = 1e-12;

fn argmax(row: &[f64]) -> usize {
    let mut best = 0;
    for (i, p) in row.iter().enumerate() {
        if *p > row[best] {
            best = i;
        }
    }
    best
}

/// Expected calibration error over `n_bins` equal-width bins of max-probability.
///
/// Bins are half-open `[lo, hi)` except the last, which also takes confidence `1.0`.
pub fn expected_calibration_error<R: AsRef<[f64]>>(
    probs: &[R],
    labels: &[usize],
    n_bins: usize,
) -> f64 {
    let n = probs.len().min(labels.len());
    if n == 0 || n_bins == 0 {
        return 0.0;
    }

    let mut conf_sum = vec![0.0f64; n_bins];
    let mut correct = vec![0usize; n_bins];
    let mut count = vec![0usize; n_bins];

    for (row, &label) in probs.iter().zip(labels).take(n) {
        let row = row.as_ref();
        if row.is_empty() {
            continue;
        }
        let pred = argmax(row);
        let conf = row[pred];
        let bin = ((conf * n_bins as f64).floor() as usize).min(n_bins - 1);
        conf_sum[bin] += conf;
        count[bin] += 1;
        if pred == label {
            correct[bin] += 1;
        }
    }

    (0..n_bins)
        .filter(|&b| count[b] > 0)
        .map(|b| {
            let c = count[b] as f64;
            let weight = c / n as f64;
            weight * (conf_sum[b] / c - correct[b] as f64 / c).abs()
        })
        .sum()
}

/// Mean over rows of the squared error against the one-hot label.
pub fn brier_score<R: AsRef<[f64]>>(probs: &[R], labels: &[usize]) -> f64 {
    let n = probs.len().min(labels.len());
    if n == 0 {
        return 0.0;
    }
    let total: f64 = probs
        .iter()
        .zip(labels)
        .map(|(row, &label)| {
            row.as_ref()
                .iter()
                .enumerate()
                .map(|(j, p)| {
                    let target = if j == label { 1.0 } else { 0.0 };
                    (p - target).powi(2)
                })
                .sum::<f64>()
        })
        .sum();
    total / n as f64
}

/// Mean `-ln p(label)` with probabilities floored at `1e-12`.
pub fn negative_log_likelihood<R: AsRef<[f64]>>(probs: &[R], labels: &[usize]) -> f64 {
    let n = probs.len().min(labels.len());
    if n == 0 {
        return 0.0;
    }
    let total: f64 = probs
        .iter()
        .zip(labels)
        .map(|(row, &label)| {
            let p = row.as_ref().get(label).copied().unwrap_or(0.0);
            -p.clamp(PROB_FLOOR, 1.0).ln()
        })
        .sum();
    total / n as f64
}

/// Area under the ROC curve separating `positives` (higher is better) from `negatives`.
///
/// Trapezoidal integration over the score-sorted cumulative confusion counts, one ROC point
/// per distinct score. Returns `0.0` when either side is empty.
pub fn auroc(positives: &[f64], negatives: &[f64]) -> f64 {
    if positives.is_empty() || negatives.is_empty() {
        return 0.0;
    }

    let mut scored: Vec<(f64, bool)> = positives
        .iter()
        .map(|s| (*s, true))
        .chain(negatives.iter().map(|s| (*s, false)))
        .collect();
    scored.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(Ordering::Equal));

    let p_total = positives.len() as f64;
    let n_total = negatives.len() as f64;
    let (mut tp, mut fp) = (0.0f64, 0.0f64);
    let (mut prev_tpr, mut prev_fpr) = (0.0f64, 0.0f64);
    let mut area = 0.0;

    let mut i = 0;
    while i < scored.len() {
        let score = scored[i].0;
        while i < scored.len() && scored[i].0 == score {
            if scored[i].1 {
                tp += 1.0;
            } else {
                fp += 1.0;
            }
            i += 1;
        }
        let tpr = tp / p_total;
        let fpr = fp / n_total;
        area += (fpr - prev_fpr) * (tpr + prev_tpr) / 2.0;
        prev_tpr = tpr;
        prev_fpr = fpr;
    }
    area
}

/// Linear-interpolated percentile (`q` in `[0, 100]`); `0.0` for no values.
pub fn percentile(values: &[f64], q: f64) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(Ordering::Equal));

    let rank = (sorted.len() - 1) as f64 * (q.clamp(0.0, 100.0) / 100.0);
    let lo = rank.floor() as usize;
    let hi = (lo + 1).min(sorted.len() - 1);
    if lo == hi {
        return sorted[lo];
    }
    sorted[lo] * (hi as f64 - rank) + sorted[hi] * (rank - lo as f64)
}
