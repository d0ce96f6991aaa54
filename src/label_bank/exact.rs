use std::cmp::Ordering;

use super::{BackendKind, Candidate, SimilarityIndex};
use crate::embedding::dot;

/// Brute-force inner-product index.
#[derive(Debug, Clone, Default)]
pub struct ExactIndex {
    rows: Vec<Vec<f32>>,
}

impl ExactIndex {
    pub fn new() -> Self {
        Self::default()
    }
}

impl SimilarityIndex for ExactIndex {
    fn add(&mut self, rows: &[Vec<f32>]) {
        self.rows.extend_from_slice(rows);
    }

    fn search(&self, query: &[f32], k: usize) -> Vec<Candidate> {
        scan(&self.rows, query, k)
    }

    fn len(&self) -> usize {
        self.rows.len()
    }

    fn rows(&self) -> &[Vec<f32>] {
        &self.rows
    }

    fn backend(&self) -> BackendKind {
        BackendKind::Exact
    }
}

/// Scores every row and keeps those at or above the k-th best score.
pub(super) fn scan(rows: &[Vec<f32>], query: &[f32], k: usize) -> Vec<Candidate> {
    if k == 0 || rows.is_empty() {
        return Vec::new();
    }

    let mut scored: Vec<Candidate> = rows
        .iter()
        .enumerate()
        .map(|(row, v)| Candidate {
            row,
            score: dot(v, query),
        })
        .collect();

    if k >= scored.len() {
        return scored;
    }

    let by_score_desc =
        |a: &Candidate, b: &Candidate| b.score.partial_cmp(&a.score).unwrap_or(Ordering::Equal);
    scored.select_nth_unstable_by(k - 1, by_score_desc);
    let kth = scored[k - 1].score;
    // Keep boundary ties so the label tie-break sees all of them.
    scored.retain(|c| c.score >= kth);
    scored
}
