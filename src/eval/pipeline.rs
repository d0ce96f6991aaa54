use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;

use serde_json::{Map, Value, json};
use tracing::debug;

use super::components::{Detector, Embedder, Frame, Track, Tracker};
use super::error::{EvalError, EvalResult};
use super::metrics::STAGES;
use crate::config::MatcherSettings;
use crate::constants::validate_embedding_dim;
use crate::embedding::{Embedding, project_embedding};
use crate::label_bank::{LabelBank, TopK};
use crate::oracle::CandidateOracle;

/// Match result for one track in one frame.
#[derive(Debug, Clone)]
pub struct TrackMatch {
    pub track: Track,
    pub embedding: Embedding,
    pub neighbors: TopK,
    pub is_unknown: bool,
}

/// Latency and unknown-rate samples gathered across [`DetectTrackEmbedPipeline::process`] calls.
#[derive(Debug, Clone, Default)]
pub struct EvalCounters {
    pub per_frame_ms: Vec<f64>,
    pub per_stage_ms: BTreeMap<String, Vec<f64>>,
    pub unknown_flags: Vec<bool>,
}

impl EvalCounters {
    fn push_stage(&mut self, stage: &str, ms: f64) {
        self.per_stage_ms
            .entry(stage.to_owned())
            .or_default()
            .push(ms);
    }
}

fn elapsed_ms(start: Instant) -> f64 {
    start.elapsed().as_secs_f64() * 1000.0
}

/// Detect, track, embed and match each frame against a label bank.
///
/// Tracks with fewer than `min_neighbors` scores at or above `threshold` are unknown and
/// handed to the candidate oracle. Embeddings are trimmed or zero-padded to the bank's
/// dimension before lookup.
pub struct DetectTrackEmbedPipeline {
    detector: Box<dyn Detector>,
    tracker: Box<dyn Tracker>,
    embedder: Box<dyn Embedder>,
    bank: Arc<dyn LabelBank>,
    oracle: Arc<dyn CandidateOracle>,
    matcher: MatcherSettings,
    counters: EvalCounters,
}

impl DetectTrackEmbedPipeline {
    pub fn new(
        detector: Box<dyn Detector>,
        tracker: Box<dyn Tracker>,
        embedder: Box<dyn Embedder>,
        bank: Arc<dyn LabelBank>,
        oracle: Arc<dyn CandidateOracle>,
        matcher: MatcherSettings,
    ) -> Self {
        Self {
            detector,
            tracker,
            embedder,
            bank,
            oracle,
            matcher,
            counters: EvalCounters::default(),
        }
    }

    pub fn process(&mut self, frame: &Frame) -> EvalResult<Vec<TrackMatch>> {
        let frame_start = Instant::now();

        let start = Instant::now();
        let detections = self.detector.detect(frame);
        let detect_ms = elapsed_ms(start);

        let start = Instant::now();
        let tracks = self.tracker.update(&detections);
        let track_ms = elapsed_ms(start);

        let start = Instant::now();
        let embeddings = self.embedder.encode(frame, &tracks)?;
        let embed_ms = elapsed_ms(start);
        if embeddings.len() != tracks.len() {
            return Err(EvalError::EmbeddingCount {
                expected: tracks.len(),
                got: embeddings.len(),
            });
        }

        let start = Instant::now();
        let bank_dim = self.bank.dim();
        let mut results = Vec::with_capacity(tracks.len());
        for (track, embedding) in tracks.into_iter().zip(embeddings) {
            validate_embedding_dim(embedding.as_slice(), self.embedder.dim())?;
            let query = if embedding.dim() == bank_dim {
                embedding.as_slice().to_vec()
            } else {
                project_embedding(embedding.as_slice(), bank_dim)
            };
            let neighbors = self
                .bank
                .lookup_vecs(std::slice::from_ref(&query), self.matcher.topk)?;
            let above = neighbors
                .scores
                .iter()
                .filter(|s| **s >= self.matcher.threshold)
                .count();
            let is_unknown = above < self.matcher.min_neighbors;
            if is_unknown {
                let context = unknown_context(frame, &track, &neighbors);
                self.oracle.enqueue_unknown(query, context);
            }
            results.push(TrackMatch {
                track,
                embedding,
                neighbors,
                is_unknown,
            });
        }
        let match_ms = elapsed_ms(start);

        for (stage, ms) in STAGES.iter().zip([detect_ms, track_ms, embed_ms, match_ms]) {
            self.counters.push_stage(stage, ms);
        }
        let frame_ms = elapsed_ms(frame_start);
        let frame_unknown = results.iter().all(|r| r.is_unknown);
        self.counters.per_frame_ms.push(frame_ms);
        self.counters.unknown_flags.push(frame_unknown);

        debug!(
            frame = frame.index,
            tracks = results.len(),
            unknown = frame_unknown,
            frame_ms,
            "frame processed"
        );
        Ok(results)
    }

    pub fn counters(&self) -> &EvalCounters {
        &self.counters
    }

    pub fn into_counters(self) -> EvalCounters {
        self.counters
    }

    pub fn kb_size(&self) -> usize {
        self.bank.len()
    }

    pub fn backend_selected(&self) -> &'static str {
        self.bank.backend_name()
    }

    pub fn embedder_dim(&self) -> usize {
        self.embedder.dim()
    }
}

fn unknown_context(frame: &Frame, track: &Track, neighbors: &TopK) -> Map<String, Value> {
    let mut context = Map::new();
    context.insert("frame".to_owned(), json!(frame.index));
    context.insert("path".to_owned(), json!(frame.path.display().to_string()));
    context.insert("track_id".to_owned(), json!(track.id));
    context.insert(
        "bbox".to_owned(),
        json!([track.bbox.x1, track.bbox.y1, track.bbox.x2, track.bbox.y2]),
    );
    context.insert("candidates".to_owned(), json!(neighbors.labels));
    context
}
