//! Bounded hand-off queue for unknown detections.
//!
//! The matcher enqueues embeddings it could not label; the verify stage drains them with
//! [`CandidateOracle::next`]. Under overload the oldest record is dropped and counted.


use std::collections::VecDeque;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::debug;

use crate::constants::DEFAULT_ORACLE_MAXLEN;

/// Key under which the record's embedding is exposed in the popped context.
pub const EMBEDDING_KEY: &str = "embedding";

/// One queued unknown.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CandidateRecord {
    pub embedding: Vec<f32>,
    /// Caller context. Always carries [`EMBEDDING_KEY`] once popped.
    pub context: Map<String, Value>,
}

impl CandidateRecord {
    /// Candidate labels proposed for this record. The in-memory oracle proposes none.
    pub fn candidate_labels(&self) -> Vec<String> {
        match self.context.get("candidates") {
            Some(Value::Array(items)) => items
                .iter()
                .filter_map(|v| v.as_str().map(str::to_owned))
                .collect(),
            _ => Vec::new(),
        }
    }
}

pub trait CandidateOracle: Send + Sync {
    fn enqueue_unknown(&self, embedding: Vec<f32>, context: Map<String, Value>);

    /// Pops the oldest record, or `None` when drained.
    fn next(&self) -> Option<CandidateRecord>;

    fn qsize(&self) -> usize;

    fn shed_total(&self) -> u64;
}

#[derive(Debug, Default)]
struct QueueState {
    queue: VecDeque<CandidateRecord>,
    shed: u64,
}

/// FIFO of at most `maxlen` records with drop-oldest shedding.
#[derive(Debug)]
pub struct InMemoryCandidateOracle {
    maxlen: usize,
    state: Mutex<QueueState>,
}

impl Default for InMemoryCandidateOracle {
    fn default() -> Self {
        Self::new(DEFAULT_ORACLE_MAXLEN)
    }
}

impl InMemoryCandidateOracle {
    /// `maxlen == 0` sheds every enqueue.
    pub fn new(maxlen: usize) -> Self {
        Self {
            maxlen,
            state: Mutex::new(QueueState {
                queue: VecDeque::with_capacity(maxlen.min(DEFAULT_ORACLE_MAXLEN)),
                shed: 0,
            }),
        }
    }

    pub fn maxlen(&self) -> usize {
        self.maxlen
    }
}

impl CandidateOracle for InMemoryCandidateOracle {
    fn enqueue_unknown(&self, embedding: Vec<f32>, context: Map<String, Value>) {
        let record = CandidateRecord { embedding, context };
        let mut state = self.state.lock();
        if self.maxlen == 0 {
            state.shed += 1;
            debug!(shed_total = state.shed, "oracle disabled, candidate shed");
            return;
        }
        if state.queue.len() >= self.maxlen {
            state.queue.pop_front();
            state.shed += 1;
            debug!(
                maxlen = self.maxlen,
                shed_total = state.shed,
                "oracle full, oldest candidate shed"
            );
        }
        state.queue.push_back(record);
    }

    fn next(&self) -> Option<CandidateRecord> {
        let mut record = self.state.lock().queue.pop_front()?;
        if !record.context.contains_key(EMBEDDING_KEY) {
            let embedding = record
                .embedding
                .iter()
                .map(|x| Value::from(f64::from(*x)))
                .collect();
            record
                .context
                .insert(EMBEDDING_KEY.to_owned(), Value::Array(embedding));
        }
        Some(record)
    }

    fn qsize(&self) -> usize {
        self.state.lock().queue.len()
    }

    fn shed_total(&self) -> u64 {
        self.state.lock().shed
    }
}
