use hnsw_rs::prelude::*;
use tracing::debug;

use super::exact::scan;
use super::{BackendKind, Candidate, SimilarityIndex};
use crate::constants::MIN_EF_SEARCH;
use crate::embedding::dot;

const MAX_LAYERS: usize = 16;

/// HNSW graph over cosine distance with exact rescoring.
///
/// The stored f32 rows stay authoritative: the graph only proposes candidates, every
/// returned score is recomputed as an exact inner product. Zero rows are kept in storage but
/// not inserted into the graph (cosine distance is undefined for them).
pub struct HnswIndex {
    rows: Vec<Vec<f32>>,
    graph: Option<Hnsw<'static, f32, DistCosine>>,
    capacity: usize,
    m: usize,
    ef_construction: usize,
    min_vectors_for_ann: usize,
}

impl HnswIndex {
    pub fn new(m: usize, ef_construction: usize, min_vectors_for_ann: usize) -> Self {
        Self {
            rows: Vec::new(),
            graph: None,
            capacity: 0,
            m,
            ef_construction,
            min_vectors_for_ann,
        }
    }

    /// Whether lookups currently go through the graph.
    pub fn uses_graph(&self) -> bool {
        self.graph.is_some() && self.rows.len() >= self.min_vectors_for_ann
    }

    fn rebuild(&mut self) {
        let capacity = (self.rows.len() * 2).max(1024);
        let layers = (capacity as f32).ln().trunc() as usize;
        let nb_layer = MAX_LAYERS.min(layers).max(1);
        let graph = Hnsw::<f32, DistCosine>::new(
            self.m,
            capacity,
            nb_layer,
            self.ef_construction,
            DistCosine {},
        );
        // Serial insertion keeps the build order fixed.
        for (id, row) in self.rows.iter().enumerate() {
            if row.iter().any(|x| *x != 0.0) {
                graph.insert_slice((row.as_slice(), id));
            }
        }
        debug!(
            rows = self.rows.len(),
            capacity,
            nb_layer,
            m = self.m,
            ef_construction = self.ef_construction,
            "rebuilt hnsw graph"
        );
        self.graph = Some(graph);
        self.capacity = capacity;
    }
}

impl SimilarityIndex for HnswIndex {
    fn add(&mut self, rows: &[Vec<f32>]) {
        let start = self.rows.len();
        self.rows.extend_from_slice(rows);

        match &self.graph {
            Some(graph) if self.rows.len() <= self.capacity => {
                for (offset, row) in rows.iter().enumerate() {
                    if row.iter().any(|x| *x != 0.0) {
                        graph.insert_slice((row.as_slice(), start + offset));
                    }
                }
            }
            _ => self.rebuild(),
        }
    }

    fn search(&self, query: &[f32], k: usize) -> Vec<Candidate> {
        if k == 0 || self.rows.is_empty() {
            return Vec::new();
        }
        let graph = match &self.graph {
            Some(graph) if self.rows.len() >= self.min_vectors_for_ann => graph,
            _ => return scan(&self.rows, query, k),
        };
        if query.iter().all(|x| *x == 0.0) {
            return scan(&self.rows, query, k);
        }

        let ef_search = MIN_EF_SEARCH.max(2 * k);
        let knbn = ef_search.min(self.rows.len());
        graph
            .search(query, knbn, ef_search)
            .into_iter()
            .filter_map(|n| {
                let row = self.rows.get(n.d_id)?;
                Some(Candidate {
                    row: n.d_id,
                    score: dot(row, query),
                })
            })
            .collect()
    }

    fn len(&self) -> usize {
        self.rows.len()
    }

    fn rows(&self) -> &[Vec<f32>] {
        &self.rows
    }

    fn backend(&self) -> BackendKind {
        BackendKind::Hnsw
    }
}
