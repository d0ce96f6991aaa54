use std::path::{Path, PathBuf};

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};

use crate::embedding::{Embedding, EmbeddingError, EmbeddingResult, l2_normalize};
use crate::hashing::seed_from_text;

/// One input frame. Pixel data is carried undecoded.
#[derive(Debug, Clone)]
pub struct Frame {
    pub index: usize,
    pub path: PathBuf,
    pub bytes: Vec<u8>,
}

impl Frame {
    pub fn new(index: usize, path: impl Into<PathBuf>, bytes: Vec<u8>) -> Self {
        Self {
            index,
            path: path.into(),
            bytes,
        }
    }

    /// Subject hint from the file name: `"Coffee_Mug-003.jpg"` -> `"coffee mug"`.
    pub fn subject(&self) -> String {
        subject_from_path(&self.path)
    }
}

pub(crate) fn subject_from_path(path: &Path) -> String {
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let trimmed = stem.trim_end_matches(|c: char| c.is_ascii_digit() || c == '_' || c == '-');
    trimmed
        .split(['_', '-', ' '])
        .filter(|w| !w.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

/// Axis-aligned box `(x1, y1, x2, y2)` in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BBox {
    pub x1: i32,
    pub y1: i32,
    pub x2: i32,
    pub y2: i32,
}

impl BBox {
    pub const fn new(x1: i32, y1: i32, x2: i32, y2: i32) -> Self {
        Self { x1, y1, x2, y2 }
    }

    pub fn area(&self) -> i64 {
        i64::from((self.x2 - self.x1).max(0)) * i64::from((self.y2 - self.y1).max(0))
    }

    pub fn iou(&self, other: &BBox) -> f32 {
        let inter = BBox::new(
            self.x1.max(other.x1),
            self.y1.max(other.y1),
            self.x2.min(other.x2),
            self.y2.min(other.y2),
        )
        .area();
        let union = self.area() + other.area() - inter;
        if union <= 0 {
            0.0
        } else {
            inter as f32 / union as f32
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Track {
    pub id: u64,
    pub bbox: BBox,
}

pub trait Detector: Send {
    fn detect(&mut self, frame: &Frame) -> Vec<BBox>;
}

pub trait Tracker: Send {
    fn update(&mut self, detections: &[BBox]) -> Vec<Track>;
}

pub trait Embedder: Send + Sync {
    fn dim(&self) -> usize;

    /// One embedding per track, in track order.
    fn encode(&self, frame: &Frame, tracks: &[Track]) -> EmbeddingResult<Vec<Embedding>>;
}

/// Detector stub that reports the same box on every frame.
#[derive(Debug, Clone)]
pub struct FakeDetector {
    boxes: Vec<BBox>,
}

impl Default for FakeDetector {
    fn default() -> Self {
        Self {
            boxes: vec![BBox::new(50, 50, 200, 200)],
        }
    }
}

impl FakeDetector {
    pub fn with_boxes(boxes: Vec<BBox>) -> Self {
        Self { boxes }
    }
}

impl Detector for FakeDetector {
    fn detect(&mut self, _frame: &Frame) -> Vec<BBox> {
        self.boxes.clone()
    }
}

/// Greedy IoU tracker: each detection inherits the id of the best overlapping live track,
/// otherwise a fresh id is issued. Unmatched tracks are dropped.
#[derive(Debug)]
pub struct SimpleTracker {
    iou_threshold: f32,
    next_id: u64,
    live: Vec<Track>,
}

impl Default for SimpleTracker {
    fn default() -> Self {
        Self::new(0.3)
    }
}

impl SimpleTracker {
    pub fn new(iou_threshold: f32) -> Self {
        Self {
            iou_threshold,
            next_id: 1,
            live: Vec::new(),
        }
    }
}

impl Tracker for SimpleTracker {
    fn update(&mut self, detections: &[BBox]) -> Vec<Track> {
        let mut claimed = vec![false; self.live.len()];
        let mut tracks = Vec::with_capacity(detections.len());

        for bbox in detections {
            let best = self
                .live
                .iter()
                .enumerate()
                .filter(|(i, _)| !claimed[*i])
                .map(|(i, t)| (i, t.bbox.iou(bbox)))
                .filter(|(_, iou)| *iou >= self.iou_threshold)
                .max_by(|a, b| a.1.total_cmp(&b.1).then(b.0.cmp(&a.0)));

            let id = match best {
                Some((i, _)) => {
                    claimed[i] = true;
                    self.live[i].id
                }
                None => {
                    let id = self.next_id;
                    self.next_id += 1;
                    id
                }
            };
            tracks.push(Track { id, bbox: *bbox });
        }

        self.live = tracks.clone();
        tracks
    }
}

/// Deterministic embedder keyed on the frame's subject hint.
///
/// Draws from the same stream as [`crate::embedding::embed_text`], so frames whose file names
/// share a subject point the same way as that subject's shard row built with the same seed.
#[derive(Debug, Clone)]
pub struct HashEmbedder {
    dim: usize,
    seed: u64,
    normalize: bool,
}

impl HashEmbedder {
    pub fn new(dim: usize, seed: u64) -> Self {
        Self {
            dim,
            seed,
            normalize: true,
        }
    }

    pub fn with_normalize(mut self, normalize: bool) -> Self {
        self.normalize = normalize;
        self
    }
}

impl Embedder for HashEmbedder {
    fn dim(&self) -> usize {
        self.dim
    }

    fn encode(&self, frame: &Frame, tracks: &[Track]) -> EmbeddingResult<Vec<Embedding>> {
        if self.dim == 0 {
            return Err(EmbeddingError::EncodeFailed {
                reason: "embedder dim is zero".to_string(),
            });
        }
        let mut rng = ChaCha8Rng::seed_from_u64(seed_from_text(&frame.subject(), self.seed));
        let raw: Vec<f32> = (0..self.dim).map(|_| rng.gen_range(-1.0f32..1.0)).collect();
        let vec = if self.normalize {
            l2_normalize(&raw)
        } else {
            raw
        };
        tracks
            .iter()
            .map(|_| Embedding::with_dim(vec.clone(), self.dim))
            .collect()
    }
}
