use rand::Rng;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;

use super::l2_normalize;
use crate::hashing::seed_from_text;

/// Deterministic unit vector for `text`.
///
/// The same `(text, dim, seed)` always yields the same vector; different phrases land on
/// effectively independent random directions.
pub fn embed_text(text: &str, dim: usize, seed: u64) -> Vec<f32> {
    let mut rng = ChaCha8Rng::seed_from_u64(seed_from_text(text, seed));
    let raw: Vec<f32> = (0..dim).map(|_| rng.gen_range(-1.0f32..1.0)).collect();
    l2_normalize(&raw)
}
