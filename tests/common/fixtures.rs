//! Shared builders for integration tests.

use std::fs;
use std::path::{Path, PathBuf};

use lvision::label_bank::{LabelBankConfig, SeedRow, ShardBuildOptions};
use lvision::verify::{GalleryManifest, GalleryRow};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

pub const DIM: usize = 256;
pub const SEED: u64 = 1234;

/// Seed rows used by the shard tests. `tripod` carries a tag outside the default allow list.
pub fn seed_rows() -> Vec<SeedRow> {
    vec![
        seed_row("Coffee Mug", &["mug", "cup"], "product_model"),
        seed_row("Teapot", &["tea kettle"], "product_line"),
        seed_row("Desk Lamp", &[], "product_model"),
        seed_row("Tripod", &["camera stand"], "accessory"),
    ]
}

pub fn seed_row(label: &str, aliases: &[&str], p31: &str) -> SeedRow {
    SeedRow {
        label: label.to_owned(),
        aliases: aliases.iter().map(|a| a.to_string()).collect(),
        p31: Some(p31.to_owned()),
        lang: Some("en".to_owned()),
    }
}

pub fn write_seed_jsonl(dir: &Path, rows: &[SeedRow]) -> PathBuf {
    let path = dir.join("seed.jsonl");
    let body: String = rows
        .iter()
        .map(|r| serde_json::to_string(r).unwrap() + "\n")
        .collect();
    fs::write(&path, body).unwrap();
    path
}

pub fn shard_options() -> ShardBuildOptions {
    ShardBuildOptions {
        dim: DIM,
        seed: SEED,
        bank: LabelBankConfig::exact(DIM),
        ..Default::default()
    }
}

pub fn random_vectors(n: usize, dim: usize, seed: u64) -> Vec<Vec<f32>> {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    (0..n)
        .map(|_| (0..dim).map(|_| rng.gen_range(-1.0f32..1.0)).collect())
        .collect()
}

/// Empty placeholder images named after their subject.
pub fn write_frames(dir: &Path, names: &[&str]) {
    for name in names {
        fs::write(dir.join(name), b"\x89PNG").unwrap();
    }
}

pub fn gallery_row(label: &str, source: &str, phash: &str) -> GalleryRow {
    GalleryRow {
        source: source.to_owned(),
        path: format!("gallery/{phash}.jpg"),
        license: "cc0".to_owned(),
        phash: phash.to_owned(),
        label: label.to_owned(),
        lang: "en".to_owned(),
    }
}

/// Gallery with `coffee mug` (3 rows, 2 sources) and `teapot` (1 row).
pub fn write_gallery(path: &Path) -> GalleryManifest {
    let manifest = GalleryManifest::from_rows(vec![
        gallery_row("coffee mug", "web", "m1"),
        gallery_row("coffee mug", "scan", "m2"),
        gallery_row("coffee mug", "web", "m3"),
        gallery_row("teapot", "web", "t1"),
    ]);
    manifest.write_jsonl(path).unwrap();
    manifest
}
