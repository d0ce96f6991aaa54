//! Shard building, persistence and lookup through the public API.

mod common;

use common::fixtures::{DIM, SEED, random_vectors, seed_rows, shard_options, write_seed_jsonl};
use lvision::embedding::embed_text;
use lvision::label_bank::builder::MANIFEST_FILE;
use lvision::label_bank::{
    BackendKind, HnswInt8LabelBank, LabelBank, LabelBankConfig, LabelBankError, ShardManifest,
    VOCAB_FILE, build_shard, load_shard,
};
use std::fs;
use tempfile::TempDir;

#[test]
fn test_build_shard_indexes_canonical_labels_and_aliases() {
    let dir = TempDir::new().unwrap();
    let seed = write_seed_jsonl(dir.path(), &seed_rows());
    let out = dir.path().join("shard");

    let manifest = build_shard(&seed, &out, &shard_options()).unwrap();

    assert_eq!(manifest.n_total, 6);
    assert_eq!(manifest.dim, DIM);
    assert_eq!(manifest.lang_counts["en"], 3);
    assert_eq!(manifest.bytes_vocab, (6 * DIM) as u64);

    let on_disk: ShardManifest =
        serde_json::from_str(&fs::read_to_string(out.join(MANIFEST_FILE)).unwrap()).unwrap();
    assert_eq!(on_disk, manifest);

    let bank = load_shard(&out).unwrap();
    assert_eq!(bank.len(), 6);
    assert_eq!(bank.backend_name(), "exact");

    let top = bank
        .lookup_vecs(&[embed_text("cup", DIM, SEED)], 3)
        .unwrap();
    let (label, score) = top.top1().unwrap();
    assert_eq!(label, "coffee mug");
    assert!((score - 1.0).abs() < 1e-5);
    assert!(!top.labels.iter().any(|l| l == "tripod"));
}

#[test]
fn test_missing_seed_file() {
    let dir = TempDir::new().unwrap();
    let result = build_shard(
        &dir.path().join("absent.jsonl"),
        &dir.path().join("shard"),
        &shard_options(),
    );
    assert!(matches!(result, Err(LabelBankError::SeedNotFound { .. })));
}

#[test]
fn test_reload_reproduces_lookups_and_vocab_bytes() {
    let dir = TempDir::new().unwrap();
    let vectors = random_vectors(200, 8, 99);
    let labels: Vec<String> = (0..200).map(|i| format!("item-{i:03}")).collect();

    let mut bank = HnswInt8LabelBank::with_config(LabelBankConfig::with_dim(8)).unwrap();
    bank.add(&labels, &vectors).unwrap();
    bank.save(dir.path()).unwrap();
    let vocab_before = fs::read(dir.path().join(VOCAB_FILE)).unwrap();

    let reloaded = load_shard(dir.path()).unwrap();
    assert_eq!(reloaded.len(), 200);
    assert_eq!(reloaded.labels(), bank.labels());
    assert_eq!(
        reloaded.lookup_batch(&vectors[..20], 5).unwrap(),
        bank.lookup_batch(&vectors[..20], 5).unwrap()
    );

    let mut resaved = reloaded;
    resaved.save(dir.path()).unwrap();
    assert_eq!(fs::read(dir.path().join(VOCAB_FILE)).unwrap(), vocab_before);

    let top = load_shard(dir.path())
        .unwrap()
        .lookup_vecs(&vectors[7..8], 1)
        .unwrap();
    assert_eq!(top.top1().unwrap().0, "item-007");
}

#[test]
fn test_backend_override_on_load() {
    let dir = TempDir::new().unwrap();
    let seed = write_seed_jsonl(dir.path(), &seed_rows());
    build_shard(&seed, dir.path(), &shard_options()).unwrap();

    let bank = HnswInt8LabelBank::load_with_backend(dir.path(), BackendKind::Exact).unwrap();
    assert_eq!(bank.backend(), BackendKind::Exact);
    assert_eq!(bank.stats().n_items, 6);
}
