use super::*;
use crate::embedding::l2_normalize;
use crate::storage::read_npy_i8;
use std::fs;
use tempfile::TempDir;

/// Axis-aligned rows normalize exactly.
fn gallery() -> Vec<Vec<f32>> {
    vec![
        vec![1.0, 0.0, 0.0],
        vec![0.0, 2.0, 0.0],
        vec![0.0, 0.0, 1.0],
        vec![0.0, 0.0, 3.0],
    ]
}

fn ledger_lines(dir: &Path) -> usize {
    fs::read_to_string(dir.join(PROMOTION_LEDGER_FILE))
        .map(|s| s.lines().count())
        .unwrap_or(0)
}

#[test]
fn test_safe_label() {
    assert_eq!(safe_label("coffee mug"), "coffee_mug");
    assert_eq!(safe_label("__a/b__"), "a_b");
    assert_eq!(safe_label("x-y_z"), "x-y_z");
    assert_eq!(safe_label("///"), "label");
    assert_eq!(safe_label(""), "label");
}

#[test]
fn test_farthest_point_picks_spread_rows() {
    let raw = vec![
        vec![1.0f32, 0.0, 0.0],
        vec![0.9, 0.1, 0.0],
        vec![0.0, 2.0, 0.0],
        vec![0.0, 0.0, 1.0],
        vec![0.0, 0.1, 0.9],
    ];
    let rows: Vec<Vec<f32>> = raw.iter().map(|v| l2_normalize(v)).collect();
    let picked = farthest_point_indices(&rows, 3);

    assert_eq!(picked.len(), 3);
    // One representative per cluster.
    for cluster in [[0, 1], [2, 2], [3, 4]] {
        let hits = picked.iter().filter(|&&i| cluster.contains(&i)).count();
        assert_eq!(hits, 1, "picked = {picked:?}");
    }
}

#[test]
fn test_farthest_point_caps_and_seeds_by_norm() {
    let rows = vec![vec![0.1f32, 0.0], vec![0.0, 3.0], vec![1.0, 1.0]];
    assert_eq!(farthest_point_indices(&rows, 1), vec![1]);
    assert_eq!(farthest_point_indices(&rows, 10).len(), 3);
    assert!(farthest_point_indices(&rows, 0).is_empty());
    let empty: Vec<Vec<f32>> = Vec::new();
    assert!(farthest_point_indices(&empty, 3).is_empty());
}

#[test]
fn test_promote_writes_artifacts() {
    let dir = TempDir::new().unwrap();
    let promoter = MedoidPromoter::new(dir.path());

    let outcome = promoter.promote("coffee mug", &gallery()).unwrap();

    assert!(outcome.updated);
    // Rows 2 and 3 coincide after normalization; only one is kept.
    assert_eq!(outcome.medoids, 3);
    assert_eq!(outcome.bytes, 9);
    assert_eq!(outcome.hash.len(), 64);

    let matrix = read_npy_i8(&promoter.medoid_path("coffee mug")).unwrap();
    assert_eq!((matrix.rows, matrix.cols), (3, 3));
    assert_eq!(matrix.row(0).unwrap(), &[127, 0, 0]);
    assert_eq!(matrix.row(1).unwrap(), &[0, 127, 0]);
    assert_eq!(matrix.row(2).unwrap(), &[0, 0, 127]);
    assert_eq!(sha256_hex(matrix.as_bytes()), outcome.hash);

    let meta: serde_json::Value =
        serde_json::from_str(&fs::read_to_string(promoter.meta_path("coffee mug")).unwrap())
            .unwrap();
    assert_eq!(meta["label"], "coffee mug");
    assert_eq!(meta["dim"], 3);
    assert_eq!(meta["quant"]["scale"], 127);
    assert_eq!(meta["quant"]["dtype"], "int8");
    assert_eq!(meta["hash"], outcome.hash.as_str());

    assert_eq!(ledger_lines(dir.path()), 1);
}

#[test]
fn test_promote_is_idempotent() {
    let dir = TempDir::new().unwrap();
    let promoter = MedoidPromoter::new(dir.path());

    let first = promoter.promote("mug", &gallery()).unwrap();
    let second = promoter.promote("mug", &gallery()).unwrap();

    assert!(first.updated);
    assert!(!second.updated);
    assert_eq!(first.hash, second.hash);
    assert_eq!(ledger_lines(dir.path()), 1);
}

#[test]
fn test_changed_gallery_appends_once() {
    let dir = TempDir::new().unwrap();
    let promoter = MedoidPromoter::new(dir.path());

    promoter.promote("mug", &gallery()).unwrap();
    let changed = promoter
        .promote("mug", &[vec![0.0, 1.0, 0.0], vec![1.0, 0.0, 0.0]])
        .unwrap();
    promoter
        .promote("mug", &[vec![0.0, 1.0, 0.0], vec![1.0, 0.0, 0.0]])
        .unwrap();

    assert!(changed.updated);
    assert_eq!(changed.medoids, 2);
    assert_eq!(ledger_lines(dir.path()), 2);
}

#[test]
fn test_scale_invariant_hash() {
    let dir = TempDir::new().unwrap();
    let promoter = MedoidPromoter::new(dir.path());

    let a = promoter.promote("a", &gallery()).unwrap();
    let scaled: Vec<Vec<f32>> = gallery()
        .into_iter()
        .map(|v| v.into_iter().map(|x| x * 4.0).collect())
        .collect();
    let b = promoter.promote("b", &scaled).unwrap();
    assert_eq!(a.hash, b.hash);
}

#[test]
fn test_empty_gallery_is_noop() {
    let dir = TempDir::new().unwrap();
    let promoter = MedoidPromoter::new(dir.path());

    let outcome = promoter.promote("mug", &[]).unwrap();

    assert_eq!(
        outcome,
        PromotionOutcome {
            label: "mug".to_owned(),
            medoids: 0,
            bytes: 0,
            hash: String::new(),
            updated: false,
        }
    );
    assert!(!promoter.medoid_path("mug").exists());
    assert_eq!(ledger_lines(dir.path()), 0);
}

#[test]
fn test_ragged_rows_rejected() {
    let dir = TempDir::new().unwrap();
    let promoter = MedoidPromoter::new(dir.path());

    let err = promoter
        .promote("mug", &[vec![1.0, 0.0], vec![1.0]])
        .unwrap_err();
    assert!(matches!(
        err,
        PromotionError::RaggedRows {
            row: 1,
            expected: 2,
            actual: 1
        }
    ));
}

#[test]
fn test_zero_rows_survive() {
    let dir = TempDir::new().unwrap();
    let promoter = MedoidPromoter::new(dir.path()).with_medoid_cap(2);

    let outcome = promoter
        .promote("z", &[vec![0.0, 0.0], vec![0.0, 1.0]])
        .unwrap();
    assert_eq!(outcome.medoids, 2);

    let matrix = read_npy_i8(&promoter.medoid_path("z")).unwrap();
    assert_eq!(matrix.row(0).unwrap(), &[0, 127]);
    assert_eq!(matrix.row(1).unwrap(), &[0, 0]);
}
