use super::*;
use crate::embedding::{dot, embed_text};
use crate::label_bank::{HnswInt8LabelBank, LabelBankConfig};
use crate::ledger::JsonLedger;
use crate::verify::{CalibrationArtifact, GalleryManifest, GalleryRow, SprtThresholds};
use std::collections::BTreeMap;
use tempfile::TempDir;

const DIM: usize = 256;

fn bank_with(labels: &[&str], seed: u64) -> Arc<dyn LabelBank> {
    let mut bank = HnswInt8LabelBank::with_config(LabelBankConfig::exact(DIM)).unwrap();
    let names: Vec<String> = labels.iter().map(|s| s.to_string()).collect();
    let vectors: Vec<Vec<f32>> = labels.iter().map(|l| embed_text(l, DIM, seed)).collect();
    bank.add(&names, &vectors).unwrap();
    Arc::new(bank)
}

fn write_frames(dir: &Path, names: &[&str]) {
    for name in names {
        fs::write(dir.join(name), b"\xff\xd8fake").unwrap();
    }
}

fn test_settings(out: &Path) -> Settings {
    let mut settings = Settings::default();
    settings.embedder.dim = DIM;
    settings.label_bank.dim = DIM;
    settings.latency.budget_ms = 10_000;
    settings.verify.manifest_path = out.join("missing_manifest.jsonl");
    settings.verify.calibration_path = out.join("missing_calibration.json");
    settings
}

fn frame(index: usize, name: &str) -> Frame {
    Frame::new(index, PathBuf::from("frames").join(name), Vec::new())
}

#[test]
fn test_subject_from_file_name() {
    assert_eq!(frame(0, "Coffee_Mug-003.jpg").subject(), "coffee mug");
    assert_eq!(frame(0, "zebra_001.png").subject(), "zebra");
    assert_eq!(frame(0, "007.jpg").subject(), "");
}

#[test]
fn test_bbox_iou() {
    let a = BBox::new(0, 0, 10, 10);
    assert_eq!(a.iou(&a), 1.0);
    assert_eq!(a.iou(&BBox::new(20, 20, 30, 30)), 0.0);
    let half = a.iou(&BBox::new(5, 0, 15, 10));
    assert!((half - 1.0 / 3.0).abs() < 1e-6);
}

#[test]
fn test_tracker_keeps_ids_for_overlapping_boxes() {
    let mut tracker = SimpleTracker::default();
    let first = tracker.update(&[BBox::new(0, 0, 100, 100), BBox::new(200, 200, 300, 300)]);
    assert_eq!(first.iter().map(|t| t.id).collect::<Vec<_>>(), vec![1, 2]);

    let second = tracker.update(&[BBox::new(205, 205, 305, 305), BBox::new(2, 2, 102, 102)]);
    assert_eq!(second.iter().map(|t| t.id).collect::<Vec<_>>(), vec![2, 1]);

    let third = tracker.update(&[BBox::new(500, 500, 600, 600)]);
    assert_eq!(third[0].id, 3);
}

#[test]
fn test_hash_embedder_matches_text_embedding() {
    let embedder = HashEmbedder::new(DIM, 7);
    let tracks = [Track {
        id: 1,
        bbox: BBox::new(0, 0, 1, 1),
    }];
    let out = embedder
        .encode(&frame(0, "coffee_mug_001.jpg"), &tracks)
        .unwrap();

    assert_eq!(out.len(), 1);
    let expected = embed_text("coffee mug", DIM, 7);
    assert!((dot(out[0].as_slice(), &expected) - 1.0).abs() < 1e-5);
}

#[test]
fn test_hash_embedder_without_normalization() {
    let embedder = HashEmbedder::new(DIM, 7).with_normalize(false);
    let tracks = [Track {
        id: 1,
        bbox: BBox::new(0, 0, 1, 1),
    }];
    let out = embedder.encode(&frame(0, "mug_1.jpg"), &tracks).unwrap();
    assert!(out[0].as_slice().iter().all(|x| (-1.0..1.0).contains(x)));
    assert!((out[0].norm() - 1.0).abs() > 1e-3);

    let result = HashEmbedder::new(0, 7).encode(&frame(0, "mug.jpg"), &tracks);
    assert!(result.is_err());
}

#[test]
fn test_pipeline_flags_unknowns_and_enqueues() {
    let bank = bank_with(&["coffee mug", "teapot"], 11);
    let oracle = Arc::new(InMemoryCandidateOracle::new(16));
    let mut pipeline = DetectTrackEmbedPipeline::new(
        Box::new(FakeDetector::default()),
        Box::new(SimpleTracker::default()),
        Box::new(HashEmbedder::new(DIM, 11)),
        bank,
        Arc::clone(&oracle) as Arc<dyn CandidateOracle>,
        crate::config::MatcherSettings::default(),
    );

    let known = pipeline.process(&frame(0, "coffee_mug_001.jpg")).unwrap();
    assert_eq!(known.len(), 1);
    assert!(!known[0].is_unknown);
    assert_eq!(known[0].neighbors.top1().unwrap().0, "coffee mug");
    assert_eq!(oracle.qsize(), 0);

    let unknown = pipeline.process(&frame(1, "zebra_001.jpg")).unwrap();
    assert!(unknown[0].is_unknown);
    assert_eq!(oracle.qsize(), 1);

    let record = oracle.next().unwrap();
    assert_eq!(record.context["frame"], 1);
    assert_eq!(record.context["track_id"], 1);
    assert_eq!(
        record.context["bbox"],
        serde_json::json!([50, 50, 200, 200])
    );
    assert_eq!(record.candidate_labels().len(), 2);

    let counters = pipeline.counters();
    assert_eq!(counters.unknown_flags, vec![false, true]);
    assert_eq!(counters.per_frame_ms.len(), 2);
    for stage in metrics::STAGES {
        assert_eq!(counters.per_stage_ms[stage].len(), 2, "stage {stage}");
    }
    assert_eq!(pipeline.kb_size(), 2);
    assert_eq!(pipeline.backend_selected(), "exact");
}

#[test]
fn test_frame_without_detections_is_unknown() {
    let bank = bank_with(&["coffee mug"], 11);
    let mut pipeline = DetectTrackEmbedPipeline::new(
        Box::new(FakeDetector::with_boxes(Vec::new())),
        Box::new(SimpleTracker::default()),
        Box::new(HashEmbedder::new(DIM, 11)),
        bank,
        Arc::new(InMemoryCandidateOracle::default()),
        crate::config::MatcherSettings::default(),
    );

    let matches = pipeline.process(&frame(0, "coffee_mug.jpg")).unwrap();
    assert!(matches.is_empty());
    assert_eq!(pipeline.counters().unknown_flags, vec![true]);
}

#[test]
fn test_min_neighbors_makes_single_match_unknown() {
    let bank = bank_with(&["coffee mug", "teapot"], 11);
    let matcher = crate::config::MatcherSettings {
        min_neighbors: 2,
        ..Default::default()
    };
    let mut pipeline = DetectTrackEmbedPipeline::new(
        Box::new(FakeDetector::default()),
        Box::new(SimpleTracker::default()),
        Box::new(HashEmbedder::new(DIM, 11)),
        bank,
        Arc::new(InMemoryCandidateOracle::default()),
        matcher,
    );

    let out = pipeline.process(&frame(0, "coffee_mug.jpg")).unwrap();
    assert!(out[0].is_unknown);
}

fn ctx(warmup: usize, budget: f64) -> MetricsContext<'static> {
    MetricsContext {
        kb_size: 3,
        backend_selected: "exact",
        sdk_version: "0.0.0",
        warmup,
        slo_budget_ms: budget,
    }
}

#[test]
fn test_metrics_json_drops_warmup() {
    let per_frame = vec![100.0, 10.0, 20.0, 30.0];
    let mut per_stage = BTreeMap::new();
    for stage in metrics::STAGES {
        per_stage.insert(stage.to_string(), vec![50.0, 1.0, 2.0, 3.0]);
    }
    let flags = vec![true, false, true, false];

    let m = metrics_json(&per_frame, &per_stage, &flags, &ctx(1, 25.0));

    assert_eq!(m.frames_total, 4);
    assert_eq!(m.p50_ms, 20.0);
    assert!((m.fps - 50.0).abs() < 1e-9);
    assert!((m.unknown_rate - 1.0 / 3.0).abs() < 1e-12);
    assert!((m.slo_within_budget_pct - 200.0 / 3.0).abs() < 1e-9);
    assert_eq!(m.stage_ms.detect, 2.0);
    assert_eq!(m.stage_ms.match_, 2.0);
    assert!((m.stage_ms.overhead - 12.0).abs() < 1e-9);
    assert_eq!(m.kb_size, 3);
    assert_eq!(m.metrics_schema_version, "0.1");
}

#[test]
fn test_metrics_json_empty_input() {
    let m = metrics_json(&[], &BTreeMap::new(), &[], &ctx(5, 33.0));
    assert_eq!(m.frames_total, 0);
    assert_eq!(m.fps, 0.0);
    assert_eq!(m.p95_ms, 0.0);
    assert_eq!(m.unknown_rate, 0.0);
}

#[test]
fn test_metrics_serialization_keys_and_hash() {
    let mut m = metrics_json(&[1.0, 2.0], &BTreeMap::new(), &[false, true], &ctx(0, 33.0));
    let value = serde_json::to_value(&m).unwrap();
    assert!(value["stage_ms"].get("match").is_some());
    assert!(value["verify"].get("Δ_p95").is_some());
    assert!(value.get("unknown_rate_violation").is_none());

    let hash = m.compute_hash().unwrap();
    m.metrics_hash = "stale".to_string();
    assert_eq!(m.compute_hash().unwrap(), hash);

    m.unknown_rate_violation = Some(true);
    assert_ne!(m.compute_hash().unwrap(), hash);
}

#[test]
fn test_discover_frames_filters_and_sorts() {
    let dir = TempDir::new().unwrap();
    write_frames(dir.path(), &["b.png", "a.JPG", "c.bmp", "d.jpeg"]);
    fs::write(dir.path().join("notes.txt"), "x").unwrap();
    fs::create_dir(dir.path().join("sub.jpg")).unwrap();

    let frames = discover_frames(dir.path()).unwrap();
    let names: Vec<_> = frames
        .iter()
        .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
        .collect();
    assert_eq!(names, vec!["a.JPG", "b.png", "c.bmp", "d.jpeg"]);

    let missing = discover_frames(&dir.path().join("nope"));
    assert!(matches!(missing, Err(EvalError::InputNotFound { .. })));
}

#[test]
fn test_run_eval_within_guardrails() {
    let input = TempDir::new().unwrap();
    let output = TempDir::new().unwrap();
    write_frames(
        input.path(),
        &["alpha_001.jpg", "alpha_002.jpg", "zebra_001.jpg"],
    );
    let settings = test_settings(output.path());
    let bank = bank_with(&["alpha", "beta"], settings.label_bank.seed);

    let outcome = run_eval(input.path(), output.path(), &settings, bank).unwrap();

    assert_eq!(outcome.exit_code, 0);
    let m = &outcome.metrics;
    assert_eq!(m.frames_total, 3);
    assert!((m.unknown_rate - 1.0 / 3.0).abs() < 1e-12);
    assert_eq!(m.unknown_rate_violation, None);
    assert_eq!(m.unknown_rate_band, (0.10, 0.40));
    assert_eq!(m.kb_size, 2);
    assert_eq!(m.backend_selected, "exact");
    assert_eq!(m.verify, VerifySummary::default());
    assert_eq!(m.oracle.qsize, 1);

    let written: EvalMetrics =
        serde_json::from_slice(&fs::read(&outcome.metrics_path).unwrap()).unwrap();
    assert_eq!(&written, m);
    assert_eq!(written.metrics_hash, written.compute_hash().unwrap());
}

#[test]
fn test_run_eval_unknown_rate_violation_still_writes_metrics() {
    let input = TempDir::new().unwrap();
    let output = TempDir::new().unwrap();
    write_frames(input.path(), &["alpha_001.jpg", "alpha_002.jpg"]);
    let settings = test_settings(output.path());
    let bank = bank_with(&["alpha"], settings.label_bank.seed);

    let outcome = run_eval(input.path(), output.path(), &settings, bank).unwrap();

    assert_eq!(outcome.exit_code, GUARDRAIL_EXIT_CODE);
    assert_eq!(outcome.metrics.unknown_rate, 0.0);
    assert_eq!(outcome.metrics.unknown_rate_violation, Some(true));
    let text = fs::read_to_string(output.path().join(METRICS_FILE)).unwrap();
    assert!(text.contains("\"unknown_rate_violation\": true"));
}

#[test]
fn test_run_eval_latency_over_budget() {
    let input = TempDir::new().unwrap();
    let output = TempDir::new().unwrap();
    write_frames(input.path(), &["alpha_001.jpg", "zebra_001.jpg"]);
    let mut settings = test_settings(output.path());
    settings.latency.budget_ms = 0;
    settings.eval.unknown_rate_band = (0.0, 1.0);
    let bank = bank_with(&["alpha"], settings.label_bank.seed);

    let outcome = run_eval(input.path(), output.path(), &settings, bank).unwrap();

    assert!(outcome.metrics.p95_ms > 0.0);
    assert_eq!(outcome.exit_code, GUARDRAIL_EXIT_CODE);
    assert_eq!(outcome.metrics.unknown_rate_violation, None);
    assert!(outcome.metrics_path.is_file());
}

#[test]
fn test_run_eval_verifies_unknowns_with_gallery() {
    let input = TempDir::new().unwrap();
    let output = TempDir::new().unwrap();
    write_frames(
        input.path(),
        &["alpha_001.jpg", "zebra_001.jpg", "zebra_002.jpg"],
    );

    let row = |label: &str, source: &str, phash: &str| GalleryRow {
        source: source.to_owned(),
        phash: phash.to_owned(),
        label: label.to_owned(),
        ..Default::default()
    };
    let mut settings = test_settings(output.path());
    settings.eval.unknown_rate_band = (0.0, 1.0);
    settings.verify.manifest_path = output.path().join("gallery_manifest.jsonl");
    settings.verify.calibration_path = output.path().join("calibration.json");
    settings.verify.ledger_path = Some(output.path().join("ledger.jsonl"));
    GalleryManifest::from_rows(vec![
        row("alpha", "web", "a1"),
        row("alpha", "scan", "a2"),
        row("alpha", "web", "a3"),
    ])
    .write_jsonl(&settings.verify.manifest_path)
    .unwrap();
    CalibrationArtifact {
        sprt: SprtThresholds {
            accept: 2.0,
            reject: 1.0,
        },
        diversity_min: 2,
        ..Default::default()
    }
    .write(&settings.verify.calibration_path)
    .unwrap();
    let bank = bank_with(&["alpha"], settings.label_bank.seed);

    let outcome = run_eval(input.path(), output.path(), &settings, bank).unwrap();

    let verify = &outcome.metrics.verify;
    assert_eq!(verify.called, 2);
    assert_eq!(verify.accepted, 2);
    assert_eq!(verify.rejected, 0);
    assert_eq!(verify.r_p95, 3.0);
    assert_eq!(verify.e_p95, 3.0);
    assert_eq!(verify.diversity_min, 2);
    assert_eq!(outcome.metrics.oracle.qsize, 2);

    let ledger = JsonLedger::new(output.path().join("ledger.jsonl"));
    assert_eq!(ledger.read_entries().unwrap().len(), 2);
}

#[test]
fn test_wider_embedder_is_projected_to_bank_dim() {
    let bank = bank_with(&["coffee mug"], 11);
    let mut pipeline = DetectTrackEmbedPipeline::new(
        Box::new(FakeDetector::default()),
        Box::new(SimpleTracker::default()),
        Box::new(HashEmbedder::new(DIM * 2, 11)),
        bank,
        Arc::new(InMemoryCandidateOracle::default()),
        crate::config::MatcherSettings::default(),
    );

    let out = pipeline.process(&frame(0, "coffee_mug.jpg")).unwrap();
    assert_eq!(out[0].embedding.dim(), DIM * 2);
    assert!(!out[0].is_unknown);
    assert!((out[0].neighbors.scores[0] - 1.0).abs() < 1e-5);
}

struct ShortEmbedder;

impl Embedder for ShortEmbedder {
    fn dim(&self) -> usize {
        DIM
    }

    fn encode(
        &self,
        _frame: &Frame,
        tracks: &[Track],
    ) -> crate::embedding::EmbeddingResult<Vec<crate::embedding::Embedding>> {
        Ok(tracks
            .iter()
            .map(|_| crate::embedding::Embedding::new(vec![1.0; 3]))
            .collect())
    }
}

#[test]
fn test_embedder_dim_contract_enforced() {
    let mut pipeline = DetectTrackEmbedPipeline::new(
        Box::new(FakeDetector::default()),
        Box::new(SimpleTracker::default()),
        Box::new(ShortEmbedder),
        bank_with(&["coffee mug"], 11),
        Arc::new(InMemoryCandidateOracle::default()),
        crate::config::MatcherSettings::default(),
    );

    let result = pipeline.process(&frame(0, "coffee_mug.jpg"));
    assert!(matches!(result, Err(EvalError::Dimension(_))));
}
