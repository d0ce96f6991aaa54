//! `lvision` command-line front-end.
//!
//! # Commands
//!
//! - `build-shard`: Embed a seed JSONL into a label bank shard
//! - `eval-calibration`: Score a shard's calibration queries
//! - `calibrate-verify`: Derive verify thresholds from a gallery manifest
//! - `verify`: Check one candidate label against the gallery
//! - `promote`: Persist capped medoid sets from labelled embeddings
//! - `eval`: Run the offline pipeline over a frame directory
//!
//! Exit code 2 from `eval` means a latency or unknown-rate guardrail tripped.

use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use serde::Deserialize;
use tracing_subscriber::EnvFilter;

use lvision::config::Settings;
use lvision::kb::{KbPromotion, MedoidPromoter};
use lvision::label_bank::{HnswInt8LabelBank, ShardBuildOptions, build_shard};
use lvision::ledger::JsonLedger;
use lvision::verify::{GalleryManifest, ManifestVerifyWorker, VerifyWorker, calibrate_thresholds};
use lvision::{eval, evaluate_labelbank_calibration};

#[derive(Parser)]
#[command(name = "lvision")]
#[command(version)]
#[command(about = "Label bank, calibration and verification tools for the vision pipeline")]
struct Cli {
    /// Config file; defaults to `vision.toml` in the working directory when present.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Embed a seed JSONL into a label bank shard
    BuildShard(BuildShardArgs),
    /// Score a shard's calibration queries and write the report
    EvalCalibration(EvalCalibrationArgs),
    /// Derive verify thresholds from a gallery manifest
    CalibrateVerify(CalibrateVerifyArgs),
    /// Check one candidate label against the gallery
    Verify(VerifyArgs),
    /// Persist capped medoid sets from a labelled embeddings JSONL
    Promote(PromoteArgs),
    /// Run the offline pipeline over a frame directory
    Eval(EvalArgs),
}

#[derive(Args)]
struct BuildShardArgs {
    #[arg(long)]
    seed: PathBuf,
    #[arg(long)]
    out: PathBuf,
    #[arg(long)]
    dim: Option<usize>,
    #[arg(long)]
    max_n: Option<usize>,
    /// Accepted `p31` tags, comma separated.
    #[arg(long, value_delimiter = ',')]
    p31_allow: Vec<String>,
}

#[derive(Args)]
struct EvalCalibrationArgs {
    #[arg(long)]
    shard: PathBuf,
    #[arg(long)]
    out: PathBuf,
    #[arg(long, default_value_t = 0)]
    seed: u64,
    #[arg(long, default_value_t = 10)]
    k: usize,
}

#[derive(Args)]
struct CalibrateVerifyArgs {
    /// Gallery manifest; defaults to `verify.manifest_path`.
    #[arg(long)]
    manifest: Option<PathBuf>,
    /// Output artifact; defaults to `verify.calibration_path`.
    #[arg(long)]
    out: Option<PathBuf>,
    #[arg(long, default_value_t = 0)]
    seed: u64,
}

#[derive(Args)]
struct VerifyArgs {
    label: String,
}

#[derive(Args)]
struct PromoteArgs {
    /// JSONL rows of `{"label": ..., "embedding": [...]}`.
    #[arg(long)]
    input: PathBuf,
    /// Output directory; defaults to `kb.output_dir`.
    #[arg(long)]
    out: Option<PathBuf>,
}

#[derive(Args)]
struct EvalArgs {
    #[arg(long)]
    input: PathBuf,
    #[arg(long)]
    output: PathBuf,
    /// Label bank shard to match against.
    #[arg(long)]
    shard: PathBuf,
    #[arg(long)]
    warmup: Option<usize>,
    #[arg(long)]
    budget_ms: Option<u64>,
    /// Accepted unknown rate as `MIN,MAX`.
    #[arg(long, value_delimiter = ',', num_args = 2)]
    unknown_rate_band: Option<Vec<f64>>,
}

#[derive(Deserialize)]
struct LabelledEmbedding {
    label: String,
    embedding: Vec<f32>,
}

fn main() {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let code = match run(cli) {
        Ok(code) => code,
        Err(e) => {
            tracing::error!(error = %format!("{e:#}"), "command failed");
            1
        }
    };
    std::process::exit(code);
}

fn run(cli: Cli) -> anyhow::Result<i32> {
    let settings = Settings::load(cli.config.as_deref()).context("loading settings")?;

    match cli.command {
        Commands::BuildShard(args) => build_shard_cmd(args, &settings),
        Commands::EvalCalibration(args) => {
            let report =
                evaluate_labelbank_calibration(&args.shard, args.seed, args.k, &args.out)?;
            print_json(&report)?;
            Ok(0)
        }
        Commands::CalibrateVerify(args) => {
            let manifest_path = args.manifest.unwrap_or(settings.verify.manifest_path);
            let out = args.out.unwrap_or(settings.verify.calibration_path);
            let manifest = GalleryManifest::load(&manifest_path)?;
            let artifact = calibrate_thresholds(&manifest, args.seed)?;
            artifact.write(&out)?;
            print_json(&artifact)?;
            Ok(0)
        }
        Commands::Verify(args) => {
            let verify = &settings.verify;
            let mut worker =
                ManifestVerifyWorker::new(&verify.manifest_path, &verify.calibration_path);
            if let Some(ledger) = &verify.ledger_path {
                worker = worker.with_ledger(Arc::new(JsonLedger::new(ledger)));
            }
            let outcome = worker.verify(&[], &args.label)?;
            print_json(&outcome)?;
            Ok(0)
        }
        Commands::Promote(args) => promote_cmd(args, &settings),
        Commands::Eval(args) => eval_cmd(args, settings),
    }
}

fn build_shard_cmd(args: BuildShardArgs, settings: &Settings) -> anyhow::Result<i32> {
    let defaults = ShardBuildOptions::default();
    let dim = args.dim.unwrap_or(settings.label_bank.dim);
    let p31_allow = if args.p31_allow.is_empty() {
        defaults.p31_allow
    } else {
        args.p31_allow.into_iter().collect::<BTreeSet<_>>()
    };
    let opts = ShardBuildOptions {
        dim,
        seed: settings.label_bank.seed,
        max_n: args.max_n.unwrap_or(defaults.max_n),
        p31_allow,
        bank: settings.label_bank.clone(),
    };
    let manifest = build_shard(&args.seed, &args.out, &opts)?;
    print_json(&manifest)?;
    Ok(0)
}

fn promote_cmd(args: PromoteArgs, settings: &Settings) -> anyhow::Result<i32> {
    let text = fs::read_to_string(&args.input)
        .with_context(|| format!("reading {}", args.input.display()))?;
    let mut by_label: BTreeMap<String, Vec<Vec<f32>>> = BTreeMap::new();
    for (i, line) in text.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        let row: LabelledEmbedding = serde_json::from_str(line)
            .with_context(|| format!("{}:{}", args.input.display(), i + 1))?;
        by_label.entry(row.label).or_default().push(row.embedding);
    }

    let out = args.out.unwrap_or_else(|| settings.kb.output_dir.clone());
    let promoter = MedoidPromoter::new(&out).with_medoid_cap(settings.kb.medoid_cap);
    let promoter = match &settings.verify.ledger_path {
        Some(path) => promoter.with_ledger(Arc::new(JsonLedger::new(path))),
        None => promoter,
    };

    let mut outcomes = Vec::with_capacity(by_label.len());
    for (label, embeddings) in &by_label {
        outcomes.push(promoter.promote(label, embeddings)?);
    }
    print_json(&outcomes)?;
    Ok(0)
}

fn eval_cmd(args: EvalArgs, mut settings: Settings) -> anyhow::Result<i32> {
    if let Some(warmup) = args.warmup {
        settings.eval.warmup = warmup;
    }
    if let Some(budget_ms) = args.budget_ms {
        settings.latency.budget_ms = budget_ms;
    }
    if let Some(band) = args.unknown_rate_band.as_deref() {
        if let [lo, hi] = band {
            settings.eval.unknown_rate_band = (*lo, *hi);
        }
        settings.validate()?;
    }

    let bank = load_bank(&args.shard, &settings)?;
    let outcome = eval::run_eval(&args.input, &args.output, &settings, bank)?;
    print_json(&outcome.metrics)?;
    Ok(outcome.exit_code)
}

fn load_bank(dir: &Path, settings: &Settings) -> anyhow::Result<Arc<HnswInt8LabelBank>> {
    let bank = HnswInt8LabelBank::load_with_backend(dir, settings.label_bank.backend)
        .with_context(|| format!("loading shard {}", dir.display()))?;
    Ok(Arc::new(bank))
}

fn print_json<T: serde::Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
