//! LedgerML CLI Module
//!
//! Command-line interface for training, prediction and model history.

use clap::{Parser, Subcommand};
use colored::*;
use std::path::{Path, PathBuf};
use std::time::Instant;

use crate::evaluation::ModelMetrics;
use crate::export::{
    FileArtifactStore, JsonFileHistory, Prediction, SerializationFormat, TrainingHistory,
};
use crate::features::{FeatureExtractor, TabularExtractor};
use crate::pipeline::{TrainingPipeline, TrainingRun};
use crate::training::{ModelKind, TrainingConfig};

/// File name of the run history inside a store directory
pub const HISTORY_FILE: &str = "history.json";

// ─── Styling helpers ───────────────────────────────────────────────────────────

fn dim(s: &str) -> ColoredString    { s.truecolor(100, 100, 100) }
fn accent(s: &str) -> ColoredString { s.truecolor(120, 170, 255) }
fn muted(s: &str) -> ColoredString  { s.truecolor(140, 140, 140) }
fn ok(s: &str) -> ColoredString     { s.truecolor(100, 210, 120) }

fn step_run(msg: &str) {
    print!("  {} {}... ", accent("›"), msg);
}

fn step_done(detail: &str) {
    println!("{} {}", ok("done"), dim(detail));
}

fn section(title: &str) {
    println!();
    println!("  {}", title.white().bold());
    println!("  {}", dim(&"─".repeat(56)));
}

fn kv(key: &str, val: &str) {
    println!("  {:<18} {}", muted(key), val.white());
}

// ─── CLI definition ────────────────────────────────────────────────────────────

#[derive(Parser)]
#[command(name = "ledgerml")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Fraud, credit-score and categorization model training")]
#[command(long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Train a model and record the run
    Train {
        /// Training configuration (JSON)
        #[arg(short, long)]
        config: PathBuf,

        /// Transaction table (CSV)
        #[arg(short, long)]
        data: PathBuf,

        /// Directory holding artifacts and the run history
        #[arg(short, long)]
        store: PathBuf,

        /// Artifact encoding (json, bincode)
        #[arg(long, default_value = "json")]
        format: String,
    },

    /// Predict every row of a table with a saved artifact
    Predict {
        /// Saved model artifact
        #[arg(short, long)]
        artifact: PathBuf,

        /// Transaction table (CSV)
        #[arg(short, long)]
        data: PathBuf,

        /// Write predictions as JSON to this file instead of the console
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// List recorded training runs
    History {
        #[arg(short, long)]
        store: PathBuf,

        /// Only runs of this kind
        #[arg(short, long)]
        kind: Option<String>,
    },

    /// Mark a successfully trained version as the active model
    Deploy {
        #[arg(short, long)]
        store: PathBuf,

        #[arg(short, long)]
        kind: String,

        #[arg(short, long)]
        version: String,
    },

    /// Compare the headline metric of two versions
    Compare {
        #[arg(short, long)]
        store: PathBuf,

        #[arg(short, long)]
        kind: String,

        #[arg(long)]
        baseline: String,

        #[arg(long)]
        candidate: String,
    },
}

fn open_history(store: &Path) -> anyhow::Result<JsonFileHistory> {
    Ok(JsonFileHistory::open(store.join(HISTORY_FILE))?)
}

fn parse_kind(kind: &str) -> anyhow::Result<ModelKind> {
    Ok(kind.parse::<ModelKind>()?)
}

fn parse_format(format: &str) -> anyhow::Result<SerializationFormat> {
    match format.to_lowercase().as_str() {
        "json" => Ok(SerializationFormat::Json),
        "bincode" | "bin" => Ok(SerializationFormat::Bincode),
        _ => anyhow::bail!("Unsupported artifact format: {}", format),
    }
}

fn print_metrics(label: &str, metrics: &ModelMetrics) {
    match metrics {
        ModelMetrics::Classification(m) => {
            kv(
                label,
                &format!(
                    "f1 {:.4}  auc {:.4}  precision {:.4}  recall {:.4}  threshold {:.2}",
                    m.f1_score, m.auc_roc, m.precision, m.recall, m.threshold
                ),
            );
        }
        ModelMetrics::Regression(m) => {
            kv(
                label,
                &format!(
                    "r2 {:.4}  rmse {:.2}  mae {:.2}  within ±{:.0} {:.1}%",
                    m.r2,
                    m.rmse,
                    m.mae,
                    m.tolerance,
                    m.within_tolerance * 100.0
                ),
            );
        }
        ModelMetrics::Multiclass(m) => {
            kv(
                label,
                &format!(
                    "macro f1 {:.4}  accuracy {:.4}  classes {}",
                    m.macro_f1, m.accuracy, m.n_classes
                ),
            );
        }
    }
}

fn print_run_row(run: &TrainingRun, active: bool) {
    let status = if run.is_success() {
        ok("SUCCESS")
    } else {
        "FAILED".red()
    };
    let headline = run
        .headline_metrics()
        .map(|m| format!("{} {:.4}", m.primary_name(), m.primary()))
        .unwrap_or_else(|| "-".to_string());
    let marker = if active { accent("*") } else { " ".normal() };
    println!(
        "  {} {:<16} {:<12} {:<8} {:>8} {:>9}ms  {}",
        marker,
        run.model_kind.as_str().to_lowercase(),
        run.version,
        status,
        run.sample_count,
        run.duration_ms,
        headline
    );
    if let Some(err) = &run.error {
        println!("    {}", dim(err));
    }
}

// ─── Commands ──────────────────────────────────────────────────────────────────

pub fn cmd_train(config_path: &Path, data_path: &Path, store_dir: &Path, format: &str) -> anyhow::Result<()> {
    section("Train");

    let config = TrainingConfig::from_json_file(config_path)?;
    kv("Model", config.model_kind.as_str());
    kv("Version", &config.version);
    kv(
        "Date range",
        &format!("{} .. {}", config.date_range.start, config.date_range.end),
    );

    step_run("Loading data");
    let start = Instant::now();
    let extractor = TabularExtractor::from_csv(data_path, config.model_kind)?;
    step_done(&format!("{} rows in {:?}", extractor.len(), start.elapsed()));

    let store = FileArtifactStore::new(store_dir).with_format(parse_format(format)?);
    let pipeline = TrainingPipeline::new(store, open_history(store_dir)?);

    step_run(&format!("Training {}", config.model_kind.as_str().to_lowercase().cyan()));
    let start = Instant::now();
    let outcome = match pipeline.train_model(&config, &extractor) {
        Ok(outcome) => outcome,
        Err(err) => {
            println!("{}", "failed".red());
            return Err(err.into());
        }
    };
    step_done(&format!("{:?}", start.elapsed()));

    println!();
    kv("Run", &outcome.run.model_id.to_string());
    kv("Samples", &outcome.run.sample_count.to_string());
    if let Some(report) = &outcome.run.metrics {
        if let Some(metrics) = &report.validation {
            print_metrics("Validation", metrics);
        }
        if let Some(metrics) = &report.test {
            print_metrics("Test", metrics);
        }
    }
    if let Some(location) = &outcome.run.artifact_location {
        kv("Artifact", location);
    }
    println!();
    Ok(())
}

pub fn cmd_predict(artifact_path: &Path, data_path: &Path, output: Option<&Path>) -> anyhow::Result<()> {
    section("Predict");

    step_run("Loading artifact");
    let artifact = FileArtifactStore::load_path(artifact_path)?;
    step_done(&format!("{} {}", artifact.model_kind.as_str().to_lowercase(), artifact.version));

    let extractor = TabularExtractor::from_csv(data_path, artifact.model_kind)?;
    let mut predictions = Vec::with_capacity(extractor.len());
    let mut skipped = 0usize;
    for record in extractor.all_records() {
        match extractor.extract(record).and_then(|sample| artifact.predict(&sample)) {
            Ok(prediction) => predictions.push((record.row, prediction)),
            Err(err) => {
                skipped += 1;
                tracing::warn!(row = record.row, error = %err, "Skipping row");
            }
        }
    }

    if let Some(path) = output {
        let rows: Vec<&Prediction> = predictions.iter().map(|(_, p)| p).collect();
        std::fs::write(path, serde_json::to_vec_pretty(&rows)?)?;
        kv("Written", &path.display().to_string());
    } else {
        println!();
        for (row, prediction) in &predictions {
            let text = match prediction {
                Prediction::Fraud {
                    probability,
                    is_fraud,
                    risk_level,
                } => format!(
                    "{:.4}  {}  {:?}",
                    probability,
                    if *is_fraud { "FRAUD".red() } else { "ok".normal() },
                    risk_level
                ),
                Prediction::CreditScore { score, band } => format!("{:.0}  {:?}", score, band),
                Prediction::Category { name, .. } => name.clone(),
            };
            println!("  {:>6}  {}", muted(&row.to_string()), text);
        }
    }
    println!();
    kv("Predicted", &predictions.len().to_string());
    if skipped > 0 {
        kv("Skipped", &skipped.to_string().yellow().to_string());
    }
    println!();
    Ok(())
}

pub fn cmd_history(store_dir: &Path, kind: Option<&str>) -> anyhow::Result<()> {
    section("History");
    let history = open_history(store_dir)?;
    let kind = kind.map(parse_kind).transpose()?;
    let runs = history.runs(kind)?;
    if runs.is_empty() {
        println!("  {}", dim("no runs recorded"));
        println!();
        return Ok(());
    }

    let mut active = Vec::new();
    for k in ModelKind::ALL {
        if let Some(id) = history.active_id(k)? {
            active.push(id);
        }
    }
    for run in &runs {
        print_run_row(run, active.contains(&run.model_id));
    }
    println!();
    Ok(())
}

pub fn cmd_deploy(store_dir: &Path, kind: &str, version: &str) -> anyhow::Result<()> {
    section("Deploy");
    let history = open_history(store_dir)?;
    let run = history.mark_deployed(parse_kind(kind)?, version)?;
    println!("  {} {} {} is now active", ok("✓"), run.model_kind.as_str().to_lowercase(), run.version.bold());
    if let Some(location) = &run.artifact_location {
        kv("Artifact", location);
    }
    println!();
    Ok(())
}

pub fn cmd_compare(store_dir: &Path, kind: &str, baseline: &str, candidate: &str) -> anyhow::Result<()> {
    section("Compare");
    let history = open_history(store_dir)?;
    let cmp = history.compare(parse_kind(kind)?, baseline, candidate)?;

    let metric = cmp.metric.as_deref().unwrap_or("-");
    let fmt_value = |v: Option<f64>| v.map(|v| format!("{:.4}", v)).unwrap_or_else(|| "-".to_string());
    println!("  {:<12} {:>12} {:>12}", muted("Version"), muted(metric), muted("Samples"));
    println!("  {}", dim(&"─".repeat(38)));
    println!(
        "  {:<12} {:>12} {:>12}",
        cmp.baseline.version,
        fmt_value(cmp.baseline_value),
        cmp.baseline.sample_count
    );
    println!(
        "  {:<12} {:>12} {:>12}",
        cmp.candidate.version,
        fmt_value(cmp.candidate_value),
        cmp.candidate.sample_count
    );
    println!();
    match cmp.delta() {
        Some(delta) if cmp.candidate_improves() => {
            println!("  {} {} improves {} by {:+.4}", ok("✓"), candidate.bold(), metric, delta)
        }
        Some(delta) => println!("  {} {} changes {} by {:+.4}", "!".yellow(), candidate.bold(), metric, delta),
        None => println!("  {}", dim("no comparable metrics")),
    }
    println!();
    Ok(())
}

pub fn run(cli: Cli) -> anyhow::Result<()> {
    match cli.command {
        Commands::Train {
            config,
            data,
            store,
            format,
        } => cmd_train(&config, &data, &store, &format),
        Commands::Predict { artifact, data, output } => cmd_predict(&artifact, &data, output.as_deref()),
        Commands::History { store, kind } => cmd_history(&store, kind.as_deref()),
        Commands::Deploy { store, kind, version } => cmd_deploy(&store, &kind, &version),
        Commands::Compare {
            store,
            kind,
            baseline,
            candidate,
        } => cmd_compare(&store, &kind, &baseline, &candidate),
    }
}
