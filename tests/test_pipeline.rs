//! Integration test: training pipeline end-to-end over CSV tables

use chrono::NaiveDate;
use ledgerml::error::LedgerMlError;
use ledgerml::evaluation::ModelMetrics;
use ledgerml::export::{ArtifactStore, FileArtifactStore, JsonFileHistory, Prediction, TrainingHistory};
use ledgerml::features::{FeatureExtractor, TabularExtractor, CATEGORIZATION_FEATURES, FRAUD_FEATURES};
use ledgerml::pipeline::{PipelineStage, RunStatus, TrainingPipeline};
use ledgerml::training::{DateRange, Hyperparameters, ModelKind, TrainingConfig};
use std::fmt::Write as _;
use std::path::Path;

fn day(d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 3, d).unwrap()
}

fn march() -> DateRange {
    DateRange::new(day(1), day(31)).unwrap()
}

fn write_fraud_csv(path: &Path, n: usize) {
    let mut csv = format!("date,label,{}\n", FRAUD_FEATURES.join(","));
    for i in 0..n {
        let fraud = i % 5 == 0;
        let values = if fraud {
            [
                900.0 + (i % 7) as f64 * 30.0,
                3.0,
                (i % 4) as f64,
                (i % 2) as f64,
                0.8,
                6.0,
                14.0,
                250.0,
                1.0,
                3.0,
            ]
        } else {
            [
                20.0 + (i % 30) as f64 * 3.0,
                -0.2,
                9.0 + (i % 10) as f64,
                (i % 2) as f64,
                0.1,
                1.0,
                3.0,
                2.0,
                0.0,
                0.0,
            ]
        };
        let values: Vec<String> = values.iter().map(|v| v.to_string()).collect();
        writeln!(
            csv,
            "{},{},{}",
            day((i % 28) as u32 + 1),
            if fraud { 1 } else { 0 },
            values.join(",")
        )
        .unwrap();
    }
    std::fs::write(path, csv).unwrap();
}

fn write_categorization_csv(path: &Path, n: usize) {
    let rows = [
        ("buy airtime safaricom", "MOBILE_MONEY.AIRTIME", 50.0),
        ("airtime topup", "MOBILE_MONEY.AIRTIME", 100.0),
        ("naivas supermarket groceries", "GROCERIES", 1200.0),
        ("groceries market", "GROCERIES", 800.0),
        ("kplc power bill", "UTILITIES", 2000.0),
        ("water bill payment", "UTILITIES", 600.0),
    ];
    let mut csv = format!("date,label,description,{}\n", CATEGORIZATION_FEATURES.join(","));
    for i in 0..n {
        let (text, label, amount) = rows[i % rows.len()];
        writeln!(
            csv,
            "{},{},{},{},1,{},{}",
            day((i % 28) as u32 + 1),
            label,
            text,
            amount + i as f64,
            8 + i % 12,
            i % 7
        )
        .unwrap();
    }
    std::fs::write(path, csv).unwrap();
}

fn fraud_config(version: &str) -> TrainingConfig {
    TrainingConfig::new(ModelKind::FraudDetection, version, march()).with_hyperparameters(Hyperparameters {
        num_trees: Some(12),
        max_depth: Some(5),
        min_samples_split: Some(4),
        min_samples_leaf: Some(2),
        ..Default::default()
    })
}

#[test]
fn test_fraud_pipeline_end_to_end() {
    let dir = tempfile::tempdir().unwrap();
    let data = dir.path().join("fraud.csv");
    write_fraud_csv(&data, 200);
    let extractor = TabularExtractor::from_csv(&data, ModelKind::FraudDetection).unwrap();

    let store_dir = dir.path().join("store");
    let pipeline = TrainingPipeline::new(
        FileArtifactStore::new(&store_dir),
        JsonFileHistory::open(store_dir.join("history.json")).unwrap(),
    );
    let outcome = pipeline.train_model(&fraud_config("2024.03"), &extractor).unwrap();

    assert_eq!(outcome.run.status, RunStatus::Success);
    assert_eq!(outcome.run.sample_count, 200);
    match outcome.run.headline_metrics() {
        Some(ModelMetrics::Classification(m)) => {
            assert!(m.threshold >= 0.10 && m.threshold <= 0.90);
            assert!(m.auc_roc > 0.9);
        }
        other => panic!("expected classification metrics, got {:?}", other),
    }

    let location = outcome.run.artifact_location.clone().unwrap();
    let loaded = pipeline.store().load(&location).unwrap();
    assert_eq!(loaded, outcome.artifact);

    let record = &extractor.all_records()[0];
    let sample = extractor.extract(record).unwrap();
    match loaded.predict(&sample).unwrap() {
        Prediction::Fraud { probability, is_fraud, .. } => {
            assert!((0.0..=1.0).contains(&probability));
            assert!(is_fraud);
        }
        other => panic!("expected fraud prediction, got {:?}", other),
    }

    let reopened = JsonFileHistory::open(store_dir.join("history.json")).unwrap();
    assert_eq!(reopened.runs(Some(ModelKind::FraudDetection)).unwrap().len(), 1);
}

#[test]
fn test_deploy_and_compare_versions() {
    let dir = tempfile::tempdir().unwrap();
    let data = dir.path().join("fraud.csv");
    write_fraud_csv(&data, 150);
    let extractor = TabularExtractor::from_csv(&data, ModelKind::FraudDetection).unwrap();
    let pipeline = TrainingPipeline::new(
        FileArtifactStore::new(dir.path().join("store")),
        JsonFileHistory::open(dir.path().join("store/history.json")).unwrap(),
    );

    pipeline.train_model(&fraud_config("v1"), &extractor).unwrap();
    pipeline
        .train_model(&fraud_config("v2").with_seed(7), &extractor)
        .unwrap();

    let cmp = pipeline.history().compare(ModelKind::FraudDetection, "v1", "v2").unwrap();
    assert_eq!(cmp.metric.as_deref(), Some("f1_score"));
    assert!(cmp.delta().is_some());

    let deployed = pipeline.history().mark_deployed(ModelKind::FraudDetection, "v2").unwrap();
    let active = pipeline.history().active(ModelKind::FraudDetection).unwrap().unwrap();
    assert_eq!(active.model_id, deployed.model_id);

    let err = pipeline
        .history()
        .mark_deployed(ModelKind::FraudDetection, "v3")
        .unwrap_err();
    assert!(matches!(err, LedgerMlError::NotFound(_)));
    let err = pipeline
        .history()
        .mark_deployed(ModelKind::CreditScoring, "v1")
        .unwrap_err();
    assert!(matches!(err, LedgerMlError::NotFound(_)));
}

#[test]
fn test_categorization_pipeline() {
    let dir = tempfile::tempdir().unwrap();
    let data = dir.path().join("categories.csv");
    write_categorization_csv(&data, 120);
    let extractor = TabularExtractor::from_csv(&data, ModelKind::Categorization).unwrap();
    assert_eq!(extractor.categories().len(), 3);

    let config = TrainingConfig::new(ModelKind::Categorization, "cat-1", march()).with_hyperparameters(
        Hyperparameters {
            min_doc_freq: Some(2),
            ..Default::default()
        },
    );
    let pipeline = TrainingPipeline::new(
        FileArtifactStore::new(dir.path().join("store")),
        JsonFileHistory::open(dir.path().join("store/history.json")).unwrap(),
    );
    let outcome = pipeline.train_model(&config, &extractor).unwrap();

    match outcome.run.headline_metrics() {
        Some(ModelMetrics::Multiclass(m)) => assert!(m.accuracy > 0.9),
        other => panic!("expected multiclass metrics, got {:?}", other),
    }

    let sample = extractor.extract(&extractor.all_records()[1]).unwrap();
    match outcome.artifact.predict(&sample).unwrap() {
        Prediction::Category { name, .. } => assert_eq!(name, "MOBILE_MONEY.AIRTIME"),
        other => panic!("expected category, got {:?}", other),
    }
}

#[test]
fn test_failed_run_is_recorded_and_nothing_is_saved() {
    let dir = tempfile::tempdir().unwrap();
    let data = dir.path().join("fraud.csv");
    write_fraud_csv(&data, 50);
    let extractor = TabularExtractor::from_csv(&data, ModelKind::FraudDetection).unwrap();

    let store_dir = dir.path().join("store");
    let pipeline = TrainingPipeline::new(
        FileArtifactStore::new(&store_dir),
        JsonFileHistory::open(store_dir.join("history.json")).unwrap(),
    );
    let mut config = fraud_config("2023.01");
    config.date_range = DateRange::new(
        NaiveDate::from_ymd_opt(2023, 1, 1).unwrap(),
        NaiveDate::from_ymd_opt(2023, 1, 31).unwrap(),
    )
    .unwrap();

    let err = pipeline.train_model(&config, &extractor).unwrap_err();
    assert!(matches!(err, LedgerMlError::EmptyDataset(_)));

    let runs = JsonFileHistory::open(store_dir.join("history.json"))
        .unwrap()
        .runs(None)
        .unwrap();
    assert_eq!(runs.len(), 1);
    assert_eq!(runs[0].status, RunStatus::Failed);
    assert_eq!(runs[0].failed_stage, Some(PipelineStage::Preparing));
    assert!(runs[0].artifact_location.is_none());
    assert!(!store_dir.join("fraud_detection").exists());
}

#[test]
fn test_persistence_failure_hands_back_artifact() {
    let dir = tempfile::tempdir().unwrap();
    let data = dir.path().join("fraud.csv");
    write_fraud_csv(&data, 120);
    let extractor = TabularExtractor::from_csv(&data, ModelKind::FraudDetection).unwrap();

    // A regular file where the store directory should be
    let blocked = dir.path().join("blocked");
    std::fs::write(&blocked, b"not a directory").unwrap();
    let pipeline = TrainingPipeline::new(
        FileArtifactStore::new(&blocked),
        JsonFileHistory::open(dir.path().join("history.json")).unwrap(),
    );

    let err = pipeline.train_model(&fraud_config("v1"), &extractor).unwrap_err();
    let artifact = match err {
        LedgerMlError::PersistenceFailed { artifact, .. } => artifact,
        other => panic!("expected persistence failure, got {:?}", other),
    };
    let runs = pipeline.history().runs(None).unwrap();
    assert_eq!(runs[0].failed_stage, Some(PipelineStage::Persisting));

    let retry = FileArtifactStore::new(dir.path().join("store"));
    let location = retry
        .save(&artifact, &retry.default_location(artifact.model_kind, &artifact.version))
        .unwrap();
    assert_eq!(retry.load(&location).unwrap(), *artifact);
}
