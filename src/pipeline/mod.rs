//! Training pipeline orchestrator
//!
//! One synchronous `train_model` call walks the stage machine
//! `PREPARING → TRAINING → VALIDATING → TESTING → PERSISTING → RECORDED`.
//! Any error moves the run to `FAILED`, is recorded in the training history
//! together with the stage it happened in, and is returned to the caller.
//! Nothing is written to the artifact store unless every earlier stage
//! succeeded.

mod run;

pub use run::{PipelineStage, RunStatus, TrainingRun};

use crate::dataset::{Dataset, DatasetSplit, LabeledSample};
use crate::error::{LedgerMlError, Result};
use crate::evaluation::{EvaluationReport, Evaluator, ModelMetrics};
use crate::export::{ArtifactStore, SerializedModel, TrainedModel, TrainingHistory};
use crate::features::FeatureExtractor;
use crate::training::naive_bayes::category_indices;
use crate::training::{
    GradientBoostingModel, ModelKind, NaiveBayesModel, RandomForestModel, ThresholdSource, TrainingConfig,
};
use crate::utils::Timer;
use chrono::Utc;
use rand::SeedableRng;
use rand_xoshiro::Xoshiro256PlusPlus;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// Credit-score predictions within this many points count as accurate
pub const CREDIT_SCORE_TOLERANCE: f64 = 50.0;

/// Artifact and run record of a successful call
#[derive(Debug, Clone)]
pub struct TrainingOutcome {
    pub run: TrainingRun,
    pub artifact: SerializedModel,
}

/// Current stage of one run, logged on every transition
struct StageTracker<'a> {
    model_id: Uuid,
    kind: ModelKind,
    version: &'a str,
    stage: PipelineStage,
    sample_count: usize,
}

impl<'a> StageTracker<'a> {
    fn new(model_id: Uuid, kind: ModelKind, version: &'a str) -> Self {
        info!(%model_id, kind = %kind, version, stage = %PipelineStage::Preparing, "Training run started");
        Self {
            model_id,
            kind,
            version,
            stage: PipelineStage::Preparing,
            sample_count: 0,
        }
    }

    fn enter(&mut self, stage: PipelineStage) {
        debug_assert_eq!(self.stage.next(), Some(stage));
        info!(
            model_id = %self.model_id,
            kind = %self.kind,
            version = self.version,
            from = %self.stage,
            to = %stage,
            "Pipeline stage transition"
        );
        self.stage = stage;
    }
}

/// Orchestrates extraction, training, evaluation, persistence and recording
pub struct TrainingPipeline<S, H> {
    store: S,
    history: H,
}

impl<S: ArtifactStore, H: TrainingHistory> TrainingPipeline<S, H> {
    pub fn new(store: S, history: H) -> Self {
        Self { store, history }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn history(&self) -> &H {
        &self.history
    }

    /// Run one training job end to end
    pub fn train_model<E: FeatureExtractor>(&self, config: &TrainingConfig, extractor: &E) -> Result<TrainingOutcome> {
        let timer = Timer::start();
        let model_id = Uuid::new_v4();
        let mut tracker = StageTracker::new(model_id, config.model_kind, &config.version);

        let staged = self.run_stages(config, extractor, &mut tracker);
        let recorded = staged.and_then(|(artifact, report, location)| {
            let run = TrainingRun {
                model_id,
                model_kind: config.model_kind,
                version: config.version.clone(),
                status: RunStatus::Success,
                metrics: Some(report),
                duration_ms: timer.elapsed_ms(),
                sample_count: tracker.sample_count,
                artifact_location: Some(location.clone()),
                created_at: Utc::now(),
                error: None,
                failed_stage: None,
            };
            if let Err(err) = self.history.append(run.clone()) {
                // The saved artifact is orphaned; the failed run below still names its stage
                warn!(%model_id, location = %location, "Artifact saved but the run could not be recorded");
                return Err(err);
            }
            Ok(TrainingOutcome { run, artifact })
        });

        match recorded {
            Ok(outcome) => {
                tracker.enter(PipelineStage::Recorded);
                info!(
                    %model_id,
                    kind = %config.model_kind,
                    version = %config.version,
                    duration_ms = outcome.run.duration_ms,
                    samples = outcome.run.sample_count,
                    "Training run recorded"
                );
                Ok(outcome)
            }
            Err(err) => {
                let failed_stage = tracker.stage;
                error!(
                    %model_id,
                    kind = %config.model_kind,
                    version = %config.version,
                    stage = %failed_stage,
                    error = %err,
                    "Training run failed"
                );
                let run = TrainingRun {
                    model_id,
                    model_kind: config.model_kind,
                    version: config.version.clone(),
                    status: RunStatus::Failed,
                    metrics: None,
                    duration_ms: timer.elapsed_ms(),
                    sample_count: tracker.sample_count,
                    artifact_location: None,
                    created_at: Utc::now(),
                    error: Some(err.to_string()),
                    failed_stage: Some(failed_stage),
                };
                if let Err(record_err) = self.history.append(run) {
                    error!(%model_id, error = %record_err, "Could not record failed training run");
                }
                Err(err)
            }
        }
    }

    fn run_stages<E: FeatureExtractor>(
        &self,
        config: &TrainingConfig,
        extractor: &E,
        tracker: &mut StageTracker<'_>,
    ) -> Result<(SerializedModel, EvaluationReport, String)> {
        // PREPARING
        config.validate()?;
        if extractor.kind() != config.model_kind {
            return Err(LedgerMlError::ConfigError(format!(
                "extractor produces {} samples but the run trains {}",
                extractor.kind(),
                config.model_kind
            )));
        }
        let hyperparameters = config.hyperparameters.resolve(config.model_kind)?;
        let dataset = prepare_dataset(config, extractor)?;
        tracker.sample_count = dataset.len();

        let mut rng = Xoshiro256PlusPlus::seed_from_u64(config.seed);
        let train_frac = config.train_fraction();
        let DatasetSplit { train, validation, test } = match config.model_kind {
            ModelKind::FraudDetection => {
                let split = dataset.stratified_split(train_frac, config.validation_split, config.test_split, &mut rng)?;
                let (pos_before, neg_before) = split.train.binary_counts();
                let train = split.train.balance(config.target_minority_ratio, &mut rng)?;
                let (pos_after, neg_after) = train.binary_counts();
                info!(pos_before, neg_before, pos_after, neg_after, "Balanced training partition");
                DatasetSplit { train, ..split }
            }
            _ => dataset.split(train_frac, config.validation_split, config.test_split, &mut rng)?,
        };
        info!(
            train = train.len(),
            validation = validation.len(),
            test = test.len(),
            "Partitioned dataset"
        );

        // TRAINING
        tracker.enter(PipelineStage::Training);
        let model = match config.model_kind {
            ModelKind::FraudDetection => {
                TrainedModel::RandomForest(RandomForestModel::fit(&hyperparameters.forest_config(config.seed), &train)?)
            }
            ModelKind::CreditScoring => {
                TrainedModel::GradientBoosting(GradientBoostingModel::fit(&hyperparameters.boosting_config(), &train)?)
            }
            ModelKind::Categorization => TrainedModel::NaiveBayes(NaiveBayesModel::fit(
                &hyperparameters.naive_bayes_config(),
                &train,
                extractor.categories(),
            )?),
        };

        // VALIDATING
        tracker.enter(PipelineStage::Validating);
        let model = match model {
            TrainedModel::RandomForest(forest) => {
                TrainedModel::RandomForest(tune_threshold(forest, config.threshold_source, &validation)?)
            }
            other => other,
        };
        let validation_metrics = evaluate(&model, &validation)?;
        if let Some(metrics) = &validation_metrics {
            info!(metric = metrics.primary_name(), value = metrics.primary(), "Validation metrics");
        }

        // TESTING
        tracker.enter(PipelineStage::Testing);
        let test_metrics = evaluate(&model, &test)?;
        if let Some(metrics) = &test_metrics {
            info!(metric = metrics.primary_name(), value = metrics.primary(), "Test metrics");
        }

        // PERSISTING
        tracker.enter(PipelineStage::Persisting);
        let artifact = SerializedModel::new(config.version.clone(), model);
        let location = self.store.default_location(config.model_kind, &config.version);
        let saved_at = match self.store.save(&artifact, &location) {
            Ok(saved_at) => saved_at,
            Err(err) => {
                return Err(LedgerMlError::PersistenceFailed {
                    location,
                    reason: err.to_string(),
                    artifact: Box::new(artifact),
                })
            }
        };

        let report = EvaluationReport {
            validation: validation_metrics,
            test: test_metrics,
        };
        Ok((artifact, report, saved_at))
    }
}

/// Extract every record in the date range, skipping records that fail or carry NaN/infinite values
fn prepare_dataset<E: FeatureExtractor>(config: &TrainingConfig, extractor: &E) -> Result<Dataset> {
    let feature_names = extractor.feature_names();
    let records = extractor.records(&config.date_range)?;
    let n_records = records.len();

    let mut samples = Vec::with_capacity(n_records);
    let mut skipped = 0usize;
    for (idx, record) in records.iter().enumerate() {
        match extractor.extract(record) {
            Ok(sample) if !is_finite_sample(&sample) => {
                skipped += 1;
                warn!(record = idx, "Skipping record with non-finite values");
            }
            Ok(sample) if sample.features().len() == feature_names.len() => samples.push(sample),
            Ok(sample) => {
                skipped += 1;
                warn!(
                    record = idx,
                    expected = feature_names.len(),
                    actual = sample.features().len(),
                    "Skipping record with wrong feature count"
                );
            }
            Err(err) => {
                skipped += 1;
                warn!(record = idx, error = %err, "Skipping record that failed extraction");
            }
        }
    }

    info!(records = n_records, samples = samples.len(), skipped, "Prepared dataset");
    if samples.is_empty() {
        return Err(LedgerMlError::EmptyDataset(format!(
            "no usable {} records between {} and {} ({} read, {} skipped)",
            config.model_kind, config.date_range.start, config.date_range.end, n_records, skipped
        )));
    }
    Dataset::new(feature_names, samples)
}

fn is_finite_sample(sample: &LabeledSample) -> bool {
    sample.label().is_finite() && sample.features().as_array().iter().all(|v| v.is_finite())
}

/// Re-tune the forest threshold on the validation partition when asked and possible
fn tune_threshold(forest: RandomForestModel, source: ThresholdSource, validation: &Dataset) -> Result<RandomForestModel> {
    match source {
        ThresholdSource::Training => Ok(forest),
        ThresholdSource::Validation => {
            let (positives, negatives) = validation.binary_counts();
            if positives > 0 && negatives > 0 {
                let tuned = forest.tuned_on(validation)?;
                debug!(threshold = tuned.threshold, "Threshold tuned on validation partition");
                Ok(tuned)
            } else {
                warn!(
                    positives,
                    negatives, "Validation partition lacks a class; keeping the training-set threshold"
                );
                Ok(forest)
            }
        }
    }
}

/// Metrics of `model` on `dataset`, or `None` for an empty partition
pub fn evaluate(model: &TrainedModel, dataset: &Dataset) -> Result<Option<ModelMetrics>> {
    if dataset.is_empty() {
        return Ok(None);
    }
    let labels = dataset.labels().to_vec();
    let metrics = match model {
        TrainedModel::RandomForest(forest) => {
            let scores = forest.predict_proba(&dataset.features_matrix())?.to_vec();
            ModelMetrics::Classification(Evaluator::classification(&labels, &scores, forest.threshold)?)
        }
        TrainedModel::GradientBoosting(boosting) => {
            let predictions = boosting.predict(&dataset.features_matrix())?.to_vec();
            ModelMetrics::Regression(Evaluator::regression(&labels, &predictions, CREDIT_SCORE_TOLERANCE)?)
        }
        TrainedModel::NaiveBayes(bayes) => {
            let truth = category_indices(dataset, bayes.n_categories())?;
            let predicted = bayes.predict_dataset(dataset)?;
            ModelMetrics::Multiclass(Evaluator::multiclass(&truth, &predicted)?)
        }
    };
    Ok(Some(metrics))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::export::InMemoryTrainingHistory;
    use crate::training::{DateRange, Hyperparameters};
    use chrono::NaiveDate;
    use parking_lot::Mutex;

    /// Records are `(day, features, label)`; a NaN label fails extraction
    struct VecExtractor {
        kind: ModelKind,
        names: Vec<String>,
        rows: Vec<(u32, Vec<f64>, f64)>,
    }

    impl FeatureExtractor for VecExtractor {
        type Record = (u32, Vec<f64>, f64);

        fn kind(&self) -> ModelKind {
            self.kind
        }

        fn feature_names(&self) -> Vec<String> {
            self.names.clone()
        }

        fn records(&self, range: &DateRange) -> Result<Vec<Self::Record>> {
            Ok(self
                .rows
                .iter()
                .filter(|(day, _, _)| {
                    NaiveDate::from_ymd_opt(2024, 1, *day)
                        .map(|d| range.contains(d))
                        .unwrap_or(false)
                })
                .cloned()
                .collect())
        }

        fn extract(&self, record: &Self::Record) -> Result<LabeledSample> {
            if record.2.is_nan() {
                return Err(LedgerMlError::DataError("missing label".to_string()));
            }
            Ok(LabeledSample::new(record.1.clone(), record.2))
        }
    }

    /// Store that always fails, remembering how often it was asked
    #[derive(Default)]
    struct FailingStore {
        attempts: Mutex<usize>,
    }

    impl ArtifactStore for FailingStore {
        fn save(&self, _artifact: &SerializedModel, location: &str) -> Result<String> {
            *self.attempts.lock() += 1;
            Err(LedgerMlError::IoError(std::io::Error::new(
                std::io::ErrorKind::PermissionDenied,
                format!("read-only: {}", location),
            )))
        }

        fn load(&self, location: &str) -> Result<SerializedModel> {
            Err(LedgerMlError::NotFound(location.to_string()))
        }
    }

    /// Store that keeps artifacts in memory
    #[derive(Default)]
    struct MemoryStore {
        saved: Mutex<Vec<(String, SerializedModel)>>,
    }

    impl ArtifactStore for MemoryStore {
        fn save(&self, artifact: &SerializedModel, location: &str) -> Result<String> {
            self.saved.lock().push((location.to_string(), artifact.clone()));
            Ok(location.to_string())
        }

        fn load(&self, location: &str) -> Result<SerializedModel> {
            self.saved
                .lock()
                .iter()
                .find(|(l, _)| l == location)
                .map(|(_, a)| a.clone())
                .ok_or_else(|| LedgerMlError::NotFound(location.to_string()))
        }
    }

    /// History that refuses successful runs but keeps failed ones
    #[derive(Default)]
    struct FailureOnlyHistory {
        inner: InMemoryTrainingHistory,
    }

    impl TrainingHistory for FailureOnlyHistory {
        fn append(&self, run: TrainingRun) -> Result<()> {
            if run.is_success() {
                return Err(LedgerMlError::IoError(std::io::Error::new(
                    std::io::ErrorKind::Other,
                    "history volume is full",
                )));
            }
            self.inner.append(run)
        }

        fn runs(&self, kind: Option<ModelKind>) -> Result<Vec<TrainingRun>> {
            self.inner.runs(kind)
        }

        fn set_active(&self, kind: ModelKind, model_id: Uuid) -> Result<()> {
            self.inner.set_active(kind, model_id)
        }

        fn active_id(&self, kind: ModelKind) -> Result<Option<Uuid>> {
            self.inner.active_id(kind)
        }
    }

    fn january() -> DateRange {
        DateRange::new(
            NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
            NaiveDate::from_ymd_opt(2024, 1, 31).unwrap(),
        )
        .unwrap()
    }

    fn credit_extractor(n: usize) -> VecExtractor {
        let rows = (0..n)
            .map(|i| {
                let income = 100.0 + (i % 25) as f64 * 40.0;
                let overdrafts = (i % 4) as f64;
                let score = 450.0 + income * 0.2 - overdrafts * 20.0;
                ((i % 28) as u32 + 1, vec![income, overdrafts], score)
            })
            .collect();
        VecExtractor {
            kind: ModelKind::CreditScoring,
            names: vec!["monthly_income".into(), "overdraft_count".into()],
            rows,
        }
    }

    fn small_config(kind: ModelKind) -> TrainingConfig {
        TrainingConfig::new(kind, "test-1", january()).with_hyperparameters(Hyperparameters {
            num_trees: Some(10),
            max_depth: Some(3),
            min_samples_split: Some(4),
            min_samples_leaf: Some(2),
            ..Default::default()
        })
    }

    #[test]
    fn test_successful_run_is_recorded_once() {
        let pipeline = TrainingPipeline::new(MemoryStore::default(), InMemoryTrainingHistory::new());
        let outcome = pipeline
            .train_model(&small_config(ModelKind::CreditScoring), &credit_extractor(120))
            .unwrap();

        assert!(outcome.run.is_success());
        assert_eq!(outcome.run.sample_count, 120);
        assert!(outcome.run.metrics.as_ref().unwrap().validation.is_some());
        assert_eq!(pipeline.history().runs(None).unwrap().len(), 1);
        assert_eq!(pipeline.store().saved.lock().len(), 1);
        assert_eq!(outcome.artifact.model_kind, ModelKind::CreditScoring);
    }

    #[test]
    fn test_failed_records_are_skipped() {
        let mut extractor = credit_extractor(60);
        extractor.rows[3].2 = f64::NAN;
        extractor.rows[7].2 = f64::NAN;
        let pipeline = TrainingPipeline::new(MemoryStore::default(), InMemoryTrainingHistory::new());
        let outcome = pipeline
            .train_model(&small_config(ModelKind::CreditScoring), &extractor)
            .unwrap();
        assert_eq!(outcome.run.sample_count, 58);
    }

    #[test]
    fn test_non_finite_records_are_skipped() {
        let mut extractor = credit_extractor(70);
        for (i, row) in extractor.rows.iter_mut().enumerate() {
            if i % 7 == 0 {
                row.1[0] = f64::NAN;
            } else if i % 7 == 3 {
                row.1[1] = f64::INFINITY;
            }
        }
        extractor.rows[5].2 = f64::NEG_INFINITY;
        let pipeline = TrainingPipeline::new(MemoryStore::default(), InMemoryTrainingHistory::new());
        let outcome = pipeline
            .train_model(&small_config(ModelKind::CreditScoring), &extractor)
            .unwrap();
        assert_eq!(outcome.run.sample_count, 49);

        let json = serde_json::to_vec(&outcome.artifact).unwrap();
        let reloaded: SerializedModel = serde_json::from_slice(&json).unwrap();
        assert_eq!(reloaded, outcome.artifact);
    }

    #[test]
    fn test_unrecorded_success_becomes_failed_run() {
        let pipeline = TrainingPipeline::new(MemoryStore::default(), FailureOnlyHistory::default());
        let err = pipeline
            .train_model(&small_config(ModelKind::CreditScoring), &credit_extractor(60))
            .unwrap_err();
        assert!(matches!(err, LedgerMlError::IoError(_)));

        // The artifact was saved before the history refused the run
        assert_eq!(pipeline.store().saved.lock().len(), 1);
        let runs = pipeline.history().runs(None).unwrap();
        assert_eq!(runs.len(), 1);
        assert_eq!(runs[0].status, RunStatus::Failed);
        assert_eq!(runs[0].failed_stage, Some(PipelineStage::Persisting));
        assert!(runs[0].error.as_deref().unwrap().contains("history volume is full"));
    }

    #[test]
    fn test_empty_range_fails_in_preparing() {
        let mut config = small_config(ModelKind::CreditScoring);
        config.date_range = DateRange::new(
            NaiveDate::from_ymd_opt(2023, 1, 1).unwrap(),
            NaiveDate::from_ymd_opt(2023, 1, 31).unwrap(),
        )
        .unwrap();
        let pipeline = TrainingPipeline::new(MemoryStore::default(), InMemoryTrainingHistory::new());

        let err = pipeline.train_model(&config, &credit_extractor(30)).unwrap_err();
        assert!(matches!(err, LedgerMlError::EmptyDataset(_)));

        let runs = pipeline.history().runs(None).unwrap();
        assert_eq!(runs.len(), 1);
        assert_eq!(runs[0].status, RunStatus::Failed);
        assert_eq!(runs[0].failed_stage, Some(PipelineStage::Preparing));
        assert!(runs[0].error.is_some());
        assert!(pipeline.store().saved.lock().is_empty());
    }

    #[test]
    fn test_single_class_fraud_fails_in_training() {
        let rows = (0..40).map(|i| ((i % 28) as u32 + 1, vec![i as f64, 1.0], 0.0)).collect();
        let extractor = VecExtractor {
            kind: ModelKind::FraudDetection,
            names: vec!["amount".into(), "velocity_1h".into()],
            rows,
        };
        let pipeline = TrainingPipeline::new(MemoryStore::default(), InMemoryTrainingHistory::new());
        let err = pipeline
            .train_model(&small_config(ModelKind::FraudDetection), &extractor)
            .unwrap_err();

        assert!(matches!(err, LedgerMlError::DegenerateLabels(_)));
        let runs = pipeline.history().runs(None).unwrap();
        assert_eq!(runs[0].failed_stage, Some(PipelineStage::Training));
        assert!(pipeline.store().saved.lock().is_empty());
    }

    #[test]
    fn test_persistence_failure_returns_artifact() {
        let pipeline = TrainingPipeline::new(FailingStore::default(), InMemoryTrainingHistory::new());
        let config = small_config(ModelKind::CreditScoring);
        let err = pipeline.train_model(&config, &credit_extractor(80)).unwrap_err();

        match err {
            LedgerMlError::PersistenceFailed { artifact, location, .. } => {
                assert_eq!(artifact.version, "test-1");
                assert_eq!(location, "credit_scoring/test-1");
            }
            other => panic!("expected persistence failure, got {:?}", other),
        }
        assert_eq!(*pipeline.store().attempts.lock(), 1);
        let runs = pipeline.history().runs(None).unwrap();
        assert_eq!(runs[0].failed_stage, Some(PipelineStage::Persisting));
    }

    #[test]
    fn test_extractor_kind_mismatch() {
        let pipeline = TrainingPipeline::new(MemoryStore::default(), InMemoryTrainingHistory::new());
        let err = pipeline
            .train_model(&small_config(ModelKind::FraudDetection), &credit_extractor(30))
            .unwrap_err();
        assert!(matches!(err, LedgerMlError::ConfigError(_)));
    }
}
