//! Training history
//!
//! Append-only record of training runs per model kind, with one deployed
//! ("active") run per kind and version comparison on headline metrics.

use crate::error::{LedgerMlError, Result};
use crate::pipeline::TrainingRun;
use crate::training::ModelKind;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::info;
use uuid::Uuid;

/// Side-by-side headline metric of two versions of one model kind
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VersionComparison {
    pub model_kind: ModelKind,
    pub baseline: TrainingRun,
    pub candidate: TrainingRun,
    pub metric: Option<String>,
    pub baseline_value: Option<f64>,
    pub candidate_value: Option<f64>,
}

impl VersionComparison {
    /// `candidate − baseline`; every headline metric is higher-is-better
    pub fn delta(&self) -> Option<f64> {
        Some(self.candidate_value? - self.baseline_value?)
    }

    pub fn candidate_improves(&self) -> bool {
        self.delta().map(|d| d > 0.0).unwrap_or(false)
    }
}

/// Store of [`TrainingRun`] records.
///
/// Implementors provide storage; lookup, deploy marking and comparison are
/// derived from it.
pub trait TrainingHistory {
    fn append(&self, run: TrainingRun) -> Result<()>;

    /// Runs in append order, optionally limited to one kind
    fn runs(&self, kind: Option<ModelKind>) -> Result<Vec<TrainingRun>>;

    fn set_active(&self, kind: ModelKind, model_id: Uuid) -> Result<()>;

    fn active_id(&self, kind: ModelKind) -> Result<Option<Uuid>>;

    /// Most recent successful run of `version`
    fn find(&self, kind: ModelKind, version: &str) -> Result<TrainingRun> {
        self.runs(Some(kind))?
            .into_iter()
            .rev()
            .find(|r| r.version == version && r.is_success())
            .ok_or_else(|| {
                LedgerMlError::NotFound(format!("no successful {} run for version '{}'", kind, version))
            })
    }

    /// Promote `version` to the active model of its kind
    fn mark_deployed(&self, kind: ModelKind, version: &str) -> Result<TrainingRun> {
        let run = self.find(kind, version)?;
        self.set_active(kind, run.model_id)?;
        info!(kind = %kind, version, model_id = %run.model_id, "Marked model version as deployed");
        Ok(run)
    }

    fn active(&self, kind: ModelKind) -> Result<Option<TrainingRun>> {
        let Some(id) = self.active_id(kind)? else {
            return Ok(None);
        };
        Ok(self.runs(Some(kind))?.into_iter().find(|r| r.model_id == id))
    }

    fn compare(&self, kind: ModelKind, baseline: &str, candidate: &str) -> Result<VersionComparison> {
        let baseline = self.find(kind, baseline)?;
        let candidate = self.find(kind, candidate)?;
        let metric = baseline
            .headline_metrics()
            .or(candidate.headline_metrics())
            .map(|m| m.primary_name().to_string());
        Ok(VersionComparison {
            model_kind: kind,
            baseline_value: baseline.headline_metrics().map(|m| m.primary()),
            candidate_value: candidate.headline_metrics().map(|m| m.primary()),
            metric,
            baseline,
            candidate,
        })
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct HistoryState {
    runs: Vec<TrainingRun>,
    active: BTreeMap<ModelKind, Uuid>,
}

impl HistoryState {
    fn runs(&self, kind: Option<ModelKind>) -> Vec<TrainingRun> {
        self.runs
            .iter()
            .filter(|r| kind.map(|k| r.model_kind == k).unwrap_or(true))
            .cloned()
            .collect()
    }

    fn set_active(&mut self, kind: ModelKind, model_id: Uuid) -> Result<()> {
        let known = self
            .runs
            .iter()
            .any(|r| r.model_id == model_id && r.model_kind == kind && r.is_success());
        if !known {
            return Err(LedgerMlError::NotFound(format!(
                "no successful {} run with id {}",
                kind, model_id
            )));
        }
        self.active.insert(kind, model_id);
        Ok(())
    }
}

/// Process-local history
#[derive(Debug, Default)]
pub struct InMemoryTrainingHistory {
    state: RwLock<HistoryState>,
}

impl InMemoryTrainingHistory {
    pub fn new() -> Self {
        Self::default()
    }
}

impl TrainingHistory for InMemoryTrainingHistory {
    fn append(&self, run: TrainingRun) -> Result<()> {
        self.state.write().runs.push(run);
        Ok(())
    }

    fn runs(&self, kind: Option<ModelKind>) -> Result<Vec<TrainingRun>> {
        Ok(self.state.read().runs(kind))
    }

    fn set_active(&self, kind: ModelKind, model_id: Uuid) -> Result<()> {
        self.state.write().set_active(kind, model_id)
    }

    fn active_id(&self, kind: ModelKind) -> Result<Option<Uuid>> {
        Ok(self.state.read().active.get(&kind).copied())
    }
}

/// History persisted as one JSON document, rewritten on every change
#[derive(Debug)]
pub struct JsonFileHistory {
    path: PathBuf,
    state: RwLock<HistoryState>,
}

impl JsonFileHistory {
    /// Open `path`, starting empty if it does not exist yet
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let state = if path.exists() {
            let file = File::open(&path)?;
            serde_json::from_reader(BufReader::new(file))?
        } else {
            HistoryState::default()
        };
        Ok(Self {
            path,
            state: RwLock::new(state),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn persist(&self, state: &HistoryState) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let tmp = self.path.with_extension("json.tmp");
        {
            let mut writer = BufWriter::new(File::create(&tmp)?);
            serde_json::to_writer_pretty(&mut writer, state)?;
            writer.flush()?;
        }
        fs::rename(&tmp, &self.path)?;
        Ok(())
    }
}

impl TrainingHistory for JsonFileHistory {
    fn append(&self, run: TrainingRun) -> Result<()> {
        let mut state = self.state.write();
        state.runs.push(run);
        if let Err(e) = self.persist(&state) {
            state.runs.pop();
            return Err(e);
        }
        Ok(())
    }

    fn runs(&self, kind: Option<ModelKind>) -> Result<Vec<TrainingRun>> {
        Ok(self.state.read().runs(kind))
    }

    fn set_active(&self, kind: ModelKind, model_id: Uuid) -> Result<()> {
        let mut state = self.state.write();
        let previous = state.active.get(&kind).copied();
        state.set_active(kind, model_id)?;
        if let Err(e) = self.persist(&state) {
            match previous {
                Some(id) => state.active.insert(kind, id),
                None => state.active.remove(&kind),
            };
            return Err(e);
        }
        Ok(())
    }

    fn active_id(&self, kind: ModelKind) -> Result<Option<Uuid>> {
        Ok(self.state.read().active.get(&kind).copied())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::evaluation::{EvaluationReport, ModelMetrics, MulticlassMetrics};
    use crate::pipeline::{PipelineStage, RunStatus};
    use chrono::Utc;

    fn run(kind: ModelKind, version: &str, status: RunStatus, macro_f1: f64) -> TrainingRun {
        let metrics = ModelMetrics::Multiclass(MulticlassMetrics {
            accuracy: macro_f1,
            macro_precision: macro_f1,
            macro_recall: macro_f1,
            macro_f1,
            n_classes: 3,
            n_samples: 10,
        });
        TrainingRun {
            model_id: Uuid::new_v4(),
            model_kind: kind,
            version: version.to_string(),
            status,
            metrics: Some(EvaluationReport {
                validation: None,
                test: Some(metrics),
            }),
            duration_ms: 5,
            sample_count: 10,
            artifact_location: None,
            created_at: Utc::now(),
            error: None,
            failed_stage: if status == RunStatus::Failed {
                Some(PipelineStage::Training)
            } else {
                None
            },
        }
    }

    #[test]
    fn test_deploy_requires_successful_run() {
        let history = InMemoryTrainingHistory::new();
        history
            .append(run(ModelKind::Categorization, "v1", RunStatus::Failed, 0.0))
            .unwrap();

        let err = history.mark_deployed(ModelKind::Categorization, "v1").unwrap_err();
        assert!(matches!(err, LedgerMlError::NotFound(_)));
        assert!(history.active(ModelKind::Categorization).unwrap().is_none());

        let err = history.mark_deployed(ModelKind::Categorization, "v9").unwrap_err();
        assert!(matches!(err, LedgerMlError::NotFound(_)));
    }

    #[test]
    fn test_deploy_and_active() {
        let history = InMemoryTrainingHistory::new();
        let first = run(ModelKind::Categorization, "v1", RunStatus::Success, 0.7);
        let id = first.model_id;
        history.append(first).unwrap();
        history
            .append(run(ModelKind::FraudDetection, "v1", RunStatus::Success, 0.9))
            .unwrap();

        history.mark_deployed(ModelKind::Categorization, "v1").unwrap();
        assert_eq!(history.active(ModelKind::Categorization).unwrap().unwrap().model_id, id);
        assert!(history.active(ModelKind::FraudDetection).unwrap().is_none());
        assert_eq!(history.runs(Some(ModelKind::Categorization)).unwrap().len(), 1);
        assert_eq!(history.runs(None).unwrap().len(), 2);
    }

    #[test]
    fn test_compare_versions() {
        let history = InMemoryTrainingHistory::new();
        history
            .append(run(ModelKind::Categorization, "v1", RunStatus::Success, 0.6))
            .unwrap();
        history
            .append(run(ModelKind::Categorization, "v2", RunStatus::Success, 0.75))
            .unwrap();

        let cmp = history.compare(ModelKind::Categorization, "v1", "v2").unwrap();
        assert_eq!(cmp.metric.as_deref(), Some("macro_f1"));
        assert!((cmp.delta().unwrap() - 0.15).abs() < 1e-12);
        assert!(cmp.candidate_improves());

        assert!(history.compare(ModelKind::Categorization, "v1", "v3").is_err());
    }

    #[test]
    fn test_json_history_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("history.json");
        {
            let history = JsonFileHistory::open(&path).unwrap();
            history
                .append(run(ModelKind::CreditScoring, "v1", RunStatus::Success, 0.5))
                .unwrap();
            history.mark_deployed(ModelKind::CreditScoring, "v1").unwrap();
        }

        let reopened = JsonFileHistory::open(&path).unwrap();
        assert_eq!(reopened.runs(None).unwrap().len(), 1);
        assert_eq!(
            reopened.active(ModelKind::CreditScoring).unwrap().unwrap().version,
            "v1"
        );
    }
}
