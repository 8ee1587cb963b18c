//! Training-run records and pipeline stages

use crate::evaluation::{EvaluationReport, ModelMetrics};
use crate::training::ModelKind;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Stages a training call moves through, in order; `Failed` is reachable from any of them
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PipelineStage {
    Preparing,
    Training,
    Validating,
    Testing,
    Persisting,
    Recorded,
    Failed,
}

impl PipelineStage {
    /// Successor on the success path
    pub fn next(self) -> Option<PipelineStage> {
        match self {
            PipelineStage::Preparing => Some(PipelineStage::Training),
            PipelineStage::Training => Some(PipelineStage::Validating),
            PipelineStage::Validating => Some(PipelineStage::Testing),
            PipelineStage::Testing => Some(PipelineStage::Persisting),
            PipelineStage::Persisting => Some(PipelineStage::Recorded),
            PipelineStage::Recorded | PipelineStage::Failed => None,
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, PipelineStage::Recorded | PipelineStage::Failed)
    }
}

impl fmt::Display for PipelineStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PipelineStage::Preparing => "PREPARING",
            PipelineStage::Training => "TRAINING",
            PipelineStage::Validating => "VALIDATING",
            PipelineStage::Testing => "TESTING",
            PipelineStage::Persisting => "PERSISTING",
            PipelineStage::Recorded => "RECORDED",
            PipelineStage::Failed => "FAILED",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RunStatus {
    Success,
    Failed,
}

/// Outcome of one `train_model` call. Never mutated once recorded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainingRun {
    pub model_id: Uuid,
    pub model_kind: ModelKind,
    pub version: String,
    pub status: RunStatus,
    pub metrics: Option<EvaluationReport>,
    pub duration_ms: u64,
    pub sample_count: usize,
    pub artifact_location: Option<String>,
    pub created_at: DateTime<Utc>,
    pub error: Option<String>,
    /// Stage that was running when the run failed
    pub failed_stage: Option<PipelineStage>,
}

impl TrainingRun {
    pub fn is_success(&self) -> bool {
        self.status == RunStatus::Success
    }

    /// Test metrics when present, otherwise validation metrics
    pub fn headline_metrics(&self) -> Option<&ModelMetrics> {
        self.metrics
            .as_ref()
            .and_then(|report| report.test.as_ref().or(report.validation.as_ref()))
    }
}
