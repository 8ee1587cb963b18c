//! Self-describing model artifact

use crate::dataset::{Dataset, LabeledSample};
use crate::error::{LedgerMlError, Result};
use crate::training::{
    GradientBoostingModel, ModelKind, NaiveBayesModel, RandomForestModel, RiskLevel, ScoreBand,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Bumped whenever the artifact layout changes incompatibly
pub const ARTIFACT_FORMAT_VERSION: u32 = 1;

/// The fitted model inside an artifact.
///
/// Externally tagged so the binary format can decode it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrainedModel {
    RandomForest(RandomForestModel),
    GradientBoosting(GradientBoostingModel),
    NaiveBayes(NaiveBayesModel),
}

impl TrainedModel {
    /// Model kind this family serves
    pub fn kind(&self) -> ModelKind {
        match self {
            TrainedModel::RandomForest(_) => ModelKind::FraudDetection,
            TrainedModel::GradientBoosting(_) => ModelKind::CreditScoring,
            TrainedModel::NaiveBayes(_) => ModelKind::Categorization,
        }
    }

    pub fn feature_names(&self) -> &[String] {
        match self {
            TrainedModel::RandomForest(m) => &m.feature_names,
            TrainedModel::GradientBoosting(m) => &m.feature_names,
            TrainedModel::NaiveBayes(m) => &m.feature_names,
        }
    }
}

/// One prediction from a loaded artifact
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Prediction {
    Fraud {
        probability: f64,
        is_fraud: bool,
        risk_level: RiskLevel,
    },
    CreditScore {
        score: f64,
        band: ScoreBand,
    },
    Category {
        index: usize,
        name: String,
    },
}

/// Versioned, serializable output of a training run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SerializedModel {
    pub format_version: u32,
    pub model_kind: ModelKind,
    pub version: String,
    pub trained_at: DateTime<Utc>,
    pub feature_names: Vec<String>,
    pub model: TrainedModel,
}

impl SerializedModel {
    pub fn new(version: impl Into<String>, model: TrainedModel) -> Self {
        Self {
            format_version: ARTIFACT_FORMAT_VERSION,
            model_kind: model.kind(),
            version: version.into(),
            trained_at: Utc::now(),
            feature_names: model.feature_names().to_vec(),
            model,
        }
    }

    /// Reject artifacts this build cannot interpret
    pub fn check_compatible(&self) -> Result<()> {
        if self.format_version != ARTIFACT_FORMAT_VERSION {
            return Err(LedgerMlError::SerializationError(format!(
                "artifact format version {} is not supported (expected {})",
                self.format_version, ARTIFACT_FORMAT_VERSION
            )));
        }
        if self.model.kind() != self.model_kind {
            return Err(LedgerMlError::SerializationError(format!(
                "artifact declares {} but holds a {} model",
                self.model_kind,
                self.model.kind()
            )));
        }
        Ok(())
    }

    /// Predict one sample; categorization reads the sample's text
    pub fn predict(&self, sample: &LabeledSample) -> Result<Prediction> {
        if sample.features().len() != self.feature_names.len() {
            return Err(LedgerMlError::ShapeError {
                expected: format!("{} features", self.feature_names.len()),
                actual: format!("{} features", sample.features().len()),
            });
        }
        Ok(match &self.model {
            TrainedModel::RandomForest(m) => {
                let probability = m.predict_proba_vector(sample.features())?;
                Prediction::Fraud {
                    probability,
                    is_fraud: probability >= m.threshold,
                    risk_level: RiskLevel::from_probability(probability),
                }
            }
            TrainedModel::GradientBoosting(m) => {
                let score = m.predict_vector(sample.features())?;
                Prediction::CreditScore {
                    score,
                    band: ScoreBand::from_score(score),
                }
            }
            TrainedModel::NaiveBayes(m) => {
                let index = m.predict(sample.text().unwrap_or(""), sample.features().view())?;
                Prediction::Category {
                    index,
                    name: m.categories[index].clone(),
                }
            }
        })
    }

    pub fn predict_dataset(&self, dataset: &Dataset) -> Result<Vec<Prediction>> {
        dataset.iter().map(|s| self.predict(s)).collect()
    }
}
