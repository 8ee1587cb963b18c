//! Gradient Boosting implementation (credit-score regressor)
//!
//! Sequential residual fitting: every round fits one CART regression tree to
//! the residuals of the ensemble so far. Rounds depend on each other, so
//! unlike the forest this builder is strictly sequential.

use super::decision_tree::{DecisionTree, TreeBuilder, TreeParams};
use crate::dataset::{Dataset, FeatureVector};
use crate::error::{LedgerMlError, Result};
use crate::preprocessing::FeatureScaling;
use crate::utils::stats;
use ndarray::{Array1, Array2, ArrayView1};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

/// Gradient Boosting configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GradientBoostingConfig {
    /// Number of boosting rounds (trees)
    pub n_estimators: usize,
    /// Learning rate (shrinkage)
    pub learning_rate: f64,
    /// Per-tree growth limits
    pub tree: TreeParams,
    /// Valid output range
    pub score_range: ScoreRange,
}

impl Default for GradientBoostingConfig {
    fn default() -> Self {
        Self {
            n_estimators: 100,
            learning_rate: 0.1,
            tree: TreeParams {
                max_depth: 6,
                ..TreeParams::default()
            },
            score_range: ScoreRange::CREDIT_SCORE,
        }
    }
}

/// Inclusive range final predictions are clamped to
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScoreRange {
    pub min: f64,
    pub max: f64,
}

impl ScoreRange {
    pub const CREDIT_SCORE: ScoreRange = ScoreRange { min: 300.0, max: 850.0 };

    /// Clamp into the range and round to the nearest integer
    pub fn clamp_round(&self, raw: f64) -> f64 {
        raw.clamp(self.min, self.max).round()
    }
}

/// Credit score band
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ScoreBand {
    Poor,
    Fair,
    Good,
    VeryGood,
    Excellent,
}

impl ScoreBand {
    pub fn from_score(score: f64) -> Self {
        if score >= 800.0 {
            ScoreBand::Excellent
        } else if score >= 740.0 {
            ScoreBand::VeryGood
        } else if score >= 670.0 {
            ScoreBand::Good
        } else if score >= 580.0 {
            ScoreBand::Fair
        } else {
            ScoreBand::Poor
        }
    }
}

/// Trained credit-score model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GradientBoostingModel {
    pub trees: Vec<DecisionTree>,
    pub feature_scaling: FeatureScaling,
    /// Initial prediction: mean training label
    pub base_bias: f64,
    pub learning_rate: f64,
    pub feature_names: Vec<String>,
    pub score_range: ScoreRange,
    pub feature_importances: Vec<f64>,
}

impl GradientBoostingModel {
    /// Fit the boosting ensemble
    pub fn fit(config: &GradientBoostingConfig, train: &Dataset) -> Result<Self> {
        if train.is_empty() {
            return Err(LedgerMlError::EmptyDataset("boosting needs training samples".to_string()));
        }
        if !(config.learning_rate > 0.0 && config.learning_rate.is_finite()) {
            return Err(LedgerMlError::invalid_parameter(
                "learning_rate",
                config.learning_rate,
                "must be a positive finite number",
            ));
        }
        if config.score_range.min > config.score_range.max {
            return Err(LedgerMlError::invalid_parameter(
                "score_range",
                format!("{:?}", config.score_range),
                "min must not exceed max",
            ));
        }

        let raw = train.features_matrix();
        let feature_scaling = FeatureScaling::fit(&raw);
        let x = feature_scaling.transform(&raw)?;
        let y = train.labels();
        let n_samples = x.nrows();
        let n_features = x.ncols();

        let base_bias = stats::mean(&y.to_vec());
        let mut predictions = Array1::from_elem(n_samples, base_bias);
        let builder = TreeBuilder::regressor(config.tree);

        info!(
            n_trees = config.n_estimators,
            n_samples,
            n_features,
            base_bias,
            learning_rate = config.learning_rate,
            "Fitting gradient boosting ensemble"
        );

        let mut trees = Vec::with_capacity(config.n_estimators);
        let mut feature_importances = vec![0.0; n_features];

        for round in 0..config.n_estimators {
            let residuals: Array1<f64> = &y - &predictions;

            let tree = builder.fit(&x, &residuals)?;
            let update = tree.predict(&x);
            predictions.scaled_add(config.learning_rate, &update);

            for (acc, imp) in feature_importances.iter_mut().zip(tree.global_importances(n_features)) {
                *acc += imp;
            }

            if round % 10 == 0 || round + 1 == config.n_estimators {
                let mse = residuals.iter().map(|r| r * r).sum::<f64>() / n_samples as f64;
                debug!(round, residual_mse = mse, leaves = tree.n_leaves(), "Boosting round");
            }
            trees.push(tree);
        }

        let total: f64 = feature_importances.iter().sum();
        if total > 0.0 {
            for imp in &mut feature_importances {
                *imp /= total;
            }
        }

        Ok(Self {
            trees,
            feature_scaling,
            base_bias,
            learning_rate: config.learning_rate,
            feature_names: train.feature_names().to_vec(),
            score_range: config.score_range,
            feature_importances,
        })
    }

    /// Unclamped ensemble output for one unscaled row
    pub fn predict_raw_row(&self, row: ArrayView1<'_, f64>) -> Result<f64> {
        let scaled = Array1::from_vec(self.feature_scaling.transform_row(row)?);
        Ok(self.accumulate(scaled.view()))
    }

    /// Clamped, rounded score for one unscaled row
    pub fn predict_row(&self, row: ArrayView1<'_, f64>) -> Result<f64> {
        Ok(self.score_range.clamp_round(self.predict_raw_row(row)?))
    }

    /// Clamped, rounded score for one extracted feature vector
    pub fn predict_vector(&self, features: &FeatureVector) -> Result<f64> {
        self.predict_row(features.view())
    }

    /// Unclamped outputs for every row
    pub fn predict_raw(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        let scaled = self.feature_scaling.transform(x)?;
        Ok(scaled.rows().into_iter().map(|row| self.accumulate(row)).collect())
    }

    /// Clamped, rounded scores for every row
    pub fn predict(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        Ok(self.predict_raw(x)?.mapv(|raw| self.score_range.clamp_round(raw)))
    }

    pub fn n_trees(&self) -> usize {
        self.trees.len()
    }

    fn accumulate(&self, row: ArrayView1<'_, f64>) -> f64 {
        let correction: f64 = self.trees.iter().map(|tree| tree.predict_row(row)).sum();
        self.base_bias + self.learning_rate * correction
    }
}
