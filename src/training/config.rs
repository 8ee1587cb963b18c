//! Training configuration

use super::decision_tree::TreeParams;
use super::gradient_boosting::GradientBoostingConfig;
use super::naive_bayes::NaiveBayesConfig;
use super::random_forest::RandomForestConfig;
use crate::error::{LedgerMlError, Result};
use crate::text::{KeywordRules, TfIdfVectorizer};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;

/// Which model family a run trains
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ModelKind {
    /// Gradient-boosted credit score regressor
    CreditScoring,
    /// Random-forest fraud classifier
    FraudDetection,
    /// Naive Bayes transaction categorizer
    Categorization,
}

impl ModelKind {
    pub const ALL: [ModelKind; 3] = [
        ModelKind::CreditScoring,
        ModelKind::FraudDetection,
        ModelKind::Categorization,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ModelKind::CreditScoring => "CREDIT_SCORING",
            ModelKind::FraudDetection => "FRAUD_DETECTION",
            ModelKind::Categorization => "CATEGORIZATION",
        }
    }
}

impl fmt::Display for ModelKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ModelKind {
    type Err = LedgerMlError;

    fn from_str(s: &str) -> Result<Self> {
        let normalized = s.trim().to_ascii_uppercase().replace('-', "_");
        ModelKind::ALL
            .into_iter()
            .find(|k| k.as_str() == normalized)
            .ok_or_else(|| LedgerMlError::ConfigError(format!("unknown model kind '{}'", s)))
    }
}

/// Inclusive date window of historical records to train on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateRange {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl DateRange {
    pub fn new(start: NaiveDate, end: NaiveDate) -> Result<Self> {
        let range = Self { start, end };
        range.validate()?;
        Ok(range)
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        self.start <= date && date <= self.end
    }

    pub fn validate(&self) -> Result<()> {
        if self.start > self.end {
            return Err(LedgerMlError::ConfigError(format!(
                "date range starts ({}) after it ends ({})",
                self.start, self.end
            )));
        }
        Ok(())
    }
}

/// Where the fraud decision threshold is tuned
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ThresholdSource {
    /// Held-out validation partition, falling back to training data when it lacks a class
    #[default]
    Validation,
    /// Training partition
    Training,
}

/// Optional per-run overrides; unset fields take per-kind defaults
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Hyperparameters {
    pub num_trees: Option<usize>,
    pub max_depth: Option<usize>,
    pub learning_rate: Option<f64>,
    /// Vocabulary size cap for categorization
    pub max_features: Option<usize>,
    pub min_samples_split: Option<usize>,
    pub min_samples_leaf: Option<usize>,
    pub min_doc_freq: Option<usize>,
    /// Worker threads for forest training
    pub n_jobs: Option<usize>,
}

/// Hyperparameters with every default filled in for one model kind
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResolvedHyperparameters {
    pub num_trees: usize,
    pub max_depth: usize,
    pub learning_rate: f64,
    pub max_features: Option<usize>,
    pub min_samples_split: usize,
    pub min_samples_leaf: usize,
    pub min_doc_freq: usize,
    pub n_jobs: Option<usize>,
}

impl Hyperparameters {
    /// Fill unset values with the defaults of `kind` and validate ranges
    pub fn resolve(&self, kind: ModelKind) -> Result<ResolvedHyperparameters> {
        let default_depth = match kind {
            ModelKind::CreditScoring => 6,
            _ => TreeParams::default().max_depth,
        };
        let resolved = ResolvedHyperparameters {
            num_trees: self.num_trees.unwrap_or(100),
            max_depth: self.max_depth.unwrap_or(default_depth),
            learning_rate: self.learning_rate.unwrap_or(0.1),
            max_features: self.max_features,
            min_samples_split: self.min_samples_split.unwrap_or(TreeParams::default().min_samples_split),
            min_samples_leaf: self.min_samples_leaf.unwrap_or(TreeParams::default().min_samples_leaf),
            min_doc_freq: self.min_doc_freq.unwrap_or(TfIdfVectorizer::default().min_doc_freq),
            n_jobs: self.n_jobs,
        };

        if kind == ModelKind::FraudDetection && resolved.num_trees == 0 {
            return Err(LedgerMlError::invalid_parameter("num_trees", 0, "a forest needs at least one tree"));
        }
        if !(resolved.learning_rate > 0.0 && resolved.learning_rate.is_finite()) {
            return Err(LedgerMlError::invalid_parameter(
                "learning_rate",
                resolved.learning_rate,
                "must be a positive finite number",
            ));
        }
        if resolved.min_samples_leaf == 0 {
            return Err(LedgerMlError::invalid_parameter("min_samples_leaf", 0, "must be at least 1"));
        }
        if resolved.max_features == Some(0) {
            return Err(LedgerMlError::invalid_parameter("max_features", 0, "must be at least 1"));
        }
        if resolved.n_jobs == Some(0) {
            return Err(LedgerMlError::invalid_parameter("n_jobs", 0, "must be at least 1"));
        }
        Ok(resolved)
    }
}

impl ResolvedHyperparameters {
    pub fn tree_params(&self) -> TreeParams {
        TreeParams {
            max_depth: self.max_depth,
            min_samples_split: self.min_samples_split,
            min_samples_leaf: self.min_samples_leaf,
        }
    }

    pub fn forest_config(&self, seed: u64) -> RandomForestConfig {
        RandomForestConfig {
            n_estimators: self.num_trees,
            tree: self.tree_params(),
            random_state: Some(seed),
            n_jobs: self.n_jobs,
        }
    }

    pub fn boosting_config(&self) -> GradientBoostingConfig {
        GradientBoostingConfig {
            n_estimators: self.num_trees,
            learning_rate: self.learning_rate,
            tree: self.tree_params(),
            ..GradientBoostingConfig::default()
        }
    }

    pub fn naive_bayes_config(&self) -> NaiveBayesConfig {
        let mut vectorizer = TfIdfVectorizer::new().with_min_doc_freq(self.min_doc_freq);
        vectorizer.max_features = self.max_features;
        NaiveBayesConfig {
            vectorizer,
            keyword_rules: KeywordRules::default(),
        }
    }
}

fn default_validation_split() -> f64 {
    0.2
}

fn default_test_split() -> f64 {
    0.1
}

fn default_seed() -> u64 {
    42
}

fn default_minority_ratio() -> f64 {
    0.3
}

/// Configuration for one training run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainingConfig {
    pub model_kind: ModelKind,
    pub version: String,
    pub date_range: DateRange,
    #[serde(default)]
    pub hyperparameters: Hyperparameters,
    #[serde(default = "default_validation_split")]
    pub validation_split: f64,
    #[serde(default = "default_test_split")]
    pub test_split: f64,
    /// Seeds shuffling, oversampling and tree growth
    #[serde(default = "default_seed")]
    pub seed: u64,
    /// Fraud only: minority share the training partition is oversampled to
    #[serde(default = "default_minority_ratio")]
    pub target_minority_ratio: f64,
    #[serde(default)]
    pub threshold_source: ThresholdSource,
}

impl TrainingConfig {
    pub fn new(model_kind: ModelKind, version: impl Into<String>, date_range: DateRange) -> Self {
        Self {
            model_kind,
            version: version.into(),
            date_range,
            hyperparameters: Hyperparameters::default(),
            validation_split: default_validation_split(),
            test_split: default_test_split(),
            seed: default_seed(),
            target_minority_ratio: default_minority_ratio(),
            threshold_source: ThresholdSource::default(),
        }
    }

    pub fn with_hyperparameters(mut self, hyperparameters: Hyperparameters) -> Self {
        self.hyperparameters = hyperparameters;
        self
    }

    pub fn with_splits(mut self, validation_split: f64, test_split: f64) -> Self {
        self.validation_split = validation_split;
        self.test_split = test_split;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    pub fn with_target_minority_ratio(mut self, ratio: f64) -> Self {
        self.target_minority_ratio = ratio;
        self
    }

    pub fn with_threshold_source(mut self, source: ThresholdSource) -> Self {
        self.threshold_source = source;
        self
    }

    /// Reject configurations that cannot produce a run
    pub fn validate(&self) -> Result<()> {
        if self.version.trim().is_empty() {
            return Err(LedgerMlError::ConfigError("version must not be empty".to_string()));
        }
        self.date_range.validate()?;
        for (name, value) in [("validation_split", self.validation_split), ("test_split", self.test_split)] {
            if !(0.0..1.0).contains(&value) {
                return Err(LedgerMlError::invalid_parameter(name, value, "must be within [0, 1)"));
            }
        }
        if self.validation_split + self.test_split >= 1.0 {
            return Err(LedgerMlError::invalid_parameter(
                "validation_split + test_split",
                self.validation_split + self.test_split,
                "must leave a non-empty training fraction",
            ));
        }
        if self.model_kind == ModelKind::FraudDetection
            && !(self.target_minority_ratio > 0.0 && self.target_minority_ratio < 1.0)
        {
            return Err(LedgerMlError::invalid_parameter(
                "target_minority_ratio",
                self.target_minority_ratio,
                "must be strictly between 0 and 1",
            ));
        }
        self.hyperparameters.resolve(self.model_kind)?;
        Ok(())
    }

    pub fn train_fraction(&self) -> f64 {
        1.0 - self.validation_split - self.test_split
    }

    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())?;
        let config: TrainingConfig = serde_json::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_json_file(&self, path: impl AsRef<Path>) -> Result<()> {
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(path.as_ref(), content)?;
        Ok(())
    }
}
