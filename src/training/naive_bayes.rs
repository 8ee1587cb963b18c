//! Multinomial Naive Bayes categorizer
//!
//! Hybrid text + numeric classifier: Laplace-smoothed log priors and
//! TF-IDF-weighted token likelihoods, an information-gain weighted term over
//! the standardized numeric features, and a fixed boost for categories named
//! by the merchant keyword rules.

use crate::dataset::{Dataset, FeatureVector};
use crate::error::{LedgerMlError, Result};
use crate::preprocessing::FeatureScaling;
use crate::text::{tokenize, KeywordRules, TfIdfVectorizer, Vocabulary};
use crate::utils::stats;
use ndarray::{Array2, ArrayView1};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

/// Naive Bayes configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NaiveBayesConfig {
    pub vectorizer: TfIdfVectorizer,
    pub keyword_rules: KeywordRules,
}

impl Default for NaiveBayesConfig {
    fn default() -> Self {
        Self {
            vectorizer: TfIdfVectorizer::default(),
            keyword_rules: KeywordRules::default(),
        }
    }
}

/// Trained categorization model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NaiveBayesModel {
    pub categories: Vec<String>,
    pub category_log_priors: Vec<f64>,
    pub vocabulary: Vocabulary,
    /// category × vocabulary
    pub conditional_log_prob: Vec<Vec<f64>>,
    pub feature_weights: Vec<f64>,
    pub feature_scaling: FeatureScaling,
    pub feature_names: Vec<String>,
    pub keyword_rules: KeywordRules,
}

impl NaiveBayesModel {
    /// Fit on samples whose label is an index into `categories` and whose text is set
    pub fn fit(config: &NaiveBayesConfig, train: &Dataset, categories: Vec<String>) -> Result<Self> {
        if train.is_empty() {
            return Err(LedgerMlError::EmptyDataset("categorizer needs training samples".to_string()));
        }
        if categories.is_empty() {
            return Err(LedgerMlError::invalid_parameter(
                "categories",
                "[]",
                "at least one category is required",
            ));
        }

        let n_categories = categories.len();
        let labels = category_indices(train, n_categories)?;
        let texts = train.texts();

        let vocabulary = config.vectorizer.fit(&texts)?;
        let vocab_size = vocabulary.len();

        let n_docs = train.len() as f64;
        let mut doc_counts = vec![0usize; n_categories];
        let mut word_counts = vec![vec![0.0; vocab_size]; n_categories];
        for (text, &label) in texts.iter().zip(&labels) {
            doc_counts[label] += 1;
            for idx in vocabulary.token_indices(text) {
                word_counts[label][idx] += vocabulary.idf()[idx];
            }
        }

        let category_log_priors = doc_counts
            .iter()
            .map(|&count| ((count as f64 + 1.0) / (n_docs + n_categories as f64)).ln())
            .collect();

        let conditional_log_prob = word_counts
            .iter()
            .map(|counts| {
                let total: f64 = counts.iter().sum();
                counts
                    .iter()
                    .map(|wc| ((wc + 1.0) / (total + vocab_size as f64)).ln())
                    .collect()
            })
            .collect();

        let raw = train.features_matrix();
        let feature_scaling = FeatureScaling::fit(&raw);
        let feature_weights = information_gain_weights(&raw, &labels, n_categories);

        info!(
            n_samples = train.len(),
            n_categories,
            vocabulary_size = vocab_size,
            n_numeric = feature_weights.len(),
            "Fitted naive bayes categorizer"
        );
        debug!(?doc_counts, "Category document counts");

        Ok(Self {
            categories,
            category_log_priors,
            vocabulary,
            conditional_log_prob,
            feature_weights,
            feature_scaling,
            feature_names: train.feature_names().to_vec(),
            keyword_rules: config.keyword_rules.clone(),
        })
    }

    /// Unnormalized log-posterior per category
    pub fn scores(&self, text: &str, features: ArrayView1<'_, f64>) -> Result<Vec<f64>> {
        let scaled = self.feature_scaling.transform_row(features)?;
        let numeric: f64 = self
            .feature_weights
            .iter()
            .zip(&scaled)
            .map(|(w, x)| w * x)
            .sum();

        let token_indices = self.vocabulary.token_indices(text);
        let matched = self.keyword_rules.matched_categories(&tokenize(text));

        Ok(self
            .categories
            .iter()
            .enumerate()
            .map(|(c, name)| {
                let likelihood: f64 = token_indices
                    .iter()
                    .map(|&idx| self.conditional_log_prob[c][idx])
                    .sum();
                let boost = if matched.contains(name.as_str()) {
                    self.keyword_rules.boost()
                } else {
                    0.0
                };
                self.category_log_priors[c] + likelihood + numeric + boost
            })
            .collect())
    }

    /// Index of the highest-scoring category; ties keep the lowest index
    pub fn predict(&self, text: &str, features: ArrayView1<'_, f64>) -> Result<usize> {
        let scores = self.scores(text, features)?;
        Ok(argmax(&scores))
    }

    /// Name of the highest-scoring category
    pub fn predict_category(&self, text: &str, features: &FeatureVector) -> Result<&str> {
        let idx = self.predict(text, features.view())?;
        Ok(self.categories[idx].as_str())
    }

    /// Predicted category index for every sample (missing text counts as empty)
    pub fn predict_dataset(&self, dataset: &Dataset) -> Result<Vec<usize>> {
        dataset
            .iter()
            .map(|s| self.predict(s.text().unwrap_or(""), s.features().view()))
            .collect()
    }

    pub fn n_categories(&self) -> usize {
        self.categories.len()
    }
}

fn argmax(scores: &[f64]) -> usize {
    let mut best = 0;
    for (i, &s) in scores.iter().enumerate().skip(1) {
        if s > scores[best] {
            best = i;
        }
    }
    best
}

/// Category index of each sample, validated against the category count
pub(crate) fn category_indices(dataset: &Dataset, n_categories: usize) -> Result<Vec<usize>> {
    dataset
        .iter()
        .enumerate()
        .map(|(i, s)| {
            let label = s.label();
            if label.fract() != 0.0 || label < 0.0 || label as usize >= n_categories {
                Err(LedgerMlError::DataError(format!(
                    "sample {} has label {} outside the {} known categories",
                    i, label, n_categories
                )))
            } else {
                Ok(label as usize)
            }
        })
        .collect()
}

fn class_counts(labels: impl Iterator<Item = usize>, n_categories: usize) -> Vec<f64> {
    let mut counts = vec![0.0; n_categories];
    for label in labels {
        counts[label] += 1.0;
    }
    counts
}

/// Information gain of a median split per feature, normalized by the largest gain
fn information_gain_weights(x: &Array2<f64>, labels: &[usize], n_categories: usize) -> Vec<f64> {
    let n = labels.len() as f64;
    let parent = stats::entropy(&class_counts(labels.iter().copied(), n_categories));

    let gains: Vec<f64> = x
        .columns()
        .into_iter()
        .map(|col| {
            let values = col.to_vec();
            let median = stats::median(&values);
            let side = |left: bool| {
                class_counts(
                    labels
                        .iter()
                        .zip(&values)
                        .filter(|(_, v)| (**v <= median) == left)
                        .map(|(l, _)| *l),
                    n_categories,
                )
            };
            let left_counts = side(true);
            let right_counts = side(false);

            let n_left: f64 = left_counts.iter().sum();
            let n_right: f64 = right_counts.iter().sum();
            let child = (n_left / n) * stats::entropy(&left_counts) + (n_right / n) * stats::entropy(&right_counts);
            (parent - child).max(0.0)
        })
        .collect();

    let max_gain = gains.iter().cloned().fold(0.0, f64::max);
    if max_gain > 0.0 {
        gains.iter().map(|g| g / max_gain).collect()
    } else {
        vec![0.0; gains.len()]
    }
}
