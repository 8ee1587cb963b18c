//! Feature/label dataset container
//!
//! A [`Dataset`] is an ordered sequence of [`LabeledSample`]s that all share
//! the same vector length, together with the feature-name table describing
//! each position. Randomized operations (shuffle, split, balancing) take an
//! explicit generator so runs are reproducible.

mod sample;

pub use sample::{FeatureVector, LabeledSample};

use crate::error::{LedgerMlError, Result};
use ndarray::{Array1, Array2};
use rand::seq::SliceRandom;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Ordered collection of labeled samples with a fixed feature count
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Dataset {
    feature_names: Vec<String>,
    samples: Vec<LabeledSample>,
}

/// Train / validation / test partitions
#[derive(Debug, Clone)]
pub struct DatasetSplit {
    pub train: Dataset,
    pub validation: Dataset,
    pub test: Dataset,
}

impl Dataset {
    /// Build a dataset, rejecting samples whose length differs from the name table
    pub fn new(feature_names: Vec<String>, samples: Vec<LabeledSample>) -> Result<Self> {
        let n_features = feature_names.len();
        if let Some((idx, bad)) = samples
            .iter()
            .enumerate()
            .find(|(_, s)| s.features().len() != n_features)
        {
            return Err(LedgerMlError::ShapeError {
                expected: format!("{} features", n_features),
                actual: format!("{} features at sample {}", bad.features().len(), idx),
            });
        }
        Ok(Self { feature_names, samples })
    }

    /// Empty dataset with the given feature names
    pub fn empty(feature_names: Vec<String>) -> Self {
        Self {
            feature_names,
            samples: Vec::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn n_features(&self) -> usize {
        self.feature_names.len()
    }

    pub fn feature_names(&self) -> &[String] {
        &self.feature_names
    }

    pub fn samples(&self) -> &[LabeledSample] {
        &self.samples
    }

    pub fn iter(&self) -> std::slice::Iter<'_, LabeledSample> {
        self.samples.iter()
    }

    /// Row-major feature matrix (`n_samples × n_features`)
    pub fn features_matrix(&self) -> Array2<f64> {
        let n = self.samples.len();
        let m = self.n_features();
        Array2::from_shape_fn((n, m), |(r, c)| self.samples[r].features().as_array()[c])
    }

    pub fn labels(&self) -> Array1<f64> {
        self.samples.iter().map(|s| s.label()).collect()
    }

    /// Text blobs, with missing text treated as empty
    pub fn texts(&self) -> Vec<&str> {
        self.samples.iter().map(|s| s.text().unwrap_or("")).collect()
    }

    /// `(positive, negative)` counts under the binary label view
    pub fn binary_counts(&self) -> (usize, usize) {
        let positives = self.samples.iter().filter(|s| s.is_positive()).count();
        (positives, self.samples.len() - positives)
    }

    /// Append samples produced elsewhere (e.g. oversampling). Lengths are checked.
    pub fn extended(&self, extra: Vec<LabeledSample>) -> Result<Self> {
        let mut samples = self.samples.clone();
        samples.extend(extra);
        Self::new(self.feature_names.clone(), samples)
    }

    /// Fisher–Yates shuffled copy
    pub fn shuffled<R: Rng + ?Sized>(&self, rng: &mut R) -> Self {
        let mut samples = self.samples.clone();
        samples.shuffle(rng);
        Self {
            feature_names: self.feature_names.clone(),
            samples,
        }
    }

    /// Shuffle then partition. Validation and test take `floor(n * frac)`
    /// samples each; the remainder goes to train.
    pub fn split<R: Rng + ?Sized>(
        &self,
        train_frac: f64,
        val_frac: f64,
        test_frac: f64,
        rng: &mut R,
    ) -> Result<DatasetSplit> {
        validate_fractions(train_frac, val_frac, test_frac)?;
        let shuffled = self.shuffled(rng);
        let mut split = DatasetSplit {
            train: Dataset::empty(self.feature_names.clone()),
            validation: Dataset::empty(self.feature_names.clone()),
            test: Dataset::empty(self.feature_names.clone()),
        };
        partition_into(shuffled.samples, val_frac, test_frac, &mut split);
        Ok(split)
    }

    /// Split each label group separately with the same rule as [`Dataset::split`],
    /// so every partition keeps the label mix.
    pub fn stratified_split<R: Rng + ?Sized>(
        &self,
        train_frac: f64,
        val_frac: f64,
        test_frac: f64,
        rng: &mut R,
    ) -> Result<DatasetSplit> {
        validate_fractions(train_frac, val_frac, test_frac)?;

        let mut groups: BTreeMap<i64, Vec<LabeledSample>> = BTreeMap::new();
        for sample in &self.samples {
            groups
                .entry(sample.label().round() as i64)
                .or_default()
                .push(sample.clone());
        }

        let mut split = DatasetSplit {
            train: Dataset::empty(self.feature_names.clone()),
            validation: Dataset::empty(self.feature_names.clone()),
            test: Dataset::empty(self.feature_names.clone()),
        };
        for (_, mut group) in groups {
            group.shuffle(rng);
            partition_into(group, val_frac, test_frac, &mut split);
        }

        // Interleave classes again so downstream consumers see a mixed order
        split.train.samples.shuffle(rng);
        split.validation.samples.shuffle(rng);
        split.test.samples.shuffle(rng);
        Ok(split)
    }
}

impl<'a> IntoIterator for &'a Dataset {
    type Item = &'a LabeledSample;
    type IntoIter = std::slice::Iter<'a, LabeledSample>;

    fn into_iter(self) -> Self::IntoIter {
        self.samples.iter()
    }
}

fn validate_fractions(train: f64, val: f64, test: f64) -> Result<()> {
    for (name, value) in [("train_split", train), ("validation_split", val), ("test_split", test)] {
        if !(0.0..=1.0).contains(&value) {
            return Err(LedgerMlError::invalid_parameter(name, value, "must be within [0, 1]"));
        }
    }
    let total = train + val + test;
    if total > 1.0 + 1e-9 {
        return Err(LedgerMlError::invalid_parameter(
            "split fractions",
            total,
            "train + validation + test must not exceed 1",
        ));
    }
    Ok(())
}

fn partition_into(samples: Vec<LabeledSample>, val_frac: f64, test_frac: f64, split: &mut DatasetSplit) {
    let n = samples.len();
    let n_val = (n as f64 * val_frac).floor() as usize;
    let n_test = (n as f64 * test_frac).floor() as usize;
    let n_train = n - n_val - n_test;

    let mut iter = samples.into_iter();
    split.train.samples.extend(iter.by_ref().take(n_train));
    split.validation.samples.extend(iter.by_ref().take(n_val));
    split.test.samples.extend(iter);
}
