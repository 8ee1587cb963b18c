//! Random Forest implementation (fraud classifier)
//!
//! Class-weighted bagging of CART classification trees. Each tree sees a
//! bootstrap sample of the scaled training matrix and a random subset of
//! `round(sqrt(n_features))` features. Trees are independent, so they are
//! grown in parallel on rayon with one seeded generator per tree.

use super::decision_tree::{DecisionTree, TreeBuilder, TreeParams};
use crate::dataset::{Dataset, FeatureVector};
use crate::error::{LedgerMlError, Result};
use crate::evaluation::ConfusionCounts;
use crate::preprocessing::FeatureScaling;
use ndarray::{Array1, Array2, ArrayView1};
use rand::seq::index;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

/// Candidate decision thresholds, 0.10 to 0.90 in steps of 0.05
pub fn threshold_grid() -> impl Iterator<Item = f64> {
    (0..=16).map(|i| (10 + 5 * i) as f64 / 100.0)
}

/// Random forest hyperparameters
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RandomForestConfig {
    /// Number of trees
    pub n_estimators: usize,
    /// Per-tree growth limits
    pub tree: TreeParams,
    /// Base seed; tree `i` uses `seed + i`
    pub random_state: Option<u64>,
    /// Size of the rayon pool (None = global pool)
    pub n_jobs: Option<usize>,
}

impl Default for RandomForestConfig {
    fn default() -> Self {
        Self {
            n_estimators: 100,
            tree: TreeParams::default(),
            random_state: Some(42),
            n_jobs: None,
        }
    }
}

impl RandomForestConfig {
    /// Set number of trees
    pub fn with_n_estimators(mut self, n: usize) -> Self {
        self.n_estimators = n;
        self
    }

    /// Set maximum depth
    pub fn with_max_depth(mut self, depth: usize) -> Self {
        self.tree.max_depth = depth;
        self
    }

    /// Set random state
    pub fn with_random_state(mut self, seed: u64) -> Self {
        self.random_state = Some(seed);
        self
    }

    /// Set tree growth limits
    pub fn with_tree_params(mut self, params: TreeParams) -> Self {
        self.tree = params;
        self
    }
}

/// Coarse banding of a fraud probability
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
    Critical,
}

impl RiskLevel {
    pub fn from_probability(p: f64) -> Self {
        if p >= 0.8 {
            RiskLevel::Critical
        } else if p >= 0.6 {
            RiskLevel::High
        } else if p >= 0.3 {
            RiskLevel::Medium
        } else {
            RiskLevel::Low
        }
    }
}

/// Trained fraud classifier
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RandomForestModel {
    pub trees: Vec<DecisionTree>,
    pub feature_scaling: FeatureScaling,
    /// Decision threshold on the mean positive probability
    pub threshold: f64,
    /// Weights of classes 0 and 1: `total / (2 * count)`
    pub class_weights: [f64; 2],
    pub feature_names: Vec<String>,
    pub feature_importances: Vec<f64>,
}

/// Inverse-frequency class weights `total / (2 * count[c])`
pub fn class_weights(positives: usize, negatives: usize) -> Result<[f64; 2]> {
    if positives == 0 || negatives == 0 {
        return Err(LedgerMlError::DegenerateLabels(format!(
            "class weighting needs both labels, got {} positive and {} negative samples",
            positives, negatives
        )));
    }
    let total = (positives + negatives) as f64;
    Ok([total / (2.0 * negatives as f64), total / (2.0 * positives as f64)])
}

impl RandomForestModel {
    /// Fit on a binary-labeled dataset. The threshold is tuned on the
    /// training set; call [`RandomForestModel::tuned_on`] to tune it on a
    /// held-out partition instead.
    pub fn fit(config: &RandomForestConfig, train: &Dataset) -> Result<Self> {
        if config.n_estimators == 0 {
            return Err(LedgerMlError::invalid_parameter("n_estimators", 0, "must be at least 1"));
        }
        if train.n_features() == 0 {
            return Err(LedgerMlError::invalid_parameter("n_features", 0, "must be at least 1"));
        }
        let (positives, negatives) = train.binary_counts();
        let weights = class_weights(positives, negatives)?;

        let raw = train.features_matrix();
        let feature_scaling = FeatureScaling::fit(&raw);
        let x = feature_scaling.transform(&raw)?;
        let y = train.labels();

        let n_features = x.ncols();
        let k = ((n_features as f64).sqrt().round() as usize).clamp(1, n_features);

        info!(
            n_trees = config.n_estimators,
            n_samples = x.nrows(),
            n_features,
            features_per_tree = k,
            positives,
            negatives,
            "Growing random forest"
        );

        let trees = match config.n_jobs {
            Some(n_jobs) => rayon::ThreadPoolBuilder::new()
                .num_threads(n_jobs)
                .build()?
                .install(|| grow_trees(config, &x, &y, weights, k)),
            None => grow_trees(config, &x, &y, weights, k),
        }?;

        let mut feature_importances = vec![0.0; n_features];
        for tree in &trees {
            for (acc, imp) in feature_importances.iter_mut().zip(tree.global_importances(n_features)) {
                *acc += imp;
            }
        }
        let total: f64 = feature_importances.iter().sum();
        if total > 0.0 {
            for imp in &mut feature_importances {
                *imp /= total;
            }
        }

        let model = Self {
            trees,
            feature_scaling,
            threshold: 0.5,
            class_weights: weights,
            feature_names: train.feature_names().to_vec(),
            feature_importances,
        };
        model.tuned_on(train)
    }

    /// Copy of the model with the threshold re-tuned on `dataset`
    pub fn tuned_on(mut self, dataset: &Dataset) -> Result<Self> {
        self.threshold = self.select_threshold(dataset)?;
        Ok(self)
    }

    /// Grid-search the F1-maximizing threshold; ties keep the lowest threshold
    pub fn select_threshold(&self, dataset: &Dataset) -> Result<f64> {
        let (positives, negatives) = dataset.binary_counts();
        if positives == 0 || negatives == 0 {
            return Err(LedgerMlError::DegenerateLabels(format!(
                "threshold search needs both labels, got {} positive and {} negative samples",
                positives, negatives
            )));
        }

        let scores = self.predict_proba(&dataset.features_matrix())?.to_vec();
        let labels = dataset.labels().to_vec();

        let mut best_threshold = 0.10;
        let mut best_f1 = f64::NEG_INFINITY;
        for threshold in threshold_grid() {
            let f1 = ConfusionCounts::at_threshold(&labels, &scores, threshold).f1();
            if f1 > best_f1 {
                best_f1 = f1;
                best_threshold = threshold;
            }
        }

        debug!(threshold = best_threshold, f1 = best_f1, "Selected decision threshold");
        Ok(best_threshold)
    }

    /// Mean positive probability for one unscaled row
    pub fn predict_proba_row(&self, row: ArrayView1<'_, f64>) -> Result<f64> {
        let scaled = Array1::from_vec(self.feature_scaling.transform_row(row)?);
        Ok(self.mean_vote(scaled.view()))
    }

    /// Mean positive probability for one extracted feature vector
    pub fn predict_proba_vector(&self, features: &FeatureVector) -> Result<f64> {
        self.predict_proba_row(features.view())
    }

    /// Mean positive probability for every row of an unscaled matrix
    pub fn predict_proba(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        if self.trees.is_empty() {
            return Err(LedgerMlError::ModelNotFitted);
        }
        let scaled = self.feature_scaling.transform(x)?;
        Ok(scaled.rows().into_iter().map(|row| self.mean_vote(row)).collect())
    }

    /// Binary decisions at the tuned threshold
    pub fn predict(&self, x: &Array2<f64>) -> Result<Vec<bool>> {
        Ok(self
            .predict_proba(x)?
            .iter()
            .map(|&p| p >= self.threshold)
            .collect())
    }

    pub fn n_trees(&self) -> usize {
        self.trees.len()
    }

    fn mean_vote(&self, row: ArrayView1<'_, f64>) -> f64 {
        let sum: f64 = self.trees.iter().map(|tree| tree.predict_row(row)).sum();
        sum / self.trees.len() as f64
    }
}

fn grow_trees(
    config: &RandomForestConfig,
    x: &Array2<f64>,
    y: &Array1<f64>,
    weights: [f64; 2],
    features_per_tree: usize,
) -> Result<Vec<DecisionTree>> {
    let base_seed = config.random_state.unwrap_or(42);
    let n_samples = x.nrows();
    let n_features = x.ncols();
    let builder = TreeBuilder::classifier(config.tree).with_class_weights(weights);

    (0..config.n_estimators)
        .into_par_iter()
        .map(|tree_idx| {
            let mut rng = ChaCha8Rng::seed_from_u64(base_seed.wrapping_add(tree_idx as u64));

            let rows: Vec<usize> = (0..n_samples).map(|_| rng.gen_range(0..n_samples)).collect();
            let mut subset = index::sample(&mut rng, n_features, features_per_tree).into_vec();
            subset.sort_unstable();

            let tree = builder.fit_rows(x.view(), y.view(), rows, Some(subset))?;
            debug!(tree_idx, nodes = tree.nodes().len(), depth = tree.depth(), "Grew forest tree");
            Ok(tree)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::LabeledSample;

    fn fraud_like(n: usize) -> Dataset {
        let samples = (0..n)
            .map(|i| {
                let positive = i % 4 == 0;
                let amount = if positive { 900.0 + (i % 7) as f64 * 10.0 } else { 50.0 + (i % 11) as f64 * 5.0 };
                let velocity = if positive { 8.0 + (i % 3) as f64 } else { (i % 3) as f64 };
                let hour = (i % 24) as f64;
                let noise = ((i * 37) % 13) as f64;
                LabeledSample::new(vec![amount, velocity, hour, noise], if positive { 1.0 } else { 0.0 })
            })
            .collect();
        Dataset::new(
            vec!["amount".into(), "velocity".into(), "hour".into(), "noise".into()],
            samples,
        )
        .unwrap()
    }

    fn small_config() -> RandomForestConfig {
        RandomForestConfig::default()
            .with_n_estimators(15)
            .with_tree_params(TreeParams {
                max_depth: 6,
                min_samples_split: 4,
                min_samples_leaf: 2,
            })
    }

    #[test]
    fn test_threshold_grid_bounds() {
        let grid: Vec<f64> = threshold_grid().collect();
        assert_eq!(grid.len(), 17);
        assert_eq!(grid[0], 0.10);
        assert_eq!(grid[16], 0.90);
    }

    #[test]
    fn test_class_weights() {
        let w = class_weights(10, 90).unwrap();
        assert!((w[0] - 100.0 / 180.0).abs() < 1e-12);
        assert!((w[1] - 5.0).abs() < 1e-12);
        assert!(matches!(class_weights(0, 5), Err(LedgerMlError::DegenerateLabels(_))));
    }

    #[test]
    fn test_forest_learns_separable_pattern() {
        let ds = fraud_like(120);
        let model = RandomForestModel::fit(&small_config(), &ds).unwrap();
        assert_eq!(model.n_trees(), 15);

        let x = ds.features_matrix();
        let probs = model.predict_proba(&x).unwrap();
        for &p in probs.iter() {
            assert!((0.0..=1.0).contains(&p));
        }
        assert!((0.10..=0.90).contains(&model.threshold));

        let decisions = model.predict(&x).unwrap();
        let correct = decisions
            .iter()
            .zip(ds.iter())
            .filter(|(d, s)| **d == s.is_positive())
            .count();
        assert!(correct as f64 / ds.len() as f64 > 0.9);
    }

    #[test]
    fn test_forest_is_reproducible_for_seed() {
        let ds = fraud_like(80);
        let a = RandomForestModel::fit(&small_config(), &ds).unwrap();
        let b = RandomForestModel::fit(&small_config(), &ds).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_bounded_thread_pool_matches_global_pool() {
        let ds = fraud_like(60);
        let mut config = small_config();
        let global = RandomForestModel::fit(&config, &ds).unwrap();
        config.n_jobs = Some(2);
        let bounded = RandomForestModel::fit(&config, &ds).unwrap();
        assert_eq!(bounded.n_trees(), 15);
        assert_eq!(bounded, global);
    }

    #[test]
    fn test_single_class_is_degenerate() {
        let samples = (0..20).map(|i| LabeledSample::new(vec![i as f64], 0.0)).collect();
        let ds = Dataset::new(vec!["x".into()], samples).unwrap();
        let err = RandomForestModel::fit(&small_config(), &ds).unwrap_err();
        assert!(matches!(err, LedgerMlError::DegenerateLabels(_)));
    }

    #[test]
    fn test_risk_levels() {
        assert_eq!(RiskLevel::from_probability(0.1), RiskLevel::Low);
        assert_eq!(RiskLevel::from_probability(0.45), RiskLevel::Medium);
        assert_eq!(RiskLevel::from_probability(0.7), RiskLevel::High);
        assert_eq!(RiskLevel::from_probability(0.95), RiskLevel::Critical);
    }
}
