//! Decision tree implementation (CART)
//!
//! One recursive builder serves both model families: it is parameterized by
//! an impurity [`Criterion`] (class-weighted Gini for classification,
//! variance for regression) and the matching leaf value. Nodes are stored in
//! a flat arena with integer child indices. Children are always appended
//! before their parent, so every child index is smaller than its parent's and
//! the root is the last node.

use crate::error::{LedgerMlError, Result};
use crate::utils::stats;
use ndarray::{Array1, Array2, ArrayView1, ArrayView2};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

/// Gains below this are rounding noise and do not justify a split
const MIN_GAIN: f64 = 1e-12;

/// Decision tree node
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum TreeNode {
    /// Internal node: samples with `x[feature_idx] <= threshold` go left
    Split {
        feature_idx: usize,
        threshold: f64,
        left: usize,
        right: usize,
    },
    /// Regression leaf
    Leaf { value: f64 },
    /// Binary classification leaf, `[P(class=0), P(class=1)]`
    ClassLeaf { probabilities: [f64; 2] },
}

/// Impurity criterion
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum Criterion {
    /// Class-weighted Gini impurity (binary classification)
    Gini,
    /// Label variance (regression)
    Variance,
}

/// Growth limits shared by every tree family
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TreeParams {
    /// Maximum depth; a node at this depth becomes a leaf
    pub max_depth: usize,
    /// Nodes with fewer samples become leaves
    pub min_samples_split: usize,
    /// Candidate splits leaving fewer samples on either side are rejected
    pub min_samples_leaf: usize,
}

impl Default for TreeParams {
    fn default() -> Self {
        Self {
            max_depth: 10,
            min_samples_split: 10,
            min_samples_leaf: 5,
        }
    }
}

/// A fitted, immutable decision tree
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecisionTree {
    nodes: Vec<TreeNode>,
    root: usize,
    criterion: Criterion,
    /// Maps tree-local feature positions to global feature indices
    feature_subset: Option<Vec<usize>>,
    /// Normalized gain per tree-local feature
    feature_importances: Vec<f64>,
}

impl DecisionTree {
    pub fn nodes(&self) -> &[TreeNode] {
        &self.nodes
    }

    pub fn root(&self) -> usize {
        self.root
    }

    pub fn criterion(&self) -> Criterion {
        self.criterion
    }

    pub fn feature_subset(&self) -> Option<&[usize]> {
        self.feature_subset.as_deref()
    }

    /// Importances over tree-local feature positions
    pub fn feature_importances(&self) -> &[f64] {
        &self.feature_importances
    }

    /// Importances scattered back onto the global feature vector
    pub fn global_importances(&self, n_features: usize) -> Vec<f64> {
        let mut out = vec![0.0; n_features];
        for (local, &imp) in self.feature_importances.iter().enumerate() {
            let global = self.global_feature(local);
            if global < n_features {
                out[global] += imp;
            }
        }
        out
    }

    fn global_feature(&self, local: usize) -> usize {
        match &self.feature_subset {
            Some(subset) => subset[local],
            None => local,
        }
    }

    /// Predict one sample given its full (global) feature vector.
    ///
    /// Regression trees return the leaf value; classification trees return
    /// `P(class=1)`. Features missing from a short row read as `0.0`.
    pub fn predict_row(&self, row: ArrayView1<'_, f64>) -> f64 {
        let mut idx = self.root;
        loop {
            match &self.nodes[idx] {
                TreeNode::Leaf { value } => return *value,
                TreeNode::ClassLeaf { probabilities } => return probabilities[1],
                TreeNode::Split { feature_idx, threshold, left, right } => {
                    let value = row.get(self.global_feature(*feature_idx)).copied().unwrap_or(0.0);
                    idx = if value <= *threshold { *left } else { *right };
                }
            }
        }
    }

    /// Predict every row of a matrix
    pub fn predict(&self, x: &Array2<f64>) -> Array1<f64> {
        x.rows().into_iter().map(|row| self.predict_row(row)).collect()
    }

    /// Tree depth (a single leaf has depth 1)
    pub fn depth(&self) -> usize {
        self.node_depth(self.root)
    }

    fn node_depth(&self, idx: usize) -> usize {
        match &self.nodes[idx] {
            TreeNode::Split { left, right, .. } => 1 + self.node_depth(*left).max(self.node_depth(*right)),
            _ => 1,
        }
    }

    /// Number of leaves
    pub fn n_leaves(&self) -> usize {
        self.nodes
            .iter()
            .filter(|n| !matches!(n, TreeNode::Split { .. }))
            .count()
    }
}

/// Grows [`DecisionTree`]s
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TreeBuilder {
    pub params: TreeParams,
    pub criterion: Criterion,
    /// Weights for classes 0 and 1 (classification only)
    pub class_weights: [f64; 2],
}

impl TreeBuilder {
    /// Create a classification tree builder
    pub fn classifier(params: TreeParams) -> Self {
        Self {
            params,
            criterion: Criterion::Gini,
            class_weights: [1.0, 1.0],
        }
    }

    /// Create a regression tree builder
    pub fn regressor(params: TreeParams) -> Self {
        Self {
            params,
            criterion: Criterion::Variance,
            class_weights: [1.0, 1.0],
        }
    }

    /// Set class weights used for Gini and leaf probabilities
    pub fn with_class_weights(mut self, weights: [f64; 2]) -> Self {
        self.class_weights = weights;
        self
    }

    /// Fit on every row and every feature
    pub fn fit(&self, x: &Array2<f64>, y: &Array1<f64>) -> Result<DecisionTree> {
        let rows: Vec<usize> = (0..x.nrows()).collect();
        self.fit_rows(x.view(), y.view(), rows, None)
    }

    /// Fit on the given rows (duplicates allowed, e.g. a bootstrap sample),
    /// optionally restricted to a subset of global feature indices.
    pub fn fit_rows<'a>(
        &'a self,
        x: ArrayView2<'a, f64>,
        y: ArrayView1<'a, f64>,
        rows: Vec<usize>,
        feature_subset: Option<Vec<usize>>,
    ) -> Result<DecisionTree> {
        self.validate(&x, &y, &rows, feature_subset.as_deref())?;

        let columns: Vec<usize> = match &feature_subset {
            Some(subset) => subset.clone(),
            None => (0..x.ncols()).collect(),
        };

        let mut grower = Grower {
            x,
            y,
            columns,
            builder: self,
            nodes: Vec::new(),
            importances: Vec::new(),
        };
        grower.importances = vec![0.0; grower.columns.len()];
        let root = grower.grow(rows, 0);

        let mut importances = grower.importances;
        let total: f64 = importances.iter().sum();
        if total > 0.0 {
            for imp in &mut importances {
                *imp /= total;
            }
        }

        Ok(DecisionTree {
            nodes: grower.nodes,
            root,
            criterion: self.criterion,
            feature_subset,
            feature_importances: importances,
        })
    }

    fn validate(
        &self,
        x: &ArrayView2<'_, f64>,
        y: &ArrayView1<'_, f64>,
        rows: &[usize],
        feature_subset: Option<&[usize]>,
    ) -> Result<()> {
        if x.nrows() != y.len() {
            return Err(LedgerMlError::ShapeError {
                expected: format!("y length = {}", x.nrows()),
                actual: format!("y length = {}", y.len()),
            });
        }
        if rows.is_empty() {
            return Err(LedgerMlError::TrainingError(
                "cannot grow a tree on zero samples".to_string(),
            ));
        }
        if let Some(&bad) = rows.iter().find(|&&r| r >= x.nrows()) {
            return Err(LedgerMlError::invalid_parameter("row index", bad, "out of bounds"));
        }
        if let Some(subset) = feature_subset {
            if subset.is_empty() {
                return Err(LedgerMlError::invalid_parameter("feature_subset", "[]", "must not be empty"));
            }
            if let Some(&bad) = subset.iter().find(|&&f| f >= x.ncols()) {
                return Err(LedgerMlError::invalid_parameter("feature index", bad, "out of bounds"));
            }
        }
        if self.params.min_samples_leaf == 0 {
            return Err(LedgerMlError::invalid_parameter("min_samples_leaf", 0, "must be at least 1"));
        }
        if self.class_weights.iter().any(|w| !w.is_finite() || *w <= 0.0) {
            return Err(LedgerMlError::invalid_parameter(
                "class_weights",
                format!("{:?}", self.class_weights),
                "must be finite and positive",
            ));
        }
        Ok(())
    }
}

/// Node statistics needed for stop conditions, impurity and leaf values
#[derive(Debug, Clone, Copy, Default)]
struct NodeStats {
    count: usize,
    /// Raw class counts (classification)
    n0: usize,
    n1: usize,
    /// Label sums (regression)
    sum: f64,
    sq_sum: f64,
}

impl NodeStats {
    fn push(&mut self, label: f64) {
        self.count += 1;
        if label >= 0.5 {
            self.n1 += 1;
        } else {
            self.n0 += 1;
        }
        self.sum += label;
        self.sq_sum += label * label;
    }
}

struct Grower<'a> {
    x: ArrayView2<'a, f64>,
    y: ArrayView1<'a, f64>,
    columns: Vec<usize>,
    builder: &'a TreeBuilder,
    nodes: Vec<TreeNode>,
    importances: Vec<f64>,
}

impl<'a> Grower<'a> {
    fn grow(&mut self, rows: Vec<usize>, depth: usize) -> usize {
        let mut stats = NodeStats::default();
        for &r in &rows {
            stats.push(self.y[r]);
        }

        let params = &self.builder.params;
        let should_stop = depth >= params.max_depth
            || stats.count < params.min_samples_split
            || self.is_pure(&rows, &stats);

        if !should_stop {
            if let Some((local, threshold, gain)) = self.find_best_split(&rows, &stats) {
                let column = self.columns[local];
                let (left_rows, right_rows): (Vec<usize>, Vec<usize>) =
                    rows.iter().partition(|&&r| self.x[[r, column]] <= threshold);

                let node_weight = self.weight(&stats);
                self.importances[local] += node_weight * gain;

                let left = self.grow(left_rows, depth + 1);
                let right = self.grow(right_rows, depth + 1);
                self.nodes.push(TreeNode::Split {
                    feature_idx: local,
                    threshold,
                    left,
                    right,
                });
                return self.nodes.len() - 1;
            }
        }

        let leaf = self.leaf(&rows, &stats);
        self.nodes.push(leaf);
        self.nodes.len() - 1
    }

    fn is_pure(&self, rows: &[usize], stats: &NodeStats) -> bool {
        match self.builder.criterion {
            Criterion::Gini => stats.n0 == 0 || stats.n1 == 0,
            Criterion::Variance => {
                let first = self.y[rows[0]];
                rows.iter().all(|&r| (self.y[r] - first).abs() < 1e-12)
            }
        }
    }

    /// Weighted sample mass of a node
    fn weight(&self, stats: &NodeStats) -> f64 {
        match self.builder.criterion {
            Criterion::Gini => {
                let [w0, w1] = self.builder.class_weights;
                w0 * stats.n0 as f64 + w1 * stats.n1 as f64
            }
            Criterion::Variance => stats.count as f64,
        }
    }

    fn impurity(&self, stats: &NodeStats) -> f64 {
        match self.builder.criterion {
            Criterion::Gini => {
                let [w0, w1] = self.builder.class_weights;
                stats::gini(&[w0 * stats.n0 as f64, w1 * stats.n1 as f64])
            }
            Criterion::Variance => {
                if stats.count == 0 {
                    return 0.0;
                }
                let n = stats.count as f64;
                (stats.sq_sum / n - (stats.sum / n).powi(2)).max(0.0)
            }
        }
    }

    fn leaf(&self, rows: &[usize], stats: &NodeStats) -> TreeNode {
        match self.builder.criterion {
            Criterion::Gini => {
                let [w0, w1] = self.builder.class_weights;
                let neg = w0 * stats.n0 as f64;
                let pos = w1 * stats.n1 as f64;
                let p1 = if pos + neg > 0.0 { pos / (pos + neg) } else { 0.5 };
                TreeNode::ClassLeaf { probabilities: [1.0 - p1, p1] }
            }
            Criterion::Variance => {
                let labels: Vec<f64> = rows.iter().map(|&r| self.y[r]).collect();
                TreeNode::Leaf { value: stats::mean(&labels) }
            }
        }
    }

    /// Best `(local_feature, threshold, gain)`; ties keep the first found in
    /// feature order, then threshold order.
    fn find_best_split(&self, rows: &[usize], parent: &NodeStats) -> Option<(usize, f64, f64)> {
        let parent_impurity = self.impurity(parent);
        let min_leaf = self.builder.params.min_samples_leaf;
        let n = rows.len();
        if n < 2 * min_leaf {
            return None;
        }

        let mut best: Option<(usize, f64, f64)> = None;
        let mut best_gain = MIN_GAIN;

        let mut pairs: Vec<(f64, f64)> = Vec::with_capacity(n);
        for (local, &column) in self.columns.iter().enumerate() {
            pairs.clear();
            pairs.extend(rows.iter().map(|&r| (self.x[[r, column]], self.y[r])));
            pairs.sort_by(|a, b| a.0.partial_cmp(&b.0).unwrap_or(Ordering::Equal));

            let mut left = NodeStats::default();
            for i in 0..n - 1 {
                left.push(pairs[i].1);
                if pairs[i].0 == pairs[i + 1].0 {
                    continue;
                }
                let left_n = i + 1;
                if left_n < min_leaf {
                    continue;
                }
                if n - left_n < min_leaf {
                    break;
                }

                let right = NodeStats {
                    count: parent.count - left.count,
                    n0: parent.n0 - left.n0,
                    n1: parent.n1 - left.n1,
                    sum: parent.sum - left.sum,
                    sq_sum: parent.sq_sum - left.sq_sum,
                };

                let wl = self.weight(&left);
                let wr = self.weight(&right);
                if wl + wr <= 0.0 {
                    continue;
                }
                let weighted = (wl * self.impurity(&left) + wr * self.impurity(&right)) / (wl + wr);
                let gain = parent_impurity - weighted;

                if gain > best_gain {
                    best_gain = gain;
                    best = Some((local, (pairs[i].0 + pairs[i + 1].0) / 2.0, gain));
                }
            }
        }

        best
    }
}
