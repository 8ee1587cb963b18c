//! Model evaluation
//!
//! Classification metrics at a decision threshold plus rank-based AUC,
//! regression metrics with a domain tolerance band, and macro-averaged
//! multiclass metrics for the categorization model.

use crate::error::{LedgerMlError, Result};
use crate::utils::stats;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

/// Confusion counts for a binary decision
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfusionCounts {
    pub tp: usize,
    pub fp: usize,
    pub tn: usize,
    pub fn_: usize,
}

impl ConfusionCounts {
    /// Count decisions `score >= threshold` against labels `>= 0.5`
    pub fn at_threshold(y_true: &[f64], scores: &[f64], threshold: f64) -> Self {
        let mut counts = Self::default();
        for (&t, &s) in y_true.iter().zip(scores.iter()) {
            match (t >= 0.5, s >= threshold) {
                (true, true) => counts.tp += 1,
                (false, true) => counts.fp += 1,
                (false, false) => counts.tn += 1,
                (true, false) => counts.fn_ += 1,
            }
        }
        counts
    }

    pub fn total(&self) -> usize {
        self.tp + self.fp + self.tn + self.fn_
    }

    pub fn accuracy(&self) -> f64 {
        ratio(self.tp + self.tn, self.total())
    }

    pub fn precision(&self) -> f64 {
        ratio(self.tp, self.tp + self.fp)
    }

    pub fn recall(&self) -> f64 {
        ratio(self.tp, self.tp + self.fn_)
    }

    pub fn f1(&self) -> f64 {
        f1_score(self.precision(), self.recall())
    }
}

/// Binary classification metrics
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassificationMetrics {
    pub threshold: f64,
    pub accuracy: f64,
    pub precision: f64,
    pub recall: f64,
    pub f1_score: f64,
    pub auc_roc: f64,
    pub confusion: ConfusionCounts,
    pub n_samples: usize,
}

/// Regression metrics
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegressionMetrics {
    pub mse: f64,
    pub rmse: f64,
    pub mae: f64,
    pub r2: f64,
    /// Fraction of predictions within `tolerance` of the actual value
    pub within_tolerance: f64,
    pub tolerance: f64,
    /// Pearson correlation between predictions and actual values
    pub correlation: f64,
    pub n_samples: usize,
}

/// Multiclass metrics (macro averages over classes present in truth or predictions)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MulticlassMetrics {
    pub accuracy: f64,
    pub macro_precision: f64,
    pub macro_recall: f64,
    pub macro_f1: f64,
    pub n_classes: usize,
    pub n_samples: usize,
}

/// Metrics of any model kind
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ModelMetrics {
    Classification(ClassificationMetrics),
    Regression(RegressionMetrics),
    Multiclass(MulticlassMetrics),
}

impl ModelMetrics {
    /// The headline number for a run: F1, R², or macro F1
    pub fn primary(&self) -> f64 {
        match self {
            ModelMetrics::Classification(m) => m.f1_score,
            ModelMetrics::Regression(m) => m.r2,
            ModelMetrics::Multiclass(m) => m.macro_f1,
        }
    }

    pub fn primary_name(&self) -> &'static str {
        match self {
            ModelMetrics::Classification(_) => "f1_score",
            ModelMetrics::Regression(_) => "r2",
            ModelMetrics::Multiclass(_) => "macro_f1",
        }
    }
}

/// Metrics on the validation and test partitions of one run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluationReport {
    pub validation: Option<ModelMetrics>,
    pub test: Option<ModelMetrics>,
}

/// Stateless metric computations
pub struct Evaluator;

impl Evaluator {
    /// Classification metrics for probability scores at `threshold`
    pub fn classification(y_true: &[f64], scores: &[f64], threshold: f64) -> Result<ClassificationMetrics> {
        check_lengths(y_true.len(), scores.len())?;
        let confusion = ConfusionCounts::at_threshold(y_true, scores, threshold);
        Ok(ClassificationMetrics {
            threshold,
            accuracy: confusion.accuracy(),
            precision: confusion.precision(),
            recall: confusion.recall(),
            f1_score: confusion.f1(),
            auc_roc: Self::auc(y_true, scores)?,
            confusion,
            n_samples: y_true.len(),
        })
    }

    /// Rank-based AUC: walk scores in descending order, and for every negative
    /// add the fraction of positives ranked above it. Tied scores count half.
    /// Returns 0.0 when either class is absent.
    pub fn auc(y_true: &[f64], scores: &[f64]) -> Result<f64> {
        check_lengths(y_true.len(), scores.len())?;

        let total_pos = y_true.iter().filter(|&&t| t >= 0.5).count();
        let total_neg = y_true.len() - total_pos;
        if total_pos == 0 || total_neg == 0 {
            return Ok(0.0);
        }

        let mut order: Vec<usize> = (0..scores.len()).collect();
        order.sort_by(|&a, &b| scores[b].partial_cmp(&scores[a]).unwrap_or(Ordering::Equal));

        let mut sum = 0.0;
        let mut tp_sum = 0.0;
        let mut i = 0;
        while i < order.len() {
            let score = scores[order[i]];
            let mut group_pos = 0.0;
            let mut group_neg = 0.0;
            while i < order.len() && scores[order[i]] == score {
                if y_true[order[i]] >= 0.5 {
                    group_pos += 1.0;
                } else {
                    group_neg += 1.0;
                }
                i += 1;
            }
            sum += group_neg * (tp_sum + group_pos / 2.0) / total_pos as f64;
            tp_sum += group_pos;
        }

        Ok(sum / total_neg as f64)
    }

    /// Regression metrics; `tolerance` defines the within-tolerance band
    pub fn regression(y_true: &[f64], y_pred: &[f64], tolerance: f64) -> Result<RegressionMetrics> {
        check_lengths(y_true.len(), y_pred.len())?;
        let n = y_true.len();
        if n == 0 {
            return Ok(RegressionMetrics {
                mse: 0.0,
                rmse: 0.0,
                mae: 0.0,
                r2: 0.0,
                within_tolerance: 0.0,
                tolerance,
                correlation: 0.0,
                n_samples: 0,
            });
        }

        let errors: Vec<f64> = y_true.iter().zip(y_pred.iter()).map(|(t, p)| t - p).collect();
        let ss_res: f64 = errors.iter().map(|e| e * e).sum();
        let mse = ss_res / n as f64;
        let mae = errors.iter().map(|e| e.abs()).sum::<f64>() / n as f64;

        let y_mean = stats::mean(y_true);
        let ss_tot: f64 = y_true.iter().map(|y| (y - y_mean).powi(2)).sum();
        let r2 = if ss_tot > 0.0 { 1.0 - ss_res / ss_tot } else { 0.0 };

        let within = errors.iter().filter(|e| e.abs() <= tolerance).count();

        Ok(RegressionMetrics {
            mse,
            rmse: mse.sqrt(),
            mae,
            r2,
            within_tolerance: ratio(within, n),
            tolerance,
            correlation: stats::pearson_correlation(y_pred, y_true),
            n_samples: n,
        })
    }

    /// Multiclass accuracy and macro precision/recall/F1
    pub fn multiclass(y_true: &[usize], y_pred: &[usize]) -> Result<MulticlassMetrics> {
        check_lengths(y_true.len(), y_pred.len())?;
        let n = y_true.len();
        let n_classes = y_true.iter().chain(y_pred.iter()).max().map_or(0, |&m| m + 1);

        let mut tp = vec![0usize; n_classes];
        let mut predicted = vec![0usize; n_classes];
        let mut actual = vec![0usize; n_classes];
        for (&t, &p) in y_true.iter().zip(y_pred.iter()) {
            actual[t] += 1;
            predicted[p] += 1;
            if t == p {
                tp[t] += 1;
            }
        }

        let present: Vec<usize> = (0..n_classes)
            .filter(|&c| actual[c] > 0 || predicted[c] > 0)
            .collect();
        let k = present.len().max(1) as f64;

        let mut precision = 0.0;
        let mut recall = 0.0;
        let mut f1 = 0.0;
        for &c in &present {
            let p = ratio(tp[c], predicted[c]);
            let r = ratio(tp[c], actual[c]);
            precision += p;
            recall += r;
            f1 += f1_score(p, r);
        }

        Ok(MulticlassMetrics {
            accuracy: ratio(tp.iter().sum(), n),
            macro_precision: precision / k,
            macro_recall: recall / k,
            macro_f1: f1 / k,
            n_classes: present.len(),
            n_samples: n,
        })
    }
}

fn ratio(num: usize, denom: usize) -> f64 {
    if denom == 0 {
        0.0
    } else {
        num as f64 / denom as f64
    }
}

fn f1_score(precision: f64, recall: f64) -> f64 {
    if precision + recall > 0.0 {
        2.0 * precision * recall / (precision + recall)
    } else {
        0.0
    }
}

fn check_lengths(expected: usize, actual: usize) -> Result<()> {
    if expected != actual {
        return Err(LedgerMlError::ShapeError {
            expected: format!("{} predictions", expected),
            actual: format!("{} predictions", actual),
        });
    }
    Ok(())
}
