//! Feature scaling (z-score standardization)

use crate::error::{LedgerMlError, Result};
use crate::utils::stats;
use ndarray::{Array2, ArrayView1, Axis};
use serde::{Deserialize, Serialize};

/// Per-feature standardization parameters: `(x - mean) / std`.
///
/// A zero (or non-finite) standard deviation is stored as `1.0`, so constant
/// features map to `x - mean` instead of dividing by zero.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureScaling {
    pub mean: Vec<f64>,
    pub std: Vec<f64>,
}

impl FeatureScaling {
    /// Fit on a row-major feature matrix
    pub fn fit(x: &Array2<f64>) -> Self {
        let mut mean = Vec::with_capacity(x.ncols());
        let mut std = Vec::with_capacity(x.ncols());

        for column in x.axis_iter(Axis(1)) {
            let values = column.to_vec();
            mean.push(stats::mean(&values));
            let s = stats::std_dev(&values);
            std.push(if s > 0.0 && s.is_finite() { s } else { 1.0 });
        }

        Self { mean, std }
    }

    /// Identity scaling for `n` features
    pub fn identity(n: usize) -> Self {
        Self {
            mean: vec![0.0; n],
            std: vec![1.0; n],
        }
    }

    pub fn len(&self) -> usize {
        self.mean.len()
    }

    pub fn is_empty(&self) -> bool {
        self.mean.is_empty()
    }

    fn check_len(&self, actual: usize) -> Result<()> {
        if actual != self.len() {
            return Err(LedgerMlError::ShapeError {
                expected: format!("{} features", self.len()),
                actual: format!("{} features", actual),
            });
        }
        Ok(())
    }

    /// Scale a single row
    pub fn transform_row(&self, row: ArrayView1<'_, f64>) -> Result<Vec<f64>> {
        self.check_len(row.len())?;
        Ok(row
            .iter()
            .zip(self.mean.iter().zip(self.std.iter()))
            .map(|(&x, (&m, &s))| (x - m) / s)
            .collect())
    }

    /// Scale a whole matrix
    pub fn transform(&self, x: &Array2<f64>) -> Result<Array2<f64>> {
        self.check_len(x.ncols())?;
        let mut out = x.clone();
        for (j, mut column) in out.axis_iter_mut(Axis(1)).enumerate() {
            let (m, s) = (self.mean[j], self.std[j]);
            column.mapv_inplace(|v| (v - m) / s);
        }
        Ok(out)
    }
}
