//! Jittered minority oversampling

use crate::dataset::{Dataset, LabeledSample};
use crate::error::{LedgerMlError, Result};
use rand::prelude::*;
use rand_xoshiro::Xoshiro256PlusPlus;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Relative jitter span: each synthetic feature moves by at most ±5%
const JITTER_SPAN: f64 = 0.1;

/// Oversamples the minority label with jittered copies of existing samples.
///
/// Majority samples are never dropped. Synthetic samples are added until the
/// minority count reaches `ceil(majority * r / (1 - r))`, where `r` is the
/// target minority ratio.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JitterOverSampler {
    target_minority_ratio: f64,
    seed: Option<u64>,
}

impl JitterOverSampler {
    pub fn new(target_minority_ratio: f64) -> Result<Self> {
        if !(target_minority_ratio > 0.0 && target_minority_ratio < 1.0) {
            return Err(LedgerMlError::invalid_parameter(
                "target_minority_ratio",
                target_minority_ratio,
                "must be strictly between 0 and 1",
            ));
        }
        Ok(Self {
            target_minority_ratio,
            seed: None,
        })
    }

    /// Set random seed
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    /// Number of synthetic samples needed for the given class counts
    pub fn synthetic_count(&self, minority: usize, majority: usize) -> usize {
        if minority == 0 || majority == 0 {
            return 0;
        }
        let r = self.target_minority_ratio;
        let required = (majority as f64 * r / (1.0 - r) - 1e-9).ceil() as usize;
        required.saturating_sub(minority)
    }

    /// Resample with the sampler's own seed
    pub fn resample(&self, dataset: &Dataset) -> Result<Dataset> {
        let mut rng = match self.seed {
            Some(seed) => Xoshiro256PlusPlus::seed_from_u64(seed),
            None => Xoshiro256PlusPlus::from_entropy(),
        };
        self.resample_with(dataset, &mut rng)
    }

    /// Resample with a caller-supplied generator
    pub fn resample_with<R: Rng + ?Sized>(&self, dataset: &Dataset, rng: &mut R) -> Result<Dataset> {
        let (positives, negatives) = dataset.binary_counts();
        let minority_is_positive = positives <= negatives;
        let (minority, majority) = if minority_is_positive {
            (positives, negatives)
        } else {
            (negatives, positives)
        };

        let n_to_add = self.synthetic_count(minority, majority);
        if n_to_add == 0 {
            debug!(minority, majority, "Balancing is a no-op");
            return Ok(dataset.clone());
        }

        let pool: Vec<&LabeledSample> = dataset
            .iter()
            .filter(|s| s.is_positive() == minority_is_positive)
            .collect();

        let synthetic: Vec<LabeledSample> = (0..n_to_add)
            .map(|_| {
                let source = pool[rng.gen_range(0..pool.len())];
                let jittered = source
                    .features()
                    .map(|&x| x + (rng.gen::<f64>() - 0.5) * JITTER_SPAN * x.abs());
                source.with_features(jittered)
            })
            .collect();

        debug!(
            minority,
            majority,
            synthetic = synthetic.len(),
            "Oversampled minority label"
        );
        dataset.extended(synthetic)
    }
}

impl Dataset {
    /// Oversample the minority label up to `target_minority_ratio`
    pub fn balance<R: Rng + ?Sized>(&self, target_minority_ratio: f64, rng: &mut R) -> Result<Dataset> {
        JitterOverSampler::new(target_minority_ratio)?.resample_with(self, rng)
    }
}
