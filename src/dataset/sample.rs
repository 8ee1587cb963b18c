//! Feature vectors and labeled samples

use ndarray::{Array1, ArrayView1};
use serde::{Deserialize, Serialize};

/// Fixed-length, positionally indexed numeric feature vector.
///
/// Positions are named by the feature-name table of the model kind the
/// vector was extracted for. There are no missing markers: extractors
/// substitute domain defaults before building the vector.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureVector(Array1<f64>);

impl FeatureVector {
    pub fn new(values: Vec<f64>) -> Self {
        Self(Array1::from_vec(values))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<f64> {
        self.0.get(index).copied()
    }

    pub fn view(&self) -> ArrayView1<'_, f64> {
        self.0.view()
    }

    pub fn as_array(&self) -> &Array1<f64> {
        &self.0
    }

    pub fn to_vec(&self) -> Vec<f64> {
        self.0.to_vec()
    }

    /// Apply `f` to every component, producing a new vector
    pub fn map(&self, f: impl FnMut(&f64) -> f64) -> Self {
        Self(self.0.map(f))
    }
}

impl From<Vec<f64>> for FeatureVector {
    fn from(values: Vec<f64>) -> Self {
        Self::new(values)
    }
}

impl From<Array1<f64>> for FeatureVector {
    fn from(values: Array1<f64>) -> Self {
        Self(values)
    }
}

/// One labeled training example. Immutable once constructed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LabeledSample {
    features: FeatureVector,
    label: f64,
    text: Option<String>,
}

impl LabeledSample {
    pub fn new(features: impl Into<FeatureVector>, label: f64) -> Self {
        Self {
            features: features.into(),
            label,
            text: None,
        }
    }

    /// Sample carrying a normalized text blob (transaction categorization)
    pub fn with_text(features: impl Into<FeatureVector>, label: f64, text: impl Into<String>) -> Self {
        Self {
            features: features.into(),
            label,
            text: Some(text.into()),
        }
    }

    pub fn features(&self) -> &FeatureVector {
        &self.features
    }

    pub fn label(&self) -> f64 {
        self.label
    }

    pub fn text(&self) -> Option<&str> {
        self.text.as_deref()
    }

    /// Binary view of the label: anything at or above 0.5 is the positive class
    pub fn is_positive(&self) -> bool {
        self.label >= 0.5
    }

    /// Copy of this sample with replaced features, keeping label and text
    pub fn with_features(&self, features: FeatureVector) -> Self {
        Self {
            features,
            label: self.label,
            text: self.text.clone(),
        }
    }
}
