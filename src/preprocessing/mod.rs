//! Data preprocessing module
//!
//! Standardization parameters fitted on the training partition and carried
//! inside every model artifact.

mod scaler;

pub use scaler::FeatureScaling;
