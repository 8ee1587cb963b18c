//! Synthetic data generation module
//!
//! Class balancing for binary-labeled datasets by jittered oversampling of
//! the minority label.

mod jitter;

pub use jitter::JitterOverSampler;
