//! Utility functions and types

pub mod stats;

pub use stats::{entropy, gini, mean, median, pearson_correlation, std_dev, variance};

use std::time::Instant;

/// Wall-clock timer used to fill run durations
#[derive(Debug, Clone, Copy)]
pub struct Timer {
    start: Instant,
}

impl Timer {
    /// Start a new timer
    pub fn start() -> Self {
        Self { start: Instant::now() }
    }

    /// Elapsed milliseconds since start
    pub fn elapsed_ms(&self) -> u64 {
        self.start.elapsed().as_millis() as u64
    }
}
