//! LedgerML - model training for mobile-money ledgers
//!
//! Trains, evaluates, serializes and versions three models over historical
//! transaction records:
//! - a Random Forest fraud classifier
//! - a Gradient Boosting credit-score regressor (scores clamped to 300-850)
//! - a multinomial Naive Bayes transaction categorizer on TF-IDF text features
//!
//! # Modules
//!
//! ## Data
//! - [`dataset`] - Feature vectors, labeled samples, shuffling and splits
//! - [`features`] - Per-model feature tables and record extractors
//! - [`synthetic`] - Minority-class oversampling
//! - [`preprocessing`] - Feature scaling
//! - [`text`] - Tokenization, TF-IDF vocabularies and merchant keywords
//!
//! ## Models
//! - [`training`] - CART trees, forests, boosting, Naive Bayes and run configuration
//! - [`evaluation`] - Classification, regression and multiclass metrics
//!
//! ## Lifecycle
//! - [`export`] - Artifacts, artifact stores and training history
//! - [`pipeline`] - End-to-end training runs
//! - [`cli`] - Command-line interface

// Core error handling
pub mod error;

// Data
pub mod dataset;
pub mod features;
pub mod preprocessing;
pub mod synthetic;
pub mod text;
pub mod utils;

// Models
pub mod evaluation;
pub mod training;

// Lifecycle
pub mod export;
pub mod pipeline;

// Services
pub mod cli;

pub use error::{LedgerMlError, Result};

/// Re-export commonly used types
pub mod prelude {
    // Error handling
    pub use crate::error::{LedgerMlError, Result};

    // Data
    pub use crate::dataset::{Dataset, DatasetSplit, FeatureVector, LabeledSample};
    pub use crate::features::{FeatureExtractor, TabularExtractor};

    // Training
    pub use crate::training::{
        DateRange, GradientBoostingModel, Hyperparameters, ModelKind, NaiveBayesModel, RandomForestModel,
        ThresholdSource, TrainingConfig,
    };

    // Evaluation
    pub use crate::evaluation::{EvaluationReport, Evaluator, ModelMetrics};

    // Export
    pub use crate::export::{
        ArtifactStore, FileArtifactStore, InMemoryTrainingHistory, JsonFileHistory, Prediction, SerializationFormat,
        SerializedModel, TrainedModel, TrainingHistory,
    };

    // Pipeline
    pub use crate::pipeline::{PipelineStage, RunStatus, TrainingOutcome, TrainingPipeline, TrainingRun};
}
