//! Model training module
//!
//! Provides the models trained by the pipeline and their run configuration:
//! - CART decision trees (shared by both ensembles)
//! - Random Forest fraud classifier
//! - Gradient Boosting credit-score regressor
//! - Multinomial Naive Bayes transaction categorizer

mod config;
pub mod decision_tree;
pub mod gradient_boosting;
pub mod naive_bayes;
pub mod random_forest;

pub use config::{
    DateRange, Hyperparameters, ModelKind, ResolvedHyperparameters, ThresholdSource, TrainingConfig,
};
pub use decision_tree::{Criterion, DecisionTree, TreeBuilder, TreeNode, TreeParams};
pub use gradient_boosting::{GradientBoostingConfig, GradientBoostingModel, ScoreBand, ScoreRange};
pub use naive_bayes::{NaiveBayesConfig, NaiveBayesModel};
pub use random_forest::{class_weights, threshold_grid, RandomForestConfig, RandomForestModel, RiskLevel};
