//! Model export and serialization module
//!
//! Provides the persisted side of a training run:
//! - Self-describing model artifacts
//! - Artifact stores (JSON or bincode files)
//! - Training history with deploy marking and version comparison

mod artifact;
mod history;
mod store;

pub use artifact::{Prediction, SerializedModel, TrainedModel, ARTIFACT_FORMAT_VERSION};
pub use history::{InMemoryTrainingHistory, JsonFileHistory, TrainingHistory, VersionComparison};
pub use store::{ArtifactStore, FileArtifactStore, SerializationFormat};
