//! Artifact persistence

use super::artifact::SerializedModel;
use crate::error::{LedgerMlError, Result};
use crate::training::ModelKind;
use serde::{Deserialize, Serialize};
use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// On-disk encoding of an artifact
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SerializationFormat {
    /// Portable, human-readable
    #[default]
    Json,
    /// Compact binary
    Bincode,
}

impl SerializationFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            SerializationFormat::Json => "json",
            SerializationFormat::Bincode => "bin",
        }
    }

    /// Format implied by a file extension, if any
    pub fn from_path(path: &Path) -> Option<Self> {
        match path.extension().and_then(|e| e.to_str()) {
            Some("json") => Some(SerializationFormat::Json),
            Some("bin") => Some(SerializationFormat::Bincode),
            _ => None,
        }
    }

    pub fn encode(&self, artifact: &SerializedModel) -> Result<Vec<u8>> {
        Ok(match self {
            SerializationFormat::Json => serde_json::to_vec_pretty(artifact)?,
            SerializationFormat::Bincode => bincode::serialize(artifact)?,
        })
    }

    pub fn decode(&self, bytes: &[u8]) -> Result<SerializedModel> {
        Ok(match self {
            SerializationFormat::Json => serde_json::from_slice(bytes)?,
            SerializationFormat::Bincode => bincode::deserialize(bytes)?,
        })
    }
}

/// Where trained artifacts are written
pub trait ArtifactStore {
    /// Persist `artifact` at `location`, returning the resolved location
    fn save(&self, artifact: &SerializedModel, location: &str) -> Result<String>;

    fn load(&self, location: &str) -> Result<SerializedModel>;

    /// Location used when the caller does not choose one
    fn default_location(&self, kind: ModelKind, version: &str) -> String {
        format!("{}/{}", kind.as_str().to_lowercase(), sanitize(version))
    }
}

/// Artifacts as files under a root directory
#[derive(Debug, Clone)]
pub struct FileArtifactStore {
    root: PathBuf,
    format: SerializationFormat,
}

impl FileArtifactStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            format: SerializationFormat::default(),
        }
    }

    pub fn with_format(mut self, format: SerializationFormat) -> Self {
        self.format = format;
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn format(&self) -> SerializationFormat {
        self.format
    }

    fn resolve(&self, location: &str) -> PathBuf {
        let path = self.root.join(location);
        if path.extension().is_some() {
            path
        } else {
            path.with_extension(self.format.extension())
        }
    }

    /// Read an artifact from an arbitrary path; the extension picks the format
    pub fn load_path(path: impl AsRef<Path>) -> Result<SerializedModel> {
        let path = path.as_ref();
        let format = SerializationFormat::from_path(path).unwrap_or_default();
        let file = File::open(path)
            .map_err(|e| LedgerMlError::NotFound(format!("artifact {}: {}", path.display(), e)))?;
        let mut bytes = Vec::new();
        BufReader::new(file).read_to_end(&mut bytes)?;
        let artifact = format.decode(&bytes)?;
        artifact.check_compatible()?;
        Ok(artifact)
    }
}

impl ArtifactStore for FileArtifactStore {
    fn save(&self, artifact: &SerializedModel, location: &str) -> Result<String> {
        let path = self.resolve(location);
        let format = SerializationFormat::from_path(&path).unwrap_or(self.format);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let bytes = format.encode(artifact)?;
        // Write beside the target, then rename, so readers never see a partial file
        let tmp = path.with_extension("tmp");
        {
            let mut writer = BufWriter::new(File::create(&tmp)?);
            writer.write_all(&bytes)?;
            writer.flush()?;
        }
        fs::rename(&tmp, &path)?;

        let location = path.to_string_lossy().to_string();
        info!(
            kind = %artifact.model_kind,
            version = %artifact.version,
            bytes = bytes.len(),
            location = %location,
            "Saved model artifact"
        );
        Ok(location)
    }

    fn load(&self, location: &str) -> Result<SerializedModel> {
        let candidate = Path::new(location);
        let path = if candidate.is_absolute() || candidate.exists() {
            candidate.to_path_buf()
        } else {
            self.resolve(location)
        };
        debug!(path = %path.display(), "Loading model artifact");
        Self::load_path(path)
    }
}

fn sanitize(version: &str) -> String {
    version
        .chars()
        .map(|c| if c.is_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
        .collect()
}
