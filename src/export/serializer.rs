//! Model artifact serialization
//!
//! Binary artifacts are a bincode-encoded [`SerializedModel`]: magic bytes,
//! format version, metadata, the bincode-encoded model and an FNV-1a
//! checksum over the model bytes. JSON artifacts hold the metadata and the
//! model side by side for inspection.

use crate::config::ProblemType;
use crate::error::{GridfitError, Result};
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tracing::info;

/// Directory under the output root that holds every kind's artifact
pub const ARTIFACT_DIR: &str = "bestClassifiers";

/// Serialization format
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum SerializationFormat {
    /// bincode with integrity checksum
    #[default]
    Binary,
    /// Human-readable JSON
    Json,
}

impl SerializationFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            SerializationFormat::Binary => "bin",
            SerializationFormat::Json => "json",
        }
    }

    pub fn from_path(path: &Path) -> Self {
        match path.extension().and_then(|e| e.to_str()) {
            Some("json") => SerializationFormat::Json,
            _ => SerializationFormat::Binary,
        }
    }
}

impl FromStr for SerializationFormat {
    type Err = GridfitError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "binary" | "bin" | "bincode" => Ok(SerializationFormat::Binary),
            "json" => Ok(SerializationFormat::Json),
            other => Err(GridfitError::ConfigError(format!(
                "unknown artifact format {:?}, expected binary or json",
                other
            ))),
        }
    }
}

/// What was trained, on what, and how well
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelMetadata {
    /// Classifier kind, e.g. `clRandomForest`
    pub name: String,
    pub model_type: String,
    /// Version of the crate that wrote the artifact
    pub version: String,
    pub trained_at: DateTime<Utc>,
    pub problem_type: ProblemType,
    pub hyperparameters: BTreeMap<String, String>,
    pub metrics: BTreeMap<String, f64>,
    /// Class labels by class index (classification only)
    pub classes: Vec<String>,
    pub n_training_samples: usize,
    pub n_features: usize,
    /// Whether this is the big model trained on the full dataset
    pub extended_training: bool,
}

impl ModelMetadata {
    pub fn new(name: impl Into<String>, problem_type: ProblemType) -> Self {
        Self {
            name: name.into(),
            model_type: "unknown".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            trained_at: Utc::now(),
            problem_type,
            hyperparameters: BTreeMap::new(),
            metrics: BTreeMap::new(),
            classes: Vec::new(),
            n_training_samples: 0,
            n_features: 0,
            extended_training: false,
        }
    }

    pub fn with_model_type(mut self, model_type: impl Into<String>) -> Self {
        self.model_type = model_type.into();
        self
    }

    pub fn with_training_shape(mut self, n_samples: usize, n_features: usize) -> Self {
        self.n_training_samples = n_samples;
        self.n_features = n_features;
        self
    }

    pub fn with_classes(mut self, classes: Vec<String>) -> Self {
        self.classes = classes;
        self
    }

    pub fn with_extended_training(mut self, extended: bool) -> Self {
        self.extended_training = extended;
        self
    }

    pub fn add_hyperparameter(mut self, key: impl Into<String>, value: impl ToString) -> Self {
        self.hyperparameters.insert(key.into(), value.to_string());
        self
    }

    pub fn add_metric(mut self, key: impl Into<String>, value: f64) -> Self {
        self.metrics.insert(key.into(), value);
        self
    }
}

/// Binary artifact envelope
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SerializedModel {
    pub magic: [u8; 4],
    pub format_version: u32,
    pub metadata: ModelMetadata,
    pub model_data: Vec<u8>,
    pub checksum: u64,
}

impl SerializedModel {
    pub const MAGIC: [u8; 4] = *b"GFIT";
    pub const VERSION: u32 = 1;

    pub fn new(metadata: ModelMetadata, model_data: Vec<u8>) -> Self {
        let checksum = Self::compute_checksum(&model_data);
        Self {
            magic: Self::MAGIC,
            format_version: Self::VERSION,
            metadata,
            model_data,
            checksum,
        }
    }

    /// FNV-1a over the model bytes
    fn compute_checksum(data: &[u8]) -> u64 {
        const FNV_OFFSET: u64 = 14695981039346656037;
        const FNV_PRIME: u64 = 1099511628211;

        data.iter().fold(FNV_OFFSET, |hash, byte| {
            (hash ^ *byte as u64).wrapping_mul(FNV_PRIME)
        })
    }

    pub fn verify_checksum(&self) -> bool {
        Self::compute_checksum(&self.model_data) == self.checksum
    }

    /// Check magic, version and checksum, then decode the model
    pub fn into_model<M: DeserializeOwned>(self) -> Result<(M, ModelMetadata)> {
        if self.magic != Self::MAGIC {
            return Err(GridfitError::SerializationError(
                "not a gridfit artifact (bad magic bytes)".to_string(),
            ));
        }
        if self.format_version > Self::VERSION {
            return Err(GridfitError::SerializationError(format!(
                "artifact format version {} is newer than supported version {}",
                self.format_version,
                Self::VERSION
            )));
        }
        if !self.verify_checksum() {
            return Err(GridfitError::SerializationError(
                "artifact checksum mismatch, file is corrupted".to_string(),
            ));
        }
        let model = bincode::deserialize(&self.model_data)?;
        Ok((model, self.metadata))
    }
}

#[derive(Serialize)]
struct JsonArtifactRef<'a, M> {
    metadata: &'a ModelMetadata,
    model: &'a M,
}

#[derive(Deserialize)]
struct JsonArtifact<M> {
    metadata: ModelMetadata,
    model: M,
}

/// `<root>/bestClassifiers/best<kind>`
pub fn artifact_dir(root: impl AsRef<Path>, kind: &str) -> PathBuf {
    root.as_ref().join(ARTIFACT_DIR).join(format!("best{}", kind))
}

/// `<root>/bestClassifiers/best<kind>/best<kind>.<ext>`
pub fn artifact_path(root: impl AsRef<Path>, kind: &str, format: SerializationFormat) -> PathBuf {
    artifact_dir(root, kind).join(format!("best{}.{}", kind, format.extension()))
}

/// Encode a model in the binary artifact format
pub fn to_bytes<M: Serialize>(model: &M, metadata: &ModelMetadata) -> Result<Vec<u8>> {
    let model_data = bincode::serialize(model)?;
    Ok(bincode::serialize(&SerializedModel::new(metadata.clone(), model_data))?)
}

/// Decode a binary artifact
pub fn from_bytes<M: DeserializeOwned>(bytes: &[u8]) -> Result<(M, ModelMetadata)> {
    let envelope: SerializedModel = bincode::deserialize(bytes)?;
    envelope.into_model()
}

/// Write an artifact, creating parent directories and replacing any
/// existing file
pub fn save_artifact<M: Serialize>(
    model: &M,
    metadata: &ModelMetadata,
    path: impl AsRef<Path>,
    format: SerializationFormat,
) -> Result<()> {
    let path = path.as_ref();
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }

    let mut writer = BufWriter::new(File::create(path)?);
    match format {
        SerializationFormat::Binary => writer.write_all(&to_bytes(model, metadata)?)?,
        SerializationFormat::Json => {
            serde_json::to_writer_pretty(&mut writer, &JsonArtifactRef { metadata, model })?
        }
    }
    writer.flush()?;

    info!(path = %path.display(), ?format, "Saved model artifact");
    Ok(())
}

/// Read an artifact; the format follows the file extension
pub fn load_artifact<M: DeserializeOwned>(path: impl AsRef<Path>) -> Result<(M, ModelMetadata)> {
    let path = path.as_ref();
    let mut reader = BufReader::new(File::open(path)?);
    match SerializationFormat::from_path(path) {
        SerializationFormat::Binary => {
            let mut bytes = Vec::new();
            reader.read_to_end(&mut bytes)?;
            from_bytes(&bytes)
        }
        SerializationFormat::Json => {
            let artifact: JsonArtifact<M> = serde_json::from_reader(reader)?;
            Ok((artifact.model, artifact.metadata))
        }
    }
}
