//! Trained model persistence

mod serializer;

pub use serializer::{
    artifact_dir, artifact_path, from_bytes, load_artifact, save_artifact, to_bytes,
    ModelMetadata, SerializationFormat, SerializedModel, ARTIFACT_DIR,
};
