// Model + metadata bundle in one directory

use crate::encoding::CallStackMetadata;
use crate::error::{CallStackError, Result};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};

pub const MODEL_FILE: &str = "model.json";
pub const METADATA_FILE: &str = "metadata.json";

/// A trained model exported together with the metadata it was trained on
pub struct ModelContainer;

impl ModelContainer {
    pub fn model_path<P: AsRef<Path>>(dir: P) -> PathBuf {
        dir.as_ref().join(MODEL_FILE)
    }

    pub fn metadata_path<P: AsRef<Path>>(dir: P) -> PathBuf {
        dir.as_ref().join(METADATA_FILE)
    }

    /// Write `model` and `metadata` into `dir`
    pub fn export<P, M>(dir: P, model: &M, metadata: &CallStackMetadata) -> Result<()>
    where
        P: AsRef<Path>,
        M: Serialize,
    {
        let dir = dir.as_ref();
        fs::create_dir_all(dir)?;

        let json = serde_json::to_string_pretty(model)
            .map_err(|e| CallStackError::Encode(format!("model: {}", e)))?;
        fs::write(Self::model_path(dir), json)?;
        metadata.write_to_file(Self::metadata_path(dir))?;

        tracing::info!(dir = %dir.display(), "Model exported");
        Ok(())
    }

    /// Fail with `MissingArtifact` unless both files are present in `dir`
    pub fn require_artifacts<P: AsRef<Path>>(dir: P) -> Result<()> {
        let dir = dir.as_ref();
        for path in [Self::model_path(dir), Self::metadata_path(dir)] {
            if !path.exists() {
                tracing::warn!("Model container is missing {}", path.display());
                return Err(CallStackError::MissingArtifact(path));
            }
        }
        Ok(())
    }

    /// Load both artifacts; either one missing fails the import
    pub fn import<P, M>(dir: P) -> Result<(M, CallStackMetadata)>
    where
        P: AsRef<Path>,
        M: DeserializeOwned,
    {
        let dir = dir.as_ref();
        Self::require_artifacts(dir)?;
        let model_path = Self::model_path(dir);
        let metadata_path = Self::metadata_path(dir);

        let contents = fs::read_to_string(&model_path)?;
        let model = serde_json::from_str(&contents).map_err(|e| {
            CallStackError::Decode(format!("invalid model {}: {}", model_path.display(), e))
        })?;
        let metadata = CallStackMetadata::read_from_file(&metadata_path)?;
        Ok((model, metadata))
    }

    /// Load only the metadata, for the dimension check
    pub fn read_metadata<P: AsRef<Path>>(dir: P) -> Result<CallStackMetadata> {
        CallStackMetadata::read_from_file(Self::metadata_path(dir))
    }
}
