//! Persistence for the fitted scaler and model bank.
//!
//! Artifacts live under one data directory: `scaler.bin` at the top level,
//! one `models/<name>.bin` per fitted model, and a `metadata.json` describing
//! the training run that produced them.

use std::fs::{self, File};
use std::io::{BufReader, BufWriter};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::scaler::StandardScaler;

/// Default artifact directory, relative to the working directory.
pub const DEFAULT_DATA_DIR: &str = "data/models";

/// Metadata about a persisted training run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreMetadata {
    /// Storage format version
    pub version: u32,
    /// When the artifacts were saved
    pub saved_at: DateTime<Utc>,
    /// Rows the models trained on
    pub trained_rows: usize,
    /// Rows held out for threshold calibration
    pub holdout_rows: usize,
    /// Feature columns the scaler was fitted on
    pub feature_columns: Vec<String>,
    /// Names of the persisted models
    pub models: Vec<String>,
    /// Host identifier
    pub host_id: String,
    /// Tool version that wrote the artifacts
    pub tool_version: String,
}

impl Default for StoreMetadata {
    fn default() -> Self {
        Self {
            version: 1,
            saved_at: Utc::now(),
            trained_rows: 0,
            holdout_rows: 0,
            feature_columns: Vec::new(),
            models: Vec::new(),
            host_id: hostname::get()
                .map(|h| h.to_string_lossy().to_string())
                .unwrap_or_else(|_| "unknown".to_string()),
            tool_version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}

/// One artifact on disk.
#[derive(Debug, Clone)]
pub struct ArtifactInfo {
    pub name: String,
    pub size_bytes: u64,
    pub modified: DateTime<Utc>,
}

/// Artifact storage manager.
pub struct ModelStore {
    data_dir: PathBuf,
}

impl ModelStore {
    /// Create a store rooted at `path`.
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self {
            data_dir: path.as_ref().to_path_buf(),
        }
    }

    /// Get the base directory.
    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    /// Initialize the storage directory structure.
    pub fn init(&self) -> std::io::Result<()> {
        fs::create_dir_all(&self.data_dir)?;
        fs::create_dir_all(self.data_dir.join("models"))?;

        debug!("Initialized model store at {:?}", self.data_dir);
        Ok(())
    }

    fn scaler_path(&self) -> PathBuf {
        self.data_dir.join("scaler.bin")
    }

    fn model_path(&self, name: &str) -> PathBuf {
        self.data_dir.join("models").join(format!("{}.bin", name))
    }

    fn save_bin<T: Serialize>(&self, path: &Path, value: &T) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {:?}", parent))?;
        }

        let file =
            File::create(path).with_context(|| format!("Failed to create {:?}", path))?;
        let mut writer = BufWriter::new(file);
        bincode::serde::encode_into_std_write(value, &mut writer, bincode::config::standard())
            .with_context(|| format!("Failed to encode {:?}", path))?;
        Ok(())
    }

    fn load_bin<T: DeserializeOwned>(&self, path: &Path) -> Result<T> {
        let file = File::open(path).with_context(|| format!("Failed to open {:?}", path))?;
        let mut reader = BufReader::new(file);
        let value =
            bincode::serde::decode_from_std_read(&mut reader, bincode::config::standard())
                .with_context(|| format!("Failed to decode {:?}", path))?;
        Ok(value)
    }

    // === Scaler Operations ===

    /// Save the fitted scaler.
    pub fn save_scaler(&self, scaler: &StandardScaler) -> Result<()> {
        let path = self.scaler_path();
        self.save_bin(&path, scaler)?;
        info!(
            "Saved scaler over {} columns to {:?}",
            scaler.n_features(),
            path
        );
        Ok(())
    }

    /// Load the persisted scaler, if any.
    pub fn load_scaler(&self) -> Result<Option<StandardScaler>> {
        let path = self.scaler_path();
        if !path.exists() {
            debug!("No scaler file found at {:?}", path);
            return Ok(None);
        }

        let scaler: StandardScaler = self.load_bin(&path)?;
        info!(
            "Loaded scaler over {} columns ({} training samples)",
            scaler.n_features(),
            scaler.n_samples()
        );
        Ok(Some(scaler))
    }

    /// Check if a scaler has been persisted.
    pub fn has_scaler(&self) -> bool {
        self.scaler_path().exists()
    }

    // === Model Operations ===

    /// Save a fitted model under its artifact name.
    pub fn save_model<T: Serialize>(&self, name: &str, model: &T) -> Result<()> {
        let path = self.model_path(name);
        self.save_bin(&path, model)?;
        info!("Saved model '{}' to {:?}", name, path);
        Ok(())
    }

    /// Load a model by artifact name, if it exists.
    pub fn load_model<T: DeserializeOwned>(&self, name: &str) -> Result<Option<T>> {
        let path = self.model_path(name);
        if !path.exists() {
            return Ok(None);
        }

        let model = self.load_bin(&path)?;
        info!("Loaded model '{}' from {:?}", name, path);
        Ok(Some(model))
    }

    // === Metadata Operations ===

    /// Save run metadata alongside the artifacts.
    pub fn save_metadata(&self, metadata: &StoreMetadata) -> Result<()> {
        let path = self.data_dir.join("metadata.json");
        let content = serde_json::to_string_pretty(metadata)?;
        fs::write(&path, content).with_context(|| format!("Failed to write {:?}", path))?;
        Ok(())
    }

    /// Load run metadata.
    pub fn load_metadata(&self) -> Result<StoreMetadata> {
        let path = self.data_dir.join("metadata.json");
        let content =
            fs::read_to_string(&path).with_context(|| format!("Failed to read {:?}", path))?;
        let metadata: StoreMetadata = serde_json::from_str(&content)?;
        Ok(metadata)
    }

    /// List persisted artifacts, sorted by name.
    pub fn list_artifacts(&self) -> std::io::Result<Vec<ArtifactInfo>> {
        let mut artifacts = Vec::new();

        let mut push_entry = |path: &Path, name: String| -> std::io::Result<()> {
            let metadata = fs::metadata(path)?;
            let modified: DateTime<Utc> = metadata.modified()?.into();
            artifacts.push(ArtifactInfo {
                name,
                size_bytes: metadata.len(),
                modified,
            });
            Ok(())
        };

        let scaler = self.scaler_path();
        if scaler.exists() {
            push_entry(&scaler, "scaler".to_string())?;
        }

        let models_dir = self.data_dir.join("models");
        if models_dir.exists() {
            for entry in fs::read_dir(&models_dir)? {
                let entry = entry?;
                let path = entry.path();
                if path.extension().map(|e| e == "bin").unwrap_or(false) {
                    if let Some(name) = path.file_stem().and_then(|s| s.to_str()) {
                        push_entry(&path, name.to_string())?;
                    }
                }
            }
        }

        artifacts.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(artifacts)
    }
}

impl Default for ModelStore {
    fn default() -> Self {
        Self::new(DEFAULT_DATA_DIR)
    }
}
