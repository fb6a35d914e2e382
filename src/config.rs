use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::ml::storage::DEFAULT_DATA_DIR;
use crate::ml::ModelsConfig;

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub general: GeneralConfig,

    #[serde(default)]
    pub dataset: DatasetConfig,

    #[serde(default)]
    pub models: ModelsConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            general: GeneralConfig::default(),
            dataset: DatasetConfig::default(),
            models: ModelsConfig::default(),
        }
    }
}

impl Config {
    /// Load configuration from file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(&path)
            .with_context(|| format!("Failed to read config file: {}", path.as_ref().display()))?;

        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.as_ref().display()))?;

        Ok(config)
    }

    /// Load config from default locations or create default
    pub fn load_or_default() -> Result<Self> {
        let paths = [
            PathBuf::from("flowsentry.toml"),
            dirs_next::config_dir()
                .map(|p| p.join("flowsentry/config.toml"))
                .unwrap_or_default(),
        ];

        for path in &paths {
            if path.exists() {
                return Self::load(path);
            }
        }

        Ok(Self::default())
    }

    /// Save configuration to file
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = toml::to_string_pretty(self)?;
        std::fs::write(&path, content)?;
        Ok(())
    }

    /// Get the artifact directory path
    pub fn data_dir(&self) -> PathBuf {
        PathBuf::from(&self.general.data_dir)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneralConfig {
    /// Directory for persisted scaler and model artifacts
    #[serde(default = "default_data_dir")]
    pub data_dir: String,

    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            log_level: default_log_level(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatasetConfig {
    /// CSV of mixed traffic used for training
    #[serde(default = "default_train_path")]
    pub train_path: String,

    /// CSV of attack-only traffic used for evaluation
    #[serde(default = "default_attack_path")]
    pub attack_path: String,

    /// Fraction of training rows held out for threshold calibration
    #[serde(default = "default_holdout_fraction")]
    pub holdout_fraction: f32,

    /// Seed for the train/holdout split (random when unset)
    #[serde(default)]
    pub seed: Option<u64>,
}

impl Default for DatasetConfig {
    fn default() -> Self {
        Self {
            train_path: default_train_path(),
            attack_path: default_attack_path(),
            holdout_fraction: default_holdout_fraction(),
            seed: None,
        }
    }
}

// Default value functions
fn default_data_dir() -> String {
    DEFAULT_DATA_DIR.to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_train_path() -> String {
    "dataset/dataset-full.csv".to_string()
}

fn default_attack_path() -> String {
    "dataset/attack.csv".to_string()
}

fn default_holdout_fraction() -> f32 {
    0.2
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.general.data_dir, "data/models");
        assert_eq!(config.dataset.train_path, "dataset/dataset-full.csv");
        assert_eq!(config.dataset.holdout_fraction, 0.2);
    }

    #[test]
    fn test_config_serialization() {
        let config = Config::default();
        let toml_str = toml::to_string_pretty(&config).unwrap();
        let parsed: Config = toml::from_str(&toml_str).unwrap();
        assert_eq!(parsed.dataset.attack_path, config.dataset.attack_path);
        assert_eq!(
            parsed.models.isolation_forest.num_trees,
            config.models.isolation_forest.num_trees
        );
    }

    #[test]
    fn test_save_and_load_round_trip() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("flowsentry.toml");

        let mut config = Config::default();
        config.dataset.seed = Some(7);
        config.save(&path).unwrap();

        let loaded = Config::load(&path).unwrap();
        assert_eq!(loaded.dataset.seed, Some(7));
        assert_eq!(loaded.general.data_dir, config.general.data_dir);
    }

    #[test]
    fn test_partial_config_fills_defaults() {
        let parsed: Config = toml::from_str("[dataset]\ntrain_path = \"other.csv\"\n").unwrap();
        assert_eq!(parsed.dataset.train_path, "other.csv");
        assert_eq!(parsed.dataset.attack_path, "dataset/attack.csv");
        assert_eq!(parsed.general.log_level, "info");
    }
}
