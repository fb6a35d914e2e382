//! Anomaly model training and evaluation.
//!
//! Provides the scaler, the model bank, and the persistence layer used by the
//! batch pipeline.
//!
//! # Models
//! - Isolation forest with a contamination-calibrated threshold
//! - Local outlier factor in novelty mode
//! - One-class SVM with an RBF kernel
//! - Reconstruction autoencoder
//!
//! # Example
//! ```ignore
//! use flowsentry::ml::{ModelBank, ModelsConfig, StandardScaler};
//!
//! let scaler = StandardScaler::fit(&train)?;
//! let scaled = scaler.transform(&train)?;
//!
//! let mut bank = ModelBank::new(&ModelsConfig::default());
//! bank.fit(&scaled)?;
//!
//! for (name, model) in bank.models() {
//!     println!("{}: {:?}", name, model.predict(&scaled.rows()[0])?);
//! }
//! ```

pub mod evaluation;
pub mod models;
pub mod scaler;
pub mod storage;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::dataset::FeatureMatrix;
use crate::error::Result;

pub use evaluation::{evaluate, EvaluationResult};
pub use models::{
    AnomalyModel, Autoencoder, AutoencoderConfig, IsolationForest, IsolationForestConfig, Label,
    LocalOutlierFactor, LofConfig, OneClassSvm, OneClassSvmConfig,
};
pub use scaler::StandardScaler;
pub use storage::{ArtifactInfo, ModelStore, StoreMetadata, DEFAULT_DATA_DIR};

/// Configuration for every model in the bank.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ModelsConfig {
    #[serde(default)]
    pub isolation_forest: IsolationForestConfig,
    #[serde(default)]
    pub lof: LofConfig,
    #[serde(default)]
    pub ocsvm: OneClassSvmConfig,
    #[serde(default)]
    pub autoencoder: AutoencoderConfig,
}

/// The four anomaly models trained and evaluated together.
pub struct ModelBank {
    pub isolation_forest: IsolationForest,
    pub lof: LocalOutlierFactor,
    pub ocsvm: OneClassSvm,
    pub autoencoder: Autoencoder,
}

impl ModelBank {
    /// Create an unfitted bank from per-model configuration.
    pub fn new(config: &ModelsConfig) -> Self {
        Self {
            isolation_forest: IsolationForest::new(config.isolation_forest.clone()),
            lof: LocalOutlierFactor::new(config.lof.clone()),
            ocsvm: OneClassSvm::new(config.ocsvm.clone()),
            autoencoder: Autoencoder::new(config.autoencoder.clone()),
        }
    }

    /// Fit every model on the same scaled training matrix.
    pub fn fit(&mut self, train: &FeatureMatrix) -> Result<()> {
        for model in self.models_mut() {
            model.fit(train)?;
        }
        info!("Fitted {} models on {} rows", self.models().len(), train.n_rows());
        Ok(())
    }

    /// Models with their artifact names, in training order.
    pub fn models(&self) -> [(&'static str, &dyn AnomalyModel); 4] {
        [
            (IsolationForest::NAME, &self.isolation_forest),
            (LocalOutlierFactor::NAME, &self.lof),
            (OneClassSvm::NAME, &self.ocsvm),
            (Autoencoder::NAME, &self.autoencoder),
        ]
    }

    /// Mutable access for fitting, in the same order as [`Self::models`].
    pub fn models_mut(&mut self) -> [&mut dyn AnomalyModel; 4] {
        [
            &mut self.isolation_forest,
            &mut self.lof,
            &mut self.ocsvm,
            &mut self.autoencoder,
        ]
    }
}

impl Default for ModelBank {
    fn default() -> Self {
        Self::new(&ModelsConfig::default())
    }
}
