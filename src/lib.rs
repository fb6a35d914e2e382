pub mod config;
pub mod dataset;
pub mod error;
pub mod ml;

use anyhow::{bail, Context, Result};
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::{info, warn};

use config::Config;
use dataset::{load_features, FeatureMatrix};
use ml::models::{Autoencoder, IsolationForest, LocalOutlierFactor, OneClassSvm};
use ml::{evaluate, AnomalyModel, EvaluationResult, Label, ModelBank, ModelStore, StoreMetadata};

/// One model's outcome over one batch
#[derive(Debug, Clone)]
pub struct ModelReport {
    pub model: &'static str,
    pub result: EvaluationResult,
    /// Fit wall time, present only for training runs
    pub fit_seconds: Option<f64>,
}

/// Outcome of a full training run
#[derive(Debug, Clone)]
pub struct TrainingReport {
    pub trained_rows: usize,
    pub holdout_rows: usize,
    pub feature_columns: usize,
    /// Holdout sanity check per model
    pub reports: Vec<ModelReport>,
}

/// Core flowsentry instance
pub struct FlowSentry {
    config: Config,
    store: ModelStore,
}

impl FlowSentry {
    /// Create a new flowsentry instance
    pub fn new(config: Config) -> Self {
        let store = ModelStore::new(config.data_dir());
        Self { config, store }
    }

    /// Train the scaler and every model, then persist the artifacts
    pub fn train(
        &self,
        dataset: Option<&Path>,
        holdout_override: Option<f32>,
    ) -> Result<TrainingReport> {
        let path = dataset
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from(&self.config.dataset.train_path));
        let data = load_features(&path)?;

        let holdout_fraction = holdout_override.unwrap_or(self.config.dataset.holdout_fraction);
        let (train, holdout) = data.split(holdout_fraction, self.config.dataset.seed)?;
        info!(
            "Split {} rows into {} training / {} holdout",
            data.n_rows(),
            train.n_rows(),
            holdout.n_rows()
        );

        let scaler = ml::StandardScaler::fit(&train)?;
        let scaled_train = scaler.transform(&train)?;
        let scaled_holdout = scaler.transform(&holdout)?;

        let mut bank = ModelBank::new(&self.config.models);
        let mut timings = Vec::new();
        for model in bank.models_mut() {
            let started = Instant::now();
            model.fit(&scaled_train)?;
            let seconds = started.elapsed().as_secs_f64();
            info!("Fitted {} in {:.2}s", model.name(), seconds);
            timings.push(seconds);
        }

        // The autoencoder threshold comes from rows it never trained on.
        bank.autoencoder.calibrate_threshold(&scaled_holdout)?;

        self.store
            .init()
            .context("Failed to initialize the model store")?;
        self.store.save_scaler(&scaler)?;
        self.store
            .save_model(IsolationForest::NAME, &bank.isolation_forest)?;
        self.store.save_model(LocalOutlierFactor::NAME, &bank.lof)?;
        self.store.save_model(OneClassSvm::NAME, &bank.ocsvm)?;
        self.store
            .save_model(Autoencoder::NAME, &bank.autoencoder)?;

        let metadata = StoreMetadata {
            trained_rows: train.n_rows(),
            holdout_rows: holdout.n_rows(),
            feature_columns: train.columns().to_vec(),
            models: bank.models().iter().map(|(n, _)| n.to_string()).collect(),
            ..StoreMetadata::default()
        };
        self.store.save_metadata(&metadata)?;

        // Sanity check: the holdout came from mixed traffic, so most rows
        // should come back normal.
        let mut reports = Vec::new();
        for ((name, model), seconds) in bank.models().into_iter().zip(timings) {
            let result = evaluate(model, &scaled_holdout, Label::Normal)?;
            reports.push(ModelReport {
                model: name,
                result,
                fit_seconds: Some(seconds),
            });
        }

        info!("Training complete, artifacts in {:?}", self.store.data_dir());

        Ok(TrainingReport {
            trained_rows: train.n_rows(),
            holdout_rows: holdout.n_rows(),
            feature_columns: train.n_columns(),
            reports,
        })
    }

    /// Score a batch with every persisted model under one assumed label
    pub fn evaluate_dataset(&self, path: &Path, assumed: Label) -> Result<Vec<ModelReport>> {
        let data = load_features(path)?;

        let scaler = self
            .store
            .load_scaler()?
            .context("No persisted scaler found; run train first")?;
        let scaled = scaler.transform(&data)?;

        let mut reports = Vec::new();
        self.evaluate_stored::<IsolationForest>(IsolationForest::NAME, &scaled, assumed, &mut reports)?;
        self.evaluate_stored::<LocalOutlierFactor>(LocalOutlierFactor::NAME, &scaled, assumed, &mut reports)?;
        self.evaluate_stored::<OneClassSvm>(OneClassSvm::NAME, &scaled, assumed, &mut reports)?;
        self.evaluate_stored::<Autoencoder>(Autoencoder::NAME, &scaled, assumed, &mut reports)?;

        if reports.is_empty() {
            bail!(
                "No fitted models found in {:?}; run train first",
                self.store.data_dir()
            );
        }

        Ok(reports)
    }

    fn evaluate_stored<T>(
        &self,
        name: &'static str,
        data: &FeatureMatrix,
        assumed: Label,
        reports: &mut Vec<ModelReport>,
    ) -> Result<()>
    where
        T: AnomalyModel + serde::de::DeserializeOwned,
    {
        match self.store.load_model::<T>(name)? {
            Some(model) => {
                let result = evaluate(&model, data, assumed)?;
                reports.push(ModelReport {
                    model: name,
                    result,
                    fit_seconds: None,
                });
            }
            None => warn!("No persisted '{}' model, skipping", name),
        }
        Ok(())
    }

    /// Get the artifact store
    pub fn store(&self) -> &ModelStore {
        &self.store
    }

    /// Get configuration reference
    pub fn config(&self) -> &Config {
        &self.config
    }
}
