//! Reconstruction autoencoder trained with plain SGD.
//!
//! The network narrows from the input width through the configured hidden
//! widths to the latent width, then mirrors back out. Hidden layers are ReLU
//! and the output layer is sigmoid. A row's anomaly score is its mean squared
//! reconstruction error; rows whose error clears the calibrated threshold are
//! flagged.

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::{quantile, AnomalyModel, Label};
use crate::dataset::FeatureMatrix;
use crate::error::{Result, SentryError};

/// Epochs without validation improvement before training stops.
const EARLY_STOP_PATIENCE: usize = 10;

/// Autoencoder configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AutoencoderConfig {
    /// Encoder hidden widths, mirrored on the decoder side
    #[serde(default = "default_hidden_dims")]
    pub hidden_dims: Vec<usize>,
    /// Bottleneck width
    #[serde(default = "default_latent_dim")]
    pub latent_dim: usize,
    #[serde(default = "default_learning_rate")]
    pub learning_rate: f32,
    #[serde(default = "default_epochs")]
    pub epochs: usize,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    /// Percentile of held-out errors used as the decision threshold
    #[serde(default = "default_threshold_percentile")]
    pub threshold_percentile: f32,
    /// Fraction of training rows held back for loss tracking and the
    /// initial threshold
    #[serde(default = "default_validation_split")]
    pub validation_split: f32,
    #[serde(default)]
    pub seed: Option<u64>,
}

impl Default for AutoencoderConfig {
    fn default() -> Self {
        Self {
            hidden_dims: default_hidden_dims(),
            latent_dim: default_latent_dim(),
            learning_rate: default_learning_rate(),
            epochs: default_epochs(),
            batch_size: default_batch_size(),
            threshold_percentile: default_threshold_percentile(),
            validation_split: default_validation_split(),
            seed: None,
        }
    }
}

fn default_hidden_dims() -> Vec<usize> {
    vec![14, 7]
}

fn default_latent_dim() -> usize {
    3
}

fn default_learning_rate() -> f32 {
    0.01
}

fn default_epochs() -> usize {
    50
}

fn default_batch_size() -> usize {
    32
}

fn default_threshold_percentile() -> f32 {
    95.0
}

fn default_validation_split() -> f32 {
    0.2
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
enum Activation {
    Relu,
    Sigmoid,
}

impl Activation {
    fn apply(&self, z: f32) -> f32 {
        match self {
            Activation::Relu => z.max(0.0),
            Activation::Sigmoid => 1.0 / (1.0 + (-z).exp()),
        }
    }
}

/// Fully connected layer. Weights are stored row-major as `[output][input]`.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct DenseLayer {
    weights: Vec<Vec<f32>>,
    biases: Vec<f32>,
    activation: Activation,
}

impl DenseLayer {
    fn new(input_dim: usize, output_dim: usize, activation: Activation, rng: &mut StdRng) -> Self {
        // Xavier initialization
        let scale = (2.0 / (input_dim + output_dim) as f32).sqrt();
        let weights = (0..output_dim)
            .map(|_| (0..input_dim).map(|_| rng.random_range(-scale..scale)).collect())
            .collect();

        Self {
            weights,
            biases: vec![0.0; output_dim],
            activation,
        }
    }

    fn forward(&self, input: &[f32]) -> Vec<f32> {
        self.weights
            .iter()
            .zip(self.biases.iter())
            .map(|(row, &bias)| {
                let z: f32 = row.iter().zip(input.iter()).map(|(w, x)| w * x).sum();
                self.activation.apply(z + bias)
            })
            .collect()
    }
}

/// Gradient accumulator shaped like one layer.
#[derive(Debug, Clone)]
struct LayerGradient {
    weights: Vec<Vec<f32>>,
    biases: Vec<f32>,
}

impl LayerGradient {
    fn zeros_like(layer: &DenseLayer) -> Self {
        Self {
            weights: layer
                .weights
                .iter()
                .map(|row| vec![0.0; row.len()])
                .collect(),
            biases: vec![0.0; layer.biases.len()],
        }
    }
}

/// Autoencoder model for anomaly detection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Autoencoder {
    config: AutoencoderConfig,
    layers: Vec<DenseLayer>,
    /// Reconstruction error threshold, calibrated on held-out rows
    threshold: f32,
    n_features: usize,
    /// Best validation loss reached during fit
    final_loss: f32,
    fitted: bool,
}

impl Default for Autoencoder {
    fn default() -> Self {
        Self::new(AutoencoderConfig::default())
    }
}

impl Autoencoder {
    /// Storage artifact name.
    pub const NAME: &'static str = "autoencoder";

    /// Create a new autoencoder.
    pub fn new(config: AutoencoderConfig) -> Self {
        Self {
            config,
            layers: Vec::new(),
            threshold: 0.0,
            n_features: 0,
            final_loss: 0.0,
            fitted: false,
        }
    }

    /// Reconstruction error threshold.
    pub fn threshold(&self) -> f32 {
        self.threshold
    }

    /// Best validation loss reached during fit.
    pub fn final_loss(&self) -> f32 {
        self.final_loss
    }

    /// Encoder input width, hidden widths, latent width, mirrored decoder.
    fn layer_dims(&self, n_features: usize) -> Vec<usize> {
        let mut dims = vec![n_features];
        dims.extend(&self.config.hidden_dims);
        dims.push(self.config.latent_dim);
        dims.extend(self.config.hidden_dims.iter().rev());
        dims.push(n_features);
        dims
    }

    /// Forward pass keeping every layer's activations, input first.
    fn forward_full(&self, row: &[f32]) -> Vec<Vec<f32>> {
        let mut activations = vec![row.to_vec()];
        for layer in &self.layers {
            let next = layer.forward(activations.last().map(|a| a.as_slice()).unwrap_or(row));
            activations.push(next);
        }
        activations
    }

    fn reconstruct(&self, row: &[f32]) -> Vec<f32> {
        self.forward_full(row).pop().unwrap_or_default()
    }

    /// Mean squared reconstruction error of a single row.
    fn reconstruction_error(&self, row: &[f32]) -> f32 {
        let output = self.reconstruct(row);
        let sum: f32 = output
            .iter()
            .zip(row.iter())
            .map(|(y, x)| (y - x) * (y - x))
            .sum();
        sum / row.len().max(1) as f32
    }

    /// Backpropagate one row into the gradient accumulators.
    fn accumulate_gradients(&self, row: &[f32], gradients: &mut [LayerGradient]) {
        let activations = self.forward_full(row);
        let output = &activations[self.layers.len()];
        let d = row.len() as f32;

        // Output layer is sigmoid: dL/dz = 2(y - x)/d * y(1 - y).
        let mut delta: Vec<f32> = output
            .iter()
            .zip(row.iter())
            .map(|(y, x)| 2.0 * (y - x) / d * y * (1.0 - y))
            .collect();

        for l in (0..self.layers.len()).rev() {
            let input = &activations[l];
            let grad = &mut gradients[l];
            for (j, &dj) in delta.iter().enumerate() {
                for (i, &a) in input.iter().enumerate() {
                    grad.weights[j][i] += dj * a;
                }
                grad.biases[j] += dj;
            }

            if l == 0 {
                break;
            }

            // Propagate through the weights, then gate by the ReLU input.
            let layer = &self.layers[l];
            let mut prev = vec![0.0; input.len()];
            for (j, &dj) in delta.iter().enumerate() {
                for (i, w) in layer.weights[j].iter().enumerate() {
                    prev[i] += w * dj;
                }
            }
            for (p, &a) in prev.iter_mut().zip(input.iter()) {
                if a <= 0.0 {
                    *p = 0.0;
                }
            }
            delta = prev;
        }
    }

    fn apply_gradients(&mut self, gradients: &[LayerGradient], batch_len: usize) {
        let scale = self.config.learning_rate / batch_len.max(1) as f32;
        for (layer, grad) in self.layers.iter_mut().zip(gradients.iter()) {
            for (w_row, g_row) in layer.weights.iter_mut().zip(grad.weights.iter()) {
                for (w, g) in w_row.iter_mut().zip(g_row.iter()) {
                    *w -= scale * g;
                }
            }
            for (b, g) in layer.biases.iter_mut().zip(grad.biases.iter()) {
                *b -= scale * g;
            }
        }
    }

    fn mean_error(&self, rows: &[Vec<f32>]) -> f32 {
        if rows.is_empty() {
            return 0.0;
        }
        rows.iter().map(|r| self.reconstruction_error(r)).sum::<f32>() / rows.len() as f32
    }

    /// Recalibrate the decision threshold on held-out rows and return it.
    pub fn calibrate_threshold(&mut self, holdout: &FeatureMatrix) -> Result<f32> {
        if !self.fitted {
            return Err(SentryError::NotFitted(Self::NAME));
        }
        if holdout.n_columns() != self.n_features {
            return Err(SentryError::DimensionMismatch {
                expected: self.n_features,
                got: holdout.n_columns(),
            });
        }
        if holdout.is_empty() {
            return Err(SentryError::EmptyDataset(
                "cannot calibrate autoencoder threshold on an empty holdout".to_string(),
            ));
        }

        let errors: Vec<f32> = holdout
            .rows()
            .iter()
            .map(|row| self.reconstruction_error(row))
            .collect();
        self.threshold = quantile(&errors, self.config.threshold_percentile / 100.0);

        debug!(
            "Autoencoder threshold recalibrated to {:.6} over {} rows",
            self.threshold,
            holdout.n_rows()
        );
        Ok(self.threshold)
    }

    fn check_row(&self, row: &[f32]) -> Result<()> {
        if !self.fitted {
            return Err(SentryError::NotFitted(Self::NAME));
        }
        if row.len() != self.n_features {
            return Err(SentryError::DimensionMismatch {
                expected: self.n_features,
                got: row.len(),
            });
        }
        Ok(())
    }
}

impl AnomalyModel for Autoencoder {
    fn fit(&mut self, data: &FeatureMatrix) -> Result<()> {
        if data.n_rows() < 2 {
            return Err(SentryError::EmptyDataset(
                "autoencoder needs at least 2 training rows".to_string(),
            ));
        }

        self.n_features = data.n_columns();
        let mut rng = match self.config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_os_rng(),
        };

        let dims = self.layer_dims(self.n_features);
        self.layers = dims
            .windows(2)
            .enumerate()
            .map(|(i, pair)| {
                let activation = if i == dims.len() - 2 {
                    Activation::Sigmoid
                } else {
                    Activation::Relu
                };
                DenseLayer::new(pair[0], pair[1], activation, &mut rng)
            })
            .collect();

        let (train, validation) = data.split(self.config.validation_split, self.config.seed)?;
        let train_rows = train.rows().to_vec();
        let validation_rows = validation.rows().to_vec();

        debug!(
            "Training autoencoder {:?} on {} rows ({} validation)",
            dims,
            train_rows.len(),
            validation_rows.len()
        );

        let mut best_loss = f32::INFINITY;
        let mut stall = 0;
        let mut order: Vec<usize> = (0..train_rows.len()).collect();

        for epoch in 0..self.config.epochs {
            order.shuffle(&mut rng);

            for batch in order.chunks(self.config.batch_size.max(1)) {
                let mut gradients: Vec<LayerGradient> =
                    self.layers.iter().map(LayerGradient::zeros_like).collect();
                for &idx in batch {
                    self.accumulate_gradients(&train_rows[idx], &mut gradients);
                }
                self.apply_gradients(&gradients, batch.len());
            }

            let val_loss = self.mean_error(&validation_rows);
            if val_loss < best_loss - 1e-6 {
                best_loss = val_loss;
                stall = 0;
            } else {
                stall += 1;
                if stall >= EARLY_STOP_PATIENCE {
                    debug!(
                        "Early stop at epoch {} (validation loss {:.6})",
                        epoch + 1,
                        best_loss
                    );
                    break;
                }
            }
        }
        self.final_loss = best_loss;
        self.fitted = true;

        // Initial threshold from the internal validation split. The pipeline
        // recalibrates against its own holdout before persisting.
        let errors: Vec<f32> = validation_rows
            .iter()
            .map(|row| self.reconstruction_error(row))
            .collect();
        self.threshold = quantile(&errors, self.config.threshold_percentile / 100.0);

        info!(
            "Autoencoder fitted: validation loss {:.6}, threshold {:.6}",
            self.final_loss, self.threshold
        );

        Ok(())
    }

    fn score(&self, row: &[f32]) -> Result<f32> {
        self.check_row(row)?;
        Ok(self.reconstruction_error(row))
    }

    fn predict(&self, row: &[f32]) -> Result<Label> {
        let error = self.score(row)?;
        if error > self.threshold {
            Ok(Label::Anomaly)
        } else {
            Ok(Label::Normal)
        }
    }

    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn is_fitted(&self) -> bool {
        self.fitted
    }
}
