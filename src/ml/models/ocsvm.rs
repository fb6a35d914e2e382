//! One-class support vector machine with an RBF kernel.
//!
//! The dual problem (minimize a'Ka/2 over 0 <= a_i <= 1/(nu*n), sum a = 1)
//! is solved with projected gradient descent. The offset rho is taken as the
//! nu-quantile of the training decision values, so roughly a nu fraction of
//! the training rows falls on the anomalous side of the boundary.

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::{quantile, AnomalyModel, Label};
use crate::dataset::FeatureMatrix;
use crate::error::{Result, SentryError};

/// Coefficients below this are dropped when extracting support vectors.
const SV_CUTOFF: f64 = 1e-8;

/// One-class SVM configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OneClassSvmConfig {
    /// Upper bound on the training outlier fraction, in (0, 1]
    #[serde(default = "default_nu")]
    pub nu: f32,
    /// RBF kernel width; defaults to 1 / n_features when unset
    #[serde(default)]
    pub gamma: Option<f32>,
    /// Solver iteration cap
    #[serde(default = "default_max_iter")]
    pub max_iter: usize,
    /// Training rows are subsampled past this count to bound kernel memory
    #[serde(default = "default_max_samples")]
    pub max_samples: usize,
    /// Seed for the subsampling draw
    #[serde(default)]
    pub seed: Option<u64>,
}

impl Default for OneClassSvmConfig {
    fn default() -> Self {
        Self {
            nu: default_nu(),
            gamma: None,
            max_iter: default_max_iter(),
            max_samples: default_max_samples(),
            seed: None,
        }
    }
}

fn default_nu() -> f32 {
    0.1
}

fn default_max_iter() -> usize {
    200
}

fn default_max_samples() -> usize {
    1000
}

/// One-class SVM model for anomaly detection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OneClassSvm {
    config: OneClassSvmConfig,
    /// Training rows with non-negligible dual coefficients
    support_vectors: Vec<Vec<f32>>,
    /// Dual coefficients matching `support_vectors`
    coefficients: Vec<f32>,
    /// Resolved kernel width
    gamma: f32,
    /// Decision offset
    rho: f32,
    n_features: usize,
    fitted: bool,
}

impl Default for OneClassSvm {
    fn default() -> Self {
        Self::new(OneClassSvmConfig::default())
    }
}

impl OneClassSvm {
    /// Storage artifact name.
    pub const NAME: &'static str = "ocsvm";

    /// Create a new one-class SVM.
    pub fn new(config: OneClassSvmConfig) -> Self {
        Self {
            config,
            support_vectors: Vec::new(),
            coefficients: Vec::new(),
            gamma: 0.0,
            rho: 0.0,
            n_features: 0,
            fitted: false,
        }
    }

    /// Decision offset learned during fit.
    pub fn rho(&self) -> f32 {
        self.rho
    }

    /// Number of retained support vectors.
    pub fn n_support_vectors(&self) -> usize {
        self.support_vectors.len()
    }

    /// Signed distance to the boundary. Negative values are anomalous.
    pub fn decision_function(&self, row: &[f32]) -> Result<f32> {
        self.check_row(row)?;
        Ok(self.kernel_expansion(row) - self.rho)
    }

    fn kernel_expansion(&self, row: &[f32]) -> f32 {
        self.support_vectors
            .iter()
            .zip(self.coefficients.iter())
            .map(|(sv, &coeff)| coeff * rbf(sv, row, self.gamma))
            .sum()
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

    /// Subsample rows when the training set exceeds `max_samples`.
    fn training_rows<'a>(&self, data: &'a FeatureMatrix) -> Vec<&'a [f32]> {
        let mut rows: Vec<&[f32]> = data.rows().iter().map(|r| r.as_slice()).collect();
        if rows.len() <= self.config.max_samples {
            return rows;
        }

        let mut rng = match self.config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_os_rng(),
        };
        rows.shuffle(&mut rng);
        rows.truncate(self.config.max_samples);
        debug!(
            "Subsampled ocsvm training set to {} rows",
            self.config.max_samples
        );
        rows
    }
}

impl AnomalyModel for OneClassSvm {
    fn fit(&mut self, data: &FeatureMatrix) -> Result<()> {
        if !(self.config.nu > 0.0 && self.config.nu <= 1.0) {
            return Err(SentryError::Config(format!(
                "ocsvm nu must be in (0, 1], got {}",
                self.config.nu
            )));
        }
        if data.n_rows() < 2 {
            return Err(SentryError::EmptyDataset(
                "ocsvm needs at least 2 training rows".to_string(),
            ));
        }

        self.n_features = data.n_columns();
        self.gamma = self
            .config
            .gamma
            .unwrap_or(1.0 / self.n_features.max(1) as f32);

        let rows = self.training_rows(data);
        let n = rows.len();
        let upper = 1.0 / (self.config.nu as f64 * n as f64);

        // Dense RBF kernel matrix over the (sub)sampled rows.
        let kernel: Vec<Vec<f64>> = rows
            .iter()
            .map(|a| rows.iter().map(|b| rbf(a, b, self.gamma) as f64).collect())
            .collect();

        // Gershgorin bound on the largest eigenvalue keeps the step safe.
        let max_row_sum = kernel
            .iter()
            .map(|row| row.iter().sum::<f64>())
            .fold(0.0_f64, f64::max)
            .max(1.0);

        let mut alphas = vec![1.0 / n as f64; n];
        for iter in 0..self.config.max_iter {
            let step = 1.0 / (max_row_sum * (1.0 + 0.1 * iter as f64));

            let gradient: Vec<f64> = kernel
                .iter()
                .map(|row| row.iter().zip(alphas.iter()).map(|(k, a)| k * a).sum())
                .collect();

            let proposed: Vec<f64> = alphas
                .iter()
                .zip(gradient.iter())
                .map(|(a, g)| a - step * g)
                .collect();
            let projected = project_capped_simplex(&proposed, upper);

            let shift = alphas
                .iter()
                .zip(projected.iter())
                .map(|(old, new)| (old - new).abs())
                .fold(0.0_f64, f64::max);
            alphas = projected;

            if shift < 1e-9 {
                debug!("ocsvm solver converged after {} iterations", iter + 1);
                break;
            }
        }

        // Training decision values before the offset is subtracted.
        let expansions: Vec<f32> = kernel
            .iter()
            .map(|row| {
                row.iter()
                    .zip(alphas.iter())
                    .map(|(k, a)| k * a)
                    .sum::<f64>() as f32
            })
            .collect();
        self.rho = quantile(&expansions, self.config.nu);

        self.support_vectors.clear();
        self.coefficients.clear();
        for (row, &alpha) in rows.iter().zip(alphas.iter()) {
            if alpha > SV_CUTOFF {
                self.support_vectors.push(row.to_vec());
                self.coefficients.push(alpha as f32);
            }
        }
        self.fitted = true;

        info!(
            "ocsvm fitted over {} rows: {} support vectors, rho {:.4}, gamma {:.4}",
            n,
            self.support_vectors.len(),
            self.rho,
            self.gamma
        );

        Ok(())
    }

    fn score(&self, row: &[f32]) -> Result<f32> {
        // Positive scores are anomalous, matching the other models.
        Ok(-self.decision_function(row)?)
    }

    fn predict(&self, row: &[f32]) -> Result<Label> {
        if self.decision_function(row)? < 0.0 {
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

fn rbf(a: &[f32], b: &[f32], gamma: f32) -> f32 {
    let squared: f32 = a
        .iter()
        .zip(b.iter())
        .map(|(x, y)| (x - y) * (x - y))
        .sum();
    (-gamma * squared).exp()
}

/// Project onto the set {0 <= v_i <= upper, sum v = 1} by bisecting the
/// simplex shift theta in clip(v_i - theta).
fn project_capped_simplex(values: &[f64], upper: f64) -> Vec<f64> {
    let clip_sum = |theta: f64| -> f64 {
        values
            .iter()
            .map(|v| (v - theta).clamp(0.0, upper))
            .sum()
    };

    let mut lo = values.iter().cloned().fold(f64::INFINITY, f64::min) - upper - 1.0;
    let mut hi = values.iter().cloned().fold(f64::NEG_INFINITY, f64::max);

    for _ in 0..64 {
        let theta = (lo + hi) / 2.0;
        if clip_sum(theta) > 1.0 {
            lo = theta;
        } else {
            hi = theta;
        }
    }

    let theta = (lo + hi) / 2.0;
    values
        .iter()
        .map(|v| (v - theta).clamp(0.0, upper))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Tight square cluster around the origin.
    fn cluster_matrix() -> FeatureMatrix {
        let rows = (0..100)
            .map(|i| {
                vec![
                    (i % 10) as f32 * 0.05 - 0.25,
                    (i / 10) as f32 * 0.05 - 0.25,
                ]
            })
            .collect();
        FeatureMatrix::from_rows(vec!["x".to_string(), "y".to_string()], rows).unwrap()
    }

    #[test]
    fn test_creation() {
        let svm = OneClassSvm::default();
        assert!(!svm.is_fitted());
        assert_eq!(svm.name(), "ocsvm");
    }

    #[test]
    fn test_invalid_nu_rejected() {
        for nu in [0.0, -0.5, 1.5] {
            let mut svm = OneClassSvm::new(OneClassSvmConfig {
                nu,
                ..OneClassSvmConfig::default()
            });
            assert!(matches!(
                svm.fit(&cluster_matrix()),
                Err(SentryError::Config(_))
            ));
        }
    }

    #[test]
    fn test_score_before_fit_fails() {
        let svm = OneClassSvm::default();
        assert!(matches!(
            svm.score(&[0.0, 0.0]),
            Err(SentryError::NotFitted(_))
        ));
    }

    #[test]
    fn test_far_row_is_flagged() {
        let mut svm = OneClassSvm::new(OneClassSvmConfig {
            seed: Some(7),
            ..OneClassSvmConfig::default()
        });
        svm.fit(&cluster_matrix()).unwrap();
        assert!(svm.rho() > 0.0);

        assert_eq!(svm.predict(&[10.0, 10.0]).unwrap(), Label::Anomaly);
        assert!(svm.decision_function(&[10.0, 10.0]).unwrap() < 0.0);
        assert!(svm.score(&[10.0, 10.0]).unwrap() > 0.0);
    }

    #[test]
    fn test_most_training_rows_are_normal() {
        let matrix = cluster_matrix();
        let mut svm = OneClassSvm::new(OneClassSvmConfig {
            seed: Some(7),
            ..OneClassSvmConfig::default()
        });
        svm.fit(&matrix).unwrap();

        let labels = svm.predict_batch(&matrix).unwrap();
        let normal = labels.iter().filter(|&&l| l == Label::Normal).count();
        assert!(normal >= 70, "only {} of 100 rows were normal", normal);
    }

    #[test]
    fn test_subsampling_cap() {
        let rows = (0..50).map(|i| vec![i as f32 * 0.01]).collect();
        let matrix = FeatureMatrix::from_rows(vec!["v".to_string()], rows).unwrap();

        let mut svm = OneClassSvm::new(OneClassSvmConfig {
            max_samples: 20,
            seed: Some(3),
            ..OneClassSvmConfig::default()
        });
        svm.fit(&matrix).unwrap();
        assert!(svm.n_support_vectors() <= 20);
    }

    #[test]
    fn test_capped_simplex_projection() {
        let projected = project_capped_simplex(&[0.9, 0.8, 0.1, 0.0], 0.5);

        let sum: f64 = projected.iter().sum();
        assert!((sum - 1.0).abs() < 1e-6);
        for v in projected {
            assert!((0.0..=0.5 + 1e-9).contains(&v));
        }
    }

    #[test]
    fn test_width_mismatch_rejected() {
        let mut svm = OneClassSvm::default();
        svm.fit(&cluster_matrix()).unwrap();
        assert!(matches!(
            svm.score(&[1.0]),
            Err(SentryError::DimensionMismatch { expected: 2, got: 1 })
        ));
    }
}
