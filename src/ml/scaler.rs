//! Per-column standardization fitted on training data only.
//!
//! The fitted state (column names, means, standard deviations) is persisted
//! with the models and reused verbatim for every later evaluation, so a batch
//! scored tomorrow is scaled exactly like the batch the models trained on.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::dataset::FeatureMatrix;
use crate::error::{Result, SentryError};

/// Z-score scaler over the feature columns.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StandardScaler {
    columns: Vec<String>,
    means: Vec<f32>,
    stds: Vec<f32>,
    n_samples: u64,
}

impl StandardScaler {
    /// Fit column statistics over every row of `data`.
    pub fn fit(data: &FeatureMatrix) -> Result<Self> {
        if data.is_empty() {
            return Err(SentryError::EmptyDataset(
                "cannot fit scaler on an empty matrix".to_string(),
            ));
        }

        let n_rows = data.n_rows();
        let n_columns = data.n_columns();

        // Two passes with f64 accumulators to keep the sums stable.
        let mut sums = vec![0.0_f64; n_columns];
        for row in data.rows() {
            for (sum, &value) in sums.iter_mut().zip(row.iter()) {
                *sum += value as f64;
            }
        }
        let means_f64: Vec<f64> = sums.iter().map(|s| s / n_rows as f64).collect();

        let mut squared = vec![0.0_f64; n_columns];
        for row in data.rows() {
            for ((sq, &mean), &value) in squared.iter_mut().zip(means_f64.iter()).zip(row.iter()) {
                let delta = value as f64 - mean;
                *sq += delta * delta;
            }
        }
        let stds: Vec<f32> = squared
            .iter()
            .map(|sq| (sq / n_rows as f64).sqrt() as f32)
            .collect();
        let means: Vec<f32> = means_f64.iter().map(|&m| m as f32).collect();

        let constant = stds.iter().filter(|&&s| s == 0.0).count();
        if constant > 0 {
            debug!("{} constant columns will scale to zero", constant);
        }

        Ok(Self {
            columns: data.columns().to_vec(),
            means,
            stds,
            n_samples: n_rows as u64,
        })
    }

    /// Standardize one row. Constant columns map to zero.
    pub fn transform_row(&self, row: &[f32]) -> Result<Vec<f32>> {
        if row.len() != self.columns.len() {
            return Err(SentryError::DimensionMismatch {
                expected: self.columns.len(),
                got: row.len(),
            });
        }

        Ok(row
            .iter()
            .zip(self.means.iter())
            .zip(self.stds.iter())
            .map(|((&value, &mean), &std)| {
                if std > 0.0 {
                    (value - mean) / std
                } else {
                    0.0
                }
            })
            .collect())
    }

    /// Standardize a whole matrix, checking both width and column names.
    pub fn transform(&self, data: &FeatureMatrix) -> Result<FeatureMatrix> {
        if data.n_columns() != self.columns.len() {
            return Err(SentryError::DimensionMismatch {
                expected: self.columns.len(),
                got: data.n_columns(),
            });
        }
        if data.columns() != self.columns.as_slice() {
            return Err(SentryError::Schema(format!(
                "column names differ from the fitted scaler (fitted on: {})",
                self.columns.join(", ")
            )));
        }

        let rows = data
            .rows()
            .iter()
            .map(|row| self.transform_row(row))
            .collect::<Result<Vec<_>>>()?;
        FeatureMatrix::from_rows(self.columns.clone(), rows)
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn means(&self) -> &[f32] {
        &self.means
    }

    pub fn stds(&self) -> &[f32] {
        &self.stds
    }

    /// Rows the scaler was fitted on.
    pub fn n_samples(&self) -> u64 {
        self.n_samples
    }

    pub fn n_features(&self) -> usize {
        self.columns.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_matrix() -> FeatureMatrix {
        let rows = (0..50)
            .map(|i| vec![i as f32, i as f32 * 2.0 + 5.0, 3.0])
            .collect();
        FeatureMatrix::from_rows(
            vec!["a".to_string(), "b".to_string(), "c".to_string()],
            rows,
        )
        .unwrap()
    }

    fn column_mean(matrix: &FeatureMatrix, col: usize) -> f32 {
        matrix.column(col).sum::<f32>() / matrix.n_rows() as f32
    }

    fn column_std(matrix: &FeatureMatrix, col: usize) -> f32 {
        let mean = column_mean(matrix, col);
        let var = matrix
            .column(col)
            .map(|v| (v - mean) * (v - mean))
            .sum::<f32>()
            / matrix.n_rows() as f32;
        var.sqrt()
    }

    #[test]
    fn test_transformed_columns_are_standardized() {
        let matrix = sample_matrix();
        let scaler = StandardScaler::fit(&matrix).unwrap();
        let scaled = scaler.transform(&matrix).unwrap();

        for col in 0..2 {
            assert!(column_mean(&scaled, col).abs() < 1e-4);
            assert!((column_std(&scaled, col) - 1.0).abs() < 1e-3);
        }
    }

    #[test]
    fn test_fitted_statistics_match_data() {
        let scaler = StandardScaler::fit(&sample_matrix()).unwrap();

        assert_eq!(scaler.n_samples(), 50);
        // Column a is 0..50, column b is 2a + 5, column c is constant.
        assert!((scaler.means()[0] - 24.5).abs() < 1e-4);
        assert!((scaler.means()[1] - 54.0).abs() < 1e-4);
        assert!((scaler.stds()[1] - 2.0 * scaler.stds()[0]).abs() < 1e-3);
        assert_eq!(scaler.stds()[2], 0.0);
    }

    #[test]
    fn test_constant_column_maps_to_zero() {
        let matrix = sample_matrix();
        let scaler = StandardScaler::fit(&matrix).unwrap();
        let scaled = scaler.transform(&matrix).unwrap();

        for row in scaled.rows() {
            assert_eq!(row[2], 0.0);
        }
    }

    #[test]
    fn test_transform_is_deterministic() {
        let matrix = sample_matrix();
        let scaler = StandardScaler::fit(&matrix).unwrap();

        let first = scaler.transform(&matrix).unwrap();
        let second = scaler.transform(&matrix).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_width_mismatch_rejected() {
        let scaler = StandardScaler::fit(&sample_matrix()).unwrap();
        assert!(matches!(
            scaler.transform_row(&[1.0, 2.0]),
            Err(SentryError::DimensionMismatch { expected: 3, got: 2 })
        ));
    }

    #[test]
    fn test_renamed_column_rejected() {
        let scaler = StandardScaler::fit(&sample_matrix()).unwrap();

        let rows = (0..5).map(|i| vec![i as f32, i as f32, 3.0]).collect();
        let renamed = FeatureMatrix::from_rows(
            vec!["a".to_string(), "x".to_string(), "c".to_string()],
            rows,
        )
        .unwrap();

        assert!(matches!(
            scaler.transform(&renamed),
            Err(SentryError::Schema(_))
        ));
    }

    #[test]
    fn test_empty_matrix_rejected() {
        let empty = FeatureMatrix::new(vec!["a".to_string()]);
        assert!(matches!(
            StandardScaler::fit(&empty),
            Err(SentryError::EmptyDataset(_))
        ));
    }

    #[test]
    fn test_row_order_preserved() {
        let matrix = sample_matrix();
        let scaler = StandardScaler::fit(&matrix).unwrap();
        let scaled = scaler.transform(&matrix).unwrap();

        assert_eq!(scaled.n_rows(), matrix.n_rows());
        // Column a is strictly increasing, so its scaled values must be too.
        let first = scaled.rows()[0][0];
        let last = scaled.rows()[scaled.n_rows() - 1][0];
        assert!(first < last);
    }
}
