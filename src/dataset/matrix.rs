//! Rectangular feature matrix shared by the scaler and every model.

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};

use crate::error::{Result, SentryError};

/// A numeric matrix with named columns. Rows keep the order they were
/// loaded in; every row has exactly one value per column.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureMatrix {
    columns: Vec<String>,
    rows: Vec<Vec<f32>>,
}

impl FeatureMatrix {
    /// Create an empty matrix with the given columns.
    pub fn new(columns: Vec<String>) -> Self {
        Self {
            columns,
            rows: Vec::new(),
        }
    }

    /// Build a matrix from pre-collected rows, checking rectangularity.
    pub fn from_rows(columns: Vec<String>, rows: Vec<Vec<f32>>) -> Result<Self> {
        let width = columns.len();
        for row in &rows {
            if row.len() != width {
                return Err(SentryError::DimensionMismatch {
                    expected: width,
                    got: row.len(),
                });
            }
        }
        Ok(Self { columns, rows })
    }

    /// Append a row, checking its width.
    pub fn push_row(&mut self, row: Vec<f32>) -> Result<()> {
        if row.len() != self.columns.len() {
            return Err(SentryError::DimensionMismatch {
                expected: self.columns.len(),
                got: row.len(),
            });
        }
        self.rows.push(row);
        Ok(())
    }

    pub fn n_rows(&self) -> usize {
        self.rows.len()
    }

    pub fn n_columns(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn rows(&self) -> &[Vec<f32>] {
        &self.rows
    }

    pub fn row(&self, idx: usize) -> Option<&[f32]> {
        self.rows.get(idx).map(|r| r.as_slice())
    }

    /// Iterate one column's values in row order.
    pub fn column(&self, idx: usize) -> impl Iterator<Item = f32> + '_ {
        self.rows.iter().map(move |r| r[idx])
    }

    /// Shuffled train/holdout split.
    ///
    /// The holdout fraction is clamped so both sides keep at least one row.
    /// With a seed the split is reproducible.
    pub fn split(
        &self,
        holdout_fraction: f32,
        seed: Option<u64>,
    ) -> Result<(FeatureMatrix, FeatureMatrix)> {
        if self.rows.len() < 2 {
            return Err(SentryError::EmptyDataset(
                "need at least 2 rows to split".to_string(),
            ));
        }

        let mut rng = match seed {
            Some(s) => StdRng::seed_from_u64(s),
            None => StdRng::from_os_rng(),
        };

        let mut indices: Vec<usize> = (0..self.rows.len()).collect();
        indices.shuffle(&mut rng);

        let holdout_len = ((self.rows.len() as f32 * holdout_fraction).round() as usize)
            .clamp(1, self.rows.len() - 1);
        let (holdout_idx, train_idx) = indices.split_at(holdout_len);

        let pick = |idx: &[usize]| -> Vec<Vec<f32>> {
            idx.iter().map(|&i| self.rows[i].clone()).collect()
        };

        let train = FeatureMatrix {
            columns: self.columns.clone(),
            rows: pick(train_idx),
        };
        let holdout = FeatureMatrix {
            columns: self.columns.clone(),
            rows: pick(holdout_idx),
        };

        Ok((train, holdout))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn two_column_matrix(n: usize) -> FeatureMatrix {
        let rows = (0..n).map(|i| vec![i as f32, (i * 2) as f32]).collect();
        FeatureMatrix::from_rows(vec!["a".to_string(), "b".to_string()], rows).unwrap()
    }

    #[test]
    fn test_ragged_rows_rejected() {
        let err = FeatureMatrix::from_rows(
            vec!["a".to_string(), "b".to_string()],
            vec![vec![1.0, 2.0], vec![3.0]],
        )
        .unwrap_err();

        match err {
            SentryError::DimensionMismatch { expected, got } => {
                assert_eq!(expected, 2);
                assert_eq!(got, 1);
            }
            other => panic!("unexpected error: {}", other),
        }
    }

    #[test]
    fn test_push_row_checks_width() {
        let mut matrix = FeatureMatrix::new(vec!["a".to_string()]);
        assert!(matrix.push_row(vec![1.0]).is_ok());
        assert!(matrix.push_row(vec![1.0, 2.0]).is_err());
    }

    #[test]
    fn test_column_iterates_in_row_order() {
        let matrix = two_column_matrix(5);
        let b: Vec<f32> = matrix.column(1).collect();
        assert_eq!(b, [0.0, 2.0, 4.0, 6.0, 8.0]);
    }

    #[test]
    fn test_split_sizes() {
        let matrix = two_column_matrix(100);
        let (train, holdout) = matrix.split(0.2, Some(7)).unwrap();

        assert_eq!(train.n_rows(), 80);
        assert_eq!(holdout.n_rows(), 20);
        assert_eq!(train.n_columns(), 2);
        assert_eq!(holdout.columns(), matrix.columns());
    }

    #[test]
    fn test_split_is_seeded() {
        let matrix = two_column_matrix(50);
        let (a_train, _) = matrix.split(0.2, Some(42)).unwrap();
        let (b_train, _) = matrix.split(0.2, Some(42)).unwrap();
        assert_eq!(a_train, b_train);
    }

    #[test]
    fn test_split_keeps_both_sides_nonempty() {
        let matrix = two_column_matrix(2);
        let (train, holdout) = matrix.split(0.99, Some(1)).unwrap();
        assert_eq!(train.n_rows(), 1);
        assert_eq!(holdout.n_rows(), 1);
    }

    #[test]
    fn test_split_too_small() {
        let matrix = two_column_matrix(1);
        assert!(matrix.split(0.2, None).is_err());
    }
}
