//! Local Outlier Factor in novelty mode.
//!
//! The fitted model keeps the training rows, their k-distances, and their
//! local reachability densities, so rows never seen during fit can be scored
//! against the training structure. Scores near 1 mean a row sits in a region
//! as dense as its neighbors; larger scores mean locally sparse, anomalous
//! placement.

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use super::{quantile, AnomalyModel, Label};
use crate::dataset::FeatureMatrix;
use crate::error::{Result, SentryError};

/// Guard against zero distances between duplicate rows.
const MIN_DENSITY_SUM: f32 = 1e-10;

/// Local Outlier Factor configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LofConfig {
    /// Neighbors consulted per row
    #[serde(default = "default_n_neighbors")]
    pub n_neighbors: usize,
    /// Expected fraction of anomalous rows in training data
    #[serde(default = "default_contamination")]
    pub contamination: f32,
}

impl Default for LofConfig {
    fn default() -> Self {
        Self {
            n_neighbors: default_n_neighbors(),
            contamination: default_contamination(),
        }
    }
}

fn default_n_neighbors() -> usize {
    20
}

fn default_contamination() -> f32 {
    0.1
}

/// Local Outlier Factor model for anomaly detection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LocalOutlierFactor {
    config: LofConfig,
    /// Training rows retained for novelty scoring
    train: Vec<Vec<f32>>,
    /// Distance from each training row to its kth neighbor
    k_distances: Vec<f32>,
    /// Local reachability density of each training row
    lrds: Vec<f32>,
    /// Effective neighbor count (clamped to n - 1 at fit time)
    k: usize,
    /// LOF score threshold, set from training scores
    threshold: f32,
    n_features: usize,
    fitted: bool,
}

impl Default for LocalOutlierFactor {
    fn default() -> Self {
        Self::new(LofConfig::default())
    }
}

impl LocalOutlierFactor {
    /// Storage artifact name.
    pub const NAME: &'static str = "lof";

    /// Create a new LOF model.
    pub fn new(config: LofConfig) -> Self {
        Self {
            config,
            train: Vec::new(),
            k_distances: Vec::new(),
            lrds: Vec::new(),
            k: 0,
            threshold: 0.0,
            n_features: 0,
            fitted: false,
        }
    }

    /// Decision threshold derived from the training scores.
    pub fn threshold(&self) -> f32 {
        self.threshold
    }

    /// Nearest training rows to `row`, sorted by ascending distance.
    fn nearest(&self, row: &[f32], exclude: Option<usize>) -> Vec<(usize, f32)> {
        let mut distances: Vec<(usize, f32)> = self
            .train
            .iter()
            .enumerate()
            .filter(|(i, _)| Some(*i) != exclude)
            .map(|(i, other)| (i, euclidean(row, other)))
            .collect();

        distances.sort_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(std::cmp::Ordering::Equal));
        distances.truncate(self.k);
        distances
    }

    /// Local reachability density of `row` against its training neighbors.
    fn lrd_of(&self, neighbors: &[(usize, f32)]) -> f32 {
        let reach_sum: f32 = neighbors
            .iter()
            .map(|&(o, dist)| self.k_distances[o].max(dist))
            .sum();
        neighbors.len() as f32 / reach_sum.max(MIN_DENSITY_SUM)
    }

    /// LOF score of a row not required to be in the training set.
    fn score_row(&self, row: &[f32]) -> f32 {
        let neighbors = self.nearest(row, None);
        if neighbors.is_empty() {
            return 1.0;
        }

        let lrd = self.lrd_of(&neighbors);
        let neighbor_lrd: f32 =
            neighbors.iter().map(|&(o, _)| self.lrds[o]).sum::<f32>() / neighbors.len() as f32;

        neighbor_lrd / lrd.max(MIN_DENSITY_SUM)
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

impl AnomalyModel for LocalOutlierFactor {
    fn fit(&mut self, data: &FeatureMatrix) -> Result<()> {
        if self.config.n_neighbors == 0 {
            return Err(SentryError::Config(
                "lof n_neighbors must be at least 1".to_string(),
            ));
        }
        if data.n_rows() < 2 {
            return Err(SentryError::EmptyDataset(
                "lof needs at least 2 training rows".to_string(),
            ));
        }

        let n = data.n_rows();
        let mut k = self.config.n_neighbors;
        if k >= n {
            k = n - 1;
            warn!(
                "Clamping lof neighbor count from {} to {} (training set has {} rows)",
                self.config.n_neighbors, k, n
            );
        }

        self.train = data.rows().to_vec();
        self.n_features = data.n_columns();
        self.k = k;

        // Neighbor lists for every training row, excluding the row itself.
        let neighbor_lists: Vec<Vec<(usize, f32)>> = (0..n)
            .map(|i| self.nearest(&self.train[i], Some(i)))
            .collect();

        self.k_distances = neighbor_lists
            .iter()
            .map(|neighbors| neighbors.last().map(|&(_, d)| d).unwrap_or(0.0))
            .collect();

        self.lrds = neighbor_lists
            .iter()
            .map(|neighbors| self.lrd_of(neighbors))
            .collect();

        let lofs: Vec<f32> = neighbor_lists
            .iter()
            .enumerate()
            .map(|(i, neighbors)| {
                let neighbor_lrd: f32 = neighbors.iter().map(|&(o, _)| self.lrds[o]).sum::<f32>()
                    / neighbors.len() as f32;
                neighbor_lrd / self.lrds[i].max(MIN_DENSITY_SUM)
            })
            .collect();

        self.threshold = quantile(&lofs, 1.0 - self.config.contamination);
        self.fitted = true;

        debug!("LOF fitted over {} rows with k={}", n, k);
        info!(
            "LOF threshold {:.4} (contamination {:.2})",
            self.threshold, self.config.contamination
        );

        Ok(())
    }

    fn score(&self, row: &[f32]) -> Result<f32> {
        self.check_row(row)?;
        Ok(self.score_row(row))
    }

    fn predict(&self, row: &[f32]) -> Result<Label> {
        let score = self.score(row)?;
        if score > self.threshold {
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

fn euclidean(a: &[f32], b: &[f32]) -> f32 {
    a.iter()
        .zip(b.iter())
        .map(|(x, y)| (x - y) * (x - y))
        .sum::<f32>()
        .sqrt()
}

#[cfg(test)]
mod tests {
    use super::*;

    /// 10x10 grid with 0.1 spacing, a dense uniform cluster.
    fn grid_matrix() -> FeatureMatrix {
        let rows = (0..100)
            .map(|i| vec![(i % 10) as f32 * 0.1, (i / 10) as f32 * 0.1])
            .collect();
        FeatureMatrix::from_rows(vec!["x".to_string(), "y".to_string()], rows).unwrap()
    }

    #[test]
    fn test_creation() {
        let lof = LocalOutlierFactor::default();
        assert!(!lof.is_fitted());
        assert_eq!(lof.name(), "lof");
    }

    #[test]
    fn test_score_before_fit_fails() {
        let lof = LocalOutlierFactor::default();
        assert!(matches!(
            lof.score(&[0.0, 0.0]),
            Err(SentryError::NotFitted(_))
        ));
    }

    #[test]
    fn test_far_row_is_flagged() {
        let mut lof = LocalOutlierFactor::new(LofConfig {
            n_neighbors: 10,
            contamination: 0.1,
        });
        lof.fit(&grid_matrix()).unwrap();

        let far = lof.predict(&[100.0, 100.0]).unwrap();
        assert_eq!(far, Label::Anomaly);
        assert!(lof.score(&[100.0, 100.0]).unwrap() > lof.threshold());
    }

    #[test]
    fn test_most_training_rows_are_normal() {
        let matrix = grid_matrix();
        let mut lof = LocalOutlierFactor::new(LofConfig {
            n_neighbors: 10,
            contamination: 0.1,
        });
        lof.fit(&matrix).unwrap();

        let labels = lof.predict_batch(&matrix).unwrap();
        let normal = labels.iter().filter(|&&l| l == Label::Normal).count();
        assert!(normal >= 85, "only {} of 100 rows were normal", normal);

        for label in labels {
            assert!(label.as_i8() == 1 || label.as_i8() == -1);
        }
    }

    #[test]
    fn test_zero_neighbors_rejected() {
        let mut lof = LocalOutlierFactor::new(LofConfig {
            n_neighbors: 0,
            contamination: 0.1,
        });
        assert!(matches!(
            lof.fit(&grid_matrix()),
            Err(SentryError::Config(_))
        ));
        assert!(!lof.is_fitted());
    }

    #[test]
    fn test_neighbor_count_clamped() {
        let rows = (0..5).map(|i| vec![i as f32]).collect();
        let matrix = FeatureMatrix::from_rows(vec!["v".to_string()], rows).unwrap();

        let mut lof = LocalOutlierFactor::new(LofConfig {
            n_neighbors: 50,
            contamination: 0.2,
        });
        lof.fit(&matrix).unwrap();
        assert_eq!(lof.k, 4);
    }

    #[test]
    fn test_duplicate_rows_do_not_blow_up() {
        let rows = (0..20).map(|_| vec![1.0, 2.0]).collect();
        let matrix =
            FeatureMatrix::from_rows(vec!["x".to_string(), "y".to_string()], rows).unwrap();

        let mut lof = LocalOutlierFactor::default();
        lof.fit(&matrix).unwrap();

        let score = lof.score(&[1.0, 2.0]).unwrap();
        assert!(score.is_finite());
    }

    #[test]
    fn test_width_mismatch_rejected() {
        let mut lof = LocalOutlierFactor::default();
        lof.fit(&grid_matrix()).unwrap();

        assert!(matches!(
            lof.score(&[1.0]),
            Err(SentryError::DimensionMismatch { expected: 2, got: 1 })
        ));
    }
}
