//! Isolation Forest implementation
//!
//! Anomaly detection using isolation trees. Anomalies are easier to isolate
//! and thus have shorter path lengths in the trees. The decision threshold
//! is calibrated from the contamination fraction: after fitting, the
//! `(1 - contamination)` quantile of training scores becomes the cut line.

use rand::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::{quantile, AnomalyModel, Label};
use crate::dataset::FeatureMatrix;
use crate::error::{Result, SentryError};

/// Isolation Forest configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IsolationForestConfig {
    /// Number of trees in the ensemble
    #[serde(default = "default_num_trees")]
    pub num_trees: usize,
    /// Rows sampled (with replacement) per tree
    #[serde(default = "default_sample_size")]
    pub sample_size: usize,
    /// Expected fraction of anomalous rows in training data
    #[serde(default = "default_contamination")]
    pub contamination: f32,
    /// Random seed for reproducibility
    #[serde(default)]
    pub seed: Option<u64>,
}

impl Default for IsolationForestConfig {
    fn default() -> Self {
        Self {
            num_trees: default_num_trees(),
            sample_size: default_sample_size(),
            contamination: default_contamination(),
            seed: None,
        }
    }
}

fn default_num_trees() -> usize {
    100
}

fn default_sample_size() -> usize {
    256
}

fn default_contamination() -> f32 {
    0.1
}

/// Isolation Forest model for anomaly detection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IsolationForest {
    config: IsolationForestConfig,
    /// Individual isolation trees
    trees: Vec<IsolationTree>,
    /// Anomaly score threshold, set from training scores
    threshold: f32,
    /// Average path length normalization factor
    avg_path_length: f32,
    /// Feature width seen at fit time
    n_features: usize,
    fitted: bool,
}

impl Default for IsolationForest {
    fn default() -> Self {
        Self::new(IsolationForestConfig::default())
    }
}

impl IsolationForest {
    /// Storage artifact name.
    pub const NAME: &'static str = "isolation_forest";

    /// Create a new Isolation Forest.
    pub fn new(config: IsolationForestConfig) -> Self {
        Self {
            config,
            trees: Vec::new(),
            threshold: 0.0,
            avg_path_length: 0.0,
            n_features: 0,
            fitted: false,
        }
    }

    /// Decision threshold derived from the training scores.
    pub fn threshold(&self) -> f32 {
        self.threshold
    }

    /// Calculate average path length for normalization (c(n) function).
    fn average_path_length(n: usize) -> f32 {
        if n <= 1 {
            return 0.0;
        }
        let n = n as f32;
        2.0 * (n.ln() + 0.5772156649) - 2.0 * (n - 1.0) / n
    }

    /// Score a row without fit/width checks.
    fn score_row(&self, row: &[f32]) -> f32 {
        if self.trees.is_empty() || self.avg_path_length == 0.0 {
            return 0.5;
        }

        let total_path_length: f32 = self
            .trees
            .iter()
            .map(|tree| tree.path_length(row, 0))
            .sum();

        let avg_path = total_path_length / self.trees.len() as f32;

        // Anomaly score: 2^(-avg_path / c(sample_size))
        2.0_f32.powf(-avg_path / self.avg_path_length)
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

impl AnomalyModel for IsolationForest {
    fn fit(&mut self, data: &FeatureMatrix) -> Result<()> {
        if self.config.num_trees == 0 {
            return Err(SentryError::Config(
                "isolation forest num_trees must be at least 1".to_string(),
            ));
        }
        if self.config.sample_size == 0 {
            return Err(SentryError::Config(
                "isolation forest sample_size must be at least 1".to_string(),
            ));
        }
        if data.is_empty() {
            return Err(SentryError::EmptyDataset(
                "isolation forest fit on empty matrix".to_string(),
            ));
        }

        let mut rng = match self.config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_os_rng(),
        };

        let rows = data.rows();
        self.n_features = data.n_columns();
        self.trees.clear();
        self.avg_path_length = Self::average_path_length(self.config.sample_size);

        for _ in 0..self.config.num_trees {
            // Sample with replacement
            let sample: Vec<Vec<f32>> = (0..self.config.sample_size.min(rows.len()))
                .map(|_| {
                    let idx = rng.random_range(0..rows.len());
                    rows[idx].clone()
                })
                .collect();

            let max_depth = (self.config.sample_size as f32).log2().ceil() as usize;
            let tree = IsolationTree::build(&sample, self.n_features, max_depth, &mut rng);
            self.trees.push(tree);
        }

        // Calibrate the decision threshold from the contamination fraction.
        // Strictly-greater prediction keeps an all-identical training set
        // from being flagged wholesale.
        let scores: Vec<f32> = rows.iter().map(|row| self.score_row(row)).collect();
        self.threshold = quantile(&scores, 1.0 - self.config.contamination);
        self.fitted = true;

        debug!(
            "Isolation forest: {} trees over {} rows",
            self.trees.len(),
            rows.len()
        );
        info!(
            "Isolation forest threshold {:.4} (contamination {:.2})",
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

/// A single isolation tree.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct IsolationTree {
    root: Option<Box<IsolationNode>>,
}

impl IsolationTree {
    /// Build an isolation tree from samples.
    fn build<R: Rng>(
        samples: &[Vec<f32>],
        n_features: usize,
        max_depth: usize,
        rng: &mut R,
    ) -> Self {
        let root = Self::build_node(samples, n_features, 0, max_depth, rng);
        Self { root }
    }

    /// Recursively build tree nodes.
    fn build_node<R: Rng>(
        samples: &[Vec<f32>],
        n_features: usize,
        depth: usize,
        max_depth: usize,
        rng: &mut R,
    ) -> Option<Box<IsolationNode>> {
        if samples.is_empty() {
            return None;
        }

        // Terminal conditions
        if depth >= max_depth || samples.len() <= 1 {
            return Some(Box::new(IsolationNode::Leaf {
                size: samples.len(),
            }));
        }

        // Randomly select feature
        let feature_idx = rng.random_range(0..n_features);

        // Find min/max for selected feature
        let mut min_val = f32::MAX;
        let mut max_val = f32::MIN;
        for sample in samples {
            if let Some(&val) = sample.get(feature_idx) {
                if val < min_val {
                    min_val = val;
                }
                if val > max_val {
                    max_val = val;
                }
            }
        }

        // If all values are the same, make a leaf
        if (max_val - min_val).abs() < f32::EPSILON {
            return Some(Box::new(IsolationNode::Leaf {
                size: samples.len(),
            }));
        }

        // Random split point
        let split_value = rng.random_range(min_val..max_val);

        // Partition samples
        let (left_samples, right_samples): (Vec<Vec<f32>>, Vec<Vec<f32>>) = samples
            .iter()
            .cloned()
            .partition(|s| s.get(feature_idx).map(|&v| v < split_value).unwrap_or(true));

        // Build child nodes
        let left = Self::build_node(&left_samples, n_features, depth + 1, max_depth, rng);
        let right = Self::build_node(&right_samples, n_features, depth + 1, max_depth, rng);

        Some(Box::new(IsolationNode::Internal {
            feature_idx,
            split_value,
            left,
            right,
        }))
    }

    /// Calculate path length for a row.
    fn path_length(&self, row: &[f32], current_depth: usize) -> f32 {
        match &self.root {
            None => current_depth as f32,
            Some(node) => Self::node_path_length(node, row, current_depth),
        }
    }

    fn node_path_length(node: &IsolationNode, row: &[f32], depth: usize) -> f32 {
        match node {
            IsolationNode::Leaf { size } => {
                // Add expected path length adjustment for leaves with multiple samples
                depth as f32 + IsolationForest::average_path_length(*size)
            }
            IsolationNode::Internal {
                feature_idx,
                split_value,
                left,
                right,
            } => {
                let val = row.get(*feature_idx).copied().unwrap_or(0.0);
                let next_node = if val < *split_value { left } else { right };

                match next_node {
                    Some(n) => Self::node_path_length(n, row, depth + 1),
                    None => depth as f32 + 1.0,
                }
            }
        }
    }
}

/// Node in an isolation tree.
#[derive(Debug, Clone, Serialize, Deserialize)]
enum IsolationNode {
    /// Internal node with split
    Internal {
        feature_idx: usize,
        split_value: f32,
        left: Option<Box<IsolationNode>>,
        right: Option<Box<IsolationNode>>,
    },
    /// Leaf node
    Leaf { size: usize },
}
