//! Anomaly models for flow features.
//!
//! Four independent scorers share one trait and one label convention. Each
//! is fitted once on scaled, presumed-legitimate traffic and then reused
//! read-only for scoring.

pub mod autoencoder;
pub mod isolation_forest;
pub mod lof;
pub mod ocsvm;

pub use autoencoder::{Autoencoder, AutoencoderConfig};
pub use isolation_forest::{IsolationForest, IsolationForestConfig};
pub use lof::{LocalOutlierFactor, LofConfig};
pub use ocsvm::{OneClassSvm, OneClassSvmConfig};

use serde::{Deserialize, Serialize};

use crate::dataset::FeatureMatrix;
use crate::error::Result;

/// Binary decision for one row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Label {
    Normal,
    Anomaly,
}

impl Label {
    /// Conventional wire encoding: +1 normal, -1 anomaly.
    pub fn as_i8(self) -> i8 {
        match self {
            Label::Normal => 1,
            Label::Anomaly => -1,
        }
    }
}

impl std::fmt::Display for Label {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Label::Normal => write!(f, "normal"),
            Label::Anomaly => write!(f, "anomaly"),
        }
    }
}

/// Trait for anomaly detection models.
pub trait AnomalyModel: Send + Sync {
    /// Train the model on scaled, presumed-normal data.
    fn fit(&mut self, data: &FeatureMatrix) -> Result<()>;

    /// Score a scaled row (higher = more anomalous).
    fn score(&self, row: &[f32]) -> Result<f32>;

    /// Classify a scaled row.
    fn predict(&self, row: &[f32]) -> Result<Label>;

    /// Classify every row of a scaled matrix, in row order.
    fn predict_batch(&self, data: &FeatureMatrix) -> Result<Vec<Label>> {
        data.rows().iter().map(|row| self.predict(row)).collect()
    }

    /// Model name, also used as the storage artifact name.
    fn name(&self) -> &'static str;

    /// Whether fit has completed.
    fn is_fitted(&self) -> bool;
}

/// Quantile of a sample by linear interpolation, `q` in [0, 1].
///
/// Used for contamination-based decision thresholds and the autoencoder's
/// reconstruction-error percentile.
pub(crate) fn quantile(values: &[f32], q: f32) -> f32 {
    if values.is_empty() {
        return 0.0;
    }

    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));

    let q = q.clamp(0.0, 1.0);
    let pos = q as f64 * (sorted.len() - 1) as f64;
    let lower = pos.floor() as usize;
    let upper = pos.ceil() as usize;

    if lower == upper {
        sorted[lower]
    } else {
        let frac = (pos - lower as f64) as f32;
        sorted[lower] + (sorted[upper] - sorted[lower]) * frac
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_label_wire_values() {
        assert_eq!(Label::Normal.as_i8(), 1);
        assert_eq!(Label::Anomaly.as_i8(), -1);
    }

    #[test]
    fn test_quantile_endpoints() {
        let values = vec![1.0, 2.0, 3.0, 4.0, 5.0];
        assert_eq!(quantile(&values, 0.0), 1.0);
        assert_eq!(quantile(&values, 1.0), 5.0);
        assert_eq!(quantile(&values, 0.5), 3.0);
    }

    #[test]
    fn test_quantile_interpolates() {
        let values = vec![0.0, 1.0];
        let q = quantile(&values, 0.75);
        assert!((q - 0.75).abs() < 1e-6);
    }

    #[test]
    fn test_quantile_unsorted_input() {
        let values = vec![5.0, 1.0, 3.0, 2.0, 4.0];
        assert_eq!(quantile(&values, 1.0), 5.0);
        assert_eq!(quantile(&values, 0.5), 3.0);
    }

    #[test]
    fn test_quantile_empty() {
        assert_eq!(quantile(&[], 0.5), 0.0);
    }
}
