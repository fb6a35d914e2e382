//! Whole-batch model evaluation.
//!
//! Every row of an evaluation batch is assumed to share one label (an attack
//! capture is all attack, a clean capture is all normal), so accuracy is
//! simply the fraction of predictions matching that label.

use serde::{Deserialize, Serialize};
use tracing::debug;

use super::models::{AnomalyModel, Label};
use crate::dataset::FeatureMatrix;
use crate::error::{Result, SentryError};

/// Outcome of scoring one model over one batch.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EvaluationResult {
    /// Rows in the batch
    pub total: usize,
    /// Rows whose prediction matched the assumed label
    pub matched: usize,
    /// Rows predicted anomalous, regardless of the assumed label
    pub flagged: usize,
}

impl EvaluationResult {
    /// Accuracy as a percentage in `[0, 100]`.
    pub fn accuracy(&self) -> f64 {
        if self.total == 0 {
            return 0.0;
        }
        self.matched as f64 / self.total as f64 * 100.0
    }

    /// Fraction of rows flagged anomalous, in `[0, 1]`.
    pub fn flagged_fraction(&self) -> f64 {
        if self.total == 0 {
            return 0.0;
        }
        self.flagged as f64 / self.total as f64
    }
}

/// Score `model` over `data` under the assumption every row is `assumed`.
pub fn evaluate(
    model: &dyn AnomalyModel,
    data: &FeatureMatrix,
    assumed: Label,
) -> Result<EvaluationResult> {
    if data.is_empty() {
        return Err(SentryError::EmptyDataset(
            "cannot evaluate on an empty batch".to_string(),
        ));
    }

    let labels = model.predict_batch(data)?;
    let matched = labels.iter().filter(|&&l| l == assumed).count();
    let flagged = labels.iter().filter(|&&l| l == Label::Anomaly).count();

    let result = EvaluationResult {
        total: labels.len(),
        matched,
        flagged,
    };
    debug!(
        "{}: {}/{} rows matched '{}' ({:.1}%)",
        model.name(),
        matched,
        result.total,
        assumed,
        result.accuracy()
    );

    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Flags any row whose first value is above zero.
    struct ThresholdModel;

    impl AnomalyModel for ThresholdModel {
        fn fit(&mut self, _data: &FeatureMatrix) -> Result<()> {
            Ok(())
        }

        fn score(&self, row: &[f32]) -> Result<f32> {
            Ok(row[0])
        }

        fn predict(&self, row: &[f32]) -> Result<Label> {
            if row[0] > 0.0 {
                Ok(Label::Anomaly)
            } else {
                Ok(Label::Normal)
            }
        }

        fn name(&self) -> &'static str {
            "threshold"
        }

        fn is_fitted(&self) -> bool {
            true
        }
    }

    fn matrix_of(values: &[f32]) -> FeatureMatrix {
        let rows = values.iter().map(|&v| vec![v]).collect();
        FeatureMatrix::from_rows(vec!["v".to_string()], rows).unwrap()
    }

    #[test]
    fn test_accuracy_against_assumed_anomaly() {
        let data = matrix_of(&[1.0, 2.0, -1.0, 3.0]);
        let result = evaluate(&ThresholdModel, &data, Label::Anomaly).unwrap();

        assert_eq!(result.total, 4);
        assert_eq!(result.matched, 3);
        assert_eq!(result.flagged, 3);
        assert_eq!(result.accuracy(), 75.0);
    }

    #[test]
    fn test_accuracy_against_assumed_normal() {
        let data = matrix_of(&[1.0, 2.0, -1.0, 3.0]);
        let result = evaluate(&ThresholdModel, &data, Label::Normal).unwrap();

        assert_eq!(result.matched, 1);
        assert_eq!(result.flagged, 3);
        assert_eq!(result.accuracy(), 25.0);
        assert!((result.flagged_fraction() - 0.75).abs() < 1e-9);
    }

    #[test]
    fn test_empty_batch_rejected() {
        let empty = FeatureMatrix::new(vec!["v".to_string()]);
        assert!(matches!(
            evaluate(&ThresholdModel, &empty, Label::Anomaly),
            Err(SentryError::EmptyDataset(_))
        ));
    }
}
