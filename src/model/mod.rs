//! Trained model artifacts behind narrow capability traits.
//!
//! The training pipeline exports each estimator as JSON. Every artifact
//! kind is consumed through one trait so the scoring code never cares
//! which model family produced it, and tests can plug in fakes.

pub mod artifacts;
pub mod envelope;
pub mod forest;
pub mod logistic;
pub mod lstm;
pub mod scaler;

pub use self::artifacts::{resolve_artifact_dir, ArtifactSummary, ModelArtifactSet};
pub use self::envelope::ZScoreEnvelope;
pub use self::forest::{DecisionTree, IsolationForest, RandomForest};
pub use self::logistic::LogisticModel;
pub use self::lstm::{LstmLayer, PredictiveRnn};
pub use self::scaler::StandardScaler;

use crate::error::InferenceError;
use serde::{Deserialize, Serialize};

/// Output of an anomaly detector for one scaled vector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Verdict {
    Normal,
    Anomaly,
}

impl Verdict {
    pub fn is_anomaly(&self) -> bool {
        matches!(self, Verdict::Anomaly)
    }
}

/// Per-feature standardisation fit at training time.
pub trait Scaler: Send + Sync {
    /// Column names the scaler was fit on, in fit order, when recorded.
    fn feature_names(&self) -> Option<&[String]>;

    fn n_features(&self) -> usize;

    fn transform(&self, vector: &[f64]) -> Result<Vec<f64>, InferenceError>;
}

/// Unsupervised normal/anomaly decision on a scaled vector.
pub trait AnomalyDetector: Send + Sync {
    /// Input width the detector was fit on, if it is fixed.
    fn n_features(&self) -> Option<usize>;

    fn score(&self, scaled: &[f64]) -> Result<Verdict, InferenceError>;
}

/// Supervised failure classifier on a scaled vector.
pub trait Classifier: Send + Sync {
    fn n_features(&self) -> Option<usize>;

    /// Probability of the failure class, in `[0, 1]`.
    fn predict_proba(&self, scaled: &[f64]) -> Result<f64, InferenceError>;

    /// Label chosen by the classifier's own decision rule.
    fn predict(&self, scaled: &[f64]) -> Result<u8, InferenceError>;
}

/// Recurrent scorer over an ordered window of scaled samples.
pub trait SequenceModel: Send + Sync {
    fn input_size(&self) -> usize;

    /// Whether real weights were loaded. An untrained model still answers.
    fn is_trained(&self) -> bool;

    fn infer(&self, window: &[Vec<f64>]) -> Result<f64, InferenceError>;
}

/// Logistic function, stable for large magnitudes.
pub fn sigmoid(x: f64) -> f64 {
    if x >= 0.0 {
        1.0 / (1.0 + (-x).exp())
    } else {
        let e = x.exp();
        e / (1.0 + e)
    }
}

pub(crate) fn check_width(
    stage: &'static str,
    expected: usize,
    got: usize,
) -> Result<(), InferenceError> {
    if expected != got {
        return Err(InferenceError::DimensionMismatch { stage, expected, got });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sigmoid_bounds() {
        assert_eq!(sigmoid(0.0), 0.5);
        assert!(sigmoid(800.0) <= 1.0);
        assert!(sigmoid(-800.0) >= 0.0);
        assert!(sigmoid(2.0) > sigmoid(1.0));
        assert!((sigmoid(3.0) + sigmoid(-3.0) - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_check_width() {
        assert!(check_width("test", 3, 3).is_ok());
        let err = check_width("test", 3, 2).unwrap_err();
        assert!(matches!(
            err,
            InferenceError::DimensionMismatch { expected: 3, got: 2, .. }
        ));
    }
}
