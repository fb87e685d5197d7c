use crate::error::InferenceError;
use crate::model::{AnomalyDetector, Classifier, ModelArtifactSet, Scaler};
use crate::scoring::{clamp_probability, PredictionResult};

/// Outcome of scoring one feature vector, with the scaled vector kept for
/// the drift window.
#[derive(Debug, Clone)]
pub struct PointScore {
    pub result: PredictionResult,
    pub scaled: Vec<f64>,
}

/// Scaler, anomaly detector and classifier applied to a single vector.
pub struct PointScorer<'a> {
    scaler: &'a dyn Scaler,
    detector: &'a dyn AnomalyDetector,
    classifier: &'a dyn Classifier,
}

impl<'a> PointScorer<'a> {
    pub fn new(
        scaler: &'a dyn Scaler,
        detector: &'a dyn AnomalyDetector,
        classifier: &'a dyn Classifier,
    ) -> Self {
        Self {
            scaler,
            detector,
            classifier,
        }
    }

    /// Borrow the three required models, failing if any is absent.
    pub fn from_artifacts(artifacts: &'a ModelArtifactSet) -> Result<Self, InferenceError> {
        let scaler = artifacts
            .scaler
            .as_deref()
            .ok_or(InferenceError::ModelsNotLoaded { missing: "scaler" })?;
        let detector = artifacts
            .anomaly_detector
            .as_deref()
            .ok_or(InferenceError::ModelsNotLoaded {
                missing: "anomaly detector",
            })?;
        let classifier = artifacts
            .classifier
            .as_deref()
            .ok_or(InferenceError::ModelsNotLoaded {
                missing: "classifier",
            })?;
        Ok(Self::new(scaler, detector, classifier))
    }

    pub fn scaler(&self) -> &'a dyn Scaler {
        self.scaler
    }

    /// Score an aligned, unscaled feature vector. The label is the
    /// classifier's own decision, never re-derived from the probability.
    pub fn score(&self, features: &[f64]) -> Result<PointScore, InferenceError> {
        let scaled = self.scaler.transform(features)?;
        let verdict = self.detector.score(&scaled)?;
        let failure_probability = clamp_probability(self.classifier.predict_proba(&scaled)?);
        let prediction = self.classifier.predict(&scaled)?;

        Ok(PointScore {
            result: PredictionResult {
                anomaly: verdict.is_anomaly(),
                failure_probability,
                prediction,
            },
            scaled,
        })
    }
}
