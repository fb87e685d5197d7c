use crate::error::InferenceError;
use crate::model::{check_width, sigmoid, Classifier};
use serde::{Deserialize, Serialize};

/// Binary failure classifier (logistic regression).
///
/// Inputs arrive already standardized by the artifact scaler, so unlike a
/// self-contained model this one carries no means/stds of its own.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogisticModel {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub feature_names: Vec<String>,
    pub weights: Vec<f64>, // [n_features]
    pub bias: f64,
    /// Decision-function cut-off. The exported estimator predicts class 1
    /// when `w.x + b > decision_threshold` (0.0 for a stock model).
    #[serde(default)]
    pub decision_threshold: f64,
}

impl LogisticModel {
    pub fn new(weights: Vec<f64>, bias: f64) -> Self {
        Self {
            feature_names: Vec::new(),
            weights,
            bias,
            decision_threshold: 0.0,
        }
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.weights.is_empty() {
            return Err("logistic model has no weights".into());
        }
        if !self.feature_names.is_empty() && self.feature_names.len() != self.weights.len() {
            return Err(format!(
                "{} feature names for {} weights",
                self.feature_names.len(),
                self.weights.len()
            ));
        }
        if self.weights.iter().chain([&self.bias]).any(|w| !w.is_finite()) {
            return Err("weights must be finite".into());
        }
        Ok(())
    }

    /// Dot product plus bias.
    pub fn decision_function(&self, scaled: &[f64]) -> Result<f64, InferenceError> {
        check_width("logistic classifier", self.weights.len(), scaled.len())?;
        let dot: f64 = self.weights.iter().zip(scaled).map(|(w, x)| w * x).sum();
        Ok(dot + self.bias)
    }
}

impl Classifier for LogisticModel {
    fn n_features(&self) -> Option<usize> {
        Some(self.weights.len())
    }

    fn predict_proba(&self, scaled: &[f64]) -> Result<f64, InferenceError> {
        Ok(sigmoid(self.decision_function(scaled)?))
    }

    fn predict(&self, scaled: &[f64]) -> Result<u8, InferenceError> {
        let score = self.decision_function(scaled)?;
        Ok(u8::from(score > self.decision_threshold))
    }
}
