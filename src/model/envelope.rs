use crate::error::InferenceError;
use crate::model::{check_width, AnomalyDetector, Verdict};
use serde::{Deserialize, Serialize};

fn default_threshold() -> f64 {
    3.0
}

/// Flags a vector as anomalous when any scaled column leaves the
/// `[-threshold, threshold]` band. Since inputs are already standardized,
/// each column is a Z-score against the training distribution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ZScoreEnvelope {
    #[serde(default = "default_threshold")]
    pub threshold: f64,
    /// Fixed input width, if the exporter recorded one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub n_features: Option<usize>,
}

impl Default for ZScoreEnvelope {
    fn default() -> Self {
        Self {
            threshold: default_threshold(),
            n_features: None,
        }
    }
}

impl ZScoreEnvelope {
    pub fn new(threshold: f64) -> Self {
        Self {
            threshold,
            n_features: None,
        }
    }

    pub fn validate(&self) -> Result<(), String> {
        if !(self.threshold.is_finite() && self.threshold > 0.0) {
            return Err(format!("threshold must be positive, got {}", self.threshold));
        }
        Ok(())
    }

    /// Largest absolute Z-score in the vector.
    pub fn max_deviation(scaled: &[f64]) -> f64 {
        scaled.iter().fold(0.0_f64, |acc, z| acc.max(z.abs()))
    }
}

impl AnomalyDetector for ZScoreEnvelope {
    fn n_features(&self) -> Option<usize> {
        self.n_features
    }

    fn score(&self, scaled: &[f64]) -> Result<Verdict, InferenceError> {
        if let Some(n) = self.n_features {
            check_width("envelope detector", n, scaled.len())?;
        }
        if Self::max_deviation(scaled) > self.threshold {
            Ok(Verdict::Anomaly)
        } else {
            Ok(Verdict::Normal)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_envelope_verdicts() {
        let det = ZScoreEnvelope::new(3.0);
        assert_eq!(det.score(&[0.1, -0.5, 2.9]).unwrap(), Verdict::Normal);
        assert_eq!(det.score(&[0.1, -4.2, 0.0]).unwrap(), Verdict::Anomaly);
        assert_eq!(det.score(&[f64::INFINITY]).unwrap(), Verdict::Anomaly);
    }

    #[test]
    fn test_envelope_default_threshold_from_json() {
        let det: ZScoreEnvelope = serde_json::from_str("{}").unwrap();
        assert_eq!(det.threshold, 3.0);
        assert!(det.validate().is_ok());
        assert!(ZScoreEnvelope::new(0.0).validate().is_err());
    }

    #[test]
    fn test_envelope_fixed_width() {
        let det = ZScoreEnvelope {
            threshold: 3.0,
            n_features: Some(2),
        };
        assert!(det.score(&[0.0, 0.0, 0.0]).is_err());
    }
}
