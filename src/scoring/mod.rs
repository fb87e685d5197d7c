//! Point and sequence scoring on top of the loaded model artifacts.

pub mod point;
pub mod sequence;

pub use self::point::{PointScore, PointScorer};
pub use self::sequence::{resolve_roles, sliding_windows, SequencePolicy, SequenceScore, SequenceScorer};

use serde::{Deserialize, Serialize};

/// Decision returned to callers for one record or one window.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PredictionResult {
    pub anomaly: bool,
    /// Probability of failure, in `[0, 1]`.
    pub failure_probability: f64,
    /// 0 = normal, 1 = failure predicted.
    pub prediction: u8,
}

impl PredictionResult {
    pub fn is_failure(&self) -> bool {
        self.prediction == 1
    }
}

/// Keep a model probability inside `[0, 1]`; NaN collapses to 0.
pub(crate) fn clamp_probability(p: f64) -> f64 {
    if p.is_nan() {
        0.0
    } else {
        p.clamp(0.0, 1.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clamp_probability() {
        assert_eq!(clamp_probability(1.2), 1.0);
        assert_eq!(clamp_probability(-0.1), 0.0);
        assert_eq!(clamp_probability(f64::NAN), 0.0);
        assert_eq!(clamp_probability(0.3), 0.3);
    }

    #[test]
    fn test_result_wire_shape() {
        let r = PredictionResult {
            anomaly: true,
            failure_probability: 0.75,
            prediction: 1,
        };
        let json = serde_json::to_value(r).unwrap();
        assert_eq!(json["anomaly"], true);
        assert_eq!(json["failure_probability"], 0.75);
        assert_eq!(json["prediction"], 1);
        assert!(r.is_failure());
    }
}
