use crate::error::InferenceError;
use crate::model::{check_width, Scaler};
use serde::{Deserialize, Serialize};

/// Standard scaler: `(x - mean) / sqrt(var)` per column.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StandardScaler {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub feature_names_in: Option<Vec<String>>,
    pub mean: Vec<f64>,
    pub var: Vec<f64>,
}

impl StandardScaler {
    pub fn new(mean: Vec<f64>, var: Vec<f64>) -> Self {
        Self {
            feature_names_in: None,
            mean,
            var,
        }
    }

    pub fn with_feature_names<S: Into<String>>(mut self, names: impl IntoIterator<Item = S>) -> Self {
        self.feature_names_in = Some(names.into_iter().map(Into::into).collect());
        self
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.mean.is_empty() {
            return Err("scaler has no columns".into());
        }
        if self.mean.len() != self.var.len() {
            return Err(format!(
                "mean has {} columns but var has {}",
                self.mean.len(),
                self.var.len()
            ));
        }
        if let Some(names) = &self.feature_names_in {
            if names.len() != self.mean.len() {
                return Err(format!(
                    "{} feature names for {} columns",
                    names.len(),
                    self.mean.len()
                ));
            }
        }
        if self.var.iter().any(|v| !v.is_finite() || *v < 0.0) {
            return Err("variance must be finite and non-negative".into());
        }
        Ok(())
    }

    // Constant training columns keep unit scale instead of dividing by zero.
    fn scale(&self, i: usize) -> f64 {
        let s = self.var[i].sqrt();
        if s < 10.0 * f64::EPSILON {
            1.0
        } else {
            s
        }
    }
}

impl Scaler for StandardScaler {
    fn feature_names(&self) -> Option<&[String]> {
        self.feature_names_in.as_deref()
    }

    fn n_features(&self) -> usize {
        self.mean.len()
    }

    fn transform(&self, vector: &[f64]) -> Result<Vec<f64>, InferenceError> {
        check_width("scaler", self.mean.len(), vector.len())?;
        Ok(vector
            .iter()
            .enumerate()
            .map(|(i, x)| (x - self.mean[i]) / self.scale(i))
            .collect())
    }
}
