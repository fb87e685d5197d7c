//! Error taxonomy shared by the scoring pipeline and the artifact loader.

use std::path::PathBuf;
use thiserror::Error;

/// Errors surfaced to callers of the inference service.
#[derive(Debug, Error)]
pub enum InferenceError {
    /// A required artifact (scaler, anomaly detector or classifier) is absent.
    /// Fatal for the request; fixing it requires new artifacts and a restart.
    #[error("models are not loaded: missing {missing}")]
    ModelsNotLoaded { missing: &'static str },

    /// The scaler expects a column the transformer cannot produce.
    #[error("schema mismatch: scaler expects column '{column}' which is not available")]
    SchemaMismatch { column: String },

    /// A vector of the wrong width reached a model.
    #[error("dimension mismatch in {stage}: expected {expected} features, got {got}")]
    DimensionMismatch {
        stage: &'static str,
        expected: usize,
        got: usize,
    },

    /// The sequence holds no usable samples after windowing.
    #[error("insufficient data: {have} samples available for a window of {requested}")]
    InsufficientData { have: usize, requested: usize },
}

impl InferenceError {
    /// Short machine-readable tag, used in API error bodies and logs.
    pub fn kind(&self) -> &'static str {
        match self {
            InferenceError::ModelsNotLoaded { .. } => "models_not_loaded",
            InferenceError::SchemaMismatch { .. } => "schema_mismatch",
            InferenceError::DimensionMismatch { .. } => "dimension_mismatch",
            InferenceError::InsufficientData { .. } => "insufficient_data",
        }
    }

    /// Whether the caller can fix the request and retry.
    pub fn is_caller_error(&self) -> bool {
        !matches!(self, InferenceError::ModelsNotLoaded { .. })
    }
}

/// Errors raised while reading model artifacts from disk.
#[derive(Debug, Error)]
pub enum ArtifactError {
    #[error("artifact not found: {}", .0.display())]
    Missing(PathBuf),

    #[error("failed to read artifact {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse artifact {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("invalid artifact {}: {reason}", path.display())]
    Invalid { path: PathBuf, reason: String },
}
