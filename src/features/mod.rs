//! Telemetry records and their mapping onto scaler-aligned feature vectors.

pub mod schema;
pub mod transform;

pub use self::schema::{ColumnSpec, DomainVariant, FeatureRole};
pub use self::transform::{FeatureTransformer, FeatureVector};

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// One telemetry observation as delivered by a caller or the ingestion queue.
///
/// Sensor readings are kept by name so the transformer can select and
/// reorder them against whatever column list the scaler was fit on.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TelemetryRecord {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    /// Seconds since the Unix epoch, if the producer stamped the record.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<f64>,
    #[serde(flatten)]
    pub fields: BTreeMap<String, f64>,
}

impl TelemetryRecord {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn with_field(mut self, name: impl Into<String>, value: f64) -> Self {
        self.fields.insert(name.into(), value);
        self
    }

    pub fn get(&self, name: &str) -> Option<f64> {
        self.fields.get(name).copied()
    }
}
