//! Process-wide prediction counters in Prometheus text exposition format.

use prometheus::{Encoder, IntCounter, Registry, TextEncoder};
use serde::Serialize;
use tracing::error;

use crate::scoring::PredictionResult;

/// Snapshot of the three counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct MetricCounts {
    pub predictions_total: u64,
    pub anomalies_total: u64,
    pub failures_total: u64,
}

/// Owns a private registry so independent service instances (and tests)
/// never share counters.
pub struct MetricsRegistry {
    registry: Registry,
    predictions_total: IntCounter,
    anomalies_total: IntCounter,
    failures_total: IntCounter,
}

impl MetricsRegistry {
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new();
        let predictions_total =
            IntCounter::new("predictions_total", "Total number of predictions served")?;
        let anomalies_total =
            IntCounter::new("anomalies_total", "Total number of anomalies detected")?;
        let failures_total =
            IntCounter::new("failures_total", "Total number of machine failures predicted")?;

        registry.register(Box::new(predictions_total.clone()))?;
        registry.register(Box::new(anomalies_total.clone()))?;
        registry.register(Box::new(failures_total.clone()))?;

        Ok(Self {
            registry,
            predictions_total,
            anomalies_total,
            failures_total,
        })
    }

    /// Count one served prediction. Each counter is a single atomic add.
    pub fn record(&self, result: &PredictionResult) {
        self.predictions_total.inc();
        if result.anomaly {
            self.anomalies_total.inc();
        }
        if result.is_failure() {
            self.failures_total.inc();
        }
    }

    pub fn counts(&self) -> MetricCounts {
        MetricCounts {
            predictions_total: self.predictions_total.get(),
            anomalies_total: self.anomalies_total.get(),
            failures_total: self.failures_total.get(),
        }
    }

    /// HELP/TYPE/value per counter, sorted by metric name, newline-terminated.
    pub fn render(&self) -> String {
        let encoder = TextEncoder::new();
        let families = self.registry.gather();
        let mut buffer = Vec::new();
        if let Err(e) = encoder.encode(&families, &mut buffer) {
            error!(error = %e, "failed to encode metrics");
        }
        String::from_utf8_lossy(&buffer).into_owned()
    }

    pub fn content_type(&self) -> &'static str {
        prometheus::TEXT_FORMAT
    }
}
