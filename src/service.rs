//! Inference service: the single entry point for HTTP handlers, the queue
//! consumer and the CLI.
//!
//! Artifacts are loaded once and never mutated afterwards, so scoring reads
//! them without locking. The drift window and the counters are the only
//! shared mutable state, and each update to them is one complete operation.

use anyhow::{Context, Result};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::config::ServiceConfig;
use crate::drift::{DriftMonitor, DriftReport};
use crate::error::InferenceError;
use crate::features::{DomainVariant, FeatureRole, FeatureTransformer, TelemetryRecord};
use crate::metrics::{MetricCounts, MetricsRegistry};
use crate::model::{resolve_artifact_dir, ArtifactSummary, ModelArtifactSet, Scaler};
use crate::scoring::{
    resolve_roles, PointScorer, PredictionResult, SequencePolicy, SequenceScore, SequenceScorer,
};

pub struct InferenceService {
    artifacts: ModelArtifactSet,
    transformer: FeatureTransformer,
    policy: SequencePolicy,
    sequence_roles: Vec<FeatureRole>,
    /// The sequence scaler in use can be fed from raw readings.
    sequence_ready: bool,
    drift: DriftMonitor,
    metrics: MetricsRegistry,
}

impl InferenceService {
    /// Wire an already-loaded artifact set into a service.
    pub fn new(artifacts: ModelArtifactSet, config: &ServiceConfig) -> Result<Self> {
        let variant = config.features.variant;
        let transformer = FeatureTransformer::new(variant);

        let sequence_roles = sequence_scaler(&artifacts)
            .map(|scaler| {
                let names = transformer.sequence_column_names(scaler);
                resolve_roles(variant, &names, &config.sequence.weights)
            })
            .unwrap_or_default();

        let sequence_ready = match sequence_scaler(&artifacts) {
            Some(scaler) => match transformer.check_sequence_scaler(scaler) {
                Ok(()) => true,
                Err(e) => {
                    error!(
                        error = %e,
                        variant = %variant,
                        dedicated = artifacts.sequence_scaler.is_some(),
                        "sequence scaler cannot be fed from raw readings, sequence predictions disabled"
                    );
                    false
                }
            },
            None => false,
        };

        let drift = DriftMonitor::new(artifacts.reference.clone(), config.drift.clone())
            .with_feature_names(drift_feature_names(&artifacts, variant));

        let metrics = MetricsRegistry::new().context("failed to register prediction counters")?;

        Ok(Self {
            artifacts,
            transformer,
            policy: SequencePolicy::from_config(&config.sequence),
            sequence_roles,
            sequence_ready,
            drift,
            metrics,
        })
    }

    /// Resolve the configured artifact version and load it. A missing
    /// directory is logged and the service starts with no models.
    pub fn from_config(config: &ServiceConfig) -> Result<Self> {
        let version = config.artifacts.effective_version();
        let artifacts = match resolve_artifact_dir(&config.artifacts.root, &version) {
            Ok(dir) => ModelArtifactSet::load_dir(&dir),
            Err(e) => {
                error!(
                    root = %config.artifacts.root.display(),
                    %version,
                    error = %e,
                    "artifact directory unavailable, starting without models"
                );
                ModelArtifactSet::default()
            }
        };
        Self::new(artifacts, config)
    }

    /// Score one record. On success the counters are bumped and the scaled
    /// vector enters the drift window, each exactly once.
    pub fn predict(&self, record: &TelemetryRecord) -> Result<PredictionResult, InferenceError> {
        let correlation_id = correlation_id(record);
        let outcome = PointScorer::from_artifacts(&self.artifacts).and_then(|scorer| {
            let features = self.transformer.transform_point(record, scorer.scaler())?;
            scorer.score(&features)
        });

        match outcome {
            Ok(score) => {
                self.metrics.record(&score.result);
                self.drift.add(score.scaled);
                debug!(
                    %correlation_id,
                    anomaly = score.result.anomaly,
                    prediction = score.result.prediction,
                    "point prediction served"
                );
                Ok(score.result)
            }
            Err(e) => {
                log_failure(&correlation_id, "point", &e);
                Err(e)
            }
        }
    }

    /// Score the most recent window of an ordered sequence. Counted in the
    /// metrics but kept out of the drift window, whose reference lives in
    /// the point feature space.
    pub fn predict_sequence(
        &self,
        records: &[TelemetryRecord],
    ) -> Result<SequenceScore, InferenceError> {
        let correlation_id = records
            .last()
            .map(correlation_id)
            .unwrap_or_else(|| Uuid::new_v4().to_string());

        let outcome = self.score_sequence(records);
        match outcome {
            Ok(score) => {
                self.metrics.record(&score.result);
                debug!(
                    %correlation_id,
                    windows = score.windows,
                    score = score.score,
                    prediction = score.result.prediction,
                    "sequence prediction served"
                );
                Ok(score)
            }
            Err(e) => {
                log_failure(&correlation_id, "sequence", &e);
                Err(e)
            }
        }
    }

    fn score_sequence(&self, records: &[TelemetryRecord]) -> Result<SequenceScore, InferenceError> {
        let scaler = sequence_scaler(&self.artifacts)
            .ok_or(InferenceError::ModelsNotLoaded { missing: "scaler" })?;
        if !self.sequence_ready {
            return Err(InferenceError::ModelsNotLoaded {
                missing: "sequence scaler",
            });
        }
        let rows = self.transformer.transform_sequence(records, scaler)?;
        SequenceScorer::new(
            scaler,
            self.artifacts.sequence_model.as_deref(),
            &self.policy,
            &self.sequence_roles,
        )
        .score(&rows)
    }

    pub fn drift_report(&self) -> DriftReport {
        self.drift.report()
    }

    pub fn reset_drift(&self) {
        self.drift.clear();
        info!("drift window reset");
    }

    pub fn drift_samples(&self) -> usize {
        self.drift.len()
    }

    pub fn render_metrics(&self) -> String {
        self.metrics.render()
    }

    pub fn metrics_content_type(&self) -> &'static str {
        self.metrics.content_type()
    }

    pub fn metric_counts(&self) -> MetricCounts {
        self.metrics.counts()
    }

    pub fn models_loaded(&self) -> bool {
        self.artifacts.models_loaded()
    }

    /// Whether sequence requests can be served with the loaded artifacts.
    pub fn sequence_available(&self) -> bool {
        self.sequence_ready
    }

    pub fn artifact_summary(&self) -> ArtifactSummary {
        self.artifacts.summary()
    }

    pub fn variant(&self) -> DomainVariant {
        self.transformer.variant()
    }

    pub fn shutdown(&self) {
        let counts = self.metrics.counts();
        info!(
            predictions = counts.predictions_total,
            anomalies = counts.anomalies_total,
            failures = counts.failures_total,
            drift_samples = self.drift.len(),
            "inference service shutting down"
        );
    }
}

fn sequence_scaler(artifacts: &ModelArtifactSet) -> Option<&dyn Scaler> {
    artifacts
        .sequence_scaler
        .as_deref()
        .or(artifacts.scaler.as_deref())
}

fn drift_feature_names(artifacts: &ModelArtifactSet, variant: DomainVariant) -> Vec<String> {
    let Some(scaler) = artifacts.scaler.as_deref() else {
        return Vec::new();
    };
    match scaler.feature_names() {
        Some(names) => names.to_vec(),
        None => {
            let layout = variant.point_layout();
            if layout.len() == scaler.n_features() {
                layout
            } else {
                Vec::new()
            }
        }
    }
}

fn correlation_id(record: &TelemetryRecord) -> String {
    record
        .id
        .clone()
        .unwrap_or_else(|| Uuid::new_v4().to_string())
}

fn log_failure(correlation_id: &str, path: &'static str, e: &InferenceError) {
    if e.is_caller_error() {
        warn!(%correlation_id, path, kind = e.kind(), error = %e, "prediction rejected");
    } else {
        error!(%correlation_id, path, kind = e.kind(), error = %e, "prediction failed");
    }
}
