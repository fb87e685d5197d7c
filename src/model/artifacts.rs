//! Versioned artifact directory: resolution and loading.
//!
//! Loading never aborts the process. Each file that is missing or invalid
//! is logged and left empty in the set; scoring then fails per request with
//! `ModelsNotLoaded` until the artifacts are fixed and the service restarts.

use std::fs;
use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};

use crate::drift::ReferenceSample;
use crate::error::ArtifactError;
use crate::model::{
    AnomalyDetector, Classifier, IsolationForest, LogisticModel, PredictiveRnn, RandomForest,
    Scaler, SequenceModel, StandardScaler, ZScoreEnvelope,
};

pub const SCALER_FILE: &str = "scaler.json";
pub const DETECTOR_FILE: &str = "anomaly_detector.json";
pub const CLASSIFIER_FILE: &str = "classifier.json";
pub const REFERENCE_FILE: &str = "reference_sample.json";
pub const SEQUENCE_MODEL_FILE: &str = "sequence_model.json";
pub const SEQUENCE_SCALER_FILE: &str = "sequence_scaler.json";

/// Version tag that selects the newest version directory.
pub const LATEST: &str = "latest";

#[derive(Debug, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
enum DetectorArtifact {
    IsolationForest(IsolationForest),
    Envelope(ZScoreEnvelope),
}

#[derive(Debug, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
enum ClassifierArtifact {
    RandomForest(RandomForest),
    Logistic(LogisticModel),
}

/// Everything the inference service reads from one artifact version.
/// Read-only once built.
#[derive(Default)]
pub struct ModelArtifactSet {
    pub version: Option<String>,
    pub scaler: Option<Box<dyn Scaler>>,
    pub anomaly_detector: Option<Box<dyn AnomalyDetector>>,
    pub classifier: Option<Box<dyn Classifier>>,
    pub sequence_model: Option<Box<dyn SequenceModel>>,
    pub sequence_scaler: Option<Box<dyn Scaler>>,
    pub reference: Option<ReferenceSample>,
}

/// Presence report for logs, `check-artifacts` and the health endpoint.
#[derive(Debug, Clone, Serialize)]
pub struct ArtifactSummary {
    pub version: Option<String>,
    pub models_loaded: bool,
    pub scaler: bool,
    pub anomaly_detector: bool,
    pub classifier: bool,
    pub sequence_model: bool,
    pub sequence_model_trained: bool,
    pub sequence_scaler: bool,
    pub reference_rows: usize,
    pub n_features: Option<usize>,
}

impl ModelArtifactSet {
    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.version = Some(version.into());
        self
    }

    pub fn with_scaler(mut self, scaler: impl Scaler + 'static) -> Self {
        self.scaler = Some(Box::new(scaler));
        self
    }

    pub fn with_anomaly_detector(mut self, detector: impl AnomalyDetector + 'static) -> Self {
        self.anomaly_detector = Some(Box::new(detector));
        self
    }

    pub fn with_classifier(mut self, classifier: impl Classifier + 'static) -> Self {
        self.classifier = Some(Box::new(classifier));
        self
    }

    pub fn with_sequence_model(mut self, model: impl SequenceModel + 'static) -> Self {
        self.sequence_model = Some(Box::new(model));
        self
    }

    pub fn with_sequence_scaler(mut self, scaler: impl Scaler + 'static) -> Self {
        self.sequence_scaler = Some(Box::new(scaler));
        self
    }

    pub fn with_reference(mut self, reference: ReferenceSample) -> Self {
        self.reference = Some(reference);
        self
    }

    /// Load every artifact found in `dir`. Problems are logged per file and
    /// the affected slot stays empty.
    pub fn load_dir(dir: &Path) -> Self {
        let version = dir
            .file_name()
            .map(|name| name.to_string_lossy().into_owned());
        info!(path = %dir.display(), "loading model artifacts");

        let mut set = ModelArtifactSet {
            version,
            ..Default::default()
        };

        if let Some(scaler) = required(load_scaler(&dir.join(SCALER_FILE))) {
            set.scaler = Some(Box::new(scaler));
        }
        if let Some(detector) = required(load_detector(&dir.join(DETECTOR_FILE))) {
            set.anomaly_detector = Some(detector);
        }
        if let Some(classifier) = required(load_classifier(&dir.join(CLASSIFIER_FILE))) {
            set.classifier = Some(classifier);
        }
        if let Some(reference) = optional(load_reference(&dir.join(REFERENCE_FILE))) {
            set.reference = Some(reference);
        }
        if let Some(model) = optional(load_sequence_model(&dir.join(SEQUENCE_MODEL_FILE))) {
            set.sequence_model = Some(Box::new(model));
        }
        if let Some(scaler) = optional(load_scaler(&dir.join(SEQUENCE_SCALER_FILE))) {
            set.sequence_scaler = Some(Box::new(scaler));
        }

        set.check_widths();
        let summary = set.summary();
        if summary.models_loaded {
            info!(
                version = ?summary.version,
                n_features = ?summary.n_features,
                reference_rows = summary.reference_rows,
                sequence_model = summary.sequence_model,
                "model artifacts loaded"
            );
        } else {
            error!(missing = ?set.missing_required(), "required model artifacts missing, predictions will fail");
        }
        set
    }

    /// Drop models whose fixed input width disagrees with the scaler, and a
    /// reference sample of the wrong width. A dropped required model makes
    /// the set unusable, which is safer than scoring misaligned vectors.
    fn check_widths(&mut self) {
        // The sequence path falls back to the main scaler.
        let seq_width = self
            .sequence_scaler
            .as_ref()
            .or(self.scaler.as_ref())
            .map(|s| s.n_features());
        if let (Some(model), Some(n)) = (&self.sequence_model, seq_width) {
            if model.input_size() != n {
                warn!(
                    expected = n,
                    got = model.input_size(),
                    "sequence model input size disagrees with the scaler the sequence path uses, ignoring model"
                );
                self.sequence_model = None;
            }
        }

        let Some(width) = self.scaler.as_ref().map(|s| s.n_features()) else {
            return;
        };
        if let Some(n) = self.anomaly_detector.as_ref().and_then(|d| d.n_features()) {
            if n != width {
                error!(expected = width, got = n, "anomaly detector width disagrees with scaler, discarding");
                self.anomaly_detector = None;
            }
        }
        if let Some(n) = self.classifier.as_ref().and_then(|c| c.n_features()) {
            if n != width {
                error!(expected = width, got = n, "classifier width disagrees with scaler, discarding");
                self.classifier = None;
            }
        }
        if let Some(reference) = &self.reference {
            if reference.n_features() != width {
                warn!(
                    expected = width,
                    got = reference.n_features(),
                    "reference sample width disagrees with scaler, drift disabled"
                );
                self.reference = None;
            }
        }
    }

    /// Names of required artifacts that are absent.
    pub fn missing_required(&self) -> Vec<&'static str> {
        let mut missing = Vec::new();
        if self.scaler.is_none() {
            missing.push("scaler");
        }
        if self.anomaly_detector.is_none() {
            missing.push("anomaly detector");
        }
        if self.classifier.is_none() {
            missing.push("classifier");
        }
        missing
    }

    pub fn models_loaded(&self) -> bool {
        self.missing_required().is_empty()
    }

    pub fn summary(&self) -> ArtifactSummary {
        ArtifactSummary {
            version: self.version.clone(),
            models_loaded: self.models_loaded(),
            scaler: self.scaler.is_some(),
            anomaly_detector: self.anomaly_detector.is_some(),
            classifier: self.classifier.is_some(),
            sequence_model: self.sequence_model.is_some(),
            sequence_model_trained: self
                .sequence_model
                .as_ref()
                .is_some_and(|m| m.is_trained()),
            sequence_scaler: self.sequence_scaler.is_some(),
            reference_rows: self.reference.as_ref().map_or(0, |r| r.rows.len()),
            n_features: self.scaler.as_ref().map(|s| s.n_features()),
        }
    }
}

impl std::fmt::Debug for ModelArtifactSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModelArtifactSet")
            .field("summary", &self.summary())
            .finish()
    }
}

/// Resolve `<root>/<version>`. The `latest` tag picks the greatest
/// sub-directory name.
pub fn resolve_artifact_dir(root: &Path, version: &str) -> Result<PathBuf, ArtifactError> {
    if version != LATEST {
        let dir = root.join(version);
        return if dir.is_dir() {
            Ok(dir)
        } else {
            Err(ArtifactError::Missing(dir))
        };
    }

    let entries = fs::read_dir(root).map_err(|source| ArtifactError::Io {
        path: root.to_path_buf(),
        source,
    })?;
    entries
        .filter_map(Result::ok)
        .map(|entry| entry.path())
        .filter(|path| path.is_dir())
        .max_by(|a, b| a.file_name().cmp(&b.file_name()))
        .ok_or_else(|| ArtifactError::Missing(root.join(LATEST)))
}

fn required<T>(result: Result<T, ArtifactError>) -> Option<T> {
    result
        .map_err(|e| error!(error = %e, "required artifact unavailable"))
        .ok()
}

fn optional<T>(result: Result<T, ArtifactError>) -> Option<T> {
    match result {
        Ok(value) => Some(value),
        Err(ArtifactError::Missing(path)) => {
            info!(path = %path.display(), "optional artifact not present");
            None
        }
        Err(e) => {
            warn!(error = %e, "optional artifact unusable, skipping");
            None
        }
    }
}

fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T, ArtifactError> {
    if !path.exists() {
        return Err(ArtifactError::Missing(path.to_path_buf()));
    }
    let text = fs::read_to_string(path).map_err(|source| ArtifactError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    serde_json::from_str(&text).map_err(|source| ArtifactError::Parse {
        path: path.to_path_buf(),
        source,
    })
}

fn invalid(path: &Path) -> impl FnOnce(String) -> ArtifactError + '_ {
    move |reason| ArtifactError::Invalid {
        path: path.to_path_buf(),
        reason,
    }
}

pub fn load_scaler(path: &Path) -> Result<StandardScaler, ArtifactError> {
    let scaler: StandardScaler = read_json(path)?;
    scaler.validate().map_err(invalid(path))?;
    Ok(scaler)
}

pub fn load_detector(path: &Path) -> Result<Box<dyn AnomalyDetector>, ArtifactError> {
    match read_json(path)? {
        DetectorArtifact::IsolationForest(forest) => {
            forest.validate().map_err(invalid(path))?;
            Ok(Box::new(forest))
        }
        DetectorArtifact::Envelope(envelope) => {
            envelope.validate().map_err(invalid(path))?;
            Ok(Box::new(envelope))
        }
    }
}

pub fn load_classifier(path: &Path) -> Result<Box<dyn Classifier>, ArtifactError> {
    match read_json(path)? {
        ClassifierArtifact::RandomForest(forest) => {
            forest.validate().map_err(invalid(path))?;
            Ok(Box::new(forest))
        }
        ClassifierArtifact::Logistic(model) => {
            model.validate().map_err(invalid(path))?;
            Ok(Box::new(model))
        }
    }
}

pub fn load_reference(path: &Path) -> Result<ReferenceSample, ArtifactError> {
    let reference: ReferenceSample = read_json(path)?;
    reference.validate().map_err(invalid(path))?;
    Ok(reference)
}

pub fn load_sequence_model(path: &Path) -> Result<PredictiveRnn, ArtifactError> {
    let model: PredictiveRnn = read_json(path)?;
    model.validate().map_err(invalid(path))?;
    Ok(model)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    fn write(dir: &Path, name: &str, value: serde_json::Value) {
        fs::write(dir.join(name), value.to_string()).unwrap();
    }

    fn write_required(dir: &Path) {
        write(dir, SCALER_FILE, json!({"mean": [0.0, 0.0], "var": [1.0, 1.0]}));
        write(dir, DETECTOR_FILE, json!({"kind": "envelope", "threshold": 3.0}));
        write(
            dir,
            CLASSIFIER_FILE,
            json!({"kind": "logistic", "weights": [1.0, 1.0], "bias": -3.0}),
        );
    }

    #[test]
    fn test_load_complete_dir() {
        let tmp = TempDir::new().unwrap();
        let dir = tmp.path().join("v1");
        fs::create_dir(&dir).unwrap();
        write_required(&dir);
        write(&dir, REFERENCE_FILE, json!({"rows": [[0.0, 0.1], [0.2, -0.1]]}));

        let set = ModelArtifactSet::load_dir(&dir);
        assert!(set.models_loaded());
        let summary = set.summary();
        assert_eq!(summary.version.as_deref(), Some("v1"));
        assert_eq!(summary.reference_rows, 2);
        assert_eq!(summary.n_features, Some(2));
        assert!(!summary.sequence_model);
    }

    #[test]
    fn test_missing_classifier_is_logged_not_fatal() {
        let tmp = TempDir::new().unwrap();
        write_required(tmp.path());
        fs::remove_file(tmp.path().join(CLASSIFIER_FILE)).unwrap();

        let set = ModelArtifactSet::load_dir(tmp.path());
        assert!(!set.models_loaded());
        assert_eq!(set.missing_required(), vec!["classifier"]);
        assert!(set.scaler.is_some());
    }

    #[test]
    fn test_unknown_kind_and_invalid_content() {
        let tmp = TempDir::new().unwrap();
        write_required(tmp.path());
        write(tmp.path(), DETECTOR_FILE, json!({"kind": "one_class_svm"}));
        write(tmp.path(), SCALER_FILE, json!({"mean": [0.0], "var": [1.0, 2.0]}));

        assert!(matches!(
            load_detector(&tmp.path().join(DETECTOR_FILE)),
            Err(ArtifactError::Parse { .. })
        ));
        assert!(matches!(
            load_scaler(&tmp.path().join(SCALER_FILE)),
            Err(ArtifactError::Invalid { .. })
        ));
        assert_eq!(
            ModelArtifactSet::load_dir(tmp.path()).missing_required(),
            vec!["scaler", "anomaly detector"]
        );
    }

    #[test]
    fn test_width_disagreement_discards_model() {
        let tmp = TempDir::new().unwrap();
        write_required(tmp.path());
        write(
            tmp.path(),
            CLASSIFIER_FILE,
            json!({"kind": "logistic", "weights": [1.0, 1.0, 1.0], "bias": 0.0}),
        );
        write(tmp.path(), REFERENCE_FILE, json!({"rows": [[0.0]]}));

        let set = ModelArtifactSet::load_dir(tmp.path());
        assert_eq!(set.missing_required(), vec!["classifier"]);
        assert!(set.reference.is_none());
    }

    #[test]
    fn test_loaded_sequence_model_counts_as_trained() {
        let tmp = TempDir::new().unwrap();
        write_required(tmp.path());
        let model = serde_json::to_value(PredictiveRnn::untrained(2, 3, 1)).unwrap();
        write(tmp.path(), SEQUENCE_MODEL_FILE, model);

        let set = ModelArtifactSet::load_dir(tmp.path());
        assert!(set.summary().sequence_model_trained);
    }

    #[test]
    fn test_sequence_model_checked_against_main_scaler_fallback() {
        let tmp = TempDir::new().unwrap();
        write_required(tmp.path());
        let model = serde_json::to_value(PredictiveRnn::untrained(3, 4, 1)).unwrap();
        write(tmp.path(), SEQUENCE_MODEL_FILE, model);

        // No sequence scaler, so the 2-wide main scaler feeds the model.
        let set = ModelArtifactSet::load_dir(tmp.path());
        assert!(set.sequence_scaler.is_none());
        assert!(set.sequence_model.is_none());
        assert!(set.models_loaded());
    }

    #[test]
    fn test_resolve_latest_and_explicit() {
        let tmp = TempDir::new().unwrap();
        for v in ["v1", "v3", "v2"] {
            fs::create_dir(tmp.path().join(v)).unwrap();
        }
        fs::write(tmp.path().join("zzz.txt"), "not a version").unwrap();

        assert_eq!(
            resolve_artifact_dir(tmp.path(), LATEST).unwrap(),
            tmp.path().join("v3")
        );
        assert_eq!(
            resolve_artifact_dir(tmp.path(), "v1").unwrap(),
            tmp.path().join("v1")
        );
        assert!(matches!(
            resolve_artifact_dir(tmp.path(), "v9"),
            Err(ArtifactError::Missing(_))
        ));
    }

    #[test]
    fn test_resolve_latest_without_versions() {
        let tmp = TempDir::new().unwrap();
        assert!(resolve_artifact_dir(tmp.path(), LATEST).is_err());
        assert!(matches!(
            resolve_artifact_dir(&tmp.path().join("absent"), LATEST),
            Err(ArtifactError::Io { .. })
        ));
    }
}
