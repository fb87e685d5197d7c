//! TOML configuration for the maintwatch daemon.
//!
//! Every section has compiled-in defaults, so an empty file (or no file at
//! all) yields a working configuration. The config file path can be given
//! on the command line or through `MAINTWATCH_CONFIG`.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::features::DomainVariant;

pub const CONFIG_ENV: &str = "MAINTWATCH_CONFIG";
const SYSTEM_CONFIG_PATH: &str = "/etc/maintwatch/maintwatch.toml";

// ---------------------------------------------------------------------------
// Top-level config
// ---------------------------------------------------------------------------

/// Root configuration for the inference process.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ServiceConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub artifacts: ArtifactConfig,
    #[serde(default)]
    pub features: FeatureConfig,
    #[serde(default)]
    pub drift: DriftConfig,
    #[serde(default)]
    pub sequence: SequenceConfig,
    #[serde(default)]
    pub ingest: IngestConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl ServiceConfig {
    /// Load configuration from a TOML file at `path`.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file: {}", path.display()))?;
        let config: Self = toml::from_str(&content)
            .with_context(|| format!("failed to parse config file: {}", path.display()))?;
        info!(path = %path.display(), "loaded service configuration");
        Ok(config)
    }

    /// Resolve configuration from, in order:
    /// 1. An explicit path (CLI flag); failure to load it is an error.
    /// 2. The path in the `MAINTWATCH_CONFIG` environment variable.
    /// 3. `/etc/maintwatch/maintwatch.toml`.
    /// 4. Compiled-in defaults.
    pub fn resolve(explicit: Option<&Path>) -> Result<Self> {
        if let Some(path) = explicit {
            return Self::load(path);
        }
        Ok(Self::load_or_default())
    }

    pub fn load_or_default() -> Self {
        if let Ok(env_path) = std::env::var(CONFIG_ENV) {
            let path = Path::new(&env_path);
            match Self::load(path) {
                Ok(cfg) => return cfg,
                Err(e) => {
                    warn!(
                        path = %path.display(),
                        error = %e,
                        "MAINTWATCH_CONFIG set but file could not be loaded, trying fallback"
                    );
                }
            }
        }

        let system_path = Path::new(SYSTEM_CONFIG_PATH);
        if system_path.exists() {
            match Self::load(system_path) {
                Ok(cfg) => return cfg,
                Err(e) => {
                    warn!(
                        path = %system_path.display(),
                        error = %e,
                        "system config file exists but could not be loaded, using defaults"
                    );
                }
            }
        }

        debug!("no config file found, using compiled-in defaults");
        Self::default()
    }
}

// ---------------------------------------------------------------------------
// Server
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Address and port for the HTTP API.
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0:8000".to_string(),
        }
    }
}

// ---------------------------------------------------------------------------
// Artifacts
// ---------------------------------------------------------------------------

/// Where trained model artifacts live and which version to serve.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ArtifactConfig {
    /// Directory holding one sub-directory per artifact version.
    pub root: PathBuf,
    /// Version to serve; `latest` picks the greatest sub-directory name.
    pub version: String,
    /// Environment variable that overrides `version` when set.
    pub version_env: String,
}

impl Default for ArtifactConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::from("artifacts"),
            version: "latest".to_string(),
            version_env: "MODEL_VERSION".to_string(),
        }
    }
}

impl ArtifactConfig {
    /// Version tag after applying the environment override.
    pub fn effective_version(&self) -> String {
        match std::env::var(&self.version_env) {
            Ok(v) if !v.trim().is_empty() => v.trim().to_string(),
            _ => self.version.clone(),
        }
    }
}

// ---------------------------------------------------------------------------
// Features
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct FeatureConfig {
    /// Machine family the artifacts were trained for.
    pub variant: DomainVariant,
}

// ---------------------------------------------------------------------------
// Drift
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DriftConfig {
    /// Maximum number of live vectors kept for comparison.
    pub window_size: usize,
    /// Vectors required before a statistical report is produced.
    pub min_samples: usize,
    /// A feature drifts when its KS p-value falls below this.
    pub significance: f64,
}

impl Default for DriftConfig {
    fn default() -> Self {
        Self {
            window_size: 1000,
            min_samples: 50,
            significance: 0.05,
        }
    }
}

// ---------------------------------------------------------------------------
// Sequence scoring
// ---------------------------------------------------------------------------

pub const DEFAULT_WINDOW_LEN: usize = 10;
/// Risk score that maps to probability 0.5 (sigmoid center).
pub const DEFAULT_CRITICAL_SCORE: f64 = 3.0;
/// Sigmoid steepness around the critical score.
pub const DEFAULT_SIGMOID_SLOPE: f64 = 1.5;
/// Weight of an absolute Z-score on a neutral feature.
pub const DEFAULT_NEUTRAL_WEIGHT: f64 = 0.25;
/// Weight of a harmful first-to-last change on a stress/protective feature.
pub const DEFAULT_TREND_WEIGHT: f64 = 0.5;
/// Share of a trained recurrent model in the final probability.
pub const DEFAULT_MODEL_BLEND: f64 = 0.5;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SequenceConfig {
    /// Target window length; shorter inputs shrink the window.
    pub window_len: usize,
    pub critical_score: f64,
    pub slope: f64,
    pub neutral_weight: f64,
    pub trend_weight: f64,
    pub model_blend: f64,
    /// Score at or above which the window is flagged anomalous.
    /// Defaults to `critical_score`.
    pub anomaly_score: Option<f64>,
    /// Per-column directional weight overrides, by column name.
    pub weights: BTreeMap<String, f64>,
}

impl Default for SequenceConfig {
    fn default() -> Self {
        Self {
            window_len: DEFAULT_WINDOW_LEN,
            critical_score: DEFAULT_CRITICAL_SCORE,
            slope: DEFAULT_SIGMOID_SLOPE,
            neutral_weight: DEFAULT_NEUTRAL_WEIGHT,
            trend_weight: DEFAULT_TREND_WEIGHT,
            model_blend: DEFAULT_MODEL_BLEND,
            anomaly_score: None,
            weights: BTreeMap::new(),
        }
    }
}

// ---------------------------------------------------------------------------
// Ingestion
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IngestConfig {
    /// Buffered records between a producer and the consumer loop.
    pub channel_capacity: usize,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            channel_capacity: 1024,
        }
    }
}

// ---------------------------------------------------------------------------
// Logging
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Minimum tracing level (`trace`, `debug`, `info`, `warn`, `error`),
    /// used when `RUST_LOG` is not set.
    pub level: String,
    /// Emit JSON lines instead of human-readable output.
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_sane() {
        let cfg = ServiceConfig::default();

        assert_eq!(cfg.server.bind, "0.0.0.0:8000");

        assert_eq!(cfg.artifacts.root, PathBuf::from("artifacts"));
        assert_eq!(cfg.artifacts.version, "latest");
        assert_eq!(cfg.artifacts.version_env, "MODEL_VERSION");

        assert_eq!(cfg.features.variant, DomainVariant::Milling);

        assert_eq!(cfg.drift.window_size, 1000);
        assert_eq!(cfg.drift.min_samples, 50);
        assert_eq!(cfg.drift.significance, 0.05);

        assert_eq!(cfg.sequence.window_len, 10);
        assert_eq!(cfg.sequence.critical_score, 3.0);
        assert_eq!(cfg.sequence.slope, 1.5);
        assert!(cfg.sequence.anomaly_score.is_none());
        assert!(cfg.sequence.weights.is_empty());

        assert_eq!(cfg.ingest.channel_capacity, 1024);

        assert_eq!(cfg.logging.level, "info");
        assert!(!cfg.logging.json);
    }

    #[test]
    fn test_parse_example_toml() {
        let toml_str = r#"
[server]
bind = "127.0.0.1:9000"

[artifacts]
root = "/var/lib/maintwatch/models"
version = "v3"
version_env = "MW_MODEL_VERSION"

[features]
variant = "engine"

[drift]
window_size = 500
min_samples = 30
significance = 0.01

[sequence]
window_len = 20
critical_score = 4.0
slope = 2.0
model_blend = 0.3
anomaly_score = 3.5

[sequence.weights]
oil_pressure_psi = 1.5

[ingest]
channel_capacity = 64

[logging]
level = "debug"
json = true
"#;

        let cfg: ServiceConfig = toml::from_str(toml_str).unwrap();

        assert_eq!(cfg.server.bind, "127.0.0.1:9000");
        assert_eq!(cfg.artifacts.root, PathBuf::from("/var/lib/maintwatch/models"));
        assert_eq!(cfg.artifacts.version, "v3");
        assert_eq!(cfg.artifacts.version_env, "MW_MODEL_VERSION");
        assert_eq!(cfg.features.variant, DomainVariant::Engine);
        assert_eq!(cfg.drift.window_size, 500);
        assert_eq!(cfg.drift.min_samples, 30);
        assert_eq!(cfg.drift.significance, 0.01);
        assert_eq!(cfg.sequence.window_len, 20);
        assert_eq!(cfg.sequence.critical_score, 4.0);
        assert_eq!(cfg.sequence.slope, 2.0);
        assert_eq!(cfg.sequence.model_blend, 0.3);
        assert_eq!(cfg.sequence.anomaly_score, Some(3.5));
        assert_eq!(cfg.sequence.weights.get("oil_pressure_psi"), Some(&1.5));
        // untouched fields keep their defaults
        assert_eq!(cfg.sequence.trend_weight, DEFAULT_TREND_WEIGHT);
        assert_eq!(cfg.ingest.channel_capacity, 64);
        assert_eq!(cfg.logging.level, "debug");
        assert!(cfg.logging.json);
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let toml_str = r#"
[drift]
window_size = 10
"#;
        let cfg: ServiceConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(cfg.drift.window_size, 10);
        assert_eq!(cfg.drift.min_samples, 50);
        assert_eq!(cfg.server.bind, "0.0.0.0:8000");
        assert_eq!(cfg.sequence.window_len, DEFAULT_WINDOW_LEN);
    }

    #[test]
    fn test_empty_toml_is_default() {
        let cfg: ServiceConfig = toml::from_str("").unwrap();
        assert_eq!(cfg.artifacts.version, "latest");
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("maintwatch.toml");
        std::fs::write(&path, "[logging]\nlevel = \"warn\"\n").unwrap();
        let cfg = ServiceConfig::resolve(Some(&path)).unwrap();
        assert_eq!(cfg.logging.level, "warn");
        assert!(ServiceConfig::resolve(Some(&dir.path().join("missing.toml"))).is_err());
    }

    #[test]
    fn test_version_env_override() {
        let cfg = ArtifactConfig {
            version_env: "MAINTWATCH_TEST_VERSION_OVERRIDE".into(),
            ..ArtifactConfig::default()
        };
        assert_eq!(cfg.effective_version(), "latest");
        std::env::set_var("MAINTWATCH_TEST_VERSION_OVERRIDE", "2024-06-01");
        assert_eq!(cfg.effective_version(), "2024-06-01");
        std::env::remove_var("MAINTWATCH_TEST_VERSION_OVERRIDE");
    }
}
