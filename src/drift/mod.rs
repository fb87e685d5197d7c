//! Distribution drift between live traffic and the training reference.
//!
//! Every scored point sample lands in a bounded FIFO window. A report takes
//! a private copy of the window under the lock, releases it, and then runs
//! one two-sample KS test per feature against the frozen reference sample.

pub mod ks;

use crate::config::DriftConfig;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard, PoisonError};
use tracing::{debug, warn};

/// Training-time feature sample (rows x features, scaled space).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReferenceSample {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub feature_names: Option<Vec<String>>,
    pub rows: Vec<Vec<f64>>,
}

impl ReferenceSample {
    pub fn new(rows: Vec<Vec<f64>>) -> Self {
        Self {
            feature_names: None,
            rows,
        }
    }

    pub fn n_features(&self) -> usize {
        self.rows.first().map(Vec::len).unwrap_or(0)
    }

    pub fn validate(&self) -> Result<(), String> {
        let width = self.n_features();
        if self.rows.is_empty() || width == 0 {
            return Err("reference sample is empty".into());
        }
        if let Some(i) = self.rows.iter().position(|r| r.len() != width) {
            return Err(format!("row {i} has {} columns, expected {width}", self.rows[i].len()));
        }
        if let Some(names) = &self.feature_names {
            if names.len() != width {
                return Err(format!("{} feature names for {width} columns", names.len()));
            }
        }
        Ok(())
    }

    pub fn column(&self, i: usize) -> Vec<f64> {
        self.rows.iter().filter_map(|r| r.get(i).copied()).collect()
    }
}

/// KS outcome for one feature.
#[derive(Debug, Clone, Serialize)]
pub struct FeatureDrift {
    pub feature: String,
    pub statistic: f64,
    pub p_value: f64,
    pub drift_detected: bool,
}

/// Drift status at the time of the call. Warm-up and a missing reference
/// are ordinary states, not errors.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum DriftReport {
    NoReferenceData,
    InsufficientData {
        current_samples: usize,
        required_samples: usize,
    },
    Evaluated {
        overall_drift: bool,
        samples: usize,
        significance: f64,
        features: Vec<FeatureDrift>,
    },
}

impl DriftReport {
    pub fn overall_drift(&self) -> bool {
        matches!(self, DriftReport::Evaluated { overall_drift: true, .. })
    }
}

pub struct DriftMonitor {
    reference: Option<ReferenceSample>,
    feature_names: Vec<String>,
    config: DriftConfig,
    window: Mutex<VecDeque<Vec<f64>>>,
}

impl DriftMonitor {
    pub fn new(reference: Option<ReferenceSample>, config: DriftConfig) -> Self {
        let capacity = config.window_size.max(1);
        Self {
            reference,
            feature_names: Vec::new(),
            config,
            window: Mutex::new(VecDeque::with_capacity(capacity + 1)),
        }
    }

    /// Fallback names (usually the scaler's) when the reference has none.
    pub fn with_feature_names(mut self, names: Vec<String>) -> Self {
        self.feature_names = names;
        self
    }

    pub fn has_reference(&self) -> bool {
        self.reference.is_some()
    }

    pub fn capacity(&self) -> usize {
        self.config.window_size.max(1)
    }

    // Each critical section is one complete push/evict or clear, so a
    // poisoned lock still guards a consistent window.
    fn lock(&self) -> MutexGuard<'_, VecDeque<Vec<f64>>> {
        self.window.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Append a scaled vector, evicting the oldest entry beyond capacity.
    pub fn add(&self, vector: Vec<f64>) {
        let capacity = self.capacity();
        let mut window = self.lock();
        window.push_back(vector);
        while window.len() > capacity {
            window.pop_front();
        }
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        self.lock().clear();
        debug!("drift window cleared");
    }

    /// Copy of the current window, oldest first.
    pub fn snapshot(&self) -> Vec<Vec<f64>> {
        self.lock().iter().cloned().collect()
    }

    pub fn report(&self) -> DriftReport {
        let Some(reference) = &self.reference else {
            return DriftReport::NoReferenceData;
        };

        let current = {
            let window = self.lock();
            if window.len() < self.config.min_samples {
                return DriftReport::InsufficientData {
                    current_samples: window.len(),
                    required_samples: self.config.min_samples,
                };
            }
            window.iter().cloned().collect::<Vec<_>>()
        };

        let mut features = Vec::with_capacity(reference.n_features());
        for i in 0..reference.n_features() {
            let live: Vec<f64> = current.iter().filter_map(|v| v.get(i).copied()).collect();
            let Some(result) = ks::ks_2samp(&reference.column(i), &live) else {
                warn!(feature = i, "no comparable values for drift test, skipping feature");
                continue;
            };
            features.push(FeatureDrift {
                feature: self.feature_name(reference, i),
                statistic: result.statistic,
                p_value: result.p_value,
                drift_detected: result.p_value < self.config.significance,
            });
        }

        let overall_drift = features.iter().any(|f| f.drift_detected);
        if overall_drift {
            let drifted: Vec<&str> = features
                .iter()
                .filter(|f| f.drift_detected)
                .map(|f| f.feature.as_str())
                .collect();
            warn!(?drifted, samples = current.len(), "feature drift detected");
        }

        DriftReport::Evaluated {
            overall_drift,
            samples: current.len(),
            significance: self.config.significance,
            features,
        }
    }

    fn feature_name(&self, reference: &ReferenceSample, i: usize) -> String {
        reference
            .feature_names
            .as_ref()
            .and_then(|names| names.get(i))
            .or_else(|| self.feature_names.get(i))
            .cloned()
            .unwrap_or_else(|| format!("feature_{i}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn config(window_size: usize, min_samples: usize) -> DriftConfig {
        DriftConfig {
            window_size,
            min_samples,
            significance: 0.05,
        }
    }

    /// 500 rows: column 0 and 1 both evenly cover [0, 1).
    fn grid_reference() -> ReferenceSample {
        ReferenceSample::new((0..500).map(|i| vec![i as f64 / 500.0, i as f64 / 500.0]).collect())
    }

    #[test]
    fn test_fifo_bound_evicts_oldest() {
        let monitor = DriftMonitor::new(None, config(5, 1));
        for i in 0..8 {
            monitor.add(vec![i as f64]);
        }
        let window = monitor.snapshot();
        assert_eq!(window.len(), 5);
        assert_eq!(window.first().unwrap()[0], 3.0);
        assert_eq!(window.last().unwrap()[0], 7.0);
        assert!(!window.iter().any(|v| v[0] < 3.0));
    }

    #[test]
    fn test_no_reference_is_a_status() {
        let monitor = DriftMonitor::new(None, config(10, 1));
        monitor.add(vec![0.0]);
        assert!(matches!(monitor.report(), DriftReport::NoReferenceData));
    }

    #[test]
    fn test_warm_up_reports_insufficient_data() {
        let monitor = DriftMonitor::new(Some(grid_reference()), config(1000, 50));
        for _ in 0..49 {
            monitor.add(vec![0.5, 0.5]);
        }
        match monitor.report() {
            DriftReport::InsufficientData {
                current_samples,
                required_samples,
            } => {
                assert_eq!(current_samples, 49);
                assert_eq!(required_samples, 50);
            }
            other => panic!("expected insufficient data, got {other:?}"),
        }
    }

    #[test]
    fn test_detects_shift_on_one_feature() {
        let monitor = DriftMonitor::new(Some(grid_reference()), config(1000, 50))
            .with_feature_names(vec!["temp".into(), "torque".into()]);
        for j in 0..200 {
            let same = (j as f64 + 0.5) / 200.0;
            let shifted = 2.0 + j as f64 / 200.0;
            monitor.add(vec![same, shifted]);
        }
        let report = monitor.report();
        assert!(report.overall_drift());
        let DriftReport::Evaluated { features, samples, .. } = report else {
            panic!("expected evaluated report");
        };
        assert_eq!(samples, 200);
        assert_eq!(features.len(), 2);
        assert_eq!(features[0].feature, "temp");
        assert!(!features[0].drift_detected, "{:?}", features[0]);
        assert!(features[1].drift_detected);
        assert_eq!(features[1].statistic, 1.0);
    }

    #[test]
    fn test_reference_names_take_precedence() {
        let mut reference = grid_reference();
        reference.feature_names = Some(vec!["a".into(), "b".into()]);
        let monitor = DriftMonitor::new(Some(reference), config(100, 1))
            .with_feature_names(vec!["x".into(), "y".into()]);
        monitor.add(vec![0.1, 0.1]);
        let DriftReport::Evaluated { features, .. } = monitor.report() else {
            panic!("expected evaluated report");
        };
        assert_eq!(features[0].feature, "a");
    }

    #[test]
    fn test_clear_resets_window() {
        let monitor = DriftMonitor::new(None, config(10, 1));
        monitor.add(vec![1.0]);
        monitor.clear();
        assert!(monitor.is_empty());
    }

    #[test]
    fn test_concurrent_adds_respect_capacity() {
        let monitor = Arc::new(DriftMonitor::new(None, config(100, 1)));
        let handles: Vec<_> = (0..8)
            .map(|t| {
                let monitor = monitor.clone();
                std::thread::spawn(move || {
                    for i in 0..50 {
                        monitor.add(vec![(t * 100 + i) as f64]);
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(monitor.len(), 100);
    }

    #[test]
    fn test_reference_validation() {
        assert!(ReferenceSample::new(vec![]).validate().is_err());
        assert!(ReferenceSample::new(vec![vec![1.0, 2.0], vec![1.0]]).validate().is_err());
        assert!(grid_reference().validate().is_ok());
    }
}
