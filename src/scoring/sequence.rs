//! Window-based failure scoring.
//!
//! The latest window is scaled and turned into a directional risk score:
//! how far stress columns sit above, and protective columns below, their
//! training mean, plus how much they worsened across the window. A sigmoid
//! centred on the critical score maps that to a probability, optionally
//! blended with a trained recurrent model.

use std::collections::BTreeMap;

use tracing::{debug, warn};

use crate::config::{SequenceConfig, DEFAULT_SIGMOID_SLOPE, DEFAULT_WINDOW_LEN};
use crate::error::InferenceError;
use crate::features::{DomainVariant, FeatureRole};
use crate::model::{sigmoid, Scaler, SequenceModel};
use crate::scoring::{clamp_probability, PredictionResult};

/// All overlapping windows of `window_len` rows, oldest first, stepping by
/// one row. Fewer rows than `window_len` yield a single shorter window;
/// no rows at all is an error.
pub fn sliding_windows<T>(rows: &[T], window_len: usize) -> Result<Vec<&[T]>, InferenceError> {
    let effective = window_len.min(rows.len());
    if effective == 0 {
        return Err(InferenceError::InsufficientData {
            have: rows.len(),
            requested: window_len,
        });
    }
    if effective < window_len {
        debug!(
            have = rows.len(),
            requested = window_len,
            "sequence shorter than window, using whole sequence"
        );
    }
    Ok(rows.windows(effective).collect())
}

/// Directional roles for the sequence columns, with weight overrides
/// applied to stress/protective columns.
pub fn resolve_roles(
    variant: DomainVariant,
    columns: &[String],
    overrides: &BTreeMap<String, f64>,
) -> Vec<FeatureRole> {
    columns
        .iter()
        .map(|name| match (variant.role_of(name), overrides.get(name)) {
            (FeatureRole::Stress(_), Some(w)) => FeatureRole::Stress(*w),
            (FeatureRole::Protective(_), Some(w)) => FeatureRole::Protective(*w),
            (role, _) => role,
        })
        .collect()
}

/// Tunable constants of the heuristic score.
#[derive(Debug, Clone)]
pub struct SequencePolicy {
    /// Score mapped to probability 0.5.
    pub critical_score: f64,
    pub slope: f64,
    pub neutral_weight: f64,
    pub trend_weight: f64,
    /// Share of a trained model in the final probability, in `[0, 1]`.
    pub model_blend: f64,
    pub anomaly_score: f64,
    /// Target window length, always at least 1.
    pub window_len: usize,
}

impl Default for SequencePolicy {
    fn default() -> Self {
        Self::from_config(&SequenceConfig::default())
    }
}

impl SequencePolicy {
    pub fn from_config(cfg: &SequenceConfig) -> Self {
        // A non-positive slope would break monotonicity in the score.
        let slope = if cfg.slope.is_finite() && cfg.slope > 0.0 {
            cfg.slope
        } else {
            warn!(slope = cfg.slope, default = DEFAULT_SIGMOID_SLOPE, "invalid sigmoid slope, using default");
            DEFAULT_SIGMOID_SLOPE
        };
        // A zero-length window would reject every sequence.
        let window_len = if cfg.window_len > 0 {
            cfg.window_len
        } else {
            warn!(default = DEFAULT_WINDOW_LEN, "window_len must be positive, using default");
            DEFAULT_WINDOW_LEN
        };
        Self {
            critical_score: cfg.critical_score,
            slope,
            neutral_weight: cfg.neutral_weight.max(0.0),
            trend_weight: cfg.trend_weight.max(0.0),
            model_blend: cfg.model_blend.clamp(0.0, 1.0),
            anomaly_score: cfg.anomaly_score.unwrap_or(cfg.critical_score),
            window_len,
        }
    }

    /// Risk from the most recent scaled sample.
    pub fn level_score(&self, latest: &[f64], roles: &[FeatureRole]) -> f64 {
        latest
            .iter()
            .enumerate()
            .map(|(i, z)| match role_at(roles, i) {
                FeatureRole::Neutral => self.neutral_weight * z.abs(),
                FeatureRole::Stress(w) => w * z.max(0.0),
                FeatureRole::Protective(w) => w * (-z).max(0.0),
            })
            .sum()
    }

    /// Risk from worsening between the first and last sample. Improvements
    /// and neutral columns contribute nothing.
    pub fn trend_score(&self, first: &[f64], last: &[f64], roles: &[FeatureRole]) -> f64 {
        first
            .iter()
            .zip(last)
            .enumerate()
            .map(|(i, (a, b))| {
                let change = b - a;
                match role_at(roles, i) {
                    FeatureRole::Neutral => 0.0,
                    FeatureRole::Stress(w) => self.trend_weight * w * change.max(0.0),
                    FeatureRole::Protective(w) => self.trend_weight * w * (-change).max(0.0),
                }
            })
            .sum()
    }

    /// Combined heuristic score for a scaled window (oldest row first).
    pub fn window_score(&self, window: &[Vec<f64>], roles: &[FeatureRole]) -> f64 {
        match (window.first(), window.last()) {
            (Some(first), Some(last)) => {
                self.level_score(last, roles) + self.trend_score(first, last, roles)
            }
            _ => 0.0,
        }
    }

    /// Monotone map from score to probability. It is strictly increasing
    /// until `slope * (score - critical_score)` passes about 36.7, where the
    /// f64 sigmoid rounds to exactly 1.0 and stays there.
    pub fn probability(&self, score: f64) -> f64 {
        sigmoid(self.slope * (score - self.critical_score))
    }

    pub fn blend(&self, heuristic: f64, model: f64) -> f64 {
        (1.0 - self.model_blend) * heuristic + self.model_blend * model
    }
}

fn role_at(roles: &[FeatureRole], i: usize) -> FeatureRole {
    roles.get(i).copied().unwrap_or(FeatureRole::Neutral)
}

/// Diagnostic detail behind a sequence decision.
#[derive(Debug, Clone)]
pub struct SequenceScore {
    pub result: PredictionResult,
    pub score: f64,
    pub heuristic_probability: f64,
    /// Output of a trained recurrent model, when one took part.
    pub model_probability: Option<f64>,
    pub windows: usize,
    pub window_len: usize,
}

pub struct SequenceScorer<'a> {
    scaler: &'a dyn Scaler,
    model: Option<&'a dyn SequenceModel>,
    policy: &'a SequencePolicy,
    roles: &'a [FeatureRole],
}

impl<'a> SequenceScorer<'a> {
    pub fn new(
        scaler: &'a dyn Scaler,
        model: Option<&'a dyn SequenceModel>,
        policy: &'a SequencePolicy,
        roles: &'a [FeatureRole],
    ) -> Self {
        Self {
            scaler,
            model,
            policy,
            roles,
        }
    }

    /// Score the most recent window of raw, column-aligned rows.
    pub fn score(&self, rows: &[Vec<f64>]) -> Result<SequenceScore, InferenceError> {
        let windows = sliding_windows(rows, self.policy.window_len)?;
        let count = windows.len();
        let latest = windows.last().copied().unwrap_or_default();

        let scaled = latest
            .iter()
            .map(|row| self.scaler.transform(row))
            .collect::<Result<Vec<_>, _>>()?;

        let score = self.policy.window_score(&scaled, self.roles);
        let heuristic_probability = self.policy.probability(score);

        let model_probability = match self.model {
            Some(model) if model.is_trained() => Some(clamp_probability(model.infer(&scaled)?)),
            Some(_) => {
                debug!("sequence model has no trained weights, using heuristic only");
                None
            }
            None => None,
        };
        let probability = match model_probability {
            Some(p) => self.policy.blend(heuristic_probability, p),
            None => heuristic_probability,
        };
        let failure_probability = clamp_probability(probability);

        Ok(SequenceScore {
            result: PredictionResult {
                anomaly: score >= self.policy.anomaly_score,
                failure_probability,
                prediction: u8::from(failure_probability > 0.5),
            },
            score,
            heuristic_probability,
            model_probability,
            windows: count,
            window_len: latest.len(),
        })
    }
}
