use crate::error::InferenceError;
use crate::features::schema::{DomainVariant, DELTA_SUFFIX, ROLLING_MEAN_SUFFIX, ROLLING_STD_SUFFIX};
use crate::features::TelemetryRecord;
use crate::model::Scaler;
use tracing::debug;

/// Unscaled feature values, in the column order the scaler was fit on.
pub type FeatureVector = Vec<f64>;

/// Maps telemetry records onto the scaler's column layout.
///
/// Training computed rolling statistics over consecutive rows, which a
/// single observation cannot reproduce. On the point path each rolling
/// mean is approximated by the raw value, and each rolling std and delta
/// by exactly 0. The sequence path uses raw columns only.
#[derive(Debug, Clone, Copy, Default)]
pub struct FeatureTransformer {
    variant: DomainVariant,
}

impl FeatureTransformer {
    pub fn new(variant: DomainVariant) -> Self {
        Self { variant }
    }

    pub fn variant(&self) -> DomainVariant {
        self.variant
    }

    /// Raw sensor readings by canonical column name. Absent readings are 0.
    pub fn raw_columns(&self, record: &TelemetryRecord) -> Vec<(String, f64)> {
        self.variant
            .columns()
            .iter()
            .map(|col| {
                let value = record.get(col.name).or_else(|| record.get(col.alias));
                if value.is_none() {
                    debug!(column = col.name, "reading absent, using 0");
                }
                (col.name.to_string(), value.unwrap_or(0.0))
            })
            .collect()
    }

    /// Point-path columns in canonical order, including the approximated
    /// rolling features.
    pub fn point_columns(&self, record: &TelemetryRecord) -> Vec<(String, f64)> {
        let mut columns = self.raw_columns(record);
        let rolling: Vec<(String, f64)> = self
            .variant
            .columns()
            .iter()
            .zip(columns.iter())
            .filter(|(spec, _)| spec.rolling)
            .flat_map(|(spec, (_, value))| {
                [
                    (format!("{}{}", spec.name, ROLLING_MEAN_SUFFIX), *value),
                    (format!("{}{}", spec.name, ROLLING_STD_SUFFIX), 0.0),
                    (format!("{}{}", spec.name, DELTA_SUFFIX), 0.0),
                ]
            })
            .collect();
        columns.extend(rolling);
        columns
    }

    /// Feature vector for one record, aligned to `scaler`.
    pub fn transform_point(
        &self,
        record: &TelemetryRecord,
        scaler: &dyn Scaler,
    ) -> Result<FeatureVector, InferenceError> {
        align(&self.point_columns(record), scaler)
    }

    /// One raw feature row per record, aligned to `scaler`, in input order.
    pub fn transform_sequence(
        &self,
        records: &[TelemetryRecord],
        scaler: &dyn Scaler,
    ) -> Result<Vec<FeatureVector>, InferenceError> {
        records
            .iter()
            .map(|r| align(&self.raw_columns(r), scaler))
            .collect()
    }

    /// Canonical names of the columns `transform_sequence` produces, aligned
    /// to `scaler` when it records feature names.
    pub fn sequence_column_names(&self, scaler: &dyn Scaler) -> Vec<String> {
        match scaler.feature_names() {
            Some(names) => names.to_vec(),
            None => self.variant.raw_names().into_iter().map(String::from).collect(),
        }
    }

    /// Whether `transform_sequence` can ever satisfy `scaler`: every named
    /// column must be a raw reading, and the produced width must match.
    pub fn check_sequence_scaler(&self, scaler: &dyn Scaler) -> Result<(), InferenceError> {
        let raw = self.variant.raw_names();
        let width = match scaler.feature_names() {
            Some(names) => {
                if let Some(name) = names.iter().find(|n| !raw.iter().any(|r| *r == n.as_str())) {
                    return Err(InferenceError::SchemaMismatch {
                        column: name.clone(),
                    });
                }
                names.len()
            }
            None => raw.len(),
        };
        if width != scaler.n_features() {
            return Err(InferenceError::DimensionMismatch {
                stage: "sequence alignment",
                expected: scaler.n_features(),
                got: width,
            });
        }
        Ok(())
    }
}

/// Select and order `columns` by the scaler's fit-time names. Without names,
/// the canonical order is used as-is and only the width is checked.
fn align(columns: &[(String, f64)], scaler: &dyn Scaler) -> Result<FeatureVector, InferenceError> {
    let vector: FeatureVector = match scaler.feature_names() {
        Some(names) => names
            .iter()
            .map(|name| {
                columns
                    .iter()
                    .find(|(col, _)| col == name)
                    .map(|(_, v)| *v)
                    .ok_or_else(|| InferenceError::SchemaMismatch {
                        column: name.clone(),
                    })
            })
            .collect::<Result<_, _>>()?,
        None => columns.iter().map(|(_, v)| *v).collect(),
    };
    if vector.len() != scaler.n_features() {
        return Err(InferenceError::DimensionMismatch {
            stage: "feature alignment",
            expected: scaler.n_features(),
            got: vector.len(),
        });
    }
    Ok(vector)
}
