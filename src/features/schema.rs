//! Column schemas for the supported machine families.

use serde::{Deserialize, Serialize};

pub const ROLLING_MEAN_SUFFIX: &str = "_rolling_mean";
pub const ROLLING_STD_SUFFIX: &str = "_rolling_std";
pub const DELTA_SUFFIX: &str = "_delta";

/// How a column moves the sequence-path risk score.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FeatureRole {
    /// Deviation in either direction counts, at the neutral weight.
    Neutral,
    /// A rise is harmful (temperatures, vibration, wear).
    Stress(f64),
    /// A drop is harmful (oil pressure).
    Protective(f64),
}

/// One raw sensor column.
#[derive(Debug, Clone, Copy)]
pub struct ColumnSpec {
    /// Name the training pipeline used for the column.
    pub name: &'static str,
    /// Alternate request field name accepted for the same reading.
    pub alias: &'static str,
    /// Whether training derived rolling mean/std/delta columns from it.
    pub rolling: bool,
    pub role: FeatureRole,
}

const MILLING_COLUMNS: &[ColumnSpec] = &[
    ColumnSpec {
        name: "Air temperature [K]",
        alias: "air_temperature",
        rolling: true,
        role: FeatureRole::Neutral,
    },
    ColumnSpec {
        name: "Process temperature [K]",
        alias: "process_temperature",
        rolling: true,
        role: FeatureRole::Stress(0.8),
    },
    ColumnSpec {
        name: "Rotational speed [rpm]",
        alias: "rotational_speed",
        rolling: true,
        role: FeatureRole::Neutral,
    },
    ColumnSpec {
        name: "Torque [Nm]",
        alias: "torque",
        rolling: true,
        role: FeatureRole::Stress(0.8),
    },
    ColumnSpec {
        name: "Tool wear [min]",
        alias: "tool_wear",
        rolling: false,
        role: FeatureRole::Stress(0.6),
    },
];

const ENGINE_COLUMNS: &[ColumnSpec] = &[
    ColumnSpec {
        name: "engine_rpm",
        alias: "engine_rpm",
        rolling: false,
        role: FeatureRole::Neutral,
    },
    ColumnSpec {
        name: "oil_pressure_psi",
        alias: "oil_pressure",
        rolling: false,
        role: FeatureRole::Protective(1.0),
    },
    ColumnSpec {
        name: "coolant_temp_c",
        alias: "coolant_temp",
        rolling: false,
        role: FeatureRole::Stress(0.8),
    },
    ColumnSpec {
        name: "vibration_level",
        alias: "vibration",
        rolling: false,
        role: FeatureRole::Stress(1.0),
    },
    ColumnSpec {
        name: "engine_temp_c",
        alias: "engine_temp",
        rolling: false,
        role: FeatureRole::Stress(0.8),
    },
];

/// Machine family whose artifacts are being served.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DomainVariant {
    /// Milling machine telemetry (AI4I schema), point features carry rolling columns.
    #[default]
    Milling,
    /// Car engine telemetry, trained on raw columns only.
    Engine,
}

impl DomainVariant {
    pub fn columns(&self) -> &'static [ColumnSpec] {
        match self {
            DomainVariant::Milling => MILLING_COLUMNS,
            DomainVariant::Engine => ENGINE_COLUMNS,
        }
    }

    pub fn raw_names(&self) -> Vec<&'static str> {
        self.columns().iter().map(|c| c.name).collect()
    }

    /// Canonical point-path column order: raw columns, then mean/std/delta
    /// for every rolling column.
    pub fn point_layout(&self) -> Vec<String> {
        let mut names: Vec<String> = self.raw_names().into_iter().map(String::from).collect();
        for col in self.columns().iter().filter(|c| c.rolling) {
            names.push(format!("{}{}", col.name, ROLLING_MEAN_SUFFIX));
            names.push(format!("{}{}", col.name, ROLLING_STD_SUFFIX));
            names.push(format!("{}{}", col.name, DELTA_SUFFIX));
        }
        names
    }

    /// Role of a raw column by name. Unknown columns are neutral.
    pub fn role_of(&self, name: &str) -> FeatureRole {
        self.columns()
            .iter()
            .find(|c| c.name == name || c.alias == name)
            .map(|c| c.role)
            .unwrap_or(FeatureRole::Neutral)
    }
}

impl std::fmt::Display for DomainVariant {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DomainVariant::Milling => write!(f, "milling"),
            DomainVariant::Engine => write!(f, "engine"),
        }
    }
}
