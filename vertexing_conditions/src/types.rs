//! Run conditions consumed by the vertex fitter.
//!
//! All positions and sizes here are in detector coordinates (mm), with
//! `z` along the beam. The fitter converts to its own frame on load.

use crate::error::ConditionsError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

/// Gaussian luminous region of the beam at the target.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BeamSpot {
    /// Beam spot centre [x, y, z] in detector coordinates (mm)
    pub position: [f64; 3],

    /// Gaussian widths [sigma_x, sigma_y, sigma_z] (mm)
    pub size: [f64; 3],
}

impl Default for BeamSpot {
    fn default() -> Self {
        Self {
            position: [0.0, 0.0, 0.0],
            // 10 um transverse, 1 um along the beam
            size: [0.01, 0.01, 0.001],
        }
    }
}

impl BeamSpot {
    /// Checks that every width is a positive finite number.
    pub fn validate(&self) -> Result<(), ConditionsError> {
        if self.position.iter().any(|p| !p.is_finite()) {
            return Err(ConditionsError::invalid(format!(
                "beam position {:?} is not finite",
                self.position
            )));
        }
        if self.size.iter().any(|s| !s.is_finite() || *s <= 0.0) {
            return Err(ConditionsError::invalid(format!(
                "beam size {:?} must be positive",
                self.size
            )));
        }
        Ok(())
    }
}

/// Conditions in effect for one run.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RunConditions {
    /// Run number these conditions apply to (0 for the default set)
    pub run: i32,

    /// Dipole field strength (Tesla)
    pub b_field: f64,

    /// Beam spot at the target
    pub beam: BeamSpot,
}

impl Default for RunConditions {
    fn default() -> Self {
        Self {
            run: 0,
            b_field: 0.5,
            beam: BeamSpot::default(),
        }
    }
}

impl RunConditions {
    /// Checks that the field is usable and the beam spot is well formed.
    pub fn validate(&self) -> Result<(), ConditionsError> {
        if !self.b_field.is_finite() || self.b_field == 0.0 {
            return Err(ConditionsError::invalid(format!(
                "run {}: magnetic field {} T is unusable",
                self.run, self.b_field
            )));
        }
        self.beam.validate()
    }
}

/// Per-run deviations from the default conditions. Unset fields inherit.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct RunOverride {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub b_field: Option<f64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub beam_position: Option<[f64; 3]>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub beam_size: Option<[f64; 3]>,
}

/// Default conditions plus a per-run override map.
///
/// ```json
/// {
///   "default": { "run": 0, "b_field": 0.24,
///                "beam": { "position": [0.0, 0.0, -4.3], "size": [0.2, 0.02, 0.001] } },
///   "runs": { "7796": { "beam_position": [-0.13, -0.085, -4.17] } }
/// }
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConditionsTable {
    /// Conditions used for runs without an override
    pub default: RunConditions,

    /// Overrides keyed by run number
    #[serde(default)]
    pub runs: BTreeMap<i32, RunOverride>,
}

impl ConditionsTable {
    /// Creates a table with only default conditions.
    pub fn new(default: RunConditions) -> Self {
        Self {
            default,
            runs: BTreeMap::new(),
        }
    }

    /// Adds (or replaces) the override for `run`.
    pub fn with_run(mut self, run: i32, run_override: RunOverride) -> Self {
        self.runs.insert(run, run_override);
        self
    }

    /// Parses and validates a JSON conditions table.
    pub fn from_json(json: &str) -> Result<Self, ConditionsError> {
        let table: Self = serde_json::from_str(json)?;
        table.validate()?;
        Ok(table)
    }

    /// Reads a JSON conditions table from disk.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, ConditionsError> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json(&json)
    }

    /// Serializes the table as pretty-printed JSON.
    pub fn to_json(&self) -> Result<String, ConditionsError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Resolves the conditions for `run`, falling back to the defaults.
    pub fn conditions_for_run(&self, run: i32) -> RunConditions {
        let mut conditions = RunConditions {
            run,
            ..self.default
        };
        if let Some(o) = self.runs.get(&run) {
            if let Some(b_field) = o.b_field {
                conditions.b_field = b_field;
            }
            if let Some(position) = o.beam_position {
                conditions.beam.position = position;
            }
            if let Some(size) = o.beam_size {
                conditions.beam.size = size;
            }
        }
        conditions
    }

    /// Validates the defaults and every resolved run.
    pub fn validate(&self) -> Result<(), ConditionsError> {
        self.default.validate()?;
        for run in self.runs.keys() {
            self.conditions_for_run(*run).validate()?;
        }
        Ok(())
    }
}
