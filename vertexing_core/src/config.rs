//! Fitter configuration.

use crate::error::VertexError;
use crate::frames;
use nalgebra::Vector3;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use vertexing_conditions::RunConditions;

/// Which beam constraint, if any, is folded into the fit.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ConstraintMode {
    /// Tracks only
    #[default]
    Unconstrained,
    /// Summed momentum must point back to the beam spot
    BeamspotConstrained,
    /// Vertex must sit at the beam spot
    TargetConstrained,
}

impl ConstraintMode {
    /// All modes, in increasing constraint strength.
    pub fn all() -> &'static [ConstraintMode] {
        &[
            ConstraintMode::Unconstrained,
            ConstraintMode::BeamspotConstrained,
            ConstraintMode::TargetConstrained,
        ]
    }

    /// Algorithm label attached to fitted vertices.
    pub fn name(&self) -> &'static str {
        match self {
            ConstraintMode::Unconstrained => "Unconstrained",
            ConstraintMode::BeamspotConstrained => "BeamspotConstrained",
            ConstraintMode::TargetConstrained => "TargetConstrained",
        }
    }

    /// Degrees of freedom added by the constraint.
    pub fn extra_ndf(&self) -> usize {
        match self {
            ConstraintMode::Unconstrained => 0,
            ConstraintMode::BeamspotConstrained => 2,
            ConstraintMode::TargetConstrained => 3,
        }
    }

    /// Maps the legacy pair of boolean switches onto a mode.
    pub fn from_flags(beamspot: bool, target: bool) -> Result<Self, VertexError> {
        match (beamspot, target) {
            (false, false) => Ok(ConstraintMode::Unconstrained),
            (true, false) => Ok(ConstraintMode::BeamspotConstrained),
            (false, true) => Ok(ConstraintMode::TargetConstrained),
            (true, true) => Err(VertexError::config(
                "beamspot and target constraints are mutually exclusive",
            )),
        }
    }
}

impl fmt::Display for ConstraintMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for ConstraintMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "unconstrained" | "none" => Ok(ConstraintMode::Unconstrained),
            "beamspotconstrained" | "beamspot" | "bsc" => Ok(ConstraintMode::BeamspotConstrained),
            "targetconstrained" | "target" | "tc" => Ok(ConstraintMode::TargetConstrained),
            _ => Err(format!("Unknown constraint mode: {}", s)),
        }
    }
}

/// Configuration of a [`BilliorVertexer`](crate::BilliorVertexer).
///
/// Positions and sizes are in the tracking frame (axis 0 along the beam), mm.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VertexerConfig {
    /// Magnetic field (Tesla)
    pub b_field: f64,

    /// Beam spot centre
    pub beam_position: [f64; 3],

    /// Gaussian beam spot widths
    pub beam_size: [f64; 3],

    /// Beam constraint applied after the track-only solve
    pub constraint: ConstraintMode,

    /// Linearization point for the first pass
    pub seed_vertex: [f64; 3],

    /// Point the track perigees are expressed relative to
    pub reference_position: [f64; 3],

    /// Relinearization passes (1 = single pass)
    pub max_iterations: usize,

    /// Vertex shift below which relinearization stops (mm)
    pub convergence_tolerance: f64,
}

impl Default for VertexerConfig {
    fn default() -> Self {
        Self {
            b_field: 0.5,
            beam_position: [0.0, 0.0, 0.0],
            beam_size: [0.001, 0.01, 0.01], // 1 um along the beam, 10 um transverse
            constraint: ConstraintMode::Unconstrained,
            seed_vertex: [0.0, 0.0, 0.0],
            reference_position: [0.0, 0.0, 0.0],
            max_iterations: 1,
            convergence_tolerance: 1e-6,
        }
    }
}

impl VertexerConfig {
    pub fn new(b_field: f64) -> Self {
        Self {
            b_field,
            ..Default::default()
        }
    }

    /// Builds a configuration from run conditions (detector frame).
    pub fn from_conditions(conditions: &RunConditions) -> Self {
        let position = frames::to_tracking(&Vector3::from(conditions.beam.position));
        let size = frames::to_tracking(&Vector3::from(conditions.beam.size));
        Self {
            b_field: conditions.b_field,
            beam_position: [position.x, position.y, position.z],
            beam_size: [size.x, size.y, size.z],
            ..Default::default()
        }
    }

    /// Replaces field and beam spot from new run conditions, keeping fit options.
    pub fn apply_conditions(&mut self, conditions: &RunConditions) {
        let fresh = Self::from_conditions(conditions);
        self.b_field = fresh.b_field;
        self.beam_position = fresh.beam_position;
        self.beam_size = fresh.beam_size;
    }

    pub fn with_constraint(mut self, constraint: ConstraintMode) -> Self {
        self.constraint = constraint;
        self
    }

    pub fn with_beam_position(mut self, position: [f64; 3]) -> Self {
        self.beam_position = position;
        self
    }

    pub fn with_beam_size(mut self, size: [f64; 3]) -> Self {
        self.beam_size = size;
        self
    }

    pub fn with_seed_vertex(mut self, seed: [f64; 3]) -> Self {
        self.seed_vertex = seed;
        self
    }

    pub fn with_reference_position(mut self, reference: [f64; 3]) -> Self {
        self.reference_position = reference;
        self
    }

    /// Enables relinearization at the fitted vertex until the shift drops
    /// below `tolerance` or `max_iterations` passes have run.
    pub fn with_iterations(mut self, max_iterations: usize, tolerance: f64) -> Self {
        self.max_iterations = max_iterations;
        self.convergence_tolerance = tolerance;
        self
    }

    pub fn validate(&self) -> Result<(), VertexError> {
        if !self.b_field.is_finite() || self.b_field == 0.0 {
            return Err(VertexError::config(format!("unusable field {} T", self.b_field)));
        }
        if self.constraint != ConstraintMode::Unconstrained
            && self.beam_size.iter().any(|s| !s.is_finite() || *s <= 0.0)
        {
            return Err(VertexError::config(format!(
                "beam size {:?} must be positive for {}",
                self.beam_size, self.constraint
            )));
        }
        if self.max_iterations == 0 {
            return Err(VertexError::config("max_iterations must be at least 1"));
        }
        if !(self.convergence_tolerance > 0.0) {
            return Err(VertexError::config("convergence tolerance must be positive"));
        }
        Ok(())
    }
}
