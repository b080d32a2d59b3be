//! Validation scenarios for the vertex fitter.

use crate::error::SimError;
use vertexing_core::ConstraintMode;

/// Scenario identifiers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ScenarioId {
    /// V0-001: prompt decays, unconstrained fit
    Prompt,

    /// V0-002: prompt decays, momentum pointing back to the beam spot
    PromptBeamspot,

    /// V0-003: prompt decays, vertex pinned to the beam spot
    PromptTarget,

    /// V0-004: displaced decays, unconstrained fit
    Displaced,

    /// V0-005: displaced decays, momentum pointing back to the beam spot
    DisplacedBeamspot,

    /// V0-006: field-off straight tracks through the fallback fitters
    StraightLine,
}

impl ScenarioId {
    /// Returns a list of all scenarios.
    pub fn all() -> Vec<ScenarioId> {
        vec![
            ScenarioId::Prompt,
            ScenarioId::PromptBeamspot,
            ScenarioId::PromptTarget,
            ScenarioId::Displaced,
            ScenarioId::DisplacedBeamspot,
            ScenarioId::StraightLine,
        ]
    }

    /// Returns the scenario name.
    pub fn name(&self) -> &'static str {
        match self {
            ScenarioId::Prompt => "prompt",
            ScenarioId::PromptBeamspot => "prompt_beamspot",
            ScenarioId::PromptTarget => "prompt_target",
            ScenarioId::Displaced => "displaced",
            ScenarioId::DisplacedBeamspot => "displaced_beamspot",
            ScenarioId::StraightLine => "straight_line",
        }
    }

    /// Returns a description of the scenario.
    pub fn description(&self) -> &'static str {
        match self {
            ScenarioId::Prompt => "Prompt e+e- pairs, free vertex, pulls and chi2/ndf",
            ScenarioId::PromptBeamspot => "Prompt pairs with the summed momentum pointing at the beam spot",
            ScenarioId::PromptTarget => "Prompt pairs with the vertex constrained to the beam spot",
            ScenarioId::Displaced => "Decays with a 10 mm mean flight distance, free vertex",
            ScenarioId::DisplacedBeamspot => "Displaced decays pointing back to the beam spot",
            ScenarioId::StraightLine => "Field-off straight tracks, iterative straight-line and POCA fits",
        }
    }

    /// Beam constraint used by the Billoir fit, `None` for the straight-line fallback.
    pub fn constraint(&self) -> Option<ConstraintMode> {
        match self {
            ScenarioId::Prompt | ScenarioId::Displaced => Some(ConstraintMode::Unconstrained),
            ScenarioId::PromptBeamspot | ScenarioId::DisplacedBeamspot => {
                Some(ConstraintMode::BeamspotConstrained)
            }
            ScenarioId::PromptTarget => Some(ConstraintMode::TargetConstrained),
            ScenarioId::StraightLine => None,
        }
    }

    /// Mean decay length generated for this scenario (mm).
    pub fn decay_length(&self) -> f64 {
        match self {
            ScenarioId::Displaced | ScenarioId::DisplacedBeamspot => 10.0,
            _ => 0.0,
        }
    }

    pub fn is_displaced(&self) -> bool {
        self.decay_length() > 0.0
    }
}

impl std::fmt::Display for ScenarioId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl std::str::FromStr for ScenarioId {
    type Err = SimError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "prompt" | "v0-001" => Ok(ScenarioId::Prompt),
            "prompt_beamspot" | "promptbeamspot" | "v0-002" => Ok(ScenarioId::PromptBeamspot),
            "prompt_target" | "prompttarget" | "v0-003" => Ok(ScenarioId::PromptTarget),
            "displaced" | "v0-004" => Ok(ScenarioId::Displaced),
            "displaced_beamspot" | "displacedbeamspot" | "v0-005" => Ok(ScenarioId::DisplacedBeamspot),
            "straight_line" | "straightline" | "v0-006" => Ok(ScenarioId::StraightLine),
            _ => Err(SimError::UnknownScenario(s.to_string())),
        }
    }
}
