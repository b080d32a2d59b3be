//! JSON exporter for per-event fit results.
//!
//! Writes the truth and fitted vertex of every event so the fit quality can
//! be studied offline.

use crate::error::SimError;
use nalgebra::Vector3;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::Write;
use std::path::Path;
use vertexing_core::validation::ValidationReport;
use vertexing_core::{BilliorVertex, StraightLineVertex};

/// One fitted event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventRecord {
    pub event: u64,

    /// True vertex (detector frame, mm)
    pub truth_vertex: [f64; 3],

    /// True parent mass (GeV)
    pub truth_mass: f64,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub fit: Option<FitRecord>,

    /// Error message when the fit failed
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure: Option<String>,
}

/// Fitted quantities of one event (detector frame).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FitRecord {
    pub algorithm: String,
    pub position: [f64; 3],
    pub errors: [f64; 3],
    pub chi2: f64,
    pub ndf: usize,
    pub iterations: usize,
    /// Residual chi² per track, empty for the straight-line fit
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub track_chi2: Vec<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mass: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mass_error: Option<f64>,
}

fn array(v: &Vector3<f64>) -> [f64; 3] {
    [v.x, v.y, v.z]
}

impl EventRecord {
    pub fn new(event: u64, truth_vertex: &Vector3<f64>, truth_mass: f64) -> Self {
        Self {
            event,
            truth_vertex: array(truth_vertex),
            truth_mass,
            fit: None,
            failure: None,
        }
    }

    pub fn with_fit(mut self, fit: FitRecord) -> Self {
        self.fit = Some(fit);
        self
    }

    pub fn with_failure(mut self, reason: impl Into<String>) -> Self {
        self.failure = Some(reason.into());
        self
    }
}

impl From<&BilliorVertex> for FitRecord {
    fn from(vertex: &BilliorVertex) -> Self {
        Self {
            algorithm: vertex.algorithm().to_string(),
            position: array(&vertex.position),
            errors: array(&vertex.position_errors()),
            chi2: vertex.chi2,
            ndf: vertex.ndf,
            iterations: vertex.iterations,
            track_chi2: vertex.track_chi2.clone(),
            mass: vertex.has_valid_mass().then_some(vertex.invariant_mass),
            mass_error: vertex.invariant_mass_error_full,
        }
    }
}

impl FitRecord {
    /// Record for a straight-line fit already converted to the detector frame.
    pub fn straight_line(position: &Vector3<f64>, errors: &Vector3<f64>, fit: &StraightLineVertex) -> Self {
        Self {
            algorithm: "StraightLine".to_string(),
            position: array(position),
            errors: array(errors),
            chi2: fit.chi2,
            ndf: fit.ndf,
            iterations: fit.iterations,
            track_chi2: Vec::new(),
            mass: None,
            mass_error: None,
        }
    }
}

/// Complete export of one scenario run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimExport {
    /// Scenario name
    pub scenario: String,

    /// Seed used
    pub seed: u64,

    /// Magnetic field (T)
    pub b_field: f64,

    pub events: Vec<EventRecord>,

    pub passed: bool,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub report: Option<ValidationReport>,
}

impl SimExport {
    /// Creates a new export container.
    pub fn new(scenario: &str, seed: u64, b_field: f64) -> Self {
        Self {
            scenario: scenario.to_string(),
            seed,
            b_field,
            events: Vec::new(),
            passed: false,
            report: None,
        }
    }

    pub fn add_event(&mut self, record: EventRecord) {
        self.events.push(record);
    }

    /// Finalizes the export.
    pub fn finalize(&mut self, passed: bool, report: ValidationReport) {
        self.passed = passed;
        self.report = Some(report);
    }

    /// Writes to a JSON file.
    pub fn write_to_file(&self, path: impl AsRef<Path>) -> Result<(), SimError> {
        let json = serde_json::to_string_pretty(self)?;
        let mut file = File::create(path)?;
        file.write_all(json.as_bytes())?;
        Ok(())
    }
}
