//! Scenario runner - generates toy decays, fits them and judges the pulls.

use crate::error::SimError;
use crate::exporter::{EventRecord, FitRecord, SimExport};
use crate::oracle::{V0Event, V0Oracle};
use crate::scenarios::ScenarioId;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use vertexing_conditions::RunConditions;
use vertexing_core::frames;
use vertexing_core::validation::{RunningStats, ValidationReport, ValidationSession};
use vertexing_core::{
    fit_two_lines, BilliorVertexer, Line, StraightLineTrack, StraightLineVertexFitter,
    VertexerConfig,
};

/// Largest tolerated fraction of failed fits.
const MAX_FAILURE_FRACTION: f64 = 0.02;

/// Largest tolerated |mean| of a vertex pull.
const MAX_PULL_BIAS: f64 = 0.25;

/// Largest tolerated deviation of a pull width from one.
const PULL_WIDTH_TOLERANCE: f64 = 0.25;

/// Accepted range of <chi2> / <ndf>.
const CHI2_RATIO_RANGE: (f64, f64) = (0.7, 1.35);

/// Largest tolerated deviation of the full-covariance mass pull width from one.
const MASS_PULL_TOLERANCE: f64 = 0.3;

/// Results from running a scenario.
#[derive(Debug, Clone)]
pub struct ScenarioResult {
    /// Scenario that was run
    pub scenario: ScenarioId,

    /// Seed used
    pub seed: u64,

    /// Whether the fit statistics met every threshold
    pub passed: bool,

    /// Events generated
    pub events: usize,

    /// Failure message if any
    pub failure_reason: Option<String>,

    /// Metrics collected during run
    pub metrics: ScenarioMetrics,
}

impl ScenarioResult {
    fn aborted(scenario: ScenarioId, seed: u64, reason: String) -> Self {
        Self {
            scenario,
            seed,
            passed: false,
            events: 0,
            failure_reason: Some(reason),
            metrics: ScenarioMetrics::default(),
        }
    }
}

/// Metrics collected during scenario execution.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ScenarioMetrics {
    /// Pull, chi2 and mass statistics
    pub report: Option<ValidationReport>,

    /// Mean number of fit passes per event
    pub mean_iterations: f64,

    /// RMS distance of the two-line POCA from the true vertex (mm)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub poca_residual_rms: Option<f64>,
}

/// Runs validation scenarios.
pub struct ScenarioRunner {
    /// Configuration seed
    seed: u64,

    /// Events per scenario
    num_events: usize,

    /// Fit passes for relinearization and the beam constraint
    max_iterations: usize,

    tolerance: f64,

    /// Field and beam spot
    conditions: RunConditions,
}

impl ScenarioRunner {
    /// Creates a new scenario runner.
    pub fn new(seed: u64) -> Self {
        Self {
            seed,
            num_events: 500,
            max_iterations: 10,
            tolerance: 1e-6,
            conditions: RunConditions::default(),
        }
    }

    /// Sets the number of events per scenario.
    pub fn with_events(mut self, events: usize) -> Self {
        self.num_events = events;
        self
    }

    pub fn with_iterations(mut self, max_iterations: usize, tolerance: f64) -> Self {
        self.max_iterations = max_iterations;
        self.tolerance = tolerance;
        self
    }

    /// Uses the field and beam spot of a run.
    pub fn with_conditions(mut self, conditions: RunConditions) -> Self {
        self.conditions = conditions;
        self
    }

    pub fn seed(&self) -> u64 {
        self.seed
    }

    /// Fitter configuration for a scenario.
    pub fn config(&self, scenario: ScenarioId) -> VertexerConfig {
        VertexerConfig::from_conditions(&self.conditions)
            .with_constraint(scenario.constraint().unwrap_or_default())
            .with_iterations(self.max_iterations, self.tolerance)
    }

    /// Runs a scenario and returns the result.
    pub fn run(&self, scenario: ScenarioId) -> ScenarioResult {
        self.execute(scenario, None)
            .unwrap_or_else(|e| ScenarioResult::aborted(scenario, self.seed, e.to_string()))
    }

    /// Runs a scenario and keeps every event for export.
    pub fn run_with_export(&self, scenario: ScenarioId) -> (ScenarioResult, SimExport) {
        let mut export = SimExport::new(scenario.name(), self.seed, self.conditions.b_field);
        let result = self
            .execute(scenario, Some(&mut export))
            .unwrap_or_else(|e| ScenarioResult::aborted(scenario, self.seed, e.to_string()));
        (result, export)
    }

    fn execute(
        &self,
        scenario: ScenarioId,
        mut export: Option<&mut SimExport>,
    ) -> Result<ScenarioResult, SimError> {
        info!("Starting scenario: {} (seed={})", scenario.name(), self.seed);
        debug!("  {}", scenario.description());

        let config = self.config(scenario);
        config.validate()?;

        let physics_seed = self.seed.wrapping_mul(0x9e3779b97f4a7c15);
        let mut oracle = V0Oracle::new(physics_seed, &config).with_decay_length(scenario.decay_length());
        if scenario.constraint().is_none() {
            oracle = oracle.field_free();
        }

        let mut session = ValidationSession::new();
        let mut iterations = RunningStats::default();
        let mut poca = RunningStats::default();

        let vertexer = BilliorVertexer::with_config(config.clone());
        let straight = StraightLineVertexFitter::new(config.beam_position[0]);

        for n in 0..self.num_events {
            let event = oracle.generate()?;
            let record = if scenario.constraint().is_some() {
                fit_billoir(&vertexer, &event, &mut session, &mut iterations)
            } else {
                fit_straight(&straight, &event, &mut session, &mut iterations, &mut poca)
            };
            if let Some(export) = export.as_deref_mut() {
                export.add_event(record);
            }

            if n % 100 == 0 {
                debug!("  event {} | decay length {:.2} mm", n, event.decay_length());
            }
        }

        let report = session.generate_report();
        let reasons = self.judge(scenario, &report);
        let passed = reasons.is_empty();

        info!(
            "{} complete: {} fits, {} failures, <chi2>/<ndf> = {:.3}, pull widths [{:.2}, {:.2}, {:.2}]",
            scenario.name(),
            report.fits,
            report.failures,
            report.chi2_ratio(),
            report.pull_width[0],
            report.pull_width[1],
            report.pull_width[2]
        );
        if !passed {
            warn!("{}: {}", scenario.name(), reasons.join("; "));
        }

        if let Some(export) = export {
            export.finalize(passed, report.clone());
        }

        Ok(ScenarioResult {
            scenario,
            seed: self.seed,
            passed,
            events: self.num_events,
            failure_reason: (!passed).then(|| reasons.join("; ")),
            metrics: ScenarioMetrics {
                report: Some(report),
                mean_iterations: iterations.mean(),
                poca_residual_rms: (poca.count > 0)
                    .then(|| (poca.variance() + poca.mean() * poca.mean()).sqrt()),
            },
        })
    }

    /// Returns the thresholds the report violates.
    fn judge(&self, scenario: ScenarioId, report: &ValidationReport) -> Vec<String> {
        let mut reasons = Vec::new();

        if report.fits == 0 {
            reasons.push("no successful fits".to_string());
            return reasons;
        }

        let failure_fraction = report.failures as f64 / self.num_events as f64;
        if failure_fraction > MAX_FAILURE_FRACTION {
            reasons.push(format!("{:.1}% of fits failed", 100.0 * failure_fraction));
        }

        if !report.pulls_consistent(MAX_PULL_BIAS, PULL_WIDTH_TOLERANCE) {
            reasons.push(format!(
                "vertex pulls mean {:.2?} width {:.2?}",
                report.pull_mean, report.pull_width
            ));
        }

        let ratio = report.chi2_ratio();
        if ratio < CHI2_RATIO_RANGE.0 || ratio > CHI2_RATIO_RANGE.1 {
            reasons.push(format!("<chi2>/<ndf> = {:.3}", ratio));
        }

        if scenario.constraint().is_some()
            && (report.mass_pull_width_full - 1.0).abs() > MASS_PULL_TOLERANCE
        {
            reasons.push(format!("mass pull width {:.2}", report.mass_pull_width_full));
        }

        reasons
    }
}

fn fit_billoir(
    vertexer: &BilliorVertexer,
    event: &V0Event,
    session: &mut ValidationSession,
    iterations: &mut RunningStats,
) -> EventRecord {
    let truth = event.vertex_detector();
    let record = EventRecord::new(event.id, &truth, event.mass);

    match vertexer.fit(&event.tracks) {
        Ok(vertex) => {
            session.record_fit(&truth, Some(event.mass), &vertex);
            iterations.push(vertex.iterations as f64);
            record.with_fit(FitRecord::from(&vertex))
        }
        Err(e) => {
            debug!("event {}: fit failed: {}", event.id, e);
            session.record_failure();
            record.with_failure(e.to_string())
        }
    }
}

fn fit_straight(
    fitter: &StraightLineVertexFitter,
    event: &V0Event,
    session: &mut ValidationSession,
    iterations: &mut RunningStats,
    poca: &mut RunningStats,
) -> EventRecord {
    let truth = event.vertex_detector();
    let record = EventRecord::new(event.id, &truth, event.mass);

    let lines: Vec<Line> = event.tracks.iter().map(Line::from_track).collect();
    let crossing = fit_two_lines(&lines);
    if crossing.is_valid {
        poca.push((crossing.position - event.vertex).norm());
    }

    let tracks: Vec<StraightLineTrack> = event
        .tracks
        .iter()
        .map(|t| StraightLineTrack::from_helix(t, fitter.x_ref))
        .collect();

    match fitter.fit(&tracks) {
        Some(fit) => {
            let position = frames::to_detector(&fit.position);
            let covariance = frames::covariance_to_detector(&fit.covariance);
            session.record_vertex(&truth, &position, &covariance, fit.chi2, fit.ndf);
            iterations.push(fit.iterations as f64);
            let errors = covariance.diagonal().map(f64::sqrt);
            record.with_fit(FitRecord::straight_line(&position, &errors, &fit))
        }
        None => {
            debug!("event {}: straight-line fit did not converge", event.id);
            session.record_failure();
            record.with_failure("straight-line fit did not converge")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_follows_scenario() {
        let runner = ScenarioRunner::new(1).with_iterations(4, 1e-5);
        let config = runner.config(ScenarioId::PromptTarget);
        assert_eq!(config.constraint, vertexing_core::ConstraintMode::TargetConstrained);
        assert_eq!(config.max_iterations, 4);
        assert_eq!(
            runner.config(ScenarioId::StraightLine).constraint,
            vertexing_core::ConstraintMode::Unconstrained
        );
    }

    #[test]
    fn test_unusable_conditions_abort() {
        let conditions = RunConditions {
            b_field: 0.0,
            ..RunConditions::default()
        };
        let result = ScenarioRunner::new(1)
            .with_events(10)
            .with_conditions(conditions)
            .run(ScenarioId::Prompt);
        assert!(!result.passed);
        assert_eq!(result.events, 0);
        assert!(result.failure_reason.unwrap().contains("field"));
    }

    #[test]
    fn test_export_keeps_every_event() {
        let (result, export) = ScenarioRunner::new(9)
            .with_events(25)
            .run_with_export(ScenarioId::Displaced);
        assert_eq!(export.events.len(), 25);
        assert_eq!(export.passed, result.passed);
        assert!(export.report.is_some());
    }
}
