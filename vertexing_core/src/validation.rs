//! Validation Module - Fit Quality Against Generator Truth
//! ========================================================
//!
//! Collects fitted vertices together with the true decay they came from
//! and summarises the statistics a correct fitter must reproduce:
//! - Vertex pulls `(fit - truth) / sigma` with zero mean and unit width
//! - Mean chi² close to the number of degrees of freedom
//! - Mass resolution and mass pulls
//!
//! Usage:
//! ```ignore
//! use vertexing_core::validation::ValidationSession;
//!
//! let mut session = ValidationSession::new();
//! session.record_fit(&truth_vertex, Some(truth_mass), &fitted);
//! let report = session.generate_report();
//! report.print();
//! ```

use crate::vertex::BilliorVertex;
use nalgebra::{Matrix3, Vector3};
use serde::{Deserialize, Serialize};

// =============================================================================
// RUNNING STATISTICS
// =============================================================================

/// Streaming mean and variance (Welford).
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct RunningStats {
    pub count: usize,
    mean: f64,
    m2: f64,
}

impl RunningStats {
    pub fn push(&mut self, value: f64) {
        if !value.is_finite() {
            return;
        }
        self.count += 1;
        let delta = value - self.mean;
        self.mean += delta / self.count as f64;
        self.m2 += delta * (value - self.mean);
    }

    pub fn mean(&self) -> f64 {
        self.mean
    }

    /// Sample variance (zero for fewer than two entries).
    pub fn variance(&self) -> f64 {
        if self.count > 1 {
            self.m2 / (self.count - 1) as f64
        } else {
            0.0
        }
    }

    pub fn std_dev(&self) -> f64 {
        self.variance().sqrt()
    }
}

// =============================================================================
// VALIDATION SESSION
// =============================================================================

/// Accumulates fit-versus-truth comparisons.
#[derive(Debug, Clone)]
pub struct ValidationSession {
    /// Pulls in detector x, y, z
    vertex_pulls: [RunningStats; 3],
    /// Residuals in detector x, y, z (mm)
    vertex_residuals: [RunningStats; 3],
    chi2: RunningStats,
    ndf: RunningStats,
    mass: RunningStats,
    mass_pull: RunningStats,
    mass_pull_full: RunningStats,
    /// Fits with any |vertex pull| above the outlier threshold
    outliers: usize,
    failures: usize,
    /// Pull magnitude counted as an outlier
    outlier_threshold: f64,
}

impl ValidationSession {
    pub fn new() -> Self {
        Self::with_outlier_threshold(5.0)
    }

    pub fn with_outlier_threshold(threshold: f64) -> Self {
        Self {
            vertex_pulls: Default::default(),
            vertex_residuals: Default::default(),
            chi2: RunningStats::default(),
            ndf: RunningStats::default(),
            mass: RunningStats::default(),
            mass_pull: RunningStats::default(),
            mass_pull_full: RunningStats::default(),
            outliers: 0,
            failures: 0,
            outlier_threshold: threshold,
        }
    }

    /// Records one fit against its truth (detector coordinates).
    pub fn record_fit(&mut self, truth_vertex: &Vector3<f64>, truth_mass: Option<f64>, fit: &BilliorVertex) {
        self.record_vertex(truth_vertex, &fit.position, &fit.covariance, fit.chi2, fit.ndf);

        if let (Some(truth), true) = (truth_mass, fit.has_valid_mass()) {
            let delta = fit.invariant_mass - truth;
            self.mass.push(delta);
            if let Some(err) = fit.invariant_mass_error {
                self.mass_pull.push(delta / err);
            }
            if let Some(err) = fit.invariant_mass_error_full {
                self.mass_pull_full.push(delta / err);
            }
        }
    }

    /// Records a vertex from any fitter; all quantities share one frame.
    pub fn record_vertex(
        &mut self,
        truth_vertex: &Vector3<f64>,
        position: &Vector3<f64>,
        covariance: &Matrix3<f64>,
        chi2: f64,
        ndf: usize,
    ) {
        let residual = position - truth_vertex;
        let mut outlier = false;
        for k in 0..3 {
            let pull = residual[k] / covariance[(k, k)].sqrt();
            outlier |= pull.abs() > self.outlier_threshold;
            self.vertex_pulls[k].push(pull);
            self.vertex_residuals[k].push(residual[k]);
        }
        if outlier {
            self.outliers += 1;
        }

        self.chi2.push(chi2);
        self.ndf.push(ndf as f64);
    }

    /// Records a fit that returned an error.
    pub fn record_failure(&mut self) {
        self.failures += 1;
    }

    pub fn generate_report(&self) -> ValidationReport {
        ValidationReport {
            fits: self.chi2.count,
            failures: self.failures,
            outliers: self.outliers,
            pull_mean: self.vertex_pulls.map(|s| s.mean()),
            pull_width: self.vertex_pulls.map(|s| s.std_dev()),
            residual_rms: self
                .vertex_residuals
                .map(|s| (s.variance() + s.mean() * s.mean()).sqrt()),
            mean_chi2: self.chi2.mean(),
            mean_ndf: self.ndf.mean(),
            mass_bias: self.mass.mean(),
            mass_resolution: self.mass.std_dev(),
            mass_pull_width: self.mass_pull.std_dev(),
            mass_pull_width_full: self.mass_pull_full.std_dev(),
        }
    }
}

impl Default for ValidationSession {
    fn default() -> Self {
        Self::new()
    }
}

// =============================================================================
// VALIDATION REPORT
// =============================================================================

/// Summary of a validation session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationReport {
    pub fits: usize,
    pub failures: usize,
    pub outliers: usize,
    /// Mean vertex pull in detector x, y, z
    pub pull_mean: [f64; 3],
    /// Standard deviation of the vertex pulls
    pub pull_width: [f64; 3],
    /// RMS vertex residual (mm)
    pub residual_rms: [f64; 3],
    pub mean_chi2: f64,
    pub mean_ndf: f64,
    /// Mean fitted minus true mass (GeV)
    pub mass_bias: f64,
    /// Standard deviation of fitted minus true mass (GeV)
    pub mass_resolution: f64,
    /// Width of the mass pull using the diagonal-only error
    pub mass_pull_width: f64,
    /// Width of the mass pull using the full-covariance error
    pub mass_pull_width_full: f64,
}

impl ValidationReport {
    /// Mean chi² per degree of freedom over all fits.
    pub fn chi2_ratio(&self) -> f64 {
        if self.mean_ndf > 0.0 {
            self.mean_chi2 / self.mean_ndf
        } else {
            0.0
        }
    }

    /// True if every vertex pull has |mean| <= `max_bias` and a width within
    /// `width_tolerance` of one.
    pub fn pulls_consistent(&self, max_bias: f64, width_tolerance: f64) -> bool {
        self.fits > 0
            && self.pull_mean.iter().all(|m| m.abs() <= max_bias)
            && self
                .pull_width
                .iter()
                .all(|w| (w - 1.0).abs() <= width_tolerance)
    }

    /// Print formatted report to console
    pub fn print(&self) {
        println!();
        println!("╔══════════════════════════════════════════════════════════════╗");
        println!("║                VERTEX FIT VALIDATION REPORT                  ║");
        println!("╠══════════════════════════════════════════════════════════════╣");
        println!("║ Fits:                  {:>10}                            ║", self.fits);
        println!("║ Failures:              {:>10}                            ║", self.failures);
        println!("║ Outliers:              {:>10}                            ║", self.outliers);
        println!("║ <chi2> / <ndf>:        {:>10.3}                            ║", self.chi2_ratio());
        println!("╠══════════════════════════════════════════════════════════════╣");
        println!("║ PULLS              x           y           z                 ║");
        println!(
            "║ mean        {:>10.3}  {:>10.3}  {:>10.3}                 ║",
            self.pull_mean[0], self.pull_mean[1], self.pull_mean[2]
        );
        println!(
            "║ width       {:>10.3}  {:>10.3}  {:>10.3}                 ║",
            self.pull_width[0], self.pull_width[1], self.pull_width[2]
        );
        println!(
            "║ rms (mm)    {:>10.4}  {:>10.4}  {:>10.4}                 ║",
            self.residual_rms[0], self.residual_rms[1], self.residual_rms[2]
        );
        println!("╠══════════════════════════════════════════════════════════════╣");
        println!("║ Mass bias:             {:>10.5} GeV                        ║", self.mass_bias);
        println!("║ Mass resolution:       {:>10.5} GeV                        ║", self.mass_resolution);
        println!("║ Mass pull (diag):      {:>10.3}                            ║", self.mass_pull_width);
        println!("║ Mass pull (full):      {:>10.3}                            ║", self.mass_pull_width_full);
        println!("╚══════════════════════════════════════════════════════════════╝");
    }
}

// =============================================================================
// TESTS
// =============================================================================
