//! Fitted vertex as reported to analysis, in detector coordinates.

use crate::billoir::VertexFitState;
use crate::config::{ConstraintMode, VertexerConfig};
use crate::error::VertexError;
use crate::frames;
use crate::kinematics::{self, ELECTRON_MASS, INVALID_MASS};
use nalgebra::{Matrix2, Matrix3, Vector2, Vector3};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Fitted curvatures below this (1/mm) are treated as straight tracks.
pub const MIN_CURVATURE: f64 = 1e-12;

/// Summed-momentum extrapolation of a two-track vertex to the beam spot plane.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TargetProjection {
    /// Detector z of the plane (mm)
    pub plane_z: f64,
    /// Detector (x, y) where the pair momentum crosses the plane
    pub position: Vector2<f64>,
    /// Covariance of `position`
    pub covariance: Matrix2<f64>,
}

impl TargetProjection {
    /// One-sigma uncertainties on (x, y).
    pub fn errors(&self) -> Vector2<f64> {
        Vector2::new(self.covariance[(0, 0)].sqrt(), self.covariance[(1, 1)].sqrt())
    }
}

/// Result of a Billoir fit.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BilliorVertex {
    /// Vertex position (mm)
    pub position: Vector3<f64>,

    /// Vertex covariance (mm^2)
    pub covariance: Matrix3<f64>,

    /// Total chi² (tracks plus constraint)
    pub chi2: f64,

    /// Residual chi² of each track before the beam constraint
    pub track_chi2: Vec<f64>,

    pub ndf: usize,

    /// Constraint the fit used
    pub constraint: ConstraintMode,

    /// Momentum of each track at the vertex (GeV)
    pub track_momenta: Vec<Vector3<f64>>,

    /// Covariance of each entry of `track_momenta`
    pub track_momentum_covariances: Vec<Matrix3<f64>>,

    /// Two-track invariant mass under the electron hypothesis,
    /// [`INVALID_MASS`] if undefined or the fit has more than two tracks
    pub invariant_mass: f64,

    /// Two-track mass error from diagonal momentum variances only,
    /// `None` when the mass is invalid
    pub invariant_mass_error: Option<f64>,

    /// Two-track mass error with all momentum correlations,
    /// `None` when the mass is invalid
    pub invariant_mass_error_full: Option<f64>,

    /// Two-track projection to the beam spot plane
    pub target_projection: Option<TargetProjection>,

    /// Linearization passes used
    pub iterations: usize,
}

impl BilliorVertex {
    /// Derives the reported quantities from a tracking-frame fit state.
    ///
    /// Fails with [`VertexError::DegenerateGeometry`] when a track has zero
    /// curvature, since its momentum is undefined. Use
    /// [`BilliorVertexer::fit_state`](crate::BilliorVertexer::fit_state) for
    /// field-free tracks.
    pub fn from_state(state: &VertexFitState, config: &VertexerConfig) -> Result<Self, VertexError> {
        let k = kinematics::field_constant(config.b_field);

        let mut momenta_trk = Vec::with_capacity(state.n_tracks);
        let mut covariances_trk = Vec::with_capacity(state.n_tracks);
        let mut track_momenta = Vec::with_capacity(state.n_tracks);
        let mut track_momentum_covariances = Vec::with_capacity(state.n_tracks);
        for i in 0..state.n_tracks {
            let q = state.momentum_parameters(i)?;
            if q[2].abs() < MIN_CURVATURE {
                return Err(VertexError::degenerate(format!(
                    "track {} has zero curvature, momentum undefined",
                    i
                )));
            }
            let cov = kinematics::momentum_covariance(&q, &state.momentum_covariance(i, i)?, k);
            let p = kinematics::momentum(&q, k);
            if !p.iter().chain(cov.iter()).all(|x| x.is_finite()) {
                return Err(VertexError::degenerate(format!("track {} momentum is not finite", i)));
            }
            momenta_trk.push(p);
            covariances_trk.push(cov);
            track_momenta.push(frames::to_detector(&p));
            track_momentum_covariances.push(frames::covariance_to_detector(&cov));
        }

        let (invariant_mass, invariant_mass_error, invariant_mass_error_full, target_projection) =
            if state.n_tracks == 2 {
                let mass = kinematics::invariant_mass(&momenta_trk, ELECTRON_MASS);
                let diagonal = kinematics::invariant_mass_uncertainty(
                    &momenta_trk[0],
                    &momenta_trk[1],
                    &covariances_trk[0],
                    &covariances_trk[1],
                    ELECTRON_MASS,
                );
                let full = kinematics::invariant_mass_uncertainty_full(state, k, ELECTRON_MASS)?;
                let plane = config.beam_position[0];
                let projection = match kinematics::projected_position(state, plane, k) {
                    Ok((position, covariance)) => Some(TargetProjection {
                        plane_z: plane,
                        position,
                        covariance,
                    }),
                    Err(VertexError::DegenerateGeometry(_)) => None,
                    Err(e) => return Err(e),
                };
                (mass, diagonal, full, projection)
            } else {
                (INVALID_MASS, None, None, None)
            };

        Ok(Self {
            position: frames::to_detector(&state.vertex()),
            covariance: frames::covariance_to_detector(&state.vertex_covariance()),
            chi2: state.chi2,
            track_chi2: state.track_chi2.clone(),
            ndf: state.ndf(),
            constraint: state.constraint,
            track_momenta,
            track_momentum_covariances,
            invariant_mass,
            invariant_mass_error,
            invariant_mass_error_full,
            target_projection,
            iterations: state.iterations,
        })
    }

    /// Algorithm label, e.g. `"TargetConstrained"`.
    pub fn algorithm(&self) -> &'static str {
        self.constraint.name()
    }

    /// One-sigma position uncertainties.
    pub fn position_errors(&self) -> Vector3<f64> {
        self.covariance.diagonal().map(f64::sqrt)
    }

    /// Sum of the track momenta at the vertex.
    pub fn total_momentum(&self) -> Vector3<f64> {
        self.track_momenta.iter().sum()
    }

    pub fn chi2_per_ndf(&self) -> f64 {
        if self.ndf == 0 {
            0.0
        } else {
            self.chi2 / self.ndf as f64
        }
    }

    pub fn has_valid_mass(&self) -> bool {
        self.invariant_mass != INVALID_MASS
    }
}

impl fmt::Display for BilliorVertex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let err = self.position_errors();
        writeln!(f, "{} vertex", self.algorithm())?;
        writeln!(
            f,
            "  position  ({:.4}, {:.4}, {:.4}) +- ({:.4}, {:.4}, {:.4}) mm",
            self.position.x, self.position.y, self.position.z, err.x, err.y, err.z
        )?;
        writeln!(f, "  chi2/ndf  {:.3}/{}", self.chi2, self.ndf)?;
        for (i, chi2) in self.track_chi2.iter().enumerate() {
            writeln!(f, "  chi2[{}]   {:.3}", i, chi2)?;
        }
        match self.invariant_mass_error {
            Some(mass_err) if self.has_valid_mass() => {
                writeln!(f, "  mass      {:.5} +- {:.5} GeV", self.invariant_mass, mass_err)?
            }
            _ => writeln!(f, "  mass      {:.5} GeV", self.invariant_mass)?,
        }
        for (i, p) in self.track_momenta.iter().enumerate() {
            writeln!(f, "  p[{}]      ({:.4}, {:.4}, {:.4}) GeV", i, p.x, p.y, p.z)?;
        }
        if let Some(projection) = &self.target_projection {
            write!(
                f,
                "  target    ({:.4}, {:.4}) mm at z = {:.3}",
                projection.position.x, projection.position.y, projection.plane_z
            )?;
        }
        Ok(())
    }
}
