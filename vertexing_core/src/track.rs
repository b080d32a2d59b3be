//! Track parameterizations at the fitter boundary.
//!
//! Reconstruction hands over helices `[d0, phi0, omega, z0, tan_lambda]`.
//! The fitter works in the perigee set `[eps, z0, theta, phi0, rho]` and
//! converts once when a [`BilliorTrack`] is built.

use crate::error::VertexError;
use nalgebra::{Matrix5, Vector3, Vector5};
use serde::{Deserialize, Serialize};
use std::f64::consts::FRAC_PI_2;

// =============================================================================
// NATIVE HELIX
// =============================================================================

/// Helix track as produced by reconstruction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HelixTrack {
    /// [d0, phi0, omega, z0, tan_lambda]
    pub parameters: Vector5<f64>,

    /// Covariance in the same parameter order
    pub covariance: Matrix5<f64>,
}

impl HelixTrack {
    pub const D0: usize = 0;
    pub const PHI0: usize = 1;
    pub const OMEGA: usize = 2;
    pub const Z0: usize = 3;
    pub const TAN_LAMBDA: usize = 4;

    pub fn new(parameters: [f64; 5], covariance: Matrix5<f64>) -> Self {
        Self {
            parameters: Vector5::from(parameters),
            covariance,
        }
    }

    /// Helix with an uncorrelated covariance built from per-parameter sigmas.
    pub fn with_errors(parameters: [f64; 5], sigmas: [f64; 5]) -> Self {
        let variances = Vector5::from(sigmas).map(|s| s * s);
        Self::new(parameters, Matrix5::from_diagonal(&variances))
    }

    pub fn d0(&self) -> f64 {
        self.parameters[Self::D0]
    }

    pub fn phi0(&self) -> f64 {
        self.parameters[Self::PHI0]
    }

    pub fn omega(&self) -> f64 {
        self.parameters[Self::OMEGA]
    }

    pub fn z0(&self) -> f64 {
        self.parameters[Self::Z0]
    }

    pub fn tan_lambda(&self) -> f64 {
        self.parameters[Self::TAN_LAMBDA]
    }
}

// =============================================================================
// FITTER PERIGEE PARAMETERS
// =============================================================================

/// Track in the fitter's perigee parameterization.
///
/// `eps = -d0`, `theta = pi/2 - atan(tan_lambda)`, `rho = omega`; the
/// covariance is carried through the conversion Jacobian.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BilliorTrack {
    parameters: Vector5<f64>,
    covariance: Matrix5<f64>,
}

impl BilliorTrack {
    pub const EPS: usize = 0;
    pub const Z0: usize = 1;
    pub const THETA: usize = 2;
    pub const PHI0: usize = 3;
    pub const RHO: usize = 4;

    /// Builds a track directly from perigee parameters `[eps, z0, theta, phi0, rho]`.
    pub fn new(parameters: Vector5<f64>, covariance: Matrix5<f64>) -> Self {
        Self {
            parameters,
            covariance: symmetrize(&covariance),
        }
    }

    /// Converts a reconstruction helix.
    pub fn from_helix(track: &HelixTrack) -> Self {
        let p = &track.parameters;
        let parameters = Vector5::new(
            -p[HelixTrack::D0],
            p[HelixTrack::Z0],
            FRAC_PI_2 - p[HelixTrack::TAN_LAMBDA].atan(),
            p[HelixTrack::PHI0],
            p[HelixTrack::OMEGA],
        );
        let jac = helix_to_perigee_jacobian(p[HelixTrack::TAN_LAMBDA]);
        Self::new(parameters, jac * track.covariance * jac.transpose())
    }

    /// Converts back to the reconstruction helix convention.
    pub fn to_helix(&self) -> HelixTrack {
        let theta = self.theta();
        let parameters = Vector5::new(
            -self.eps(),
            self.phi0(),
            self.rho(),
            self.z0(),
            theta.cos() / theta.sin(),
        );
        let jac = perigee_to_helix_jacobian(theta);
        HelixTrack {
            parameters,
            covariance: symmetrize(&(jac * self.covariance * jac.transpose())),
        }
    }

    pub fn parameters(&self) -> &Vector5<f64> {
        &self.parameters
    }

    pub fn covariance(&self) -> &Matrix5<f64> {
        &self.covariance
    }

    pub fn eps(&self) -> f64 {
        self.parameters[Self::EPS]
    }

    pub fn z0(&self) -> f64 {
        self.parameters[Self::Z0]
    }

    pub fn theta(&self) -> f64 {
        self.parameters[Self::THETA]
    }

    pub fn phi0(&self) -> f64 {
        self.parameters[Self::PHI0]
    }

    pub fn rho(&self) -> f64 {
        self.parameters[Self::RHO]
    }

    /// Direction and curvature `(theta, phi0, rho)` at the perigee.
    pub fn momentum_parameters(&self) -> Vector3<f64> {
        Vector3::new(self.theta(), self.phi0(), self.rho())
    }

    /// Inverse covariance `G`.
    pub fn weight_matrix(&self) -> Result<Matrix5<f64>, VertexError> {
        self.covariance
            .cholesky()
            .map(|chol| symmetrize(&chol.inverse()))
            .ok_or_else(|| VertexError::singular("track covariance"))
    }
}

impl From<&HelixTrack> for BilliorTrack {
    fn from(track: &HelixTrack) -> Self {
        Self::from_helix(track)
    }
}

/// d[eps, z0, theta, phi0, rho] / d[d0, phi0, omega, z0, tan_lambda]
fn helix_to_perigee_jacobian(tan_lambda: f64) -> Matrix5<f64> {
    let dtheta = -1.0 / (1.0 + tan_lambda * tan_lambda);
    Matrix5::new(
        -1.0, 0.0, 0.0, 0.0, 0.0,
        0.0, 0.0, 0.0, 1.0, 0.0,
        0.0, 0.0, 0.0, 0.0, dtheta,
        0.0, 1.0, 0.0, 0.0, 0.0,
        0.0, 0.0, 1.0, 0.0, 0.0,
    )
}

/// d[d0, phi0, omega, z0, tan_lambda] / d[eps, z0, theta, phi0, rho]
fn perigee_to_helix_jacobian(theta: f64) -> Matrix5<f64> {
    let sin_theta = theta.sin();
    let dtan = -1.0 / (sin_theta * sin_theta);
    Matrix5::new(
        -1.0, 0.0, 0.0, 0.0, 0.0,
        0.0, 0.0, 0.0, 1.0, 0.0,
        0.0, 0.0, 0.0, 0.0, 1.0,
        0.0, 1.0, 0.0, 0.0, 0.0,
        0.0, 0.0, dtan, 0.0, 0.0,
    )
}

fn symmetrize(m: &Matrix5<f64>) -> Matrix5<f64> {
    (m + m.transpose()) * 0.5
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn helix() -> HelixTrack {
        let mut cov = Matrix5::from_diagonal(&Vector5::new(0.04, 1e-6, 1e-10, 0.01, 4e-6));
        cov[(0, 1)] = 2e-5;
        cov[(1, 0)] = 2e-5;
        cov[(3, 4)] = -1e-4;
        cov[(4, 3)] = -1e-4;
        HelixTrack::new([0.35, 0.03, -2.1e-4, -0.12, 0.04], cov)
    }

    #[test]
    fn test_parameter_mapping() {
        let track = BilliorTrack::from_helix(&helix());
        assert_relative_eq!(track.eps(), -0.35);
        assert_relative_eq!(track.z0(), -0.12);
        assert_relative_eq!(track.theta(), FRAC_PI_2 - 0.04f64.atan());
        assert_relative_eq!(track.phi0(), 0.03);
        assert_relative_eq!(track.rho(), -2.1e-4);
    }

    #[test]
    fn test_covariance_mapping() {
        let track = BilliorTrack::from_helix(&helix());
        let cov = track.covariance();
        // d0 -> eps flips sign of the d0/phi0 correlation
        assert_relative_eq!(cov[(BilliorTrack::EPS, BilliorTrack::PHI0)], -2e-5);
        let dtheta = 1.0 / (1.0 + 0.04 * 0.04);
        assert_relative_eq!(
            cov[(BilliorTrack::THETA, BilliorTrack::THETA)],
            4e-6 * dtheta * dtheta,
            max_relative = 1e-12
        );
        assert_relative_eq!(cov[(BilliorTrack::Z0, BilliorTrack::THETA)], 1e-4 * dtheta, max_relative = 1e-12);
        assert_relative_eq!(*cov, cov.transpose());
    }

    #[test]
    fn test_helix_round_trip() {
        let original = helix();
        let back = BilliorTrack::from_helix(&original).to_helix();
        assert_relative_eq!(back.parameters, original.parameters, epsilon = 1e-12);
        assert_relative_eq!(back.covariance, original.covariance, epsilon = 1e-15);
    }

    #[test]
    fn test_weight_matrix_inverts_covariance() {
        let track = BilliorTrack::from_helix(&helix());
        let g = track.weight_matrix().unwrap();
        assert_relative_eq!(g * track.covariance(), Matrix5::identity(), epsilon = 1e-8);
    }

    #[test]
    fn test_singular_covariance_reported() {
        let track = BilliorTrack::new(Vector5::zeros(), Matrix5::zeros());
        assert_eq!(
            track.weight_matrix(),
            Err(VertexError::singular("track covariance"))
        );
    }
}
