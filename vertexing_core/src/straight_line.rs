//! Vertex fit for straight-line tracks in a field-free region.
//!
//! Tracks are measured as `(y0, dy/dx, z0, dz/dx)` on the plane `x = x_ref`.
//! The vertex is an unmeasured variable and every track contributes two
//! constraints
//!
//! ```text
//! f_y = y0 + y' (xv - x_ref) - yv = 0
//! f_z = z0 + z' (xv - x_ref) - zv = 0
//! ```
//!
//! solved with Lagrange multipliers, iterating until the constraints hold
//! within tolerance.

use crate::track::BilliorTrack;
use nalgebra::{DMatrix, DVector, Matrix4, Matrix4x5, Matrix3, Vector3, Vector4};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// Straight track on the reference plane.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StraightLineTrack {
    /// [y0, dy/dx, z0, dz/dx]
    pub parameters: Vector4<f64>,
    pub covariance: Matrix4<f64>,
}

impl StraightLineTrack {
    pub const Y0: usize = 0;
    pub const DYDX: usize = 1;
    pub const Z0: usize = 2;
    pub const DZDX: usize = 3;

    pub fn new(parameters: [f64; 4], covariance: Matrix4<f64>) -> Self {
        Self {
            parameters: Vector4::from(parameters),
            covariance,
        }
    }

    /// Extrapolates the perigee tangent of `track` to the plane `x = x_ref`,
    /// ignoring curvature.
    pub fn from_helix(track: &BilliorTrack, x_ref: f64) -> Self {
        let eps = track.eps();
        let (sin_phi, cos_phi) = track.phi0().sin_cos();
        let (sin_theta, cos_theta) = track.theta().sin_cos();
        let cot = cos_theta / sin_theta;

        // perigee point (eps sin phi, -eps cos phi, z0)
        let lever = x_ref - eps * sin_phi;
        let dydx = sin_phi / cos_phi;
        let dzdx = cot / cos_phi;
        let parameters = Vector4::new(
            -eps * cos_phi + dydx * lever,
            dydx,
            track.z0() + dzdx * lever,
            dzdx,
        );

        // columns: eps, z0, theta, phi0, rho
        let sec2 = 1.0 / (cos_phi * cos_phi);
        let dcot = -1.0 / (sin_theta * sin_theta);
        let jac = Matrix4x5::new(
            -1.0 / cos_phi, 0.0, 0.0, lever * sec2, 0.0,
            0.0, 0.0, 0.0, sec2, 0.0,
            -dzdx * sin_phi, 1.0, dcot / cos_phi * lever, cot * sin_phi * sec2 * lever - cot * eps, 0.0,
            0.0, 0.0, dcot / cos_phi, cot * sin_phi * sec2, 0.0,
        );
        let covariance = jac * track.covariance() * jac.transpose();

        Self {
            parameters,
            covariance: (covariance + covariance.transpose()) * 0.5,
        }
    }

    /// Point on the track at `x`, for measurements made at `x_ref`.
    pub fn position_at(&self, x: f64, x_ref: f64) -> Vector3<f64> {
        let p = &self.parameters;
        Vector3::new(
            x,
            p[Self::Y0] + p[Self::DYDX] * (x - x_ref),
            p[Self::Z0] + p[Self::DZDX] * (x - x_ref),
        )
    }

    /// Unit direction of flight (+x).
    pub fn direction(&self) -> Vector3<f64> {
        Vector3::new(1.0, self.parameters[Self::DYDX], self.parameters[Self::DZDX]).normalize()
    }
}

/// Converged straight-line vertex.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StraightLineVertex {
    pub position: Vector3<f64>,
    pub covariance: Matrix3<f64>,
    pub chi2: f64,
    pub ndf: usize,
    /// Fitted unit direction of each track
    pub directions: Vec<Vector3<f64>>,
    pub iterations: usize,
}

/// Lagrange-multiplier fitter for straight tracks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StraightLineVertexFitter {
    /// x of the measurement plane (mm)
    pub x_ref: f64,
    /// Largest allowed constraint residual at convergence (mm)
    pub tolerance: f64,
    pub max_iterations: usize,
}

impl Default for StraightLineVertexFitter {
    fn default() -> Self {
        Self {
            x_ref: 0.0,
            tolerance: 1e-9,
            max_iterations: 100,
        }
    }
}

impl StraightLineVertexFitter {
    pub fn new(x_ref: f64) -> Self {
        Self {
            x_ref,
            ..Default::default()
        }
    }

    pub fn with_tolerance(mut self, tolerance: f64) -> Self {
        self.tolerance = tolerance;
        self
    }

    pub fn with_max_iterations(mut self, max_iterations: usize) -> Self {
        self.max_iterations = max_iterations;
        self
    }

    /// Fits a common vertex. `None` for fewer than two tracks, a singular
    /// system, or no convergence within `max_iterations`.
    pub fn fit(&self, tracks: &[StraightLineTrack]) -> Option<StraightLineVertex> {
        let n = tracks.len();
        if n < 2 {
            return None;
        }
        let n_meas = 4 * n;
        let n_cons = 2 * n;

        let mut measured = DVector::zeros(n_meas);
        let mut cov = DMatrix::zeros(n_meas, n_meas);
        for (i, track) in tracks.iter().enumerate() {
            measured.fixed_rows_mut::<4>(4 * i).copy_from(&track.parameters);
            cov.fixed_view_mut::<4, 4>(4 * i, 4 * i).copy_from(&track.covariance);
        }
        let weight = cov.clone().try_inverse()?;

        let start = self.approximate_intersection(&tracks[0], &tracks[1]);
        let mut delta: DVector<f64> = DVector::zeros(n_meas);
        let mut vertex_delta: DVector<f64> = DVector::zeros(3);

        for iteration in 0..self.max_iterations {
            let fitted = &measured + &delta;
            let vertex = start + Vector3::new(vertex_delta[0], vertex_delta[1], vertex_delta[2]);
            let lever = vertex.x - self.x_ref;

            let mut residual = DVector::zeros(n_cons);
            // df_j / d(measured_i)
            let mut bb = DMatrix::zeros(n_meas, n_cons);
            // df_j / d(vertex_k)
            let mut b_star = DMatrix::zeros(3, n_cons);
            for i in 0..n {
                let (y0, dydx, z0, dzdx) = (fitted[4 * i], fitted[4 * i + 1], fitted[4 * i + 2], fitted[4 * i + 3]);
                residual[2 * i] = y0 + dydx * lever - vertex.y;
                residual[2 * i + 1] = z0 + dzdx * lever - vertex.z;

                bb[(4 * i, 2 * i)] = 1.0;
                bb[(4 * i + 1, 2 * i)] = lever;
                bb[(4 * i + 2, 2 * i + 1)] = 1.0;
                bb[(4 * i + 3, 2 * i + 1)] = lever;

                b_star[(0, 2 * i)] = dydx;
                b_star[(1, 2 * i)] = -1.0;
                b_star[(0, 2 * i + 1)] = dzdx;
                b_star[(2, 2 * i + 1)] = -1.0;
            }

            let hh = bb.transpose() * &cov * &bb;
            let mut system = DMatrix::zeros(n_cons + 3, n_cons + 3);
            system.view_mut((0, 0), (n_cons, n_cons)).copy_from(&(-hh));
            system.view_mut((0, n_cons), (n_cons, 3)).copy_from(&b_star.transpose());
            system.view_mut((n_cons, 0), (3, n_cons)).copy_from(&b_star);

            let mut rhs = DVector::zeros(n_cons + 3);
            rhs.rows_mut(0, n_cons).copy_from(
                &(b_star.transpose() * &vertex_delta + bb.transpose() * &delta - &residual),
            );

            let Some(inverse) = system.try_inverse() else {
                warn!(iteration, "Straight-line vertex system is singular");
                return None;
            };
            let solution = &inverse * rhs;
            let alpha = solution.rows(0, n_cons).into_owned();

            if iteration > 0 && residual.iter().all(|f| f.abs() <= self.tolerance) {
                let chi2 = delta.dot(&(&weight * &delta));
                let covariance: Matrix3<f64> = inverse.fixed_view::<3, 3>(n_cons, n_cons).into_owned();
                let directions = (0..n)
                    .map(|i| Vector3::new(1.0, fitted[4 * i + 1], fitted[4 * i + 3]).normalize())
                    .collect();
                debug!(iterations = iteration + 1, chi2, "Straight-line vertex converged");
                return Some(StraightLineVertex {
                    position: vertex,
                    covariance: (covariance + covariance.transpose()) * 0.5,
                    chi2,
                    ndf: n_cons - 3,
                    directions,
                    iterations: iteration + 1,
                });
            }

            delta = -(&cov * &bb * &alpha);
            vertex_delta = solution.rows(n_cons, 3).into_owned();
        }

        warn!(max_iterations = self.max_iterations, "Straight-line vertex fit did not converge");
        None
    }

    /// Starting vertex from the xy and xz crossings of two tracks.
    fn approximate_intersection(&self, t1: &StraightLineTrack, t2: &StraightLineTrack) -> Vector3<f64> {
        let (p1, p2) = (&t1.parameters, &t2.parameters);
        let crossings: Vec<f64> = [
            (p1[0] - p2[0]) / (p2[1] - p1[1]),
            (p1[2] - p2[2]) / (p2[3] - p1[3]),
        ]
        .into_iter()
        .filter(|x| x.is_finite())
        .collect();
        let lever = if crossings.is_empty() {
            0.0
        } else {
            crossings.iter().sum::<f64>() / crossings.len() as f64
        };
        let x = self.x_ref + lever;
        (t1.position_at(x, self.x_ref) + t2.position_at(x, self.x_ref)) * 0.5
    }
}
