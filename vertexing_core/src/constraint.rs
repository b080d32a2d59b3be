//! Beam constraints applied as a progressive (Kalman) update of the joint
//! vertex/momentum state.
//!
//! Target: the vertex itself is measured at the beam spot.
//! Beamspot: the vertex, moved along the summed momentum to the beam-spot
//! plane, is measured at the beam spot. The vertex may be displaced.

use crate::billoir::VertexFitState;
use crate::config::ConstraintMode;
use crate::error::VertexError;
use crate::kinematics::{momentum, project_to_plane, projection_jacobian};
use nalgebra::{DMatrix, DVector, Matrix3, Vector3};

/// Beam spot pseudo-measurement.
#[derive(Debug, Clone, PartialEq)]
pub struct BeamConstraint {
    mode: ConstraintMode,
    beam_position: Vector3<f64>,
    beam_size: Vector3<f64>,
    field_constant: f64,
}

impl BeamConstraint {
    /// Returns `None` for [`ConstraintMode::Unconstrained`].
    pub fn new(
        mode: ConstraintMode,
        beam_position: Vector3<f64>,
        beam_size: Vector3<f64>,
        field_constant: f64,
    ) -> Option<Self> {
        match mode {
            ConstraintMode::Unconstrained => None,
            _ => Some(Self {
                mode,
                beam_position,
                beam_size,
                field_constant,
            }),
        }
    }

    pub fn mode(&self) -> ConstraintMode {
        self.mode
    }

    /// Diagonal beam spot covariance.
    pub fn beam_covariance(&self) -> Matrix3<f64> {
        Matrix3::from_diagonal(&self.beam_size.component_mul(&self.beam_size))
    }

    /// Constrained quantity `h(X)` for the joint state.
    pub fn predicted(&self, state_vector: &DVector<f64>, n_tracks: usize) -> Result<Vector3<f64>, VertexError> {
        let vertex: Vector3<f64> = state_vector.fixed_rows::<3>(0).into_owned();
        match self.mode {
            ConstraintMode::TargetConstrained => Ok(vertex),
            ConstraintMode::BeamspotConstrained => {
                let total = (0..n_tracks).fold(Vector3::zeros(), |acc, i| {
                    let q: Vector3<f64> = state_vector.fixed_rows::<3>(3 * (i + 1)).into_owned();
                    acc + momentum(&q, self.field_constant)
                });
                let projected = project_to_plane(&vertex, &total, self.beam_position.x)?;
                Ok(Vector3::new(self.beam_position.x, projected.x, projected.y))
            }
            ConstraintMode::Unconstrained => Err(VertexError::config("no constraint to predict")),
        }
    }

    /// `r = beam - h(X)`.
    pub fn residual(&self, state_vector: &DVector<f64>, n_tracks: usize) -> Result<Vector3<f64>, VertexError> {
        Ok(self.beam_position - self.predicted(state_vector, n_tracks)?)
    }

    /// `H = dh/dX` (3 × dim).
    pub fn derivative(&self, state_vector: &DVector<f64>, n_tracks: usize) -> Result<DMatrix<f64>, VertexError> {
        let dim = 3 * (n_tracks + 1);
        let mut h = DMatrix::zeros(3, dim);
        match self.mode {
            ConstraintMode::TargetConstrained => {
                h.fixed_view_mut::<3, 3>(0, 0).fill_with_identity();
            }
            ConstraintMode::BeamspotConstrained => {
                // first component is fixed at the plane and carries no information
                let jac = projection_jacobian(state_vector, n_tracks, self.beam_position.x, self.field_constant)?;
                h.rows_mut(1, 2).copy_from(&jac);
            }
            ConstraintMode::Unconstrained => {}
        }
        Ok(h)
    }

    /// Folds the constraint into `fit` and returns its chi² contribution.
    ///
    /// With `max_iterations > 1` the constraint is relinearized at the
    /// updated state (iterated extended Kalman update) until the state moves
    /// less than `tolerance`; the target constraint is linear and settles
    /// after one pass.
    pub fn apply(
        &self,
        fit: &mut VertexFitState,
        max_iterations: usize,
        tolerance: f64,
    ) -> Result<f64, VertexError> {
        let n = fit.n_tracks;
        let prior = fit.state_vector.clone();
        let noise = DMatrix::from_column_slice(3, 3, self.beam_covariance().as_slice());

        let mut expansion = prior.clone();
        let mut pass = 0;
        let (gain, h, innovation, s_inv) = loop {
            pass += 1;
            let h = self.derivative(&expansion, n)?;
            let r = self.residual(&expansion, n)?;
            // innovation of the prior, linearized at the expansion point
            let innovation = DVector::from_column_slice(r.as_slice()) - &h * (&prior - &expansion);

            // S = H C H^T + V
            let s = &h * &fit.covariance * h.transpose() + &noise;
            let s_chol = s
                .cholesky()
                .ok_or_else(|| VertexError::singular("constraint residual covariance"))?;
            let s_inv = s_chol.inverse();
            let gain = &fit.covariance * h.transpose() * &s_inv;

            let updated = &prior + &gain * &innovation;
            let shift = (&updated - &expansion).norm();
            expansion = updated;
            if pass >= max_iterations || shift < tolerance {
                break (gain, h, innovation, s_inv);
            }
        };
        fit.state_vector = expansion;

        // Joseph form: C = (I - KH) C (I - KH)^T + K V K^T
        let dim = fit.state_vector.len();
        let ikh = DMatrix::<f64>::identity(dim, dim) - &gain * &h;
        let covariance = &ikh * &fit.covariance * ikh.transpose() + &gain * &noise * gain.transpose();
        fit.covariance = (&covariance + covariance.transpose()) * 0.5;

        let chi2 = innovation.dot(&(&s_inv * &innovation));
        fit.chi2 += chi2;
        fit.constraint = self.mode;
        Ok(chi2)
    }
}
