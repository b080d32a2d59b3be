//! The Billoir vertex fitter.
//!
//! Solves for the common vertex `V` and the per-track momenta `q_i` that
//! minimise `sum_i r_i^T G_i r_i` under the linearized perigee model, with
//! the momenta eliminated analytically so only a 3×3 system is inverted.
//! An optional beam constraint is then folded in as a Kalman update of the
//! joint state `[V, q_1, ..., q_n]`.

use crate::config::{ConstraintMode, VertexerConfig};
use crate::constraint::BeamConstraint;
use crate::error::VertexError;
use crate::kinematics;
use crate::linearize::{invert_spd, seed_momentum, TrackLinearization};
use crate::track::BilliorTrack;
use crate::vertex::BilliorVertex;
use nalgebra::{DMatrix, DVector, Matrix3, Vector3};
use serde::{Deserialize, Serialize};
use tracing::debug;

// =============================================================================
// FIT STATE
// =============================================================================

/// Joint estimate of the vertex and the track momenta at the vertex, in the
/// tracking frame.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VertexFitState {
    /// `[V, q_1, ..., q_n]` with `q = (theta, phi, rho)` at the vertex
    /// Size: 3 * (n_tracks + 1)
    pub state_vector: DVector<f64>,

    /// Joint covariance in 3×3 blocks: `C00` vertex, `C0j` vertex/momentum,
    /// `Cij` momentum/momentum
    pub covariance: DMatrix<f64>,

    /// Number of tracks in the fit
    pub n_tracks: usize,

    /// Track residual chi² plus any constraint contribution
    pub chi2: f64,

    /// Residual chi² of each track at the track-only solution, in input order
    pub track_chi2: Vec<f64>,

    /// Constraint folded into this state
    pub constraint: ConstraintMode,

    /// Linearization passes used
    pub iterations: usize,
}

impl VertexFitState {
    pub fn vertex(&self) -> Vector3<f64> {
        self.state_vector.fixed_rows::<3>(0).into_owned()
    }

    pub fn vertex_covariance(&self) -> Matrix3<f64> {
        self.covariance.fixed_view::<3, 3>(0, 0).into_owned()
    }

    /// `(theta, phi, rho)` of track `i` at the vertex.
    pub fn momentum_parameters(&self, i: usize) -> Result<Vector3<f64>, VertexError> {
        let offset = self.block_offset(i)?;
        Ok(self.state_vector.fixed_rows::<3>(offset).into_owned())
    }

    /// `C0j`: covariance between the vertex and track `j`'s momentum.
    pub fn vertex_momentum_covariance(&self, j: usize) -> Result<Matrix3<f64>, VertexError> {
        let col = self.block_offset(j)?;
        Ok(self.covariance.fixed_view::<3, 3>(0, col).into_owned())
    }

    /// `Cij`: covariance between the momenta of tracks `i` and `j`.
    pub fn momentum_covariance(&self, i: usize, j: usize) -> Result<Matrix3<f64>, VertexError> {
        let row = self.block_offset(i)?;
        let col = self.block_offset(j)?;
        Ok(self.covariance.fixed_view::<3, 3>(row, col).into_owned())
    }

    /// Degrees of freedom: two per track, minus the vertex, plus the constraint.
    pub fn ndf(&self) -> usize {
        (2 * self.n_tracks + self.constraint.extra_ndf()).saturating_sub(3)
    }

    fn block_offset(&self, i: usize) -> Result<usize, VertexError> {
        if i >= self.n_tracks {
            return Err(VertexError::TrackIndex {
                index: i,
                count: self.n_tracks,
            });
        }
        Ok(3 * (i + 1))
    }

    fn translate_vertex(&mut self, shift: &Vector3<f64>) {
        let mut vertex = self.state_vector.fixed_rows_mut::<3>(0);
        vertex += shift;
    }
}

// =============================================================================
// VERTEXER
// =============================================================================

/// Billoir fitter for two or more tracks.
#[derive(Debug, Clone, Default)]
pub struct BilliorVertexer {
    config: VertexerConfig,
}

impl BilliorVertexer {
    /// Unconstrained fitter for the given field (Tesla).
    pub fn new(b_field: f64) -> Self {
        Self::with_config(VertexerConfig::new(b_field))
    }

    pub fn with_config(config: VertexerConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &VertexerConfig {
        &self.config
    }

    pub fn config_mut(&mut self) -> &mut VertexerConfig {
        &mut self.config
    }

    /// Fits the tracks and reports the result in detector coordinates.
    pub fn fit(&self, tracks: &[BilliorTrack]) -> Result<BilliorVertex, VertexError> {
        let state = self.fit_state(tracks)?;
        BilliorVertex::from_state(&state, &self.config)
    }

    /// Fits the tracks and returns the tracking-frame joint state.
    pub fn fit_state(&self, tracks: &[BilliorTrack]) -> Result<VertexFitState, VertexError> {
        if tracks.len() < 2 {
            return Err(VertexError::TooFewTracks(tracks.len()));
        }
        self.config.validate()?;

        let reference = Vector3::from(self.config.reference_position);
        let mut state = self.fit_tracks(tracks, &reference)?;

        let beam = BeamConstraint::new(
            self.config.constraint,
            Vector3::from(self.config.beam_position) - reference,
            Vector3::from(self.config.beam_size),
            kinematics::field_constant(self.config.b_field),
        );
        if let Some(beam) = beam {
            let chi2 = beam.apply(
                &mut state,
                self.config.max_iterations,
                self.config.convergence_tolerance,
            )?;
            debug!(
                constraint = %self.config.constraint,
                chi2,
                "Applied beam constraint"
            );
        }

        state.translate_vertex(&reference);
        Ok(state)
    }

    /// Track-only solve, relinearizing at the fitted point if configured.
    /// Works relative to `reference`.
    fn fit_tracks(
        &self,
        tracks: &[BilliorTrack],
        reference: &Vector3<f64>,
    ) -> Result<VertexFitState, VertexError> {
        let mut v0 = Vector3::from(self.config.seed_vertex) - reference;
        let mut q0: Vec<Vector3<f64>> = tracks.iter().map(|t| seed_momentum(t, &v0)).collect();

        let mut iterations = 0;
        loop {
            let mut state = solve_linearized(tracks, &v0, &q0)?;
            iterations += 1;
            state.iterations = iterations;

            let shift = (state.vertex() - v0).norm();
            debug!(iteration = iterations, shift, chi2 = state.chi2, "Billoir pass");

            if iterations >= self.config.max_iterations || shift < self.config.convergence_tolerance {
                return Ok(state);
            }

            v0 = state.vertex();
            q0 = (0..tracks.len())
                .map(|i| state.momentum_parameters(i))
                .collect::<Result<_, _>>()?;
        }
    }
}

/// One pass of the Billoir solve around `(v0, q0_i)`.
fn solve_linearized(
    tracks: &[BilliorTrack],
    v0: &Vector3<f64>,
    q0: &[Vector3<f64>],
) -> Result<VertexFitState, VertexError> {
    let lins: Vec<TrackLinearization> = tracks
        .iter()
        .zip(q0)
        .map(|(track, q)| TrackLinearization::new(track, v0, q))
        .collect::<Result<_, _>>()?;

    // Vertex information with the momenta profiled out
    let mut information = Matrix3::zeros();
    let mut rhs = Vector3::zeros();
    for lin in &lins {
        information += lin.vertex_information() - lin.d * lin.e_inv * lin.d.transpose();
        let projected_weight =
            lin.weight - lin.weight * lin.b * lin.e_inv * lin.b.transpose() * lin.weight;
        rhs += lin.a.transpose() * projected_weight * lin.measured;
    }
    let vertex_cov = invert_spd(&information, "vertex information")?;
    let vertex = vertex_cov * rhs;

    let n = lins.len();
    let dim = 3 * (n + 1);
    let mut state_vector = DVector::zeros(dim);
    let mut covariance = DMatrix::zeros(dim, dim);
    state_vector.fixed_rows_mut::<3>(0).copy_from(&vertex);
    covariance.fixed_view_mut::<3, 3>(0, 0).copy_from(&vertex_cov);

    // C0j = -Cvv D_j E_j^-1
    let cross: Vec<Matrix3<f64>> = lins
        .iter()
        .map(|lin| -(vertex_cov * lin.d * lin.e_inv))
        .collect();

    let mut track_chi2 = Vec::with_capacity(n);
    for (j, lin) in lins.iter().enumerate() {
        let q = lin.momentum_at(&vertex);
        let residual = lin.chi2(&vertex, &q);
        debug!(track = j, chi2 = residual, "Track residual");
        track_chi2.push(residual);

        let col = 3 * (j + 1);
        state_vector.fixed_rows_mut::<3>(col).copy_from(&q);
        covariance.fixed_view_mut::<3, 3>(0, col).copy_from(&cross[j]);
        covariance.fixed_view_mut::<3, 3>(col, 0).copy_from(&cross[j].transpose());

        // Cij = delta_ij E_i^-1 - E_i^-1 D_i^T C0j
        for (i, other) in lins.iter().enumerate() {
            let mut block = -(other.e_inv * other.d.transpose() * cross[j]);
            if i == j {
                block += other.e_inv;
            }
            covariance
                .fixed_view_mut::<3, 3>(3 * (i + 1), col)
                .copy_from(&block);
        }
    }

    let covariance = (&covariance + covariance.transpose()) * 0.5;

    Ok(VertexFitState {
        state_vector,
        covariance,
        n_tracks: n,
        chi2: track_chi2.iter().sum(),
        track_chi2,
        constraint: ConstraintMode::Unconstrained,
        iterations: 0,
    })
}
