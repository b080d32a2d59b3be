//! Momentum, invariant mass and target projection from a fitted state.

use crate::billoir::VertexFitState;
use crate::error::VertexError;
use nalgebra::{DMatrix, DVector, Matrix2, Matrix3, Vector2, Vector3};

/// Curvature-to-momentum conversion, GeV / (T mm).
pub const FIELD_CONVERSION: f64 = 2.99792458e-4;

/// Mass hypothesis for the daughters (GeV).
pub const ELECTRON_MASS: f64 = 0.000511;

/// Returned in place of a mass when the four-momentum sum is not time-like.
pub const INVALID_MASS: f64 = -99.0;

/// `B * FIELD_CONVERSION`: transverse momentum times curvature.
pub fn field_constant(b_field: f64) -> f64 {
    b_field * FIELD_CONVERSION
}

/// `pt = |k / rho|`.
pub fn transverse_momentum(rho: f64, field_constant: f64) -> f64 {
    (field_constant / rho).abs()
}

/// Tracking-frame momentum of `q = (theta, phi, rho)`.
pub fn momentum(q: &Vector3<f64>, field_constant: f64) -> Vector3<f64> {
    let pt = transverse_momentum(q[2], field_constant);
    let (sin_phi, cos_phi) = q[1].sin_cos();
    Vector3::new(pt * cos_phi, pt * sin_phi, pt * q[0].cos() / q[0].sin())
}

/// `d(px, py, pz) / d(theta, phi, rho)`.
pub fn momentum_jacobian(q: &Vector3<f64>, field_constant: f64) -> Matrix3<f64> {
    let p = momentum(q, field_constant);
    let pt = transverse_momentum(q[2], field_constant);
    let rho = q[2];
    let sin_theta = q[0].sin();
    Matrix3::new(
        0.0, -p.y, -p.x / rho,
        0.0, p.x, -p.y / rho,
        -pt / (sin_theta * sin_theta), 0.0, -p.z / rho,
    )
}

/// Propagates a `(theta, phi, rho)` covariance to momentum space.
pub fn momentum_covariance(q: &Vector3<f64>, cov: &Matrix3<f64>, field_constant: f64) -> Matrix3<f64> {
    let jac = momentum_jacobian(q, field_constant);
    let c = jac * cov * jac.transpose();
    (c + c.transpose()) * 0.5
}

/// Invariant mass of the momenta under a common mass hypothesis,
/// or [`INVALID_MASS`] when `m^2 <= 0`.
///
/// Sums any number of four-vectors; the fitted-vertex mass and its
/// uncertainties are only reported for two tracks.
pub fn invariant_mass(momenta: &[Vector3<f64>], mass: f64) -> f64 {
    let (energy, total) = sums(momenta, mass);
    let m2 = energy * energy - total.norm_squared();
    if m2 > 0.0 {
        m2.sqrt()
    } else {
        INVALID_MASS
    }
}

fn sums(momenta: &[Vector3<f64>], mass: f64) -> (f64, Vector3<f64>) {
    momenta.iter().fold((0.0, Vector3::zeros()), |(e, p), pi| {
        (e + (pi.norm_squared() + mass * mass).sqrt(), p + pi)
    })
}

/// `dM/dp_i` for every input momentum, or `None` for an invalid mass.
fn mass_gradient(momenta: &[Vector3<f64>], mass: f64) -> Option<Vec<Vector3<f64>>> {
    let m = invariant_mass(momenta, mass);
    if m <= 0.0 {
        return None;
    }
    let (energy, total) = sums(momenta, mass);
    Some(
        momenta
            .iter()
            .map(|p| {
                let e = (p.norm_squared() + mass * mass).sqrt();
                (p * (energy / e) - total) / m
            })
            .collect(),
    )
}

/// Two-track mass uncertainty from the diagonal momentum variances only.
///
/// Cross terms inside each track and between tracks are ignored, which
/// underestimates or overestimates the error depending on the correlations.
/// [`invariant_mass_uncertainty_full`] uses the whole covariance.
///
/// `None` when the pair mass is undefined.
pub fn invariant_mass_uncertainty(
    p1: &Vector3<f64>,
    p2: &Vector3<f64>,
    cov1: &Matrix3<f64>,
    cov2: &Matrix3<f64>,
    mass: f64,
) -> Option<f64> {
    let grad = mass_gradient(&[*p1, *p2], mass)?;
    let variance: f64 = (0..3)
        .map(|k| grad[0][k].powi(2) * cov1[(k, k)] + grad[1][k].powi(2) * cov2[(k, k)])
        .sum();
    Some(variance.sqrt())
}

/// First-order mass uncertainty of a two-track fit using the full momentum
/// covariance, including correlations between the tracks.
///
/// `Ok(None)` when the pair mass is undefined.
pub fn invariant_mass_uncertainty_full(
    state: &VertexFitState,
    field_constant: f64,
    mass: f64,
) -> Result<Option<f64>, VertexError> {
    let n = state.n_tracks;
    if n != 2 {
        return Err(VertexError::RequiresTwoTracks(n));
    }
    let params = (0..n)
        .map(|i| state.momentum_parameters(i))
        .collect::<Result<Vec<_>, _>>()?;
    let momenta: Vec<Vector3<f64>> = params.iter().map(|q| momentum(q, field_constant)).collect();

    let Some(grad) = mass_gradient(&momenta, mass) else {
        return Ok(None);
    };
    // dM/dq_i = J_i^T dM/dp_i
    let grad_q: Vec<Vector3<f64>> = params
        .iter()
        .zip(&grad)
        .map(|(q, g)| momentum_jacobian(q, field_constant).transpose() * g)
        .collect();

    let mut variance = 0.0;
    for i in 0..n {
        for j in 0..n {
            variance += grad_q[i].dot(&(state.momentum_covariance(i, j)? * grad_q[j]));
        }
    }
    Ok(Some(variance.max(0.0).sqrt()))
}

/// Sum of the track momenta in the state.
pub fn summed_momentum(state: &VertexFitState, field_constant: f64) -> Result<Vector3<f64>, VertexError> {
    (0..state.n_tracks).try_fold(Vector3::zeros(), |total, i| {
        Ok(total + momentum(&state.momentum_parameters(i)?, field_constant))
    })
}

// =============================================================================
// PROJECTION TO A PLANE OF CONSTANT t0
// =============================================================================

/// Transverse `(t1, t2)` where the line through `vertex` along `direction`
/// crosses the plane `t0 = plane`.
pub fn project_to_plane(
    vertex: &Vector3<f64>,
    direction: &Vector3<f64>,
    plane: f64,
) -> Result<Vector2<f64>, VertexError> {
    if direction.x == 0.0 || !direction.x.is_finite() {
        return Err(VertexError::degenerate(
            "momentum has no component along the beam",
        ));
    }
    let dx = vertex.x - plane;
    Ok(Vector2::new(
        vertex.y - direction.y / direction.x * dx,
        vertex.z - direction.z / direction.x * dx,
    ))
}

/// Jacobian (2 × dim) of [`project_to_plane`] with the summed momentum,
/// taken with respect to the joint state `[V, q_1, ..., q_n]`.
pub fn projection_jacobian(
    state_vector: &DVector<f64>,
    n_tracks: usize,
    plane: f64,
    field_constant: f64,
) -> Result<DMatrix<f64>, VertexError> {
    let vertex: Vector3<f64> = state_vector.fixed_rows::<3>(0).into_owned();
    let params: Vec<Vector3<f64>> = (0..n_tracks)
        .map(|i| state_vector.fixed_rows::<3>(3 * (i + 1)).into_owned())
        .collect();
    let total = params
        .iter()
        .fold(Vector3::zeros(), |acc, q| acc + momentum(q, field_constant));
    if total.x == 0.0 || !total.x.is_finite() {
        return Err(VertexError::degenerate(
            "momentum has no component along the beam",
        ));
    }

    let dx = vertex.x - plane;
    let px2 = total.x * total.x;
    let mut jac = DMatrix::zeros(2, 3 * (n_tracks + 1));
    jac[(0, 0)] = -total.y / total.x;
    jac[(0, 1)] = 1.0;
    jac[(1, 0)] = -total.z / total.x;
    jac[(1, 2)] = 1.0;

    for (i, q) in params.iter().enumerate() {
        let dp = momentum_jacobian(q, field_constant);
        for k in 0..3 {
            let col = 3 * (i + 1) + k;
            let (dpx, dpy, dpz) = (dp[(0, k)], dp[(1, k)], dp[(2, k)]);
            jac[(0, col)] = -dx * (dpy * total.x - total.y * dpx) / px2;
            jac[(1, col)] = -dx * (dpz * total.x - total.z * dpx) / px2;
        }
    }
    Ok(jac)
}

/// Projected position of the fitted pair at `t0 = plane` and its covariance.
pub fn projected_position(
    state: &VertexFitState,
    plane: f64,
    field_constant: f64,
) -> Result<(Vector2<f64>, Matrix2<f64>), VertexError> {
    if state.n_tracks != 2 {
        return Err(VertexError::RequiresTwoTracks(state.n_tracks));
    }
    let total = summed_momentum(state, field_constant)?;
    let position = project_to_plane(&state.vertex(), &total, plane)?;
    let jac = projection_jacobian(&state.state_vector, state.n_tracks, plane, field_constant)?;
    let cov = &jac * &state.covariance * jac.transpose();
    let cov = Matrix2::new(
        cov[(0, 0)],
        0.5 * (cov[(0, 1)] + cov[(1, 0)]),
        0.5 * (cov[(0, 1)] + cov[(1, 0)]),
        cov[(1, 1)],
    );
    Ok((position, cov))
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    const K: f64 = 0.5 * FIELD_CONVERSION;

    #[test]
    fn test_momentum_from_curvature() {
        // pt = 1 GeV at theta = 45 degrees
        let q = Vector3::new(std::f64::consts::FRAC_PI_4, 0.0, K);
        let p = momentum(&q, K);
        assert_relative_eq!(p, Vector3::new(1.0, 0.0, 1.0), epsilon = 1e-12);

        // curvature sign does not change the momentum
        let q_neg = Vector3::new(std::f64::consts::FRAC_PI_4, 0.0, -K);
        assert_relative_eq!(momentum(&q_neg, K), p, epsilon = 1e-12);
    }

    #[test]
    fn test_momentum_jacobian_matches_finite_difference() {
        for rho in [1.8e-4, -2.3e-4] {
            let q = Vector3::new(1.45, 0.12, rho);
            let analytic = momentum_jacobian(&q, K);
            for k in 0..3 {
                let step = if k == 2 { 1e-9 } else { 1e-7 };
                let mut hi = q;
                let mut lo = q;
                hi[k] += step;
                lo[k] -= step;
                let numeric = (momentum(&hi, K) - momentum(&lo, K)) / (2.0 * step);
                assert_relative_eq!(analytic.column(k).into_owned(), numeric, max_relative = 1e-5);
            }
        }
    }

    #[test]
    fn test_invariant_mass_back_to_back() {
        let p = 0.05;
        let momenta = [Vector3::new(0.0, p, 0.0), Vector3::new(0.0, -p, 0.0)];
        let expected = 2.0 * (p * p + ELECTRON_MASS * ELECTRON_MASS).sqrt();
        assert_relative_eq!(invariant_mass(&momenta, ELECTRON_MASS), expected, epsilon = 1e-12);
    }

    #[test]
    fn test_collinear_massless_pair_is_invalid() {
        let momenta = [Vector3::new(1.0, 0.0, 0.0), Vector3::new(2.0, 0.0, 0.0)];
        assert_eq!(invariant_mass(&momenta, 0.0), INVALID_MASS);
        assert_eq!(
            invariant_mass_uncertainty(&momenta[0], &momenta[1], &Matrix3::identity(), &Matrix3::identity(), 0.0),
            None
        );
    }

    #[test]
    fn test_diagonal_mass_error_matches_closed_form() {
        let p1: Vector3<f64> = Vector3::new(0.8, 0.03, 0.02);
        let p2: Vector3<f64> = Vector3::new(0.7, -0.04, -0.015);
        let cov1 = Matrix3::from_diagonal(&Vector3::new(4e-4, 1e-6, 2e-6));
        let cov2 = Matrix3::from_diagonal(&Vector3::new(3e-4, 2e-6, 1e-6));
        let m = ELECTRON_MASS;

        let e1 = (p1.norm_squared() + m * m).sqrt();
        let e2 = (p2.norm_squared() + m * m).sqrt();
        let mut num = 0.0;
        for k in 0..3 {
            num += ((p2[k] * e1 - p1[k] * e2) / e1).powi(2) * cov1[(k, k)];
            num += ((p2[k] * e1 - p1[k] * e2) / e2).powi(2) * cov2[(k, k)];
        }
        let ratio = num / (4.0 * (p1.dot(&p2) - (m * m + e1 * e2)).powi(2));
        let mass = invariant_mass(&[p1, p2], m);
        let expected = (ratio * mass * mass).sqrt();

        assert_relative_eq!(
            invariant_mass_uncertainty(&p1, &p2, &cov1, &cov2, m).unwrap(),
            expected,
            max_relative = 1e-9
        );
    }

    fn three_track_state() -> VertexFitState {
        VertexFitState {
            state_vector: DVector::from_vec(vec![
                5.0, 0.1, -0.05, // vertex
                1.52, 0.05, 2.0e-4, // track 1
                1.61, -0.06, -1.7e-4, // track 2
                1.57, 0.01, 1.2e-4, // track 3
            ]),
            covariance: DMatrix::identity(12, 12) * 1e-8,
            n_tracks: 3,
            chi2: 1.0,
            track_chi2: vec![0.3, 0.3, 0.4],
            constraint: crate::config::ConstraintMode::Unconstrained,
            iterations: 1,
        }
    }

    #[test]
    fn test_pair_quantities_need_two_tracks() {
        let state = three_track_state();
        assert_eq!(
            invariant_mass_uncertainty_full(&state, K, ELECTRON_MASS).unwrap_err(),
            VertexError::RequiresTwoTracks(3)
        );
        assert_eq!(
            projected_position(&state, 0.0, K).unwrap_err(),
            VertexError::RequiresTwoTracks(3)
        );
        // the bare mass sums any number of tracks
        let momenta: Vec<_> = (0..3)
            .map(|i| momentum(&state.momentum_parameters(i).unwrap(), K))
            .collect();
        assert!(invariant_mass(&momenta, ELECTRON_MASS) > 0.0);
    }

    #[test]
    fn test_projection_to_plane() {
        let vertex = Vector3::new(10.0, 1.0, -0.5);
        let direction = Vector3::new(2.0, 0.2, -0.1);
        let projected = project_to_plane(&vertex, &direction, 0.0).unwrap();
        assert_relative_eq!(projected, Vector2::new(0.0, 0.0), epsilon = 1e-12);

        assert!(project_to_plane(&vertex, &Vector3::new(0.0, 1.0, 0.0), 0.0).is_err());
    }

    #[test]
    fn test_projection_jacobian_matches_finite_difference() {
        let mut state = DVector::from_vec(vec![
            12.0, 0.4, -0.2, // vertex
            1.52, 0.05, 2.0e-4, // track 1
            1.61, -0.06, -1.7e-4, // track 2
        ]);
        let plane = -4.3;
        let analytic = projection_jacobian(&state, 2, plane, K).unwrap();

        let project = |s: &DVector<f64>| {
            let v: Vector3<f64> = s.fixed_rows::<3>(0).into_owned();
            let q1: Vector3<f64> = s.fixed_rows::<3>(3).into_owned();
            let q2: Vector3<f64> = s.fixed_rows::<3>(6).into_owned();
            project_to_plane(&v, &(momentum(&q1, K) + momentum(&q2, K)), plane).unwrap()
        };
        for col in 0..9 {
            let step = if col % 3 == 2 && col > 0 { 1e-10 } else { 1e-7 };
            let base = state[col];
            state[col] = base + step;
            let hi = project(&state);
            state[col] = base - step;
            let lo = project(&state);
            state[col] = base;
            let numeric = (hi - lo) / (2.0 * step);
            assert_relative_eq!(analytic[(0, col)], numeric.x, epsilon = 1e-5, max_relative = 1e-5);
            assert_relative_eq!(analytic[(1, col)], numeric.y, epsilon = 1e-5, max_relative = 1e-5);
        }
    }
}
