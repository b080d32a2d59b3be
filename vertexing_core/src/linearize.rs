//! Perigee measurement model and its linearization.
//!
//! A track leaving vertex `V` with direction/curvature `q = (theta, phi, rho)`
//! has perigee parameters `p = h(V, q)`. Around an expansion point
//! `(V0, q0)` the fit uses `p ~ c + A V + B q` with `A = dh/dV`,
//! `B = dh/dq` and `c = h(V0, q0) - A V0 - B q0`, valid to first order in
//! `rho * |V|`.

use crate::error::VertexError;
use crate::track::BilliorTrack;
use nalgebra::{Matrix3, Matrix5, Matrix5x3, Vector2, Vector3, Vector5};

/// Quantities of the perigee model that every derivative shares.
struct Geometry {
    sin_phi: f64,
    cos_phi: f64,
    cot_theta: f64,
    rho: f64,
    /// Vertex component along the track direction
    u: f64,
    /// Vertex component transverse to the track direction
    v: f64,
}

impl Geometry {
    fn new(vertex: &Vector3<f64>, q: &Vector3<f64>) -> Self {
        let (sin_phi, cos_phi) = q[1].sin_cos();
        Self {
            sin_phi,
            cos_phi,
            cot_theta: q[0].cos() / q[0].sin(),
            rho: q[2],
            u: vertex.x * cos_phi + vertex.y * sin_phi,
            v: vertex.y * cos_phi - vertex.x * sin_phi,
        }
    }
}

/// `h(V, q)`: perigee `[eps, z0, theta, phi0, rho]` of a track through `vertex`.
pub fn predict_perigee(vertex: &Vector3<f64>, q: &Vector3<f64>) -> Vector5<f64> {
    let g = Geometry::new(vertex, q);
    Vector5::new(
        -g.v - 0.5 * g.rho * g.u * g.u,
        vertex.z - g.u * (1.0 - g.v * g.rho) * g.cot_theta,
        q[0],
        q[1] - g.rho * g.u,
        g.rho,
    )
}

/// `A = dh/dV` (5×3).
pub fn vertex_jacobian(vertex: &Vector3<f64>, q: &Vector3<f64>) -> Matrix5x3<f64> {
    let Geometry { sin_phi: s, cos_phi: c, cot_theta: t, rho, u, v } = Geometry::new(vertex, q);
    Matrix5x3::new(
        s - rho * u * c, -c - rho * u * s, 0.0,
        -c * t + rho * t * (c * v - s * u), -s * t + rho * t * (s * v + c * u), 1.0,
        0.0, 0.0, 0.0,
        -rho * c, -rho * s, 0.0,
        0.0, 0.0, 0.0,
    )
}

/// `B = dh/dq` (5×3), columns `(theta, phi, rho)`.
pub fn momentum_jacobian(vertex: &Vector3<f64>, q: &Vector3<f64>) -> Matrix5x3<f64> {
    let Geometry { cot_theta: t, rho, u, v, .. } = Geometry::new(vertex, q);
    Matrix5x3::new(
        0.0, u - rho * u * v, -0.5 * u * u,
        u * (1.0 - v * rho) * (1.0 + t * t), -t * v + rho * t * (v * v - u * u), u * v * t,
        1.0, 0.0, 0.0,
        0.0, 1.0 - rho * v, -u,
        0.0, 0.0, 1.0,
    )
}

/// Starting `q` for a track at `vertex`: the perigee direction turned by the
/// arc length to the vertex.
pub fn seed_momentum(track: &BilliorTrack, vertex: &Vector3<f64>) -> Vector3<f64> {
    let (sin_phi, cos_phi) = track.phi0().sin_cos();
    let u = vertex.x * cos_phi + vertex.y * sin_phi;
    Vector3::new(track.theta(), track.phi0() + track.rho() * u, track.rho())
}

/// Transverse and longitudinal impact parameters of `track` relative to `vertex`.
pub fn position_residuals(track: &BilliorTrack, vertex: &Vector3<f64>) -> Vector2<f64> {
    let predicted = predict_perigee(vertex, &seed_momentum(track, vertex));
    Vector2::new(
        track.eps() - predicted[BilliorTrack::EPS],
        track.z0() - predicted[BilliorTrack::Z0],
    )
}

/// One track's contribution to the linear system around `(V0, q0)`.
#[derive(Debug, Clone)]
pub struct TrackLinearization {
    /// dh/dV
    pub a: Matrix5x3<f64>,
    /// dh/dq
    pub b: Matrix5x3<f64>,
    /// Track weight `G = C^-1`
    pub weight: Matrix5<f64>,
    /// Measured perigee minus the constant term of the expansion
    pub measured: Vector5<f64>,
    /// `A^T G B`
    pub d: Matrix3<f64>,
    /// `B^T G B`
    pub e: Matrix3<f64>,
    /// `E^-1`
    pub e_inv: Matrix3<f64>,
}

impl TrackLinearization {
    pub fn new(
        track: &BilliorTrack,
        vertex: &Vector3<f64>,
        q: &Vector3<f64>,
    ) -> Result<Self, VertexError> {
        let a = vertex_jacobian(vertex, q);
        let b = momentum_jacobian(vertex, q);
        let weight = track.weight_matrix()?;
        let offset = predict_perigee(vertex, q) - a * vertex - b * q;
        let measured = track.parameters() - offset;

        let d = a.transpose() * weight * b;
        let e = b.transpose() * weight * b;
        let e_inv = invert_spd(&e, "track momentum information")?;

        Ok(Self { a, b, weight, measured, d, e, e_inv })
    }

    /// `A^T G A`
    pub fn vertex_information(&self) -> Matrix3<f64> {
        self.a.transpose() * self.weight * self.a
    }

    /// Best `q` for this track given a vertex.
    pub fn momentum_at(&self, vertex: &Vector3<f64>) -> Vector3<f64> {
        self.e_inv * (self.b.transpose() * self.weight * self.measured - self.d.transpose() * vertex)
    }

    /// Weighted residual `r^T G r` with `r = y - A V - B q`.
    pub fn chi2(&self, vertex: &Vector3<f64>, q: &Vector3<f64>) -> f64 {
        let r = self.measured - self.a * vertex - self.b * q;
        r.dot(&(self.weight * r))
    }
}

/// Inverts a symmetric positive-definite 3×3 matrix.
pub(crate) fn invert_spd(m: &Matrix3<f64>, stage: &str) -> Result<Matrix3<f64>, VertexError> {
    let sym = (m + m.transpose()) * 0.5;
    sym.cholesky()
        .map(|chol| {
            let inv = chol.inverse();
            (inv + inv.transpose()) * 0.5
        })
        .ok_or_else(|| VertexError::singular(stage))
}
