//! Shared toy generator for the integration tests.

#![allow(dead_code)]

use nalgebra::{Matrix5, Vector3, Vector5};
use rand::Rng;
use rand_chacha::ChaCha8Rng;
use rand_distr::{Distribution, Normal};
use vertexing_core::kinematics::{field_constant, momentum};
use vertexing_core::linearize::predict_perigee;
use vertexing_core::BilliorTrack;

pub const B_FIELD: f64 = 0.5;

/// Per-track resolutions: eps, z0 (mm), theta, phi (rad), relative rho.
pub const SIGMAS: [f64; 5] = [0.05, 0.05, 1e-3, 1e-3, 0.02];

/// Smallest rho error (1/mm).
pub const RHO_SIGMA_FLOOR: f64 = 1e-6;

/// `(theta, phi, rho)` for a track of transverse momentum `pt` and charge sign.
pub fn track_parameters(theta: f64, phi: f64, pt: f64, charge: f64) -> Vector3<f64> {
    Vector3::new(theta, phi, charge * field_constant(B_FIELD) / pt)
}

/// A typical opening pair heading down the beam line.
pub fn v0_pair() -> [Vector3<f64>; 2] {
    [
        track_parameters(std::f64::consts::FRAC_PI_2 - 0.02, 0.03, 0.8, 1.0),
        track_parameters(std::f64::consts::FRAC_PI_2 + 0.03, -0.04, 0.7, -1.0),
    ]
}

/// Diagonal covariance for `q`; the rho error has a floor so straight tracks stay invertible.
pub fn covariance_for(q: &Vector3<f64>) -> Matrix5<f64> {
    let sigma_rho = (SIGMAS[4] * q[2].abs()).max(RHO_SIGMA_FLOOR);
    let sigmas = Vector5::new(SIGMAS[0], SIGMAS[1], SIGMAS[2], SIGMAS[3], sigma_rho);
    Matrix5::from_diagonal(&sigmas.component_mul(&sigmas))
}

/// Track exactly consistent with `vertex` and `q`.
pub fn exact_track(vertex: &Vector3<f64>, q: &Vector3<f64>) -> BilliorTrack {
    BilliorTrack::new(predict_perigee(vertex, q), covariance_for(q))
}

/// Track smeared with its own covariance.
pub fn smeared_track(rng: &mut ChaCha8Rng, vertex: &Vector3<f64>, q: &Vector3<f64>) -> BilliorTrack {
    let cov = covariance_for(q);
    let mut perigee = predict_perigee(vertex, q);
    for k in 0..5 {
        let sigma = cov[(k, k)].sqrt();
        if let Ok(normal) = Normal::new(0.0, sigma) {
            perigee[k] += normal.sample(rng);
        }
    }
    BilliorTrack::new(perigee, cov)
}

/// Slightly randomised pair kinematics.
pub fn random_pair(rng: &mut ChaCha8Rng) -> [Vector3<f64>; 2] {
    let half = std::f64::consts::FRAC_PI_2;
    [
        track_parameters(half + rng.gen_range(-0.04..-0.01), rng.gen_range(0.02..0.06), rng.gen_range(0.5..1.2), 1.0),
        track_parameters(half + rng.gen_range(0.01..0.04), rng.gen_range(-0.06..-0.02), rng.gen_range(0.5..1.2), -1.0),
    ]
}

pub fn summed_momentum(pair: &[Vector3<f64>]) -> Vector3<f64> {
    pair.iter()
        .map(|q| momentum(q, field_constant(B_FIELD)))
        .fold(Vector3::zeros(), |a, p| a + p)
}
