//! Property tests over randomly drawn kinematics.

mod common;

use approx::relative_eq;
use common::*;
use nalgebra::{Matrix3, Matrix5, Vector3, Vector5};
use proptest::prelude::*;
use vertexing_core::kinematics::{invariant_mass, invariant_mass_uncertainty, ELECTRON_MASS};
use vertexing_core::{BilliorTrack, BilliorVertexer, HelixTrack};

proptest! {
    #[test]
    fn helix_round_trip(
        d0 in -5.0..5.0f64,
        phi0 in -3.0..3.0f64,
        omega in -1e-3..1e-3f64,
        z0 in -5.0..5.0f64,
        tan_lambda in -0.5..0.5f64,
        sigma in 1e-3..1.0f64,
    ) {
        let mut cov = Matrix5::from_diagonal(&Vector5::new(sigma, 1e-4, 1e-9, sigma, 1e-5));
        cov[(0, 3)] = 0.1 * sigma;
        cov[(3, 0)] = 0.1 * sigma;
        let helix = HelixTrack::new([d0, phi0, omega, z0, tan_lambda], cov);
        let back = BilliorTrack::from_helix(&helix).to_helix();
        prop_assert!(relative_eq!(back.parameters, helix.parameters, epsilon = 1e-10));
        prop_assert!(relative_eq!(back.covariance, helix.covariance, epsilon = 1e-12, max_relative = 1e-9));
    }

    #[test]
    fn fitted_covariance_is_symmetric(
        x in -10.0..30.0f64,
        y in -0.5..0.5f64,
        z in -0.5..0.5f64,
        phi1 in 0.02..0.08f64,
        phi2 in -0.08..-0.02f64,
        pt1 in 0.3..1.5f64,
        pt2 in 0.3..1.5f64,
    ) {
        let vertex = Vector3::new(x, y, z);
        let pair = [
            track_parameters(1.55, phi1, pt1, 1.0),
            track_parameters(1.60, phi2, pt2, -1.0),
        ];
        let tracks: Vec<_> = pair.iter().map(|q| exact_track(&vertex, q)).collect();
        let state = BilliorVertexer::new(B_FIELD).fit_state(&tracks).unwrap();
        prop_assert!(relative_eq!(state.covariance, state.covariance.transpose(), epsilon = 1e-15));
        prop_assert!(state.vertex_covariance().diagonal().iter().all(|v| *v > 0.0));
    }

    #[test]
    fn mass_symmetric_under_exchange(
        px1 in 0.2..1.5f64, py1 in -0.1..0.1f64, pz1 in -0.1..0.1f64,
        px2 in 0.2..1.5f64, py2 in -0.1..0.1f64, pz2 in -0.1..0.1f64,
        s1 in 1e-4..1e-2f64, s2 in 1e-4..1e-2f64,
    ) {
        let p1 = Vector3::new(px1, py1, pz1);
        let p2 = Vector3::new(px2, py2, pz2);
        let c1 = Matrix3::from_diagonal(&Vector3::new(s1, 1e-6, 1e-6));
        let c2 = Matrix3::from_diagonal(&Vector3::new(s2, 2e-6, 1e-6));

        let forward = invariant_mass(&[p1, p2], ELECTRON_MASS);
        let backward = invariant_mass(&[p2, p1], ELECTRON_MASS);
        prop_assert!(relative_eq!(forward, backward, max_relative = 1e-6));

        let err_forward = invariant_mass_uncertainty(&p1, &p2, &c1, &c2, ELECTRON_MASS);
        let err_backward = invariant_mass_uncertainty(&p2, &p1, &c2, &c1, ELECTRON_MASS);
        prop_assert_eq!(err_forward.is_some(), err_backward.is_some());
        if let (Some(forward), Some(backward)) = (err_forward, err_backward) {
            prop_assert!(relative_eq!(forward, backward, max_relative = 1e-6));
        }
    }
}
