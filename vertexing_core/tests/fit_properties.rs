//! End-to-end properties of the Billoir fitter.

mod common;

use approx::assert_relative_eq;
use common::*;
use nalgebra::{DMatrix, Matrix3, SymmetricEigen, Vector3};
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use vertexing_core::kinematics::{field_constant, invariant_mass, ELECTRON_MASS};
use vertexing_core::{frames, BilliorVertexer, ConstraintMode, VertexerConfig};

fn assert_psd3(m: &Matrix3<f64>) {
    assert_relative_eq!(*m, m.transpose(), epsilon = 1e-15);
    let eigen = SymmetricEigen::new(*m);
    let scale = m.abs().max().max(1e-30);
    assert!(eigen.eigenvalues.iter().all(|e| *e >= -1e-9 * scale), "{:?}", eigen.eigenvalues);
}

fn assert_psd(m: &DMatrix<f64>) {
    assert_relative_eq!(*m, m.transpose(), epsilon = 1e-15);
    let eigen = SymmetricEigen::new(m.clone());
    let scale = m.abs().max().max(1e-30);
    assert!(eigen.eigenvalues.iter().all(|e| *e >= -1e-9 * scale), "{:?}", eigen.eigenvalues);
}

#[test]
fn returned_covariances_are_symmetric_and_psd() {
    let mut rng = ChaCha8Rng::seed_from_u64(11);
    let vertex = Vector3::new(5.0, 0.02, -0.01);
    for mode in ConstraintMode::all() {
        let pair = v0_pair();
        let tracks: Vec<_> = pair.iter().map(|q| smeared_track(&mut rng, &vertex, q)).collect();
        let vertexer = BilliorVertexer::with_config(VertexerConfig::new(B_FIELD).with_constraint(*mode));

        let state = vertexer.fit_state(&tracks).unwrap();
        assert_psd(&state.covariance);

        let fit = vertexer.fit(&tracks).unwrap();
        assert_psd3(&fit.covariance);
        for cov in &fit.track_momentum_covariances {
            assert_psd3(cov);
        }
        let projection = fit.target_projection.unwrap();
        assert_relative_eq!(projection.covariance, projection.covariance.transpose(), epsilon = 1e-15);
        assert!(projection.covariance.determinant() >= 0.0);
    }
}

#[test]
fn target_constraint_pins_vertex_to_beam() {
    let beam = [0.3, 0.02, -0.01];
    let truth = Vector3::new(0.3, 0.02, -0.01);
    let mut rng = ChaCha8Rng::seed_from_u64(3);
    let tracks: Vec<_> = v0_pair().iter().map(|q| smeared_track(&mut rng, &truth, q)).collect();

    let config = VertexerConfig::new(B_FIELD)
        .with_constraint(ConstraintMode::TargetConstrained)
        .with_beam_position(beam)
        .with_beam_size([1e-6, 1e-6, 1e-6]);
    let state = BilliorVertexer::with_config(config).fit_state(&tracks).unwrap();

    assert_relative_eq!(state.vertex(), Vector3::from(beam), epsilon = 1e-5);
    assert!(state.vertex_covariance().diagonal().iter().all(|v| *v < 1e-10));
    assert_eq!(state.ndf(), 4);
}

#[test]
fn beamspot_constraint_pins_projection_to_beam() {
    // Decay 10 mm downstream whose summed momentum misses the beam spot
    let beam = [-4.3, 0.05, -0.02];
    let truth = Vector3::new(6.0, 0.4, 0.1);
    let tracks: Vec<_> = v0_pair().iter().map(|q| exact_track(&truth, q)).collect();

    let config = VertexerConfig::new(B_FIELD)
        .with_constraint(ConstraintMode::BeamspotConstrained)
        .with_beam_position(beam)
        .with_beam_size([1e-6, 1e-6, 1e-6])
        .with_iterations(20, 1e-10);
    let fit = BilliorVertexer::with_config(config.clone()).fit(&tracks).unwrap();

    let projection = fit.target_projection.unwrap();
    assert_relative_eq!(projection.plane_z, -4.3);
    // tracking (t1, t2) on the plane are detector (x, y)
    assert_relative_eq!(projection.position.x, 0.05, epsilon = 1e-6);
    assert_relative_eq!(projection.position.y, -0.02, epsilon = 1e-6);
    assert!(fit.chi2 > 0.0);
    assert_eq!(fit.ndf, 3);

    // the vertex is not forced onto the beam
    assert!((fit.position.z - beam[0]).abs() > 1.0);

    // unconstrained fit of the same tracks does not point at the beam
    let free = BilliorVertexer::with_config(config.with_constraint(ConstraintMode::Unconstrained))
        .fit(&tracks)
        .unwrap();
    let free_projection = free.target_projection.unwrap();
    assert!((free_projection.position.x - 0.05).abs() > 0.05);
}

#[test]
fn mass_is_independent_of_track_order() {
    let mut rng = ChaCha8Rng::seed_from_u64(5);
    let vertex = Vector3::new(2.0, 0.0, 0.0);
    let tracks: Vec<_> = v0_pair().iter().map(|q| smeared_track(&mut rng, &vertex, q)).collect();
    let reversed: Vec<_> = tracks.iter().rev().cloned().collect();

    let vertexer = BilliorVertexer::new(B_FIELD);
    let a = vertexer.fit(&tracks).unwrap();
    let b = vertexer.fit(&reversed).unwrap();

    assert_relative_eq!(a.invariant_mass, b.invariant_mass, max_relative = 1e-9);
    assert_relative_eq!(
        a.invariant_mass_error.unwrap(),
        b.invariant_mass_error.unwrap(),
        max_relative = 1e-9
    );
    assert_relative_eq!(a.position, b.position, epsilon = 1e-9);
    assert_relative_eq!(a.chi2, b.chi2, epsilon = 1e-9);
}

#[test]
fn total_momentum_is_sum_of_track_momenta() {
    let pair = v0_pair();
    let truth = Vector3::new(3.0, 0.0, 0.0);
    let tracks: Vec<_> = pair.iter().map(|q| exact_track(&truth, q)).collect();
    let config = VertexerConfig::new(B_FIELD).with_iterations(10, 1e-10);
    let fit = BilliorVertexer::with_config(config).fit(&tracks).unwrap();

    let expected = frames::to_detector(&summed_momentum(&pair));
    assert_relative_eq!(fit.total_momentum(), fit.track_momenta[0] + fit.track_momenta[1]);
    assert_relative_eq!(fit.total_momentum(), expected, max_relative = 1e-6);

    let k = field_constant(B_FIELD);
    let truth_mass = invariant_mass(
        &pair.map(|q| vertexing_core::kinematics::momentum(&q, k)),
        ELECTRON_MASS,
    );
    assert_relative_eq!(fit.invariant_mass, truth_mass, max_relative = 1e-6);
    assert!(fit.invariant_mass_error_full.unwrap() > 0.0);
}

#[test]
fn smeared_pairs_have_unit_pulls_and_chi2_per_ndf() {
    // truth vertex 5 mm downstream along the beam axis
    let truth = Vector3::new(5.0, 0.0, 0.0);
    let truth_det = frames::to_detector(&truth);
    let mut rng = ChaCha8Rng::seed_from_u64(2024);
    let vertexer = BilliorVertexer::with_config(VertexerConfig::new(B_FIELD).with_iterations(10, 1e-6));

    let events = 600;
    let mut chi2_sum = 0.0;
    let mut contained = 0;
    let mut pulls = [Vec::new(), Vec::new(), Vec::new()];
    for _ in 0..events {
        let pair = random_pair(&mut rng);
        let tracks: Vec<_> = pair.iter().map(|q| smeared_track(&mut rng, &truth, q)).collect();
        let fit = vertexer.fit(&tracks).unwrap();
        assert_eq!(fit.ndf, 1);
        chi2_sum += fit.chi2;

        let errors = fit.position_errors();
        let pull: Vec<f64> = (0..3).map(|k| (fit.position[k] - truth_det[k]) / errors[k]).collect();
        if pull.iter().all(|p| p.abs() < 3.0) {
            contained += 1;
        }
        for k in 0..3 {
            pulls[k].push(pull[k]);
        }
    }

    let mean_chi2 = chi2_sum / events as f64;
    assert!((0.8..1.25).contains(&mean_chi2), "mean chi2 {}", mean_chi2);
    assert!(contained as f64 / events as f64 > 0.96, "contained {}", contained);

    for p in &pulls {
        let mean = p.iter().sum::<f64>() / p.len() as f64;
        let width = (p.iter().map(|x| (x - mean).powi(2)).sum::<f64>() / (p.len() - 1) as f64).sqrt();
        assert!(mean.abs() < 0.15, "pull mean {}", mean);
        assert!((0.85..1.15).contains(&width), "pull width {}", width);
    }
}

#[test]
fn reference_position_matches_unshifted_fit() {
    let reference = Vector3::new(-4.3, 0.1, -0.05);
    let local = Vector3::new(1.5, 0.01, 0.02);
    let mut rng = ChaCha8Rng::seed_from_u64(8);
    let tracks: Vec<_> = v0_pair().iter().map(|q| smeared_track(&mut rng, &local, q)).collect();

    let plain = BilliorVertexer::new(B_FIELD).fit_state(&tracks).unwrap();
    let shifted = BilliorVertexer::with_config(
        VertexerConfig::new(B_FIELD)
            .with_reference_position([reference.x, reference.y, reference.z])
            .with_seed_vertex([reference.x, reference.y, reference.z]),
    )
    .fit_state(&tracks)
    .unwrap();

    assert_relative_eq!(shifted.vertex(), plain.vertex() + reference, epsilon = 1e-9);
    assert_relative_eq!(shifted.chi2, plain.chi2, epsilon = 1e-9);
}

#[test]
fn result_serializes_and_displays() {
    let tracks: Vec<_> = v0_pair().iter().map(|q| exact_track(&Vector3::zeros(), q)).collect();
    let fit = BilliorVertexer::new(B_FIELD).fit(&tracks).unwrap();

    let json = serde_json::to_string(&fit).unwrap();
    assert!(json.contains("Unconstrained"));

    let text = fit.to_string();
    assert!(text.starts_with("Unconstrained vertex"));
    assert!(text.contains("chi2/ndf"));
    assert!(text.contains("mass"));
}
