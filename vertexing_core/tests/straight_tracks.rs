//! Field-free tracks crossing at a known point, fitted three ways.

mod common;

use approx::assert_relative_eq;
use common::exact_track;
use nalgebra::Vector3;
use vertexing_core::{
    fit_two_lines, BilliorVertexer, Line, StraightLineTrack, StraightLineVertexFitter, VertexError,
    VertexerConfig,
};

fn crossing() -> (Vector3<f64>, [Vector3<f64>; 2]) {
    (
        Vector3::new(12.0, -0.3, 0.25),
        [Vector3::new(1.54, 0.05, 0.0), Vector3::new(1.60, -0.06, 0.0)],
    )
}

#[test]
fn billoir_recovers_crossing_point() {
    let (point, pair) = crossing();
    let tracks: Vec<_> = pair.iter().map(|q| exact_track(&point, q)).collect();
    let config = VertexerConfig::new(0.5).with_iterations(20, 1e-10);
    let state = BilliorVertexer::with_config(config).fit_state(&tracks).unwrap();
    assert_relative_eq!(state.vertex(), point, epsilon = 1e-6);
    assert!(state.chi2 < 1e-9);
}

#[test]
fn billoir_result_refuses_undefined_momenta() {
    let (point, pair) = crossing();
    let tracks: Vec<_> = pair.iter().map(|q| exact_track(&point, q)).collect();
    let result = BilliorVertexer::new(0.5).fit(&tracks);
    assert!(matches!(result, Err(VertexError::DegenerateGeometry(_))));
}

#[test]
fn two_line_recovers_crossing_point() {
    let (point, pair) = crossing();
    let lines: Vec<_> = pair
        .iter()
        .map(|q| Line::from_track(&exact_track(&point, q)))
        .collect();
    let vertex = fit_two_lines(&lines);
    assert!(vertex.is_valid);
    assert_relative_eq!(vertex.position, point, epsilon = 1e-9);
    assert!(vertex.distance < 1e-9);
}

#[test]
fn straight_line_fitter_recovers_crossing_point() {
    let (point, pair) = crossing();
    let x_ref = 100.0;
    let tracks: Vec<_> = pair
        .iter()
        .map(|q| StraightLineTrack::from_helix(&exact_track(&point, q), x_ref))
        .collect();

    let fit = StraightLineVertexFitter::new(x_ref).fit(&tracks).unwrap();
    assert_relative_eq!(fit.position, point, epsilon = 1e-6);
    assert!(fit.chi2 < 1e-9);
    assert_eq!(fit.ndf, 1);

    // both fallbacks agree on the lines built from straight-line tracks
    let lines: Vec<_> = tracks.iter().map(|t| Line::from_straight_line(t, x_ref)).collect();
    assert_relative_eq!(fit_two_lines(&lines).position, point, epsilon = 1e-9);
}
