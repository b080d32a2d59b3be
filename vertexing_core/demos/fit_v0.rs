//! Fits one e+e- pair in all three constraint modes and prints the results.
//!
//! Run with: `cargo run -p vertexing_core --example fit_v0`

use vertexing_core::{BilliorTrack, BilliorVertexer, ConstraintMode, HelixTrack, VertexerConfig};

fn main() {
    // d0, phi0, omega, z0, tan_lambda
    let helices = [
        HelixTrack::with_errors(
            [0.12, 0.035, 1.9e-4, -0.08, 0.021],
            [0.05, 1e-3, 4e-6, 0.05, 1e-3],
        ),
        HelixTrack::with_errors(
            [-0.09, -0.041, -2.2e-4, 0.05, -0.028],
            [0.05, 1e-3, 4e-6, 0.05, 1e-3],
        ),
    ];
    let tracks: Vec<BilliorTrack> = helices.iter().map(BilliorTrack::from).collect();

    for mode in ConstraintMode::all() {
        let config = VertexerConfig::new(0.5)
            .with_constraint(*mode)
            .with_iterations(5, 1e-6);
        match BilliorVertexer::with_config(config).fit(&tracks) {
            Ok(vertex) => println!("{}\n", vertex),
            Err(e) => eprintln!("{} fit failed: {}", mode, e),
        }
    }
}
