//! HPS Vertexing Core - Constrained Least-Squares Vertex Fitting
//!
//! Fits a common decay vertex to two or more charged tracks using the
//! Billoir formalism (momenta profiled out, 3×3 vertex system), with an
//! optional beam constraint applied as a Kalman update of the joint
//! vertex/momentum state:
//! 1. **Unconstrained**: tracks only
//! 2. **BeamspotConstrained**: summed momentum points back to the beam spot
//! 3. **TargetConstrained**: vertex sits at the beam spot
//!
//! Straight-line fallbacks (two-line closest approach and a Lagrange
//! multiplier fitter) cover field-free topologies.
//!
//! # Example
//!
//! ```
//! use vertexing_core::{BilliorTrack, BilliorVertexer, ConstraintMode, HelixTrack, VertexerConfig};
//!
//! let tracks: Vec<BilliorTrack> = [
//!     HelixTrack::with_errors([0.05, 0.03, 2.0e-4, -0.02, 0.02], [0.1, 1e-3, 1e-6, 0.1, 1e-3]),
//!     HelixTrack::with_errors([-0.04, -0.04, -1.8e-4, 0.03, -0.03], [0.1, 1e-3, 1e-6, 0.1, 1e-3]),
//! ]
//! .iter()
//! .map(BilliorTrack::from)
//! .collect();
//!
//! let config = VertexerConfig::new(0.5).with_constraint(ConstraintMode::TargetConstrained);
//! let vertex = BilliorVertexer::with_config(config).fit(&tracks).unwrap();
//! assert_eq!(vertex.algorithm(), "TargetConstrained");
//! assert_eq!(vertex.ndf, 4);
//! ```

pub mod billoir;
pub mod config;
pub mod constraint;
pub mod error;
pub mod frames;
pub mod kinematics;
pub mod linearize;
pub mod straight_line;
pub mod track;
pub mod two_line;
pub mod validation;
pub mod vertex;

// Re-export key types for convenience
pub use billoir::{BilliorVertexer, VertexFitState};
pub use config::{ConstraintMode, VertexerConfig};
pub use error::VertexError;
pub use straight_line::{StraightLineTrack, StraightLineVertex, StraightLineVertexFitter};
pub use track::{BilliorTrack, HelixTrack};
pub use two_line::{fit_two_lines, Line, TwoLineVertex};
pub use vertex::{BilliorVertex, TargetProjection};
