//! Error types for vertex fitting.

use thiserror::Error;

/// Errors that can occur while fitting or querying a vertex.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum VertexError {
    /// Fewer than two tracks were supplied
    #[error("Vertex fit needs at least 2 tracks, got {0}")]
    TooFewTracks(usize),

    /// A two-track quantity was requested from a fit with another multiplicity
    #[error("Operation requires exactly 2 tracks, fit has {0}")]
    RequiresTwoTracks(usize),

    /// A matrix that must be positive definite could not be inverted
    #[error("Singular matrix in {0}")]
    SingularMatrix(String),

    /// Constraint or projection undefined for this configuration (e.g. zero Px)
    #[error("Degenerate geometry: {0}")]
    DegenerateGeometry(String),

    /// Fitter configuration is unusable
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Track index outside the fitted multiplicity
    #[error("Track index {index} out of range for {count} tracks")]
    TrackIndex { index: usize, count: usize },
}

impl VertexError {
    /// Creates a singular-matrix error naming the stage that failed.
    pub fn singular(stage: impl Into<String>) -> Self {
        Self::SingularMatrix(stage.into())
    }

    /// Creates a degenerate-geometry error.
    pub fn degenerate(msg: impl Into<String>) -> Self {
        Self::DegenerateGeometry(msg.into())
    }

    /// Creates a configuration error.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::InvalidConfig(msg.into())
    }
}
