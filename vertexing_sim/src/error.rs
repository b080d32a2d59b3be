//! Error types for the simulation harness.

use thiserror::Error;
use vertexing_conditions::ConditionsError;
use vertexing_core::VertexError;

#[derive(Debug, Error)]
pub enum SimError {
    #[error("vertex fit failed: {0}")]
    Vertex(#[from] VertexError),

    #[error("conditions error: {0}")]
    Conditions(#[from] ConditionsError),

    #[error("event generation failed: {0}")]
    Generation(String),

    #[error("unknown scenario: {0}")]
    UnknownScenario(String),

    #[error("export failed: {0}")]
    Export(#[from] std::io::Error),

    #[error("serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl SimError {
    pub fn generation(msg: impl Into<String>) -> Self {
        SimError::Generation(msg.into())
    }
}
