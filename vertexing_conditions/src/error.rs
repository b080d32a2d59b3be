//! Error types for the run conditions layer.

use thiserror::Error;

/// Errors that can occur while loading or publishing run conditions.
#[derive(Debug, Error)]
pub enum ConditionsError {
    /// Conditions table could not be parsed
    #[error("Parse error: {0}")]
    ParseError(String),

    /// Conditions file could not be read
    #[error("I/O error: {0}")]
    IoError(String),

    /// Conditions values are physically meaningless (zero field, negative beam size, ...)
    #[error("Invalid conditions: {0}")]
    InvalidConditions(String),

    /// The publishing service has been dropped
    #[error("Conditions service closed")]
    ServiceClosed,
}

impl ConditionsError {
    /// Creates a parse error.
    pub fn parse(msg: impl Into<String>) -> Self {
        Self::ParseError(msg.into())
    }

    /// Creates an invalid-conditions error.
    pub fn invalid(msg: impl Into<String>) -> Self {
        Self::InvalidConditions(msg.into())
    }
}

impl From<serde_json::Error> for ConditionsError {
    fn from(err: serde_json::Error) -> Self {
        Self::ParseError(err.to_string())
    }
}

impl From<std::io::Error> for ConditionsError {
    fn from(err: std::io::Error) -> Self {
        Self::IoError(err.to_string())
    }
}
