//! Error types for the simulation harness.

use mtrvis_core::SceneError;
use thiserror::Error;

/// Errors that can occur while generating or running a scenario.
#[derive(Debug, Error)]
pub enum SimError {
    /// Core geometry rejected the generated scene
    #[error("Scene error: {0}")]
    Scene(#[from] SceneError),

    /// Harness parameters outside their valid domain
    #[error("Invalid sim config: {0}")]
    InvalidConfig(String),

    /// Export failed on disk
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Export failed to serialise
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl SimError {
    /// Creates a config error.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::InvalidConfig(msg.into())
    }
}
