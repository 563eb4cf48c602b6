//! Error types for scene geometry.

use thiserror::Error;

/// Errors raised by the segmenter, the frame transform and the view builder.
///
/// All of them are local, synchronous failures. None are transient, so
/// callers should report and move on instead of retrying.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SceneError {
    /// The pivot agent is not observed at the reference timestep
    #[error("Pivot track {track_index} is invalid at timestep {timestep}")]
    InvalidPivotState { track_index: usize, timestep: usize },

    /// The pivot index does not name an agent of the scene
    #[error("Pivot track {track_index} out of range ({num_agents} agents)")]
    PivotOutOfRange { track_index: usize, num_agents: usize },

    /// The segmenter was handed zero map points
    #[error("Empty input sequence")]
    EmptyInputSequence,

    /// Mismatched lengths between parallel arrays
    #[error("Shape mismatch: {0}")]
    ShapeMismatch(String),

    /// A configuration value outside its valid domain
    #[error("Invalid config: {0}")]
    InvalidConfig(String),

    /// A prediction horizon outside 3 / 5 / 8 seconds
    #[error("Unsupported horizon: {0}s")]
    UnsupportedHorizon(u32),
}

impl SceneError {
    /// Creates a shape mismatch error.
    pub fn shape(msg: impl Into<String>) -> Self {
        Self::ShapeMismatch(msg.into())
    }

    /// Creates a config error.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::InvalidConfig(msg.into())
    }

    /// True for errors that only disqualify one pivot, not the scenario.
    pub fn is_pivot_local(&self) -> bool {
        matches!(self, Self::InvalidPivotState { .. })
    }
}

pub type Result<T> = std::result::Result<T, SceneError>;
