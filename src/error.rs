// Typed errors with thiserror. Poll failures are normalized before they reach the state machine;
// config errors are absorbed by fallbacks and only ever logged.

use thiserror::Error;

use crate::types::BufferId;

/// Engine error types.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum EngineError {
    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Unexpected playback data: {0}")]
    DataShape(String),

    #[error("Unknown preset: {0}")]
    UnknownPreset(String),

    #[error("Unknown component: {0}")]
    UnknownComponent(String),

    #[error("Unknown animation type: {0}")]
    UnknownAnimation(String),

    #[error("Unknown easing: {0}")]
    UnknownEasing(String),

    #[error("Unknown animation phase: {0}")]
    UnknownPhase(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Timeline already running on buffer {buffer}")]
    AnimationRace { buffer: BufferId },

    #[error("Host call failed: {0}")]
    Host(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl EngineError {
    /// Errors the poll loop turns into a "not playing" snapshot.
    pub fn is_poll_failure(&self) -> bool {
        matches!(self, EngineError::Transport(_) | EngineError::DataShape(_))
    }
}

impl From<serde_json::Error> for EngineError {
    fn from(err: serde_json::Error) -> Self {
        EngineError::Serialization(err.to_string())
    }
}
