//! Error type shared by every collaborator contract.

use thiserror::Error;

/// Result type for collaborator operations.
pub type Result<T> = std::result::Result<T, CollaboratorError>;

/// Represents a failure raised by a task, environment, algorithm, logger or storage backend.
#[derive(Debug, Error)]
pub enum CollaboratorError {
    /// An environment failed to reset, step or close.
    #[error("Environment Error: {0}")]
    Environment(String),

    /// A policy failed to select actions or to load weights.
    #[error("Policy Error: {0}")]
    Policy(String),

    /// A loss module failed during forward or backward computation.
    #[error("Loss Error: {0}")]
    Loss(String),

    /// A replay buffer failed to store or sample data.
    #[error("Replay Buffer Error: {0}")]
    Buffer(String),

    /// A logger failed to record metrics.
    #[error("Logger Error: {0}")]
    Logger(String),

    /// Tensor or batch shapes do not line up.
    #[error("Shape Error: {0}")]
    Shape(String),

    /// A batch does not contain a required field.
    #[error("Missing field '{0}'")]
    MissingField(String),

    /// The agent-group partition reported by a task is not a partition.
    #[error("Invalid group map: {0}")]
    InvalidGroupMap(String),

    /// A component could not export or import its state.
    #[error("State Error: {0}")]
    State(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Other unexpected errors.
    #[error("Other Collaborator Error: {0}")]
    Other(String),
}
