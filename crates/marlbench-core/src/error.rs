//! Error types for experiment setup, execution and restore.

use marlbench_abstraction::CollaboratorError;
use marlbench_training::TrainingError;
use std::path::PathBuf;
use thiserror::Error;

use crate::lifecycle::ExperimentState;

/// Result type for experiment operations.
pub type Result<T> = std::result::Result<T, ExperimentError>;

/// Invalid experiment configuration, detected before any resource is allocated.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ConfigError {
    /// Evaluation would never line up with collection boundaries.
    #[error(
        "evaluation_interval ({interval}) must be a multiple of the collected frames per batch ({frames_per_batch})"
    )]
    EvaluationIntervalNotMultiple { interval: u64, frames_per_batch: u64 },

    /// Checkpoints would never line up with collection boundaries.
    #[error(
        "checkpoint_interval ({interval}) must be a multiple of the collected frames per batch ({frames_per_batch})"
    )]
    CheckpointIntervalNotMultiple { interval: u64, frames_per_batch: u64 },

    /// Neither `max_n_frames` nor `max_n_iters` is set.
    #[error("at least one of max_n_frames and max_n_iters must be set")]
    MissingStopCondition,

    /// No action mode is supported by both sides.
    #[error("algorithm '{algorithm}' is not compatible with the action space of task '{task}'")]
    IncompatibleActionSpace { algorithm: String, task: String },

    /// A restored experiment always reuses its original folder.
    #[error("restore_file and save_folder are both set; a restored experiment is reloaded into its original folder")]
    RestoreWithSaveFolder,

    /// A field is out of range.
    #[error("invalid value for '{field}': {reason}")]
    InvalidValue { field: &'static str, reason: String },
}

/// Failure to reload an experiment from a checkpoint.
#[derive(Debug, Error)]
pub enum RestoreError {
    #[error("failed to read checkpoint {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: CollaboratorError,
    },

    #[error("corrupt checkpoint {path}: {reason}")]
    Corrupt { path: PathBuf, reason: String },

    /// The checkpoint lacks state for a group present in the environment.
    #[error("checkpoint has no {kind} state for group '{group}'")]
    MissingGroupState { group: String, kind: &'static str },

    /// The checkpoint holds state for a group the environment does not have.
    #[error("checkpoint holds state for unknown group '{group}'")]
    UnexpectedGroupState { group: String },

    #[error("failed to load {component} state: {source}")]
    ComponentLoad {
        component: String,
        #[source]
        source: CollaboratorError,
    },
}

/// Errors raised while building or running an experiment.
#[derive(Debug, Error)]
pub enum ExperimentError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Collaborator(#[from] CollaboratorError),

    #[error(transparent)]
    Training(#[from] TrainingError),

    #[error("restore error: {0}")]
    Restore(#[from] RestoreError),

    #[error("invalid group map: {0}")]
    InvalidGroupMap(String),

    #[error("invalid state transition from {from} to {to}")]
    InvalidTransition { from: ExperimentState, to: ExperimentState },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML error: {0}")]
    Toml(String),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
}

impl From<toml::de::Error> for ExperimentError {
    fn from(err: toml::de::Error) -> Self {
        Self::Toml(err.to_string())
    }
}

impl From<toml::ser::Error> for ExperimentError {
    fn from(err: toml::ser::Error) -> Self {
        Self::Toml(err.to_string())
    }
}
