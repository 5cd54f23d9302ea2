use marlbench_abstraction::CollaboratorError;
use thiserror::Error;

pub type TrainingResult<T> = std::result::Result<T, TrainingError>;

#[derive(Debug, Error)]
pub enum TrainingError {
    #[error("invalid training setting: {0}")]
    InvalidSetting(String),

    #[error("unknown parameter '{0}'")]
    UnknownParameter(String),

    #[error("gradient of '{name}' has {got} elements, parameter has {expected}")]
    GradientShape { name: String, expected: usize, got: usize },

    #[error(transparent)]
    Collaborator(#[from] CollaboratorError),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

impl From<TrainingError> for CollaboratorError {
    fn from(err: TrainingError) -> Self {
        match err {
            TrainingError::Collaborator(inner) => inner,
            other => Self::Other(other.to_string()),
        }
    }
}
