//! Data primitives and collaborator contracts for marlbench.
//!
//! Tasks, algorithms, models and loggers are external to the orchestrator. This
//! crate defines the capability interfaces they implement and the batch data
//! they exchange.

pub mod algorithm;
pub mod batch;
pub mod callback;
pub mod error;
pub mod group;
pub mod key;
pub mod logger;
pub mod params;
pub mod spec;
pub mod storage;
pub mod task;
pub mod tensor;

pub use algorithm::{
    Algorithm, AlgorithmConfig, AlgorithmContext, ExplorationAnneal, LossComputer, ModelConfig, Policy,
    ReplayBuffer, TargetUpdater, TrainingSettings,
};
pub use batch::{Batch, DONE_KEYS};
pub use callback::Callback;
pub use error::{CollaboratorError, Result};
pub use group::GroupMap;
pub use key::{FieldKey, INFO, NEXT};
pub use logger::{ExperimentLogger, ScalarMap};
pub use params::{is_loss_term, LossValues, Parameter, ParameterStore, PolicyWeights, TrainingRecord};
pub use spec::{ActionMode, ActionSelection, ActionSupport, FieldSpec, Spec, SpecBundle, SpecDomain};
pub use storage::CheckpointStorage;
pub use task::{EnvRequest, Environment, RenderFrame, Task};
pub use tensor::Tensor;
