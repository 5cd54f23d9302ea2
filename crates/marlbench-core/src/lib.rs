//! Orchestration engine for multi-agent reinforcement-learning experiments.
//!
//! An [`Experiment`] negotiates an action mode between a task and an
//! algorithm, builds per-group training components, and then alternates
//! collection, per-group training, evaluation and checkpointing until a frame
//! or iteration ceiling is reached.
//!
//! ```ignore
//! let mut experiment = ExperimentBuilder::new(task, algorithm, model, config)
//!     .seed(0)
//!     .build()
//!     .await?;
//! let outcome = experiment.run().await?;
//! ```

pub mod checkpoint;
pub mod collector;
pub mod config;
pub mod env;
pub mod error;
pub mod evaluation;
pub mod experiment;
pub mod layout;
pub mod lifecycle;
pub mod loggers;
pub mod negotiate;
pub mod resolve;
#[cfg(test)]
pub(crate) mod testing;
pub mod training;

pub use checkpoint::{checkpoint_file_name, Counters, ExperimentCheckpoint, FsCheckpointStorage};
pub use collector::{SyncCollector, EPISODE_REWARD};
pub use config::{ExperimentConfig, ExperimentPlan, LoggerKind};
pub use env::{is_vectorized, make_training_env, SerialEnv};
pub use error::{ConfigError, ExperimentError, RestoreError, Result};
pub use evaluation::{rollout, Evaluator, RolloutStop};
pub use experiment::{Experiment, ExperimentBuilder};
pub use layout::{experiment_name, ExperimentLayout};
pub use lifecycle::{ExperimentState, RunOutcome, ShutdownGuard};
pub use loggers::{CsvLogger, JsonLogger, MultiLogger, RunInfo, TracingLogger};
pub use negotiate::resolve_action_mode;
pub use resolve::resolve_specs;
pub use training::{excluded_keys, group_view, GroupTrainer};
