//! Experiment configuration.
//!
//! Every knob of an experiment lives in [`ExperimentConfig`]. Partial TOML
//! files deserialize over the defaults. The derived batch and frame
//! arithmetic is in [`plan`].

pub mod plan;

use crate::error::{ConfigError, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

pub use plan::ExperimentPlan;

/// Metric sinks that can be enabled from configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LoggerKind {
    /// One CSV file per scalar under `<folder>/scalars/`.
    Csv,
    /// Summaries emitted as tracing events.
    Console,
}

/// Experiment configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExperimentConfig {
    /// Device environments are stepped on.
    pub sampling_device: String,
    /// Device training happens on.
    pub train_device: String,
    /// Whether agents within a group share policy parameters.
    pub share_policy_params: bool,
    /// Chosen when both task and algorithm support continuous and discrete actions.
    pub prefer_continuous_actions: bool,

    pub gamma: f64,
    pub lr: f64,
    pub adam_eps: f64,
    /// Clip by norm when set, by value otherwise. Ignored without `clip_grad_val`.
    pub clip_grad_norm: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub clip_grad_val: Option<f64>,

    pub soft_target_update: bool,
    pub polyak_tau: f64,
    pub hard_target_update_frequency: u64,

    pub exploration_eps_init: f64,
    pub exploration_eps_end: f64,
    /// Frames over which exploration anneals. Defaults to a third of the frame ceiling.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exploration_anneal_frames: Option<u64>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_n_iters: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_n_frames: Option<u64>,

    pub on_policy_collected_frames_per_batch: u64,
    pub on_policy_n_envs_per_worker: usize,
    /// Passes over the collected batch per iteration.
    pub on_policy_n_minibatch_iters: u64,
    pub on_policy_minibatch_size: u64,

    pub off_policy_collected_frames_per_batch: u64,
    pub off_policy_n_envs_per_worker: usize,
    pub off_policy_n_optimizer_steps: u64,
    pub off_policy_train_batch_size: u64,
    pub off_policy_memory_size: u64,
    /// Frames collected with uniformly random actions before the policy takes over.
    pub off_policy_init_random_frames: u64,

    pub evaluation: bool,
    pub render: bool,
    pub evaluation_interval: u64,
    pub evaluation_episodes: usize,
    pub evaluation_deterministic_actions: bool,

    pub loggers: Vec<LoggerKind>,
    /// Write a JSON summary of evaluation returns.
    pub create_json: bool,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub save_folder: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub restore_file: Option<PathBuf>,
    /// Frames between checkpoints. Zero disables checkpointing.
    pub checkpoint_interval: u64,
}

impl Default for ExperimentConfig {
    fn default() -> Self {
        Self {
            sampling_device: "cpu".to_string(),
            train_device: "cpu".to_string(),
            share_policy_params: true,
            prefer_continuous_actions: true,
            gamma: 0.9,
            lr: 0.000_05,
            adam_eps: 0.000_001,
            clip_grad_norm: true,
            clip_grad_val: Some(5.0),
            soft_target_update: true,
            polyak_tau: 0.005,
            hard_target_update_frequency: 5,
            exploration_eps_init: 0.8,
            exploration_eps_end: 0.01,
            exploration_anneal_frames: None,
            max_n_iters: None,
            max_n_frames: Some(3_000_000),
            on_policy_collected_frames_per_batch: 6000,
            on_policy_n_envs_per_worker: 10,
            on_policy_n_minibatch_iters: 45,
            on_policy_minibatch_size: 400,
            off_policy_collected_frames_per_batch: 6000,
            off_policy_n_envs_per_worker: 10,
            off_policy_n_optimizer_steps: 1000,
            off_policy_train_batch_size: 128,
            off_policy_memory_size: 1_000_000,
            off_policy_init_random_frames: 0,
            evaluation: true,
            render: true,
            evaluation_interval: 120_000,
            evaluation_episodes: 10,
            evaluation_deterministic_actions: true,
            loggers: vec![LoggerKind::Csv],
            create_json: true,
            save_folder: None,
            restore_file: None,
            checkpoint_interval: 300_000,
        }
    }
}

impl ExperimentConfig {
    /// Parses a TOML document over the defaults.
    pub fn from_toml_str(s: &str) -> Result<Self> {
        Ok(toml::from_str(s)?)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    pub fn to_toml_string(&self) -> Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Frames collected per iteration.
    pub fn collected_frames_per_batch(&self, on_policy: bool) -> u64 {
        if on_policy {
            self.on_policy_collected_frames_per_batch
        } else {
            self.off_policy_collected_frames_per_batch
        }
    }

    pub fn n_envs_per_worker(&self, on_policy: bool) -> usize {
        if on_policy {
            self.on_policy_n_envs_per_worker
        } else {
            self.off_policy_n_envs_per_worker
        }
    }

    /// Transitions trained on per optimizer pass group. On-policy trains on everything collected.
    pub fn train_batch_size(&self, on_policy: bool) -> u64 {
        if on_policy {
            self.collected_frames_per_batch(true)
        } else {
            self.off_policy_train_batch_size
        }
    }

    pub fn train_minibatch_size(&self, on_policy: bool) -> u64 {
        if on_policy {
            self.on_policy_minibatch_size
        } else {
            self.train_batch_size(false)
        }
    }

    pub fn n_optimizer_steps(&self, on_policy: bool) -> u64 {
        if on_policy {
            self.on_policy_n_minibatch_iters
        } else {
            self.off_policy_n_optimizer_steps
        }
    }

    /// Minibatches drawn per optimizer step: `train_batch_size / train_minibatch_size`.
    pub fn minibatches_per_step(&self, on_policy: bool) -> u64 {
        let minibatch = self.train_minibatch_size(on_policy);
        if minibatch == 0 {
            return 0;
        }
        self.train_batch_size(on_policy) / minibatch
    }

    /// On-policy the buffer holds exactly the latest batch.
    pub fn replay_buffer_memory_size(&self, on_policy: bool) -> u64 {
        if on_policy {
            self.collected_frames_per_batch(true)
        } else {
            self.off_policy_memory_size
        }
    }

    pub fn init_random_frames(&self, on_policy: bool) -> u64 {
        if on_policy { 0 } else { self.off_policy_init_random_frames }
    }

    /// Frame ceiling. The smaller of the two limits wins when both are set.
    ///
    /// Zero when neither is set, which [`validate`](Self::validate) rejects.
    pub fn max_frames(&self, on_policy: bool) -> u64 {
        let per_batch = self.collected_frames_per_batch(on_policy);
        let from_iters = self.max_n_iters.map(|iters| iters.saturating_mul(per_batch));
        match (self.max_n_frames, from_iters) {
            (Some(frames), Some(iter_frames)) => frames.min(iter_frames),
            (Some(frames), None) => frames,
            (None, Some(iter_frames)) => iter_frames,
            (None, None) => 0,
        }
    }

    /// Iteration ceiling: `ceil(max_frames / collected_frames_per_batch)`.
    pub fn max_iterations(&self, on_policy: bool) -> u64 {
        let per_batch = self.collected_frames_per_batch(on_policy);
        if per_batch == 0 {
            return 0;
        }
        self.max_frames(on_policy).div_ceil(per_batch)
    }

    pub fn exploration_anneal_horizon(&self, on_policy: bool) -> u64 {
        self.exploration_anneal_frames.unwrap_or_else(|| self.max_frames(on_policy) / 3)
    }

    /// Whether any metric sink is configured.
    pub fn has_logging_sink(&self) -> bool {
        !self.loggers.is_empty() || self.create_json
    }

    /// Checks the configuration for the given training mode.
    pub fn validate(&self, on_policy: bool) -> std::result::Result<(), ConfigError> {
        self.validate_values(on_policy)?;

        let per_batch = self.collected_frames_per_batch(on_policy);
        if self.evaluation && self.evaluation_interval % per_batch != 0 {
            return Err(ConfigError::EvaluationIntervalNotMultiple {
                interval: self.evaluation_interval,
                frames_per_batch: per_batch,
            });
        }
        if self.checkpoint_interval != 0 && self.checkpoint_interval % per_batch != 0 {
            return Err(ConfigError::CheckpointIntervalNotMultiple {
                interval: self.checkpoint_interval,
                frames_per_batch: per_batch,
            });
        }
        if self.max_n_frames.is_none() && self.max_n_iters.is_none() {
            return Err(ConfigError::MissingStopCondition);
        }
        if self.restore_file.is_some() && self.save_folder.is_some() {
            return Err(ConfigError::RestoreWithSaveFolder);
        }
        Ok(())
    }

    fn validate_values(&self, on_policy: bool) -> std::result::Result<(), ConfigError> {
        fn invalid(field: &'static str, reason: impl Into<String>) -> ConfigError {
            ConfigError::InvalidValue { field, reason: reason.into() }
        }

        if self.collected_frames_per_batch(on_policy) == 0 {
            let field = if on_policy {
                "on_policy_collected_frames_per_batch"
            } else {
                "off_policy_collected_frames_per_batch"
            };
            return Err(invalid(field, "must be positive"));
        }
        if self.n_envs_per_worker(on_policy) == 0 {
            let field = if on_policy { "on_policy_n_envs_per_worker" } else { "off_policy_n_envs_per_worker" };
            return Err(invalid(field, "must be positive"));
        }
        if on_policy && self.on_policy_minibatch_size == 0 {
            return Err(invalid("on_policy_minibatch_size", "must be positive"));
        }
        if !on_policy && self.off_policy_train_batch_size == 0 {
            return Err(invalid("off_policy_train_batch_size", "must be positive"));
        }
        if !on_policy && self.off_policy_memory_size == 0 {
            return Err(invalid("off_policy_memory_size", "must be positive"));
        }
        if self.lr.is_nan() || self.lr <= 0.0 {
            return Err(invalid("lr", format!("must be positive, got {}", self.lr)));
        }
        if !(0.0..=1.0).contains(&self.polyak_tau) || self.polyak_tau == 0.0 {
            return Err(invalid("polyak_tau", format!("must be in (0, 1], got {}", self.polyak_tau)));
        }
        if self.hard_target_update_frequency == 0 {
            return Err(invalid("hard_target_update_frequency", "must be positive"));
        }
        if let Some(max) = self.clip_grad_val {
            if max.is_nan() || max <= 0.0 {
                return Err(invalid("clip_grad_val", format!("must be positive, got {}", max)));
            }
        }
        if self.evaluation && self.evaluation_episodes == 0 {
            return Err(invalid("evaluation_episodes", "must be positive when evaluation is enabled"));
        }
        Ok(())
    }
}
