use super::ExperimentConfig;
use marlbench_abstraction::TrainingSettings;
use serde::{Deserialize, Serialize};

/// Every number derived from a configuration for one training mode, computed once.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExperimentPlan {
    pub on_policy: bool,
    pub frames_per_batch: u64,
    pub n_envs_per_worker: usize,
    pub train_batch_size: u64,
    pub train_minibatch_size: u64,
    pub n_optimizer_steps: u64,
    pub minibatches_per_step: u64,
    pub replay_buffer_memory_size: u64,
    pub init_random_frames: u64,
    pub max_frames: u64,
    pub max_iterations: u64,
    pub exploration_anneal_frames: u64,
}

impl ExperimentPlan {
    pub fn new(config: &ExperimentConfig, on_policy: bool) -> Self {
        Self {
            on_policy,
            frames_per_batch: config.collected_frames_per_batch(on_policy),
            n_envs_per_worker: config.n_envs_per_worker(on_policy),
            train_batch_size: config.train_batch_size(on_policy),
            train_minibatch_size: config.train_minibatch_size(on_policy),
            n_optimizer_steps: config.n_optimizer_steps(on_policy),
            minibatches_per_step: config.minibatches_per_step(on_policy),
            replay_buffer_memory_size: config.replay_buffer_memory_size(on_policy),
            init_random_frames: config.init_random_frames(on_policy),
            max_frames: config.max_frames(on_policy),
            max_iterations: config.max_iterations(on_policy),
            exploration_anneal_frames: config.exploration_anneal_horizon(on_policy),
        }
    }

    /// Optimizer passes per group per iteration.
    pub fn optimizer_passes(&self) -> u64 {
        self.n_optimizer_steps * self.minibatches_per_step
    }

    /// Settings handed to the algorithm at construction.
    pub fn training_settings(&self, config: &ExperimentConfig) -> TrainingSettings {
        TrainingSettings {
            on_policy: self.on_policy,
            train_minibatch_size: self.train_minibatch_size as usize,
            replay_capacity: self.replay_buffer_memory_size as usize,
            gamma: config.gamma,
            polyak_tau: config.polyak_tau,
            soft_target_update: config.soft_target_update,
            hard_target_update_frequency: config.hard_target_update_frequency,
            exploration_eps_init: config.exploration_eps_init,
            exploration_eps_end: config.exploration_eps_end,
            exploration_anneal_frames: self.exploration_anneal_frames,
            train_device: config.train_device.clone(),
            share_policy_params: config.share_policy_params,
        }
    }
}
