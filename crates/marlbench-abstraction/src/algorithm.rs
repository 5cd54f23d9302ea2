//! Algorithm capability interfaces.
//!
//! An [`AlgorithmConfig`] declares what an algorithm can do and builds an
//! [`Algorithm`], which in turn produces the per-group components the
//! orchestrator trains: a replay buffer, a loss computer, an optional target
//! updater and the policy used for collection.

use crate::batch::Batch;
use crate::error::Result;
use crate::group::GroupMap;
use crate::params::{LossValues, ParameterStore, PolicyWeights};
use crate::spec::{ActionMode, ActionSelection, ActionSupport, SpecBundle};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;

/// Acts on batches of observations.
pub trait Policy: Send {
    /// Writes `<group>/action` for every group present in `batch`.
    fn act(&mut self, batch: &mut Batch, selection: ActionSelection) -> Result<()>;

    fn load_weights(&mut self, weights: &PolicyWeights) -> Result<()>;

    /// The annealing hook of the group's action-selection layer, if any.
    fn exploration_mut(&mut self, _group: &str) -> Option<&mut dyn ExplorationAnneal> {
        None
    }
}

/// An exploration parameter decayed by frames collected.
pub trait ExplorationAnneal: Send {
    fn step(&mut self, frames: usize);

    fn value(&self) -> f64;
}

/// Describes a policy or critic architecture. Only algorithms interpret it.
pub trait ModelConfig: Send + Sync {
    fn name(&self) -> &str;

    fn config(&self) -> serde_json::Value {
        serde_json::Value::Null
    }
}

/// Stores transitions for one group.
pub trait ReplayBuffer: Send {
    /// Appends a flat batch of transitions.
    fn extend(&mut self, batch: Batch) -> Result<()>;

    /// Draws one training minibatch.
    fn sample(&mut self) -> Result<Batch>;

    /// Updates sampling priorities from a trained minibatch. No-op for unprioritized buffers.
    fn update_priority(&mut self, _sample: &Batch) -> Result<()> {
        Ok(())
    }

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn capacity(&self) -> usize;

    fn state_dict(&self) -> Result<serde_json::Value>;

    fn load_state_dict(&mut self, state: serde_json::Value) -> Result<()>;
}

/// Computes loss terms and their gradients for one group.
pub trait LossComputer: Send {
    /// Runs a forward pass. Keys starting with `loss` are optimizable terms.
    fn forward(&mut self, sample: &Batch) -> Result<LossValues>;

    /// Accumulates the gradient of `term` from the last forward pass into the parameters.
    fn backward(&mut self, term: &str) -> Result<()>;

    fn parameters(&self) -> &ParameterStore;

    fn parameters_mut(&mut self) -> &mut ParameterStore;

    /// Parameters the collection policy needs.
    fn policy_weights(&self) -> ParameterStore {
        self.parameters().clone()
    }

    fn state_dict(&self) -> Result<serde_json::Value> {
        Ok(serde_json::to_value(self.parameters())?)
    }

    fn load_state_dict(&mut self, state: serde_json::Value) -> Result<()> {
        *self.parameters_mut() = serde_json::from_value(state)?;
        Ok(())
    }
}

/// Keeps target parameters in sync with their online counterparts.
pub trait TargetUpdater: Send {
    fn step(&mut self, params: &mut ParameterStore) -> Result<()>;

    /// Number of updates performed so far.
    fn steps(&self) -> u64;
}

/// Numbers derived once from the experiment configuration and handed to algorithms.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainingSettings {
    pub on_policy: bool,
    pub train_minibatch_size: usize,
    pub replay_capacity: usize,
    pub gamma: f64,
    pub polyak_tau: f64,
    pub soft_target_update: bool,
    pub hard_target_update_frequency: u64,
    pub exploration_eps_init: f64,
    pub exploration_eps_end: f64,
    pub exploration_anneal_frames: u64,
    pub train_device: String,
    pub share_policy_params: bool,
}

/// Everything an algorithm needs at construction.
#[derive(Clone)]
pub struct AlgorithmContext {
    pub spec: SpecBundle,
    pub group_map: GroupMap,
    pub action_mode: ActionMode,
    pub seed: u64,
    pub settings: TrainingSettings,
    pub model: Arc<dyn ModelConfig>,
    pub critic_model: Arc<dyn ModelConfig>,
}

/// Declares an algorithm's capabilities and builds it.
pub trait AlgorithmConfig: Send + Sync {
    fn name(&self) -> &str;

    /// Whether the algorithm consumes each batch once right after collection.
    fn on_policy(&self) -> bool;

    fn action_support(&self) -> ActionSupport;

    fn config(&self) -> serde_json::Value {
        serde_json::Value::Null
    }

    fn build(&self, context: AlgorithmContext) -> Result<Box<dyn Algorithm>>;
}

/// A built algorithm producing per-group training components.
pub trait Algorithm: Send {
    fn replay_buffer_for(&mut self, group: &str) -> Result<Box<dyn ReplayBuffer>>;

    fn loss_and_target_updater_for(
        &mut self,
        group: &str,
    ) -> Result<(Box<dyn LossComputer>, Option<Box<dyn TargetUpdater>>)>;

    /// Parameter names optimized for each loss term. Terms absent here are not stepped.
    fn trainable_parameters_for(&self, group: &str, loss: &dyn LossComputer) -> BTreeMap<String, Vec<String>>;

    fn policy_for_collection(&mut self) -> Result<Box<dyn Policy>>;

    /// Reshapes or augments a filtered group batch before it enters the buffer.
    fn normalize_batch(&self, _group: &str, batch: Batch) -> Result<Batch> {
        Ok(batch)
    }

    fn post_process_loss(&self, _group: &str, losses: LossValues) -> Result<LossValues> {
        Ok(losses)
    }
}
