//! Synchronous trajectory collection.

use crate::error::Result;
use marlbench_abstraction::{
    ActionSelection, Batch, Environment, FieldKey, Policy, PolicyWeights, Tensor,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::{debug, warn};

/// Leaf under which per-group episode returns accumulate.
pub const EPISODE_REWARD: &str = "episode_reward";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
struct CollectorState {
    frames_collected: u64,
    iterations: u64,
}

/// Running per-episode reward sums, stored next to every `next/.../reward` field.
#[derive(Debug, Default)]
pub(crate) struct EpisodeRewards {
    sums: BTreeMap<FieldKey, Tensor>,
}

impl EpisodeRewards {
    /// Adds this step's rewards and writes the running sums into `out` as `episode_reward`.
    pub(crate) fn accumulate(&mut self, out: &mut Batch) -> Result<()> {
        let reward_keys: Vec<FieldKey> = out.keys().filter(|k| k.is_next() && k.leaf() == "reward").cloned().collect();
        for key in reward_keys {
            let reward = out.require(&key)?.clone();
            let acc = self.sums.entry(key.clone()).or_insert_with(|| Tensor::zeros(reward.shape().to_vec()));
            acc.add_assign(&reward)?;
            out.insert(key.with_leaf(EPISODE_REWARD), acc.clone())?;
        }
        Ok(())
    }

    /// Restarts the sums of the finished sub-environments.
    pub(crate) fn clear(&mut self, done: &[bool]) -> Result<()> {
        for acc in self.sums.values_mut() {
            acc.fill_rows(done, 0.0)?;
        }
        Ok(())
    }
}

/// Steps a training environment with the collection policy until a frame budget is met.
///
/// Each batch has batch size `[n_envs, steps]`. Sub-environments that finish an
/// episode are reset in place, and per-group `episode_reward` fields are kept
/// next to every `next/<group>/reward`.
pub struct SyncCollector {
    env: Box<dyn Environment>,
    policy: Box<dyn Policy>,
    steps_per_batch: usize,
    max_frames: u64,
    init_random_frames: u64,
    frames_collected: u64,
    iterations: u64,
    current: Option<Batch>,
    episode_rewards: EpisodeRewards,
    closed: bool,
}

impl SyncCollector {
    pub fn new(
        env: Box<dyn Environment>,
        policy: Box<dyn Policy>,
        frames_per_batch: u64,
        max_frames: u64,
        init_random_frames: u64,
    ) -> Self {
        let n_envs = env.batch_size().iter().product::<usize>().max(1);
        let steps_per_batch = (frames_per_batch as usize).div_ceil(n_envs).max(1);
        let actual = (steps_per_batch * n_envs) as u64;
        if actual != frames_per_batch {
            warn!(
                requested = frames_per_batch,
                collected = actual,
                n_envs,
                "Frames per batch is not divisible by the number of environments; rounding up"
            );
        }
        Self {
            env,
            policy,
            steps_per_batch,
            max_frames,
            init_random_frames,
            frames_collected: 0,
            iterations: 0,
            current: None,
            episode_rewards: EpisodeRewards::default(),
            closed: false,
        }
    }

    /// Frames in every batch, after rounding up to a multiple of the number of environments.
    pub fn frames_per_batch(&self) -> u64 {
        let n_envs = self.env.batch_size().iter().product::<usize>().max(1);
        (self.steps_per_batch * n_envs) as u64
    }

    pub fn frames_collected(&self) -> u64 {
        self.frames_collected
    }

    pub fn iterations(&self) -> u64 {
        self.iterations
    }

    /// Whether the frame ceiling has been reached.
    pub fn is_exhausted(&self) -> bool {
        self.frames_collected >= self.max_frames
    }

    pub fn policy_mut(&mut self) -> &mut dyn Policy {
        &mut *self.policy
    }

    /// Collects the next batch, or `None` once the frame ceiling is reached.
    pub async fn next_batch(&mut self) -> Result<Option<Batch>> {
        if self.is_exhausted() {
            return Ok(None);
        }
        let mut input = match self.current.take() {
            Some(batch) => batch,
            None => self.env.reset(None).await?,
        };

        let mut steps = Vec::with_capacity(self.steps_per_batch);
        for _ in 0..self.steps_per_batch {
            let selection = if self.frames_collected < self.init_random_frames {
                ActionSelection::Uniform
            } else {
                ActionSelection::Random
            };
            self.policy.act(&mut input, selection)?;
            let mut out = self.env.step(input).await?;
            self.episode_rewards.accumulate(&mut out)?;

            let done = out.any_done()?;
            let mut next = out.next_as_root();
            if done.iter().any(|&d| d) {
                self.episode_rewards.clear(&done)?;
                let reset = self.env.reset(Some(&done)).await?;
                for (key, value) in reset.iter() {
                    next.insert(key.clone(), value.clone())?;
                }
            }
            steps.push(out);
            input = next;
        }
        self.current = Some(input);

        let stacked = Batch::stack(&steps)?;
        let batch = if stacked.batch_size().len() >= 2 { stacked.transpose_leading()? } else { stacked };

        self.frames_collected += batch.numel() as u64;
        self.iterations += 1;
        debug!(
            frames = batch.numel(),
            frames_collected = self.frames_collected,
            iteration = self.iterations,
            "Collected batch"
        );
        Ok(Some(batch))
    }

    pub fn update_policy_weights(&mut self, weights: &PolicyWeights) -> Result<()> {
        self.policy.load_weights(weights)?;
        Ok(())
    }

    pub fn state_dict(&self) -> Result<serde_json::Value> {
        let state = CollectorState { frames_collected: self.frames_collected, iterations: self.iterations };
        Ok(serde_json::to_value(state)?)
    }

    pub fn load_state_dict(&mut self, state: serde_json::Value) -> Result<()> {
        let state: CollectorState = serde_json::from_value(state)?;
        self.frames_collected = state.frames_collected;
        self.iterations = state.iterations;
        Ok(())
    }

    /// Closes the environment. Later calls do nothing.
    pub async fn shutdown(&mut self) -> Result<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        self.env.close().await?;
        Ok(())
    }
}
