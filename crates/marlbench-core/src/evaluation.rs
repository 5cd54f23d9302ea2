//! Evaluation rollouts.

use crate::collector::EpisodeRewards;
use crate::env::is_vectorized;
use crate::error::Result;
use marlbench_abstraction::{ActionSelection, Batch, Environment, Policy, RenderFrame};
use tracing::debug;

/// When a rollout ends before its step ceiling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RolloutStop {
    /// As soon as any sub-environment or agent reports done.
    AnyDone,
    /// Only once every sub-environment has reported done.
    AllDone,
}

/// Runs one rollout from a fresh reset.
///
/// Returns the trajectory with time as the last batch dimension, plus any
/// captured frames when `render` is set.
pub async fn rollout(
    env: &mut dyn Environment,
    policy: &mut dyn Policy,
    selection: ActionSelection,
    max_steps: usize,
    stop: RolloutStop,
    render: bool,
) -> Result<(Batch, Vec<RenderFrame>)> {
    let mut input = env.reset(None).await?;
    let mut steps = Vec::new();
    let mut frames = Vec::new();
    let mut finished = vec![false; input.leading()];
    let mut rewards = EpisodeRewards::default();

    for _ in 0..max_steps.max(1) {
        policy.act(&mut input, selection)?;
        let mut out = env.step(input).await?;
        rewards.accumulate(&mut out)?;
        if render {
            if let Some(frame) = env.render().await? {
                frames.push(frame);
            }
        }

        let done = out.any_done()?;
        let next = out.next_as_root();
        steps.push(out);

        let stop_now = match stop {
            RolloutStop::AnyDone => done.iter().any(|&d| d),
            RolloutStop::AllDone => {
                for (f, d) in finished.iter_mut().zip(&done) {
                    *f |= *d;
                }
                finished.iter().all(|&f| f)
            }
        };
        if stop_now {
            break;
        }
        input = next;
    }

    let stacked = Batch::stack(&steps)?;
    let trajectory = if stacked.batch_size().len() >= 2 { stacked.transpose_leading()? } else { stacked };
    Ok((trajectory, frames))
}

/// Evaluation settings fixed at setup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Evaluator {
    pub episodes: usize,
    pub max_steps: usize,
    pub selection: ActionSelection,
    /// Capture frames. Only set when the task can render and rendering is enabled.
    pub render: bool,
}

impl Evaluator {
    pub fn new(episodes: usize, max_steps: usize, deterministic: bool, render: bool) -> Self {
        let selection = if deterministic { ActionSelection::Mode } else { ActionSelection::Random };
        Self { episodes, max_steps, selection, render }
    }

    /// Rolls out the current policy without touching any training state.
    ///
    /// A non-vectorized environment runs `episodes` rollouts in turn, each
    /// stopping at the first done, rendering only the first. A vectorized
    /// environment runs one rollout across all sub-environments that stops only
    /// once every one has finished, split into one rollout per sub-environment.
    pub async fn evaluate(
        &self,
        env: &mut dyn Environment,
        policy: &mut dyn Policy,
    ) -> Result<(Vec<Batch>, Vec<RenderFrame>)> {
        if is_vectorized(env) {
            let (trajectory, frames) =
                rollout(env, policy, self.selection, self.max_steps, RolloutStop::AllDone, self.render).await?;
            let rollouts = trajectory.unbind()?;
            debug!(rollouts = rollouts.len(), "Finished vectorized evaluation");
            return Ok((rollouts, frames));
        }

        let mut rollouts = Vec::with_capacity(self.episodes);
        let mut frames = Vec::new();
        for episode in 0..self.episodes {
            let render = self.render && episode == 0;
            let (trajectory, episode_frames) =
                rollout(env, policy, self.selection, self.max_steps, RolloutStop::AnyDone, render).await?;
            rollouts.push(trajectory);
            frames.extend(episode_frames);
        }
        debug!(rollouts = rollouts.len(), "Finished sequential evaluation");
        Ok((rollouts, frames))
    }
}
