use super::{episode_returns, mean_over_groups, record_means};
use marlbench_abstraction::{Batch, ExperimentLogger, GroupMap, RenderFrame, ScalarMap, TrainingRecord};
use tracing::{debug, info};

/// Emits iteration summaries as tracing events.
pub struct TracingLogger {
    groups: GroupMap,
}

impl TracingLogger {
    pub fn new(groups: GroupMap) -> Self {
        Self { groups }
    }
}

impl ExperimentLogger for TracingLogger {
    fn log_hparams(&mut self, hparams: &serde_json::Value) -> marlbench_abstraction::Result<()> {
        debug!(hparams = %hparams, "Hyper-parameters");
        Ok(())
    }

    fn log_scalars(&mut self, scalars: &ScalarMap, step: u64) -> marlbench_abstraction::Result<()> {
        let get = |k: &str| scalars.get(k).copied().unwrap_or_default();
        if scalars.contains_key("timers/iteration_time") {
            info!(
                step,
                total_frames = get("counters/total_frames"),
                iteration_time = get("timers/iteration_time"),
                collection_time = get("timers/collection_time"),
                training_time = get("timers/training_time"),
                "Iteration finished"
            );
        } else {
            debug!(step, scalars = ?scalars, "Scalars");
        }
        Ok(())
    }

    fn log_collection(
        &mut self,
        batch: &Batch,
        total_frames: u64,
        task: &str,
        groups: &GroupMap,
        step: u64,
    ) -> marlbench_abstraction::Result<f64> {
        let returns = episode_returns(batch, groups);
        let mean = mean_over_groups(&returns);
        info!(step, total_frames, task, mean_return = mean, "Collected batch");
        for (group, value) in &returns {
            debug!(step, group = %group, episode_reward_mean = value, "Group return");
        }
        Ok(mean)
    }

    fn log_training(&mut self, group: &str, records: &[TrainingRecord], step: u64) -> marlbench_abstraction::Result<()> {
        for (key, value) in record_means(records) {
            debug!(step, group, key = %key, value, "Training");
        }
        Ok(())
    }

    fn log_evaluation(
        &mut self,
        rollouts: &[Batch],
        frames: &[RenderFrame],
        step: u64,
        total_frames: u64,
    ) -> marlbench_abstraction::Result<()> {
        let per_rollout: Vec<f64> =
            rollouts.iter().map(|r| mean_over_groups(&episode_returns(r, &self.groups))).collect();
        let mean = if per_rollout.is_empty() { 0.0 } else { per_rollout.iter().sum::<f64>() / per_rollout.len() as f64 };
        info!(step, total_frames, episodes = rollouts.len(), frames = frames.len(), mean_return = mean, "Evaluation");
        Ok(())
    }

    fn finish(&mut self) -> marlbench_abstraction::Result<()> {
        debug!("Console logger finished");
        Ok(())
    }
}
