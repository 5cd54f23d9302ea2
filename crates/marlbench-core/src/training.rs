//! Per-group training.
//!
//! Each group owns its replay buffer, loss computer, optional target updater
//! and one optimizer per optimizable loss term. Groups never see each other's
//! data.

use crate::config::ExperimentConfig;
use crate::error::Result;
use marlbench_abstraction::{
    is_loss_term, Algorithm, Batch, Callback, FieldKey, GroupMap, LossComputer, ReplayBuffer,
    TargetUpdater, TrainingRecord, INFO, NEXT,
};
use marlbench_training::{Adam, GradClip};
use std::collections::BTreeMap;
use tracing::debug;

/// Keys stripped from a batch before `group` trains on it.
///
/// Every other group's fields (current and next step) plus the root and
/// per-group `info` entries.
pub fn excluded_keys(group: &str, groups: &GroupMap) -> Vec<FieldKey> {
    let mut keys = Vec::new();
    for other in groups.groups().filter(|g| *g != group) {
        keys.push(FieldKey::from([other]));
        keys.push(FieldKey::from([NEXT, other]));
    }
    keys.push(FieldKey::from([INFO]));
    keys.push(FieldKey::from([group, INFO]));
    keys.push(FieldKey::from([NEXT, group, INFO]));
    keys
}

/// The part of `batch` that `group` may train on.
pub fn group_view(batch: &Batch, group: &str, groups: &GroupMap) -> Batch {
    batch.exclude(&excluded_keys(group, groups))
}

/// Training state of one group.
pub struct GroupTrainer {
    group: String,
    buffer: Box<dyn ReplayBuffer>,
    loss: Box<dyn LossComputer>,
    target_updater: Option<Box<dyn TargetUpdater>>,
    optimizers: BTreeMap<String, Adam>,
}

impl GroupTrainer {
    /// Asks `algorithm` for every component of `group`.
    pub fn build(algorithm: &mut dyn Algorithm, group: &str, config: &ExperimentConfig) -> Result<Self> {
        let buffer = algorithm.replay_buffer_for(group)?;
        let (loss, target_updater) = algorithm.loss_and_target_updater_for(group)?;
        let optimizers = algorithm
            .trainable_parameters_for(group, &*loss)
            .into_iter()
            .map(|(term, params)| (term, Adam::new(params, config.lr, config.adam_eps)))
            .collect::<BTreeMap<_, _>>();
        debug!(
            group = %group,
            optimizers = optimizers.len(),
            buffer_capacity = buffer.capacity(),
            has_target_updater = target_updater.is_some(),
            "Built group trainer"
        );
        Ok(Self { group: group.to_string(), buffer, loss, target_updater, optimizers })
    }

    pub fn group(&self) -> &str {
        &self.group
    }

    pub fn buffer(&self) -> &dyn ReplayBuffer {
        &*self.buffer
    }

    pub fn buffer_mut(&mut self) -> &mut dyn ReplayBuffer {
        &mut *self.buffer
    }

    pub fn loss(&self) -> &dyn LossComputer {
        &*self.loss
    }

    pub fn loss_mut(&mut self) -> &mut dyn LossComputer {
        &mut *self.loss
    }

    pub fn optimizer_terms(&self) -> impl Iterator<Item = &str> {
        self.optimizers.keys().map(String::as_str)
    }

    /// Filters, normalizes and flattens a collected batch into the buffer.
    pub fn ingest(&mut self, algorithm: &dyn Algorithm, batch: &Batch, groups: &GroupMap) -> Result<()> {
        let view = group_view(batch, &self.group, groups);
        let normalized = algorithm.normalize_batch(&self.group, view)?;
        self.buffer.extend(normalized.flatten()?)?;
        Ok(())
    }

    /// Runs `passes` optimizer passes and returns one record per pass.
    pub fn train(
        &mut self,
        algorithm: &dyn Algorithm,
        clip: GradClip,
        passes: u64,
        callbacks: &mut [Box<dyn Callback>],
    ) -> Result<Vec<TrainingRecord>> {
        let mut records = Vec::with_capacity(passes as usize);
        for _ in 0..passes {
            records.push(self.optimizer_pass(algorithm, clip, callbacks)?);
        }
        Ok(records)
    }

    fn optimizer_pass(
        &mut self,
        algorithm: &dyn Algorithm,
        clip: GradClip,
        callbacks: &mut [Box<dyn Callback>],
    ) -> Result<TrainingRecord> {
        let sample = self.buffer.sample()?;
        let losses = self.loss.forward(&sample)?;
        let mut record: TrainingRecord = losses.clone();
        let losses = algorithm.post_process_loss(&self.group, losses)?;

        for term in losses.keys().filter(|k| is_loss_term(k)) {
            let Some(optimizer) = self.optimizers.get_mut(term) else {
                continue;
            };
            self.loss.backward(term)?;
            let params = self.loss.parameters_mut();
            let grad_norm = clip.clip(params, optimizer.params());
            record.insert(format!("grad_norm_{}", term), grad_norm);
            optimizer.step(params)?;
            optimizer.zero_grad(params);
        }

        self.buffer.update_priority(&sample)?;
        if let Some(updater) = self.target_updater.as_mut() {
            updater.step(self.loss.parameters_mut())?;
        }

        for callback in callbacks.iter_mut() {
            if let Some(extra) = callback.on_train_step(&sample, &self.group)? {
                record.extend(extra);
            }
        }
        Ok(record)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use marlbench_abstraction::Tensor;

    fn groups() -> GroupMap {
        GroupMap::new([("a", vec!["a0", "a1"]), ("b", vec!["b0"])]).unwrap()
    }

    fn two_group_batch() -> Batch {
        let mut batch = Batch::new(vec![2, 3]);
        for key in [
            "a/observation",
            "a/info/energy",
            "b/observation",
            "info/step",
            "next/a/reward",
            "next/a/info/energy",
            "next/b/reward",
            "next/done",
        ] {
            batch.insert(key, Tensor::zeros(vec![2, 3, 1])).unwrap();
        }
        batch
    }

    #[test]
    fn test_group_view_isolates_group() {
        let view = group_view(&two_group_batch(), "a", &groups());
        let keys: Vec<String> = view.keys().map(ToString::to_string).collect();
        assert_eq!(keys, vec!["a/observation", "next/a/reward", "next/done"]);
    }

    #[test]
    fn test_group_view_has_no_foreign_fields() {
        let view = group_view(&two_group_batch(), "b", &groups());
        for key in view.keys() {
            assert!(!key.starts_with(&FieldKey::from("a")));
            assert!(!key.starts_with(&FieldKey::from("next/a")));
            assert_ne!(key.head(), INFO);
            assert!(!key.parts().iter().any(|p| p == INFO));
        }
        assert!(view.contains(&FieldKey::from("b/observation")));
    }
}
