use super::{episode_returns, RunInfo};
use marlbench_abstraction::{Batch, ExperimentLogger, GroupMap, RenderFrame, ScalarMap, TrainingRecord};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Returns of one evaluation, per group and per rollout.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluationEntry {
    pub step: u64,
    pub total_frames: u64,
    pub returns: BTreeMap<String, Vec<f64>>,
}

/// Contents of `<folder>/<name>.json`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JsonSummary {
    pub environment: String,
    pub task: String,
    pub algorithm: String,
    pub model: String,
    pub seed: u64,
    pub evaluations: Vec<EvaluationEntry>,
}

/// Accumulates evaluation returns into a JSON summary.
pub struct JsonLogger {
    path: PathBuf,
    groups: GroupMap,
    summary: JsonSummary,
}

impl JsonLogger {
    /// Opens the summary at `path`, continuing it when it already exists.
    pub fn open(path: PathBuf, groups: GroupMap, info: &RunInfo) -> crate::error::Result<Self> {
        let summary = if path.is_file() {
            let existing: JsonSummary = serde_json::from_slice(&std::fs::read(&path)?)?;
            debug!(path = %path.display(), evaluations = existing.evaluations.len(), "Continuing JSON summary");
            existing
        } else {
            JsonSummary {
                environment: info.environment.clone(),
                task: info.task.clone(),
                algorithm: info.algorithm.clone(),
                model: info.model.clone(),
                seed: info.seed,
                evaluations: Vec::new(),
            }
        };
        Ok(Self { path, groups, summary })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn summary(&self) -> &JsonSummary {
        &self.summary
    }

    fn save(&self) -> marlbench_abstraction::Result<()> {
        if let Some(dir) = self.path.parent() {
            std::fs::create_dir_all(dir)?;
        }
        std::fs::write(&self.path, serde_json::to_vec_pretty(&self.summary)?)?;
        Ok(())
    }
}

impl ExperimentLogger for JsonLogger {
    fn log_scalars(&mut self, _scalars: &ScalarMap, _step: u64) -> marlbench_abstraction::Result<()> {
        Ok(())
    }

    fn log_collection(
        &mut self,
        batch: &Batch,
        _total_frames: u64,
        _task: &str,
        groups: &GroupMap,
        _step: u64,
    ) -> marlbench_abstraction::Result<f64> {
        Ok(super::mean_over_groups(&episode_returns(batch, groups)))
    }

    fn log_training(&mut self, _group: &str, _records: &[TrainingRecord], _step: u64) -> marlbench_abstraction::Result<()> {
        Ok(())
    }

    fn log_evaluation(
        &mut self,
        rollouts: &[Batch],
        _frames: &[RenderFrame],
        step: u64,
        total_frames: u64,
    ) -> marlbench_abstraction::Result<()> {
        let mut returns: BTreeMap<String, Vec<f64>> = BTreeMap::new();
        for rollout in rollouts {
            for (group, value) in episode_returns(rollout, &self.groups) {
                returns.entry(group).or_default().push(value);
            }
        }
        self.summary.evaluations.push(EvaluationEntry { step, total_frames, returns });
        self.save()
    }

    fn finish(&mut self) -> marlbench_abstraction::Result<()> {
        self.save()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use marlbench_abstraction::Tensor;
    use tempfile::TempDir;

    fn info() -> RunInfo {
        RunInfo {
            algorithm: "mappo".to_string(),
            task: "balance".to_string(),
            environment: "vmas".to_string(),
            model: "mlp".to_string(),
            seed: 7,
        }
    }

    fn rollout(reward: f32) -> Batch {
        let mut b = Batch::new(vec![2]);
        b.insert("next/agents/episode_reward", Tensor::from_vec(vec![2, 1, 1], vec![0.0, reward]).unwrap())
            .unwrap();
        b.insert("next/done", Tensor::from_vec(vec![2, 1], vec![0.0, 1.0]).unwrap()).unwrap();
        b
    }

    #[test]
    fn test_records_each_rollout_and_reopens() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("run.json");
        let groups = GroupMap::new([("agents", vec!["a0"])]).unwrap();

        let mut logger = JsonLogger::open(path.clone(), groups.clone(), &info()).unwrap();
        logger.log_evaluation(&[rollout(1.0), rollout(3.0)], &[], 0, 100).unwrap();
        logger.finish().unwrap();

        let summary: JsonSummary = serde_json::from_slice(&std::fs::read(&path).unwrap()).unwrap();
        assert_eq!(summary.seed, 7);
        assert_eq!(summary.evaluations.len(), 1);
        assert_eq!(summary.evaluations[0].returns["agents"], vec![1.0, 3.0]);

        let mut reopened = JsonLogger::open(path, groups, &info()).unwrap();
        reopened.log_evaluation(&[rollout(2.0)], &[], 1, 200).unwrap();
        assert_eq!(reopened.summary().evaluations.len(), 2);
    }
}
