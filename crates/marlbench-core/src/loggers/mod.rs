//! Reference metric sinks.

mod console;
mod csv_logger;
mod json_logger;

pub use console::TracingLogger;
pub use csv_logger::{read_scalar_csv, scalar_file_name, CsvLogger};
pub use json_logger::{EvaluationEntry, JsonLogger, JsonSummary};

use crate::collector::EPISODE_REWARD;
use crate::config::{ExperimentConfig, LoggerKind};
use crate::error::Result;
use crate::layout::ExperimentLayout;
use marlbench_abstraction::{
    Batch, ExperimentLogger, FieldKey, GroupMap, RenderFrame, ScalarMap, TrainingRecord, NEXT,
};
use std::collections::BTreeMap;
use tracing::debug;

/// Identifies the run, for sinks that record it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunInfo {
    pub algorithm: String,
    pub task: String,
    pub environment: String,
    pub model: String,
    pub seed: u64,
}

fn done_key(batch: &Batch, group: &str) -> Option<FieldKey> {
    let per_group = FieldKey::from([NEXT, group, "done"]);
    if batch.contains(&per_group) {
        return Some(per_group);
    }
    let shared = FieldKey::from([NEXT, "done"]);
    batch.contains(&shared).then_some(shared)
}

/// Per-group mean episode return over the episodes that ended in `batch`.
///
/// Episode rewards are averaged over agents. When no episode ended, the value
/// at each trajectory's last step is used. Groups without an `episode_reward`
/// field or a done flag are left out.
pub fn episode_returns(batch: &Batch, groups: &GroupMap) -> BTreeMap<String, f64> {
    let frames = batch.numel();
    let last_dim = batch.batch_size().last().copied().unwrap_or(1).max(1);
    let mut out = BTreeMap::new();
    if frames == 0 {
        return out;
    }

    for group in groups.groups() {
        let Some(reward) = batch.get(&FieldKey::from([NEXT, group, EPISODE_REWARD])) else {
            continue;
        };
        let Some(done) = done_key(batch, group).and_then(|k| batch.get(&k)) else {
            continue;
        };
        let (Ok(per_frame), Ok(ended)) = (reward.row_means(frames), done.any_nonzero_per_row(frames)) else {
            continue;
        };

        let mut finished: Vec<f64> = per_frame.iter().zip(&ended).filter(|(_, d)| **d).map(|(r, _)| *r).collect();
        if finished.is_empty() {
            finished = per_frame.iter().skip(last_dim - 1).step_by(last_dim).copied().collect();
        }
        if !finished.is_empty() {
            out.insert(group.to_string(), finished.iter().sum::<f64>() / finished.len() as f64);
        }
    }
    out
}

/// Mean over groups, `0.0` when there is nothing to average.
pub fn mean_over_groups(returns: &BTreeMap<String, f64>) -> f64 {
    if returns.is_empty() {
        return 0.0;
    }
    returns.values().sum::<f64>() / returns.len() as f64
}

/// Mean of every key across training records.
pub fn record_means(records: &[TrainingRecord]) -> BTreeMap<String, f64> {
    let mut sums: BTreeMap<String, (f64, usize)> = BTreeMap::new();
    for record in records {
        for (k, v) in record {
            let entry = sums.entry(k.clone()).or_insert((0.0, 0));
            entry.0 += v;
            entry.1 += 1;
        }
    }
    sums.into_iter().map(|(k, (sum, n))| (k, sum / n as f64)).collect()
}

/// Fans every call out to several loggers.
///
/// `log_collection` reports the first logger's mean return, or computes it
/// directly when there are no loggers.
#[derive(Default)]
pub struct MultiLogger {
    loggers: Vec<Box<dyn ExperimentLogger>>,
}

impl MultiLogger {
    pub fn new(loggers: Vec<Box<dyn ExperimentLogger>>) -> Self {
        Self { loggers }
    }

    /// Loggers selected by `config`, plus `custom` when given.
    pub fn from_config(
        config: &ExperimentConfig,
        layout: &ExperimentLayout,
        groups: &GroupMap,
        info: &RunInfo,
        custom: Option<Box<dyn ExperimentLogger>>,
    ) -> Result<Self> {
        let mut loggers: Vec<Box<dyn ExperimentLogger>> = Vec::new();
        for kind in &config.loggers {
            match kind {
                LoggerKind::Csv => loggers.push(Box::new(CsvLogger::new(layout.scalars_dir(), groups.clone())?)),
                LoggerKind::Console => loggers.push(Box::new(TracingLogger::new(groups.clone()))),
            }
        }
        if config.create_json {
            loggers.push(Box::new(JsonLogger::open(layout.json_path(), groups.clone(), info)?));
        }
        if let Some(custom) = custom {
            loggers.push(custom);
        }
        debug!(loggers = loggers.len(), "Configured loggers");
        Ok(Self::new(loggers))
    }

    pub fn len(&self) -> usize {
        self.loggers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.loggers.is_empty()
    }
}

impl ExperimentLogger for MultiLogger {
    fn log_hparams(&mut self, hparams: &serde_json::Value) -> marlbench_abstraction::Result<()> {
        self.loggers.iter_mut().try_for_each(|l| l.log_hparams(hparams))
    }

    fn log_scalars(&mut self, scalars: &ScalarMap, step: u64) -> marlbench_abstraction::Result<()> {
        self.loggers.iter_mut().try_for_each(|l| l.log_scalars(scalars, step))
    }

    fn log_collection(
        &mut self,
        batch: &Batch,
        total_frames: u64,
        task: &str,
        groups: &GroupMap,
        step: u64,
    ) -> marlbench_abstraction::Result<f64> {
        let mut first = None;
        for logger in &mut self.loggers {
            let mean = logger.log_collection(batch, total_frames, task, groups, step)?;
            first.get_or_insert(mean);
        }
        Ok(first.unwrap_or_else(|| mean_over_groups(&episode_returns(batch, groups))))
    }

    fn log_training(
        &mut self,
        group: &str,
        records: &[TrainingRecord],
        step: u64,
    ) -> marlbench_abstraction::Result<()> {
        self.loggers.iter_mut().try_for_each(|l| l.log_training(group, records, step))
    }

    fn log_evaluation(
        &mut self,
        rollouts: &[Batch],
        frames: &[RenderFrame],
        step: u64,
        total_frames: u64,
    ) -> marlbench_abstraction::Result<()> {
        self.loggers.iter_mut().try_for_each(|l| l.log_evaluation(rollouts, frames, step, total_frames))
    }

    fn commit(&mut self) -> marlbench_abstraction::Result<()> {
        self.loggers.iter_mut().try_for_each(|l| l.commit())
    }

    fn finish(&mut self) -> marlbench_abstraction::Result<()> {
        self.loggers.iter_mut().try_for_each(|l| l.finish())
    }
}
