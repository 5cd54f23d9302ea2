use super::{episode_returns, mean_over_groups, record_means};
use marlbench_abstraction::{
    Batch, CollaboratorError, ExperimentLogger, GroupMap, RenderFrame, ScalarMap, TrainingRecord,
};
use std::collections::BTreeMap;
use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};

/// `timers/collection_time` is stored as `timers_collection_time.csv`.
pub fn scalar_file_name(key: &str) -> String {
    format!("{}.csv", key.replace('/', "_"))
}

fn logger_error(err: &csv::Error) -> CollaboratorError {
    CollaboratorError::Logger(err.to_string())
}

/// Writes every scalar to its own `step,value` CSV file.
///
/// Files are opened in append mode so a restored experiment continues the
/// series it started.
pub struct CsvLogger {
    dir: PathBuf,
    groups: GroupMap,
    writers: BTreeMap<String, csv::Writer<File>>,
}

impl CsvLogger {
    pub fn new(dir: PathBuf, groups: GroupMap) -> crate::error::Result<Self> {
        std::fs::create_dir_all(&dir)?;
        Ok(Self { dir, groups, writers: BTreeMap::new() })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn write(&mut self, key: &str, step: u64, value: f64) -> marlbench_abstraction::Result<()> {
        if !self.writers.contains_key(key) {
            let path = self.dir.join(scalar_file_name(key));
            let is_new = std::fs::metadata(&path).map_or(true, |m| m.len() == 0);
            let file = OpenOptions::new().create(true).append(true).open(&path)?;
            let mut writer = csv::WriterBuilder::new().has_headers(false).from_writer(file);
            if is_new {
                writer.write_record(["step", "value"]).map_err(|e| logger_error(&e))?;
            }
            self.writers.insert(key.to_string(), writer);
        }
        if let Some(writer) = self.writers.get_mut(key) {
            writer.serialize((step, value)).map_err(|e| logger_error(&e))?;
        }
        Ok(())
    }

    fn write_returns(&mut self, prefix: &str, returns: &BTreeMap<String, f64>, step: u64) -> marlbench_abstraction::Result<f64> {
        for (group, value) in returns {
            self.write(&format!("{}/{}/episode_reward_mean", prefix, group), step, *value)?;
        }
        let mean = mean_over_groups(returns);
        self.write(&format!("{}/reward/episode_reward_mean", prefix), step, mean)?;
        Ok(mean)
    }

    fn flush(&mut self) -> marlbench_abstraction::Result<()> {
        for writer in self.writers.values_mut() {
            writer.flush()?;
        }
        Ok(())
    }
}

impl ExperimentLogger for CsvLogger {
    fn log_scalars(&mut self, scalars: &ScalarMap, step: u64) -> marlbench_abstraction::Result<()> {
        for (key, value) in scalars {
            self.write(key, step, *value)?;
        }
        Ok(())
    }

    fn log_collection(
        &mut self,
        batch: &Batch,
        _total_frames: u64,
        _task: &str,
        groups: &GroupMap,
        step: u64,
    ) -> marlbench_abstraction::Result<f64> {
        let returns = episode_returns(batch, groups);
        self.write_returns("collection", &returns, step)
    }

    fn log_training(&mut self, group: &str, records: &[TrainingRecord], step: u64) -> marlbench_abstraction::Result<()> {
        for (name, value) in record_means(records) {
            self.write(&format!("train/{}/{}", group, name), step, value)?;
        }
        Ok(())
    }

    fn log_evaluation(
        &mut self,
        rollouts: &[Batch],
        _frames: &[RenderFrame],
        step: u64,
        total_frames: u64,
    ) -> marlbench_abstraction::Result<()> {
        let mut sums: BTreeMap<String, (f64, usize)> = BTreeMap::new();
        for rollout in rollouts {
            for (group, value) in episode_returns(rollout, &self.groups) {
                let entry = sums.entry(group).or_insert((0.0, 0));
                entry.0 += value;
                entry.1 += 1;
            }
        }
        let returns: BTreeMap<String, f64> = sums.into_iter().map(|(g, (s, n))| (g, s / n as f64)).collect();
        self.write_returns("eval", &returns, step)?;
        self.write("eval/total_frames", step, total_frames as f64)
    }

    fn commit(&mut self) -> marlbench_abstraction::Result<()> {
        self.flush()
    }

    fn finish(&mut self) -> marlbench_abstraction::Result<()> {
        self.flush()
    }
}

/// Reads a scalar file written by [`CsvLogger`].
pub fn read_scalar_csv(path: &Path) -> crate::error::Result<Vec<(u64, f64)>> {
    let mut reader = csv::Reader::from_path(path)?;
    let mut rows = Vec::new();
    for row in reader.deserialize() {
        rows.push(row?);
    }
    Ok(rows)
}
