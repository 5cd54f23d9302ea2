//! Metric sink contract.

use crate::batch::Batch;
use crate::error::Result;
use crate::group::GroupMap;
use crate::params::TrainingRecord;
use crate::task::RenderFrame;
use std::collections::BTreeMap;

/// Scalar metrics keyed by path, e.g. `timers/collection_time`.
pub type ScalarMap = BTreeMap<String, f64>;

/// Receives every metric an experiment produces.
pub trait ExperimentLogger: Send {
    fn log_hparams(&mut self, _hparams: &serde_json::Value) -> Result<()> {
        Ok(())
    }

    fn log_scalars(&mut self, scalars: &ScalarMap, step: u64) -> Result<()>;

    /// Logs a collected batch and returns its mean episode return.
    fn log_collection(
        &mut self,
        batch: &Batch,
        total_frames: u64,
        task: &str,
        groups: &GroupMap,
        step: u64,
    ) -> Result<f64>;

    /// Logs the records of every optimizer pass run for `group` in one iteration.
    fn log_training(&mut self, group: &str, records: &[TrainingRecord], step: u64) -> Result<()>;

    fn log_evaluation(
        &mut self,
        rollouts: &[Batch],
        frames: &[RenderFrame],
        step: u64,
        total_frames: u64,
    ) -> Result<()>;

    /// Marks the end of an iteration.
    fn commit(&mut self) -> Result<()> {
        Ok(())
    }

    /// Flushes everything. Called once at shutdown.
    fn finish(&mut self) -> Result<()>;
}
