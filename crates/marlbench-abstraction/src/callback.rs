//! Hooks into the experiment loop.

use crate::batch::Batch;
use crate::error::Result;
use crate::params::{LossValues, TrainingRecord};

/// Extension point notified at fixed points of an experiment. Every hook defaults to a no-op.
pub trait Callback: Send {
    fn on_setup(&mut self) -> Result<()> {
        Ok(())
    }

    fn on_batch_collected(&mut self, _batch: &Batch) -> Result<()> {
        Ok(())
    }

    /// Called after each optimizer pass. Returned values are merged into the training record.
    fn on_train_step(&mut self, _sample: &Batch, _group: &str) -> Result<Option<LossValues>> {
        Ok(None)
    }

    fn on_train_end(&mut self, _records: &[TrainingRecord], _group: &str) -> Result<()> {
        Ok(())
    }

    fn on_evaluation_end(&mut self, _rollouts: &[Batch]) -> Result<()> {
        Ok(())
    }
}
