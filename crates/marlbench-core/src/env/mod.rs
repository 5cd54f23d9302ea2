//! Environment construction for training and evaluation.

mod serial;

pub use serial::SerialEnv;

use crate::error::Result;
use marlbench_abstraction::{EnvRequest, Environment, Task};
use tracing::debug;

/// Whether `env` steps several sub-environments at once.
pub fn is_vectorized(env: &dyn Environment) -> bool {
    !env.batch_size().is_empty()
}

/// Builds the training environment.
///
/// When the evaluation environment is non-vectorized, `n_envs` independent
/// instances are stepped one after the other. Otherwise the task is asked for
/// a vectorized environment of that size.
pub fn make_training_env(
    task: &dyn Task,
    request: &EnvRequest,
    eval_is_vectorized: bool,
) -> Result<Box<dyn Environment>> {
    if eval_is_vectorized {
        debug!(num_envs = request.num_envs, "Building vectorized training environment");
        return Ok(task.make_env(request)?);
    }

    debug!(num_envs = request.num_envs, "Building serial training environment");
    let envs = (0..request.num_envs)
        .map(|i| {
            let single = EnvRequest { num_envs: 1, seed: request.seed.wrapping_add(i as u64), ..request.clone() };
            task.make_env(&single)
        })
        .collect::<marlbench_abstraction::Result<Vec<_>>>()?;
    Ok(Box::new(SerialEnv::new(envs)))
}
