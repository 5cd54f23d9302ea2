//! Derives the group partition and specs from a constructed environment.

use crate::error::{ExperimentError, Result};
use marlbench_abstraction::{CollaboratorError, Environment, GroupMap, SpecBundle, Task};
use tracing::debug;

/// Queries `task` about `env` once. The result is treated as fixed for the whole run.
pub fn resolve_specs(task: &dyn Task, env: &dyn Environment) -> Result<(GroupMap, SpecBundle)> {
    let group_map = task.group_map(env).map_err(|err| match err {
        CollaboratorError::InvalidGroupMap(reason) => ExperimentError::InvalidGroupMap(reason),
        other => ExperimentError::Collaborator(other),
    })?;

    let bundle = SpecBundle {
        observation: task.observation_spec(env)?,
        action: task.action_spec(env)?,
        state: task.state_spec(env)?,
        action_mask: task.action_mask_spec(env)?,
        info: task.info_spec(env)?,
        max_steps: task.max_steps(env),
    };

    debug!(
        task = task.name(),
        groups = group_map.len(),
        observation_fields = bundle.observation.len(),
        has_state = bundle.state.is_some(),
        max_steps = bundle.max_steps,
        "Resolved environment specs"
    );

    Ok((group_map, bundle))
}
