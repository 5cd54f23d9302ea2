//! Action-mode negotiation between a task and an algorithm.

use crate::error::ConfigError;
use marlbench_abstraction::{ActionMode, ActionSupport};

/// Picks the action mode both sides support.
///
/// Continuous wins when both sides support it and it is preferred. Otherwise
/// discrete is chosen if both support it, then continuous. The preference only
/// breaks ties between mutually available modes.
pub fn resolve_action_mode(
    task: ActionSupport,
    algorithm: ActionSupport,
    prefer_continuous: bool,
    task_name: &str,
    algorithm_name: &str,
) -> Result<ActionMode, ConfigError> {
    let continuous = task.continuous && algorithm.continuous;
    let discrete = task.discrete && algorithm.discrete;

    if continuous && prefer_continuous {
        Ok(ActionMode::Continuous)
    } else if discrete {
        Ok(ActionMode::Discrete)
    } else if continuous {
        Ok(ActionMode::Continuous)
    } else {
        Err(ConfigError::IncompatibleActionSpace {
            algorithm: algorithm_name.to_string(),
            task: task_name.to_string(),
        })
    }
}
