//! Experiment lifecycle states and the one-shot shutdown guard.

use crate::error::{ExperimentError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{debug, error};

/// Experiment execution state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExperimentState {
    /// Set up and ready to run.
    Idle,
    /// Collecting and training.
    Collecting,
    /// The frame ceiling was reached; finishing up.
    Draining,
    /// Resources released.
    Closed,
}

impl fmt::Display for ExperimentState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Idle => "idle",
            Self::Collecting => "collecting",
            Self::Draining => "draining",
            Self::Closed => "closed",
        };
        f.write_str(name)
    }
}

impl ExperimentState {
    /// Checks if the experiment can move to `to`.
    #[must_use]
    #[allow(clippy::match_same_arms)] // Each arm represents a distinct state transition rule
    pub fn can_transition_to(&self, to: Self) -> bool {
        match (self, to) {
            // From Idle: start collecting, or close without running
            (Self::Idle, Self::Collecting | Self::Closed) => true,
            // From Collecting: drain on completion, close on interrupt or error
            (Self::Collecting, Self::Draining | Self::Closed) => true,
            (Self::Draining, Self::Closed) => true,
            // Same state is always valid
            (a, b) if *a == b => true,
            _ => false,
        }
    }
}

/// Moves `current` to `to`, rejecting invalid transitions.
pub(crate) fn transition(current: &mut ExperimentState, to: ExperimentState) -> Result<()> {
    if !current.can_transition_to(to) {
        error!(from = %current, to = %to, "Invalid state transition");
        return Err(ExperimentError::InvalidTransition { from: *current, to });
    }
    debug!(from = %current, to = %to, "State transition");
    *current = to;
    Ok(())
}

/// How a run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RunOutcome {
    /// The frame or iteration ceiling was reached.
    Completed,
    /// An external cancellation stopped the run.
    Interrupted,
}

/// Lets shutdown run at most once.
#[derive(Debug, Default)]
pub struct ShutdownGuard {
    fired: AtomicBool,
}

impl ShutdownGuard {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `true` exactly once, for the first caller.
    pub fn try_begin(&self) -> bool {
        !self.fired.swap(true, Ordering::AcqRel)
    }

    pub fn has_fired(&self) -> bool {
        self.fired.load(Ordering::Acquire)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_valid_transitions() {
        use ExperimentState::*;
        assert!(Idle.can_transition_to(Collecting));
        assert!(Idle.can_transition_to(Closed));
        assert!(Collecting.can_transition_to(Draining));
        assert!(Collecting.can_transition_to(Closed));
        assert!(Draining.can_transition_to(Closed));
        assert!(Closed.can_transition_to(Closed));
    }

    #[test]
    fn test_invalid_transitions() {
        use ExperimentState::*;
        assert!(!Closed.can_transition_to(Collecting));
        assert!(!Draining.can_transition_to(Collecting));
        assert!(!Idle.can_transition_to(Draining));
        assert!(!Closed.can_transition_to(Idle));
    }

    #[test]
    fn test_transition_helper() {
        let mut state = ExperimentState::Idle;
        transition(&mut state, ExperimentState::Collecting).unwrap();
        assert_eq!(state, ExperimentState::Collecting);
        let err = transition(&mut state, ExperimentState::Idle).unwrap_err();
        assert!(matches!(err, ExperimentError::InvalidTransition { .. }));
        assert_eq!(state, ExperimentState::Collecting);
    }

    #[test]
    fn test_guard_fires_once_across_threads() {
        let guard = Arc::new(ShutdownGuard::new());
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let guard = Arc::clone(&guard);
                std::thread::spawn(move || guard.try_begin())
            })
            .collect();
        let winners = handles.into_iter().map(|h| h.join().unwrap()).filter(|&w| w).count();
        assert_eq!(winners, 1);
        assert!(guard.has_fired());
    }
}
