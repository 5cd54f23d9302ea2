//! Observation, action and state specifications plus action-mode vocabulary.

use crate::key::FieldKey;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Value domain of a single field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum SpecDomain {
    /// Bounded real values.
    Continuous { low: f32, high: f32 },
    /// Integer categories `0..n`.
    Discrete { n: usize },
    /// Boolean flags.
    Binary,
}

/// Shape and domain of one field, excluding batch dimensions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldSpec {
    pub shape: Vec<usize>,
    pub domain: SpecDomain,
}

impl FieldSpec {
    pub fn new(shape: Vec<usize>, domain: SpecDomain) -> Self {
        Self { shape, domain }
    }

    /// Number of elements per batch entry.
    pub fn numel(&self) -> usize {
        self.shape.iter().product()
    }
}

/// Map from field key to its specification.
pub type Spec = BTreeMap<FieldKey, FieldSpec>;

/// Everything the orchestrator learns about an environment once, at setup.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpecBundle {
    pub observation: Spec,
    pub action: Spec,
    pub state: Option<Spec>,
    pub action_mask: Option<Spec>,
    pub info: Option<Spec>,
    pub max_steps: usize,
}

/// Resolved action space kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionMode {
    Continuous,
    Discrete,
}

impl fmt::Display for ActionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Continuous => write!(f, "continuous"),
            Self::Discrete => write!(f, "discrete"),
        }
    }
}

/// Which action modes a task or algorithm can handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ActionSupport {
    pub continuous: bool,
    pub discrete: bool,
}

impl ActionSupport {
    pub const fn new(continuous: bool, discrete: bool) -> Self {
        Self { continuous, discrete }
    }

    pub const fn both() -> Self {
        Self::new(true, true)
    }

    pub const fn continuous_only() -> Self {
        Self::new(true, false)
    }

    pub const fn discrete_only() -> Self {
        Self::new(false, true)
    }
}

/// How a policy picks actions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionSelection {
    /// Deterministic: the mode of the action distribution.
    Mode,
    /// Sampled from the policy's action distribution.
    Random,
    /// Uniform over the action spec, ignoring the policy.
    Uniform,
}
