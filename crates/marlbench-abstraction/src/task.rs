//! Task and environment contracts.

use crate::batch::Batch;
use crate::error::Result;
use crate::group::GroupMap;
use crate::spec::{ActionMode, ActionSupport, Spec};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Parameters for constructing an environment instance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnvRequest {
    /// Number of sub-environments requested. Non-vectorized tasks may ignore it.
    pub num_envs: usize,
    pub action_mode: ActionMode,
    pub seed: u64,
    pub device: String,
}

/// An RGB frame captured from an environment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RenderFrame {
    pub width: u32,
    pub height: u32,
    pub rgb: Vec<u8>,
}

/// A running environment.
///
/// A batch size of `[]` means a single, non-vectorized environment; `[n]`
/// means `n` sub-environments stepped together.
#[async_trait]
pub trait Environment: Send {
    fn batch_size(&self) -> Vec<usize>;

    /// Resets the environment and returns the current observations.
    ///
    /// With a mask, only the selected sub-environments are re-initialized and
    /// the full observation batch is returned.
    async fn reset(&mut self, mask: Option<&[bool]>) -> Result<Batch>;

    /// Applies the actions in `input` and returns `input` extended with `next/...` fields.
    async fn step(&mut self, input: Batch) -> Result<Batch>;

    /// Captures a frame, if the environment can render.
    async fn render(&mut self) -> Result<Option<RenderFrame>> {
        Ok(None)
    }

    async fn close(&mut self) -> Result<()>;
}

/// Builds environments and describes them.
pub trait Task: Send + Sync {
    /// Identifier of the task, e.g. `balance`.
    fn name(&self) -> &str;

    /// Name of the environment suite the task belongs to.
    fn env_name(&self) -> &str;

    fn action_support(&self) -> ActionSupport;

    fn make_env(&self, request: &EnvRequest) -> Result<Box<dyn Environment>>;

    fn group_map(&self, env: &dyn Environment) -> Result<GroupMap>;

    fn observation_spec(&self, env: &dyn Environment) -> Result<Spec>;

    fn action_spec(&self, env: &dyn Environment) -> Result<Spec>;

    fn state_spec(&self, _env: &dyn Environment) -> Result<Option<Spec>> {
        Ok(None)
    }

    fn action_mask_spec(&self, _env: &dyn Environment) -> Result<Option<Spec>> {
        Ok(None)
    }

    fn info_spec(&self, _env: &dyn Environment) -> Result<Option<Spec>> {
        Ok(None)
    }

    fn max_steps(&self, env: &dyn Environment) -> usize;

    fn supports_rendering(&self, _env: &dyn Environment) -> bool {
        false
    }

    /// Task parameters, logged as hyper-parameters.
    fn config(&self) -> serde_json::Value {
        serde_json::Value::Null
    }
}
