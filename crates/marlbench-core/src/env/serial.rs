use async_trait::async_trait;
use marlbench_abstraction::{Batch, CollaboratorError, Environment, RenderFrame, Result};
use tracing::warn;

/// Steps independent non-vectorized environments in turn and stacks their outputs.
pub struct SerialEnv {
    envs: Vec<Box<dyn Environment>>,
    current: Vec<Option<Batch>>,
}

impl SerialEnv {
    pub fn new(envs: Vec<Box<dyn Environment>>) -> Self {
        let current = vec![None; envs.len()];
        Self { envs, current }
    }

    pub fn len(&self) -> usize {
        self.envs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.envs.is_empty()
    }

    fn stacked_current(&self) -> Result<Batch> {
        let parts = self
            .current
            .iter()
            .map(|b| b.clone().ok_or_else(|| CollaboratorError::Environment("sub-environment was never reset".to_string())))
            .collect::<Result<Vec<_>>>()?;
        Batch::stack(&parts)
    }
}

#[async_trait]
impl Environment for SerialEnv {
    fn batch_size(&self) -> Vec<usize> {
        vec![self.envs.len()]
    }

    async fn reset(&mut self, mask: Option<&[bool]>) -> Result<Batch> {
        if let Some(mask) = mask {
            if mask.len() != self.envs.len() {
                return Err(CollaboratorError::Shape(format!(
                    "reset mask has {} entries for {} environments",
                    mask.len(),
                    self.envs.len()
                )));
            }
        }
        for (i, env) in self.envs.iter_mut().enumerate() {
            let selected = mask.is_none_or(|m| m[i]);
            if selected || self.current[i].is_none() {
                self.current[i] = Some(env.reset(None).await?);
            }
        }
        self.stacked_current()
    }

    async fn step(&mut self, input: Batch) -> Result<Batch> {
        let parts = input.unbind()?;
        if parts.len() != self.envs.len() {
            return Err(CollaboratorError::Shape(format!(
                "step input holds {} entries for {} environments",
                parts.len(),
                self.envs.len()
            )));
        }
        let mut outputs = Vec::with_capacity(parts.len());
        for (i, (env, part)) in self.envs.iter_mut().zip(parts).enumerate() {
            let out = env.step(part).await?;
            self.current[i] = Some(out.next_as_root());
            outputs.push(out);
        }
        Batch::stack(&outputs)
    }

    async fn render(&mut self) -> Result<Option<RenderFrame>> {
        match self.envs.first_mut() {
            Some(env) => env.render().await,
            None => Ok(None),
        }
    }

    async fn close(&mut self) -> Result<()> {
        let mut first_error = None;
        for env in &mut self.envs {
            if let Err(err) = env.close().await {
                warn!(error = %err, "Failed to close sub-environment");
                first_error.get_or_insert(err);
            }
        }
        first_error.map_or(Ok(()), Err)
    }
}
