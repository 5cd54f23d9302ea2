//! Minimal environment and policy for unit tests.

use async_trait::async_trait;
use marlbench_abstraction::{
    ActionSelection, Batch, CollaboratorError, Environment, FieldKey, Policy, PolicyWeights, RenderFrame, Result,
    Tensor,
};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

/// Single-group environment. Sub-environment `i` finishes after `episode_lens[i]` steps.
pub struct CountingEnv {
    vectorized: bool,
    episode_lens: Vec<usize>,
    t: Vec<usize>,
    pub closes: Arc<AtomicUsize>,
}

impl CountingEnv {
    pub fn vectorized(episode_lens: Vec<usize>) -> Self {
        let t = vec![0; episode_lens.len()];
        Self { vectorized: true, episode_lens, t, closes: Arc::default() }
    }

    pub fn single(episode_len: usize) -> Self {
        Self { vectorized: false, episode_lens: vec![episode_len], t: vec![0], closes: Arc::default() }
    }

    fn tensor(&self, value: impl Fn(usize) -> f32) -> Tensor {
        let data: Vec<f32> = (0..self.t.len()).map(value).collect();
        let shape = if self.vectorized { vec![self.t.len(), 1] } else { vec![1] };
        Tensor::from_vec(shape, data).expect("one value per sub-environment")
    }

    fn lead(&self) -> Vec<usize> {
        if self.vectorized { vec![self.t.len()] } else { Vec::new() }
    }

    fn observation(&self) -> Result<Batch> {
        let mut batch = Batch::new(self.lead());
        batch.insert("agents/observation", self.tensor(|i| self.t[i] as f32))?;
        Ok(batch)
    }
}

#[async_trait]
impl Environment for CountingEnv {
    fn batch_size(&self) -> Vec<usize> {
        self.lead()
    }

    async fn reset(&mut self, mask: Option<&[bool]>) -> Result<Batch> {
        for (i, t) in self.t.iter_mut().enumerate() {
            if mask.is_none_or(|m| m[i]) {
                *t = 0;
            }
        }
        self.observation()
    }

    async fn step(&mut self, input: Batch) -> Result<Batch> {
        input.require(&FieldKey::from("agents/action"))?;
        for t in &mut self.t {
            *t += 1;
        }
        let mut out = input;
        out.insert("next/agents/observation", self.tensor(|i| self.t[i] as f32))?;
        out.insert("next/agents/reward", self.tensor(|_| 1.0))?;
        let done = self.tensor(|i| if self.t[i] >= self.episode_lens[i] { 1.0 } else { 0.0 });
        out.insert("next/done", done)?;
        Ok(out)
    }

    async fn render(&mut self) -> Result<Option<RenderFrame>> {
        Ok(Some(RenderFrame { width: 1, height: 1, rgb: vec![255, 255, 255] }))
    }

    async fn close(&mut self) -> Result<()> {
        self.closes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Writes zero actions and remembers how it was asked to act.
#[derive(Default)]
pub struct ZeroPolicy {
    pub selections: Arc<Mutex<Vec<ActionSelection>>>,
    pub loads: Arc<AtomicUsize>,
}

impl Policy for ZeroPolicy {
    fn act(&mut self, batch: &mut Batch, selection: ActionSelection) -> Result<()> {
        self.selections.lock().map_err(|e| CollaboratorError::Policy(e.to_string()))?.push(selection);
        let obs = batch.require(&FieldKey::from("agents/observation"))?;
        let action = Tensor::zeros(obs.shape().to_vec());
        batch.insert("agents/action", action)?;
        Ok(())
    }

    fn load_weights(&mut self, _weights: &PolicyWeights) -> Result<()> {
        self.loads.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}
