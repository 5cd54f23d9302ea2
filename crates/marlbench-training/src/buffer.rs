//! FIFO storage of flat transitions.

use marlbench_abstraction::{Batch, CollaboratorError, FieldKey, ReplayBuffer, Result, Tensor};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

/// How minibatches are drawn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Sampler {
    /// Successive minibatches walk a shuffled permutation, reshuffled once exhausted.
    WithoutReplacement,
    /// Independent uniform draws with replacement.
    Uniform,
}

#[derive(Serialize, Deserialize)]
struct BufferState {
    storage: Option<Batch>,
    written: u64,
}

/// Transition buffer holding at most `capacity` entries, evicting the oldest first.
///
/// Entries live in preallocated slots that are overwritten in place at a
/// moving write position, so extending costs time in the incoming batch only.
pub struct TransitionBuffer {
    capacity: usize,
    batch_size: usize,
    sampler: Sampler,
    slots: Option<Batch>,
    write_pos: usize,
    len: usize,
    written: u64,
    order: Vec<usize>,
    cursor: usize,
    rng: StdRng,
}

impl TransitionBuffer {
    pub fn new(capacity: usize, batch_size: usize, sampler: Sampler, seed: u64) -> Self {
        Self {
            capacity,
            batch_size,
            sampler,
            slots: None,
            write_pos: 0,
            len: 0,
            written: 0,
            order: Vec::new(),
            cursor: 0,
            rng: StdRng::seed_from_u64(seed),
        }
    }

    /// Buffer for on-policy training: holds exactly one collected batch.
    pub fn on_policy(frames_per_batch: usize, minibatch_size: usize, seed: u64) -> Self {
        Self::new(frames_per_batch, minibatch_size, Sampler::WithoutReplacement, seed)
    }

    /// Buffer for off-policy training: persists across iterations.
    pub fn off_policy(memory_size: usize, batch_size: usize, seed: u64) -> Self {
        Self::new(memory_size, batch_size, Sampler::Uniform, seed)
    }

    pub fn sampler(&self) -> Sampler {
        self.sampler
    }

    /// Total transitions ever written, including evicted ones.
    pub fn written(&self) -> u64 {
        self.written
    }

    /// Stored transitions, oldest first.
    pub fn storage(&self) -> Result<Option<Batch>> {
        match &self.slots {
            Some(slots) if self.len > 0 => {
                let oldest = (self.write_pos + self.capacity - self.len) % self.capacity;
                let indices: Vec<usize> = (0..self.len).map(|i| (oldest + i) % self.capacity).collect();
                Ok(Some(slots.index(&indices)?))
            }
            _ => Ok(None),
        }
    }

    /// Copies the newest `capacity` rows of `batch` into the slots at the write position.
    fn write(&mut self, batch: &Batch) -> Result<()> {
        let added = batch.leading();
        let skipped = added.saturating_sub(self.capacity);
        let n = added - skipped;

        let mut slots = match self.slots.take() {
            Some(slots) => slots,
            None => allocate_slots(self.capacity, batch)?,
        };
        if let Err(e) = check_layout(&slots, batch) {
            self.slots = Some(slots);
            return Err(e);
        }

        let keys: Vec<FieldKey> = slots.keys().cloned().collect();
        for key in &keys {
            let (Some(source), Some(target)) = (batch.get(key), slots.get_mut(key)) else {
                continue;
            };
            let row_len = source.numel() / added;
            let source = source.data();
            let target = target.data_mut();
            for i in 0..n {
                let from = (skipped + i) * row_len;
                let to = ((self.write_pos + i) % self.capacity) * row_len;
                target[to..to + row_len].copy_from_slice(&source[from..from + row_len]);
            }
        }

        self.slots = Some(slots);
        self.write_pos = (self.write_pos + n) % self.capacity;
        self.len = (self.len + n).min(self.capacity);
        Ok(())
    }

    fn clear(&mut self) {
        self.slots = None;
        self.write_pos = 0;
        self.len = 0;
        self.order.clear();
        self.cursor = 0;
    }

    fn next_indices(&mut self, len: usize) -> Vec<usize> {
        match self.sampler {
            Sampler::Uniform => (0..self.batch_size).map(|_| self.rng.gen_range(0..len)).collect(),
            Sampler::WithoutReplacement => {
                let n = self.batch_size.min(len);
                if self.order.len() != len || self.cursor + n > self.order.len() {
                    self.order = (0..len).collect();
                    self.order.shuffle(&mut self.rng);
                    self.cursor = 0;
                }
                let picked = self.order[self.cursor..self.cursor + n].to_vec();
                self.cursor += n;
                picked
            }
        }
    }
}

/// Zeroed slots shaped like the fields of `like`, with `capacity` rows each.
fn allocate_slots(capacity: usize, like: &Batch) -> Result<Batch> {
    let mut slots = Batch::new(vec![capacity]);
    for (key, tensor) in like.iter() {
        let mut shape = tensor.shape().to_vec();
        shape[0] = capacity;
        slots.insert(key.clone(), Tensor::zeros(shape))?;
    }
    Ok(slots)
}

fn check_layout(slots: &Batch, batch: &Batch) -> Result<()> {
    for (key, slot) in slots.iter() {
        let incoming = batch.get(key).ok_or_else(|| {
            CollaboratorError::Buffer(format!("incoming transitions lack stored field '{}'", key))
        })?;
        if incoming.shape()[1..] != slot.shape()[1..] {
            return Err(CollaboratorError::Buffer(format!(
                "field '{}' has entry shape {:?}, buffer stores {:?}",
                key,
                &incoming.shape()[1..],
                &slot.shape()[1..]
            )));
        }
    }
    Ok(())
}

impl ReplayBuffer for TransitionBuffer {
    fn extend(&mut self, batch: Batch) -> Result<()> {
        if batch.batch_size().len() != 1 {
            return Err(CollaboratorError::Buffer(format!(
                "expected a flat batch, got batch size {:?}",
                batch.batch_size()
            )));
        }
        if self.capacity == 0 {
            return Err(CollaboratorError::Buffer("cannot extend a buffer with zero capacity".to_string()));
        }
        let added = batch.leading();
        if added == 0 {
            return Ok(());
        }

        self.write(&batch)?;
        self.written += added as u64;
        self.order.clear();
        self.cursor = 0;
        Ok(())
    }

    fn sample(&mut self) -> Result<Batch> {
        let len = self.len;
        if len == 0 {
            return Err(CollaboratorError::Buffer("cannot sample from an empty buffer".to_string()));
        }
        let indices = self.next_indices(len);
        match &self.slots {
            Some(slots) => slots.index(&indices),
            None => Err(CollaboratorError::Buffer("cannot sample from an empty buffer".to_string())),
        }
    }

    fn len(&self) -> usize {
        self.len
    }

    fn capacity(&self) -> usize {
        self.capacity
    }

    fn state_dict(&self) -> Result<serde_json::Value> {
        let state = BufferState { storage: self.storage()?, written: self.written };
        Ok(serde_json::to_value(state)?)
    }

    fn load_state_dict(&mut self, state: serde_json::Value) -> Result<()> {
        let state: BufferState = serde_json::from_value(state)?;
        if let Some(stored) = &state.storage {
            if stored.leading() > self.capacity {
                return Err(CollaboratorError::Buffer(format!(
                    "stored {} transitions exceed capacity {}",
                    stored.leading(),
                    self.capacity
                )));
            }
        }
        self.clear();
        if let Some(stored) = state.storage.filter(|b| b.leading() > 0) {
            self.write(&stored)?;
        }
        self.written = state.written;
        Ok(())
    }
}
