//! Keyed collections of tensors sharing leading batch dimensions.

use crate::error::{CollaboratorError, Result};
use crate::key::{FieldKey, NEXT};
use crate::tensor::Tensor;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Leaf names that mark the end of an episode.
pub const DONE_KEYS: [&str; 3] = ["done", "terminated", "truncated"];

/// A set of named tensors whose leading dimensions all equal `batch_size`.
///
/// A collected batch from `n` environments over `t` steps has batch size
/// `[n, t]` and holds `n * t` frames.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Batch {
    batch_size: Vec<usize>,
    fields: BTreeMap<FieldKey, Tensor>,
}

impl Batch {
    /// Creates an empty batch.
    pub fn new(batch_size: Vec<usize>) -> Self {
        Self { batch_size, fields: BTreeMap::new() }
    }

    pub fn batch_size(&self) -> &[usize] {
        &self.batch_size
    }

    /// Number of frames held, i.e. the product of the batch dimensions.
    pub fn numel(&self) -> usize {
        self.batch_size.iter().product()
    }

    /// Size of the leading batch dimension, `1` when the batch is unbatched.
    pub fn leading(&self) -> usize {
        self.batch_size.first().copied().unwrap_or(1)
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Inserts a field, checking its leading dimensions.
    pub fn insert(&mut self, key: impl Into<FieldKey>, tensor: Tensor) -> Result<()> {
        let key = key.into();
        if !tensor.shape().starts_with(&self.batch_size) {
            return Err(CollaboratorError::Shape(format!(
                "field '{}' has shape {:?}, expected leading dims {:?}",
                key,
                tensor.shape(),
                self.batch_size
            )));
        }
        self.fields.insert(key, tensor);
        Ok(())
    }

    pub fn get(&self, key: &FieldKey) -> Option<&Tensor> {
        self.fields.get(key)
    }

    pub fn get_mut(&mut self, key: &FieldKey) -> Option<&mut Tensor> {
        self.fields.get_mut(key)
    }

    /// Returns a field or a [`CollaboratorError::MissingField`].
    pub fn require(&self, key: &FieldKey) -> Result<&Tensor> {
        self.fields.get(key).ok_or_else(|| CollaboratorError::MissingField(key.to_string()))
    }

    pub fn remove(&mut self, key: &FieldKey) -> Option<Tensor> {
        self.fields.remove(key)
    }

    pub fn contains(&self, key: &FieldKey) -> bool {
        self.fields.contains_key(key)
    }

    pub fn keys(&self) -> impl Iterator<Item = &FieldKey> {
        self.fields.keys()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&FieldKey, &Tensor)> {
        self.fields.iter()
    }

    /// Returns a copy without any field under one of `prefixes`.
    #[must_use]
    pub fn exclude(&self, prefixes: &[FieldKey]) -> Self {
        let fields = self
            .fields
            .iter()
            .filter(|(k, _)| !prefixes.iter().any(|p| k.starts_with(p)))
            .map(|(k, t)| (k.clone(), t.clone()))
            .collect();
        Self { batch_size: self.batch_size.clone(), fields }
    }

    /// Returns a copy holding only the fields under `prefix`.
    #[must_use]
    pub fn select(&self, prefix: &FieldKey) -> Self {
        let fields = self
            .fields
            .iter()
            .filter(|(k, _)| k.starts_with(prefix))
            .map(|(k, t)| (k.clone(), t.clone()))
            .collect();
        Self { batch_size: self.batch_size.clone(), fields }
    }

    /// Merges every batch dimension into one flat transition dimension.
    pub fn flatten(&self) -> Result<Self> {
        let dims = self.batch_size.len();
        let mut fields = BTreeMap::new();
        for (k, t) in &self.fields {
            fields.insert(k.clone(), t.flatten_leading(dims)?);
        }
        Ok(Self { batch_size: vec![self.numel()], fields })
    }

    /// Stacks equally-keyed batches along a new leading dimension.
    pub fn stack(batches: &[Batch]) -> Result<Self> {
        let first = batches
            .first()
            .ok_or_else(|| CollaboratorError::Shape("cannot stack zero batches".to_string()))?;
        let mut batch_size = Vec::with_capacity(first.batch_size.len() + 1);
        batch_size.push(batches.len());
        batch_size.extend_from_slice(&first.batch_size);

        let mut fields = BTreeMap::new();
        for key in first.fields.keys() {
            let parts = batches.iter().map(|b| b.require(key).cloned()).collect::<Result<Vec<_>>>()?;
            fields.insert(key.clone(), Tensor::stack(&parts)?);
        }
        Ok(Self { batch_size, fields })
    }

    /// Concatenates equally-keyed batches along the leading dimension.
    pub fn concat(batches: &[Batch]) -> Result<Self> {
        let first = batches
            .first()
            .ok_or_else(|| CollaboratorError::Shape("cannot concatenate zero batches".to_string()))?;
        if first.batch_size.is_empty() {
            return Err(CollaboratorError::Shape("cannot concatenate unbatched data".to_string()));
        }
        let mut batch_size = first.batch_size.clone();
        batch_size[0] = 0;
        for b in batches {
            if b.batch_size.len() != first.batch_size.len() || b.batch_size[1..] != first.batch_size[1..] {
                return Err(CollaboratorError::Shape(format!(
                    "cannot concatenate batch sizes {:?} and {:?}",
                    first.batch_size, b.batch_size
                )));
            }
            batch_size[0] += b.batch_size[0];
        }

        let mut fields = BTreeMap::new();
        for key in first.fields.keys() {
            let parts = batches.iter().map(|b| b.require(key).cloned()).collect::<Result<Vec<_>>>()?;
            fields.insert(key.clone(), Tensor::concat(&parts)?);
        }
        Ok(Self { batch_size, fields })
    }

    /// Swaps the first two batch dimensions, e.g. time-major to env-major.
    pub fn transpose_leading(&self) -> Result<Self> {
        if self.batch_size.len() < 2 {
            return Err(CollaboratorError::Shape(format!(
                "cannot transpose batch size {:?}",
                self.batch_size
            )));
        }
        let mut batch_size = self.batch_size.clone();
        batch_size.swap(0, 1);
        let mut fields = BTreeMap::new();
        for (k, t) in &self.fields {
            fields.insert(k.clone(), t.swap_leading()?);
        }
        Ok(Self { batch_size, fields })
    }

    /// Gathers entries along the leading dimension.
    pub fn index(&self, indices: &[usize]) -> Result<Self> {
        if self.batch_size.is_empty() {
            return Err(CollaboratorError::Shape("cannot index unbatched data".to_string()));
        }
        let mut batch_size = self.batch_size.clone();
        batch_size[0] = indices.len();
        let mut fields = BTreeMap::new();
        for (k, t) in &self.fields {
            fields.insert(k.clone(), t.select_rows(indices)?);
        }
        Ok(Self { batch_size, fields })
    }

    /// Splits along the leading dimension.
    pub fn unbind(&self) -> Result<Vec<Self>> {
        let rows = *self
            .batch_size
            .first()
            .ok_or_else(|| CollaboratorError::Shape("cannot unbind unbatched data".to_string()))?;
        let mut out: Vec<Self> =
            (0..rows).map(|_| Self::new(self.batch_size[1..].to_vec())).collect();
        for (k, t) in &self.fields {
            for (i, part) in t.unbind()?.into_iter().enumerate() {
                out[i].fields.insert(k.clone(), part);
            }
        }
        Ok(out)
    }

    /// Promotes `next/...` fields to the root, producing the input of the following step.
    ///
    /// Rewards are transition quantities and are not carried over.
    #[must_use]
    pub fn next_as_root(&self) -> Self {
        let next = FieldKey::from(NEXT);
        let fields = self
            .fields
            .iter()
            .filter(|(k, _)| k.is_next() && k.leaf() != "reward")
            .filter_map(|(k, t)| k.strip_prefix(&next).map(|root| (root, t.clone())))
            .collect();
        Self { batch_size: self.batch_size.clone(), fields }
    }

    /// Per leading entry, whether any `next/.../done`-like flag is raised.
    pub fn any_done(&self) -> Result<Vec<bool>> {
        let rows = self.leading();
        let mut done = vec![false; rows];
        for (k, t) in &self.fields {
            if k.is_next() && DONE_KEYS.contains(&k.leaf()) {
                for (d, row) in done.iter_mut().zip(t.any_nonzero_per_row(rows)?) {
                    *d |= row;
                }
            }
        }
        Ok(done)
    }
}
