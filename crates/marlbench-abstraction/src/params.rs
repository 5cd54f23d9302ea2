//! Named trainable parameters and the records produced while training them.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// One flat parameter tensor and its accumulated gradient.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Parameter {
    pub value: Vec<f32>,
    #[serde(skip)]
    pub grad: Option<Vec<f32>>,
}

impl Parameter {
    pub fn new(value: Vec<f32>) -> Self {
        Self { value, grad: None }
    }

    /// Adds `grad` into the accumulated gradient.
    pub fn accumulate_grad(&mut self, grad: &[f32]) {
        match &mut self.grad {
            Some(acc) => {
                for (a, g) in acc.iter_mut().zip(grad) {
                    *a += g;
                }
            }
            None => self.grad = Some(grad.to_vec()),
        }
    }
}

/// Ordered collection of parameters addressed by name.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ParameterStore(BTreeMap<String, Parameter>);

impl ParameterStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: impl Into<String>, value: Vec<f32>) {
        self.0.insert(name.into(), Parameter::new(value));
    }

    pub fn get(&self, name: &str) -> Option<&Parameter> {
        self.0.get(name)
    }

    pub fn get_mut(&mut self, name: &str) -> Option<&mut Parameter> {
        self.0.get_mut(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Parameter)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Clears the gradients of `names`. Unknown names are ignored.
    pub fn zero_grad(&mut self, names: &[String]) {
        for name in names {
            if let Some(p) = self.0.get_mut(name) {
                p.grad = None;
            }
        }
    }

    /// Total 2-norm of the gradients of `names`.
    pub fn grad_norm(&self, names: &[String]) -> f64 {
        names
            .iter()
            .filter_map(|n| self.0.get(n))
            .filter_map(|p| p.grad.as_ref())
            .flatten()
            .map(|&g| f64::from(g) * f64::from(g))
            .sum::<f64>()
            .sqrt()
    }

    /// Keeps only the parameters whose name starts with `prefix`.
    #[must_use]
    pub fn filter_prefix(&self, prefix: &str) -> Self {
        Self(self.0.iter().filter(|(k, _)| k.starts_with(prefix)).map(|(k, v)| (k.clone(), v.clone())).collect())
    }
}

/// Loss terms and diagnostics from one forward pass. Keys starting with `loss` are optimizable.
pub type LossValues = BTreeMap<String, f64>;

/// Detached values recorded for one optimizer pass.
pub type TrainingRecord = BTreeMap<String, f64>;

/// Policy parameters for every group, pushed to the collector after training.
pub type PolicyWeights = BTreeMap<String, ParameterStore>;

/// Returns `true` for keys naming an optimizable loss term.
pub fn is_loss_term(key: &str) -> bool {
    key.starts_with("loss")
}
