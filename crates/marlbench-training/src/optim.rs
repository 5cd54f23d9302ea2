//! Adam optimizer over a named subset of a [`ParameterStore`].

use crate::error::{TrainingError, TrainingResult};
use marlbench_abstraction::ParameterStore;
use std::collections::BTreeMap;

/// Bias-corrected Adam.
///
/// An optimizer owns a fixed list of parameter names. Parameters without an
/// accumulated gradient are left untouched by [`Adam::step`].
#[derive(Debug, Clone)]
pub struct Adam {
    params: Vec<String>,
    lr: f64,
    eps: f64,
    beta1: f64,
    beta2: f64,
    t: u64,
    m: BTreeMap<String, Vec<f64>>,
    v: BTreeMap<String, Vec<f64>>,
}

impl Adam {
    pub fn new(params: Vec<String>, lr: f64, eps: f64) -> Self {
        Self { params, lr, eps, beta1: 0.9, beta2: 0.999, t: 0, m: BTreeMap::new(), v: BTreeMap::new() }
    }

    #[must_use]
    pub fn with_betas(mut self, beta1: f64, beta2: f64) -> Self {
        self.beta1 = beta1;
        self.beta2 = beta2;
        self
    }

    pub fn params(&self) -> &[String] {
        &self.params
    }

    pub fn lr(&self) -> f64 {
        self.lr
    }

    /// Number of steps taken.
    pub fn steps(&self) -> u64 {
        self.t
    }

    pub fn step(&mut self, store: &mut ParameterStore) -> TrainingResult<()> {
        self.t += 1;
        let t = i32::try_from(self.t).unwrap_or(i32::MAX);
        let bias1 = 1.0 - self.beta1.powi(t);
        let bias2 = 1.0 - self.beta2.powi(t);

        for name in &self.params {
            let param = store.get_mut(name).ok_or_else(|| TrainingError::UnknownParameter(name.clone()))?;
            let Some(grad) = param.grad.as_ref() else {
                continue;
            };
            if grad.len() != param.value.len() {
                return Err(TrainingError::GradientShape {
                    name: name.clone(),
                    expected: param.value.len(),
                    got: grad.len(),
                });
            }

            let m = self.m.entry(name.clone()).or_insert_with(|| vec![0.0; grad.len()]);
            let v = self.v.entry(name.clone()).or_insert_with(|| vec![0.0; grad.len()]);
            for (i, (&g, value)) in grad.iter().zip(param.value.iter_mut()).enumerate() {
                let g = f64::from(g);
                m[i] = self.beta1 * m[i] + (1.0 - self.beta1) * g;
                v[i] = self.beta2 * v[i] + (1.0 - self.beta2) * g * g;
                let m_hat = m[i] / bias1;
                let v_hat = v[i] / bias2;
                let update = self.lr * m_hat / (v_hat.sqrt() + self.eps);
                *value = (f64::from(*value) - update) as f32;
            }
        }
        Ok(())
    }

    /// Clears the gradients of this optimizer's parameters only.
    pub fn zero_grad(&self, store: &mut ParameterStore) {
        store.zero_grad(&self.params);
    }
}
