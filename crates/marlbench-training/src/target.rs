//! Target-network updaters.
//!
//! Target parameters are matched to their online counterparts by name pairs
//! `(online, target)` inside one [`ParameterStore`].

use marlbench_abstraction::{CollaboratorError, ParameterStore, Result, TargetUpdater, TrainingSettings};

fn copy_pair(
    params: &mut ParameterStore,
    online: &str,
    target: &str,
    mut blend: impl FnMut(f32, f32) -> f32,
) -> Result<()> {
    let source = params
        .get(online)
        .map(|p| p.value.clone())
        .ok_or_else(|| CollaboratorError::State(format!("unknown online parameter '{}'", online)))?;
    let dest = params
        .get_mut(target)
        .ok_or_else(|| CollaboratorError::State(format!("unknown target parameter '{}'", target)))?;
    if dest.value.len() != source.len() {
        return Err(CollaboratorError::Shape(format!(
            "target '{}' has {} elements, online '{}' has {}",
            target,
            dest.value.len(),
            online,
            source.len()
        )));
    }
    for (t, o) in dest.value.iter_mut().zip(source) {
        *t = blend(o, *t);
    }
    Ok(())
}

/// Polyak averaging every step: `target = tau * online + (1 - tau) * target`.
#[derive(Debug, Clone)]
pub struct SoftUpdate {
    pairs: Vec<(String, String)>,
    tau: f64,
    steps: u64,
}

impl SoftUpdate {
    pub fn new(pairs: Vec<(String, String)>, tau: f64) -> Self {
        Self { pairs, tau, steps: 0 }
    }

    pub fn tau(&self) -> f64 {
        self.tau
    }
}

impl TargetUpdater for SoftUpdate {
    fn step(&mut self, params: &mut ParameterStore) -> Result<()> {
        let tau = self.tau as f32;
        for (online, target) in &self.pairs {
            copy_pair(params, online, target, |o, t| tau * o + (1.0 - tau) * t)?;
        }
        self.steps += 1;
        Ok(())
    }

    fn steps(&self) -> u64 {
        self.steps
    }
}

/// Copies online parameters into the target every `period` steps.
#[derive(Debug, Clone)]
pub struct HardUpdate {
    pairs: Vec<(String, String)>,
    period: u64,
    steps: u64,
}

impl HardUpdate {
    pub fn new(pairs: Vec<(String, String)>, period: u64) -> Self {
        Self { pairs, period: period.max(1), steps: 0 }
    }

    pub fn period(&self) -> u64 {
        self.period
    }
}

impl TargetUpdater for HardUpdate {
    fn step(&mut self, params: &mut ParameterStore) -> Result<()> {
        self.steps += 1;
        if self.steps % self.period == 0 {
            for (online, target) in &self.pairs {
                copy_pair(params, online, target, |o, _| o)?;
            }
        }
        Ok(())
    }

    fn steps(&self) -> u64 {
        self.steps
    }
}

/// Chooses between soft and hard updates.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TargetUpdaterSettings {
    pub soft: bool,
    pub tau: f64,
    pub period: u64,
}

impl TargetUpdaterSettings {
    pub fn from_training(settings: &TrainingSettings) -> Self {
        Self {
            soft: settings.soft_target_update,
            tau: settings.polyak_tau,
            period: settings.hard_target_update_frequency,
        }
    }

    pub fn build(&self, pairs: Vec<(String, String)>) -> Box<dyn TargetUpdater> {
        if self.soft {
            Box::new(SoftUpdate::new(pairs, self.tau))
        } else {
            Box::new(HardUpdate::new(pairs, self.period))
        }
    }
}
