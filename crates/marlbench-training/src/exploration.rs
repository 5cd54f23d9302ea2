use marlbench_abstraction::ExplorationAnneal;
use serde::{Deserialize, Serialize};

/// Linear decay of an exploration rate from `eps_init` to `eps_end` over `anneal_frames` collected frames.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EpsilonAnneal {
    eps_init: f64,
    eps_end: f64,
    anneal_frames: u64,
    frames: u64,
}

impl EpsilonAnneal {
    pub fn new(eps_init: f64, eps_end: f64, anneal_frames: u64) -> Self {
        Self { eps_init, eps_end, anneal_frames, frames: 0 }
    }

    pub fn frames(&self) -> u64 {
        self.frames
    }
}

impl ExplorationAnneal for EpsilonAnneal {
    fn step(&mut self, frames: usize) {
        self.frames = self.frames.saturating_add(frames as u64);
    }

    fn value(&self) -> f64 {
        if self.anneal_frames == 0 {
            return self.eps_end;
        }
        let progress = (self.frames as f64 / self.anneal_frames as f64).min(1.0);
        self.eps_init + (self.eps_end - self.eps_init) * progress
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_linear_anneal() {
        let mut eps = EpsilonAnneal::new(0.8, 0.0, 100);
        assert!((eps.value() - 0.8).abs() < 1e-12);
        eps.step(50);
        assert!((eps.value() - 0.4).abs() < 1e-12);
        eps.step(500);
        assert!(eps.value().abs() < 1e-12);
    }

    #[test]
    fn test_zero_horizon_is_fully_annealed() {
        let eps = EpsilonAnneal::new(0.8, 0.01, 0);
        assert!((eps.value() - 0.01).abs() < 1e-12);
    }
}
