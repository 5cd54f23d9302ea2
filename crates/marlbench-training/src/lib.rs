//! marlbench training primitives
//!
//! Backend-agnostic pieces shared by the orchestrator and algorithms:
//! - Adam optimizer over named parameter subsets (`Adam`)
//! - Gradient clipping policies (`GradClip`)
//! - FIFO transition storage with on/off-policy samplers (`TransitionBuffer`)
//! - Soft and hard target-network updaters
//! - Linear exploration annealing (`EpsilonAnneal`)

pub mod buffer;
pub mod clip;
pub mod error;
pub mod exploration;
pub mod optim;
pub mod target;

pub use buffer::{Sampler, TransitionBuffer};
pub use clip::GradClip;
pub use error::{TrainingError, TrainingResult};
pub use exploration::EpsilonAnneal;
pub use optim::Adam;
pub use target::{HardUpdate, SoftUpdate, TargetUpdaterSettings};
