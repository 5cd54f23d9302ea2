//! Configuration validation command.
//!
//! Loads a configuration file, checks it, and reports the derived plan.

use anyhow::Context;
use colored::Colorize;
use marlbench_core::{ExperimentConfig, ExperimentPlan};
use std::path::Path;
use tracing::debug;

/// Execute the validate command.
pub fn execute(path: &Path, off_policy: bool, json: bool) -> anyhow::Result<()> {
    let config = ExperimentConfig::from_file(path)
        .with_context(|| format!("Failed to load configuration from {}", path.display()))?;
    let on_policy = !off_policy;
    config.validate(on_policy).with_context(|| format!("Invalid configuration in {}", path.display()))?;

    let plan = ExperimentPlan::new(&config, on_policy);
    debug!(path = %path.display(), on_policy, "Configuration is valid");

    if json {
        println!("{}", serde_json::to_string_pretty(&plan)?);
    } else {
        output_human(path, &plan);
    }
    Ok(())
}

fn output_human(path: &Path, plan: &ExperimentPlan) {
    let mode = if plan.on_policy { "on-policy" } else { "off-policy" };
    println!("{} {}", "✓".green(), format!("{} is valid ({})", path.display(), mode).bold());
    println!();
    let rows: [(&str, String); 10] = [
        ("Frames per batch", plan.frames_per_batch.to_string()),
        ("Envs per worker", plan.n_envs_per_worker.to_string()),
        ("Train batch size", plan.train_batch_size.to_string()),
        ("Train minibatch size", plan.train_minibatch_size.to_string()),
        ("Optimizer steps", plan.n_optimizer_steps.to_string()),
        ("Optimizer passes", plan.optimizer_passes().to_string()),
        ("Buffer capacity", plan.replay_buffer_memory_size.to_string()),
        ("Max frames", plan.max_frames.to_string()),
        ("Max iterations", plan.max_iterations.to_string()),
        ("Anneal horizon", plan.exploration_anneal_frames.to_string()),
    ];
    for (label, value) in rows {
        println!("  {:<22} {}", format!("{}:", label).dimmed(), value);
    }
}
