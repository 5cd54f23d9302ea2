//! Checkpoint inspection commands.

use anyhow::Context;
use clap::Subcommand;
use colored::Colorize;
use marlbench_core::{ExperimentCheckpoint, FsCheckpointStorage};
use serde::Serialize;
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

/// Checkpoint subcommands
#[derive(Subcommand, Debug)]
pub enum CheckpointCommand {
    /// Show the counters and per-group state stored in a checkpoint
    Inspect {
        /// Checkpoint file
        file: PathBuf,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

#[derive(Debug, Serialize)]
struct GroupSummary {
    group: String,
    loss: bool,
    buffer: bool,
}

#[derive(Debug, Serialize)]
struct InspectOutput {
    total_frames: u64,
    n_iters_performed: u64,
    total_time: f64,
    mean_return: f64,
    groups: Vec<GroupSummary>,
}

pub fn execute(command: CheckpointCommand) -> anyhow::Result<()> {
    match command {
        CheckpointCommand::Inspect { file, json } => inspect(&file, json),
    }
}

fn inspect(file: &Path, json: bool) -> anyhow::Result<()> {
    let checkpoint = ExperimentCheckpoint::read(&FsCheckpointStorage, file)
        .with_context(|| format!("Failed to read checkpoint {}", file.display()))?;
    let output = summarize(&checkpoint);

    if json {
        println!("{}", serde_json::to_string_pretty(&output)?);
        return Ok(());
    }

    println!("{}", format!("Checkpoint {}", file.display()).bold().cyan());
    println!();
    println!("  Total frames:      {}", output.total_frames);
    println!("  Iterations:        {}", output.n_iters_performed);
    println!("  Total time:        {:.2}s", output.total_time);
    println!("  Mean return:       {:.4}", output.mean_return);
    println!();
    println!("  {}", "Groups".bold());
    for group in &output.groups {
        println!("    {:<16} loss: {}  buffer: {}", group.group, mark(group.loss), mark(group.buffer));
    }
    Ok(())
}

fn summarize(checkpoint: &ExperimentCheckpoint) -> InspectOutput {
    let names: BTreeSet<&String> = checkpoint.losses.keys().chain(checkpoint.buffers.keys()).collect();
    let groups = names
        .into_iter()
        .map(|g| GroupSummary {
            group: g.clone(),
            loss: checkpoint.losses.contains_key(g),
            buffer: checkpoint.buffers.contains_key(g),
        })
        .collect();
    InspectOutput {
        total_frames: checkpoint.state.total_frames,
        n_iters_performed: checkpoint.state.n_iters_performed,
        total_time: checkpoint.state.total_time,
        mean_return: checkpoint.state.mean_return,
        groups,
    }
}

fn mark(present: bool) -> colored::ColoredString {
    if present { "yes".green() } else { "missing".red() }
}
