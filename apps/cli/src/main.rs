//! marlbench CLI - inspect experiment configurations and checkpoints
//!
//! Provides the `marlbench` command for validating configuration files,
//! printing the defaults and looking inside saved checkpoints.

mod commands;

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::Level;
use tracing_subscriber::FmtSubscriber;

use commands::{checkpoint, config, validate};
use commands::checkpoint::CheckpointCommand;
use commands::config::ConfigCommand;

/// marlbench - multi-agent reinforcement-learning experiment orchestration
#[derive(Parser, Debug)]
#[command(name = "marlbench", author, version, about = "marlbench - multi-agent RL experiment orchestration")]
struct Args {
    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, default_value = "info", global = true)]
    log_level: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Validate an experiment configuration
    ///
    /// Loads a TOML configuration over the defaults, checks it and prints the
    /// batch and frame numbers derived from it.
    Validate {
        /// Path to the configuration file
        path: PathBuf,

        /// Derive the plan for an off-policy algorithm
        #[arg(long)]
        off_policy: bool,

        /// Output the plan as JSON
        #[arg(long)]
        json: bool,
    },

    /// Configuration helpers
    #[command(subcommand)]
    Config(ConfigCommand),

    /// Checkpoint helpers
    #[command(subcommand)]
    Checkpoint(CheckpointCommand),
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let level = match args.log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .without_time()
        .with_target(false)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    match args.command {
        Command::Validate { path, off_policy, json } => validate::execute(&path, off_policy, json),
        Command::Config(command) => config::execute(command),
        Command::Checkpoint(command) => checkpoint::execute(command),
    }
}
