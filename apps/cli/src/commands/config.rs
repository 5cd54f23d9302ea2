//! Configuration helpers.

use clap::Subcommand;
use marlbench_core::ExperimentConfig;

/// Config subcommands
#[derive(Subcommand, Debug)]
pub enum ConfigCommand {
    /// Print the default configuration as TOML
    Default,
}

pub fn execute(command: ConfigCommand) -> anyhow::Result<()> {
    match command {
        ConfigCommand::Default => {
            print!("{}", ExperimentConfig::default().to_toml_string()?);
            Ok(())
        }
    }
}
