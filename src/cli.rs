use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(
    name = "chromoting-host",
    version,
    about = "Remote-desktop host session policy tooling"
)]
pub struct Cli {
    /// Log level override (trace, debug, info, warn, error)
    #[arg(long)]
    pub log_level: Option<String>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Validate a configuration file and print the effective session policy
    CheckConfig {
        /// Path to configuration file (also settable via CHROMOTING_HOST_CONFIG env var)
        #[arg(short, long, default_value = "config.toml", env = "CHROMOTING_HOST_CONFIG")]
        config: PathBuf,
    },
    /// Print a default configuration file
    DefaultConfig,
}
