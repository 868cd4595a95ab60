use anyhow::Result;
use clap::Parser;
use tracing::info;

use chromoting_host::cli::{Cli, Command};
use chromoting_host::config;
use chromoting_host::utils::format_duration;

fn main() -> Result<()> {
    let cli = Cli::parse();

    match &cli.command {
        Command::DefaultConfig => {
            print!("{}", config::DEFAULT_CONFIG);
            Ok(())
        }
        Command::CheckConfig { config: path } => {
            let cfg = config::load_config(path)?;
            chromoting_host::logging::setup_logging(&cfg.logging, cli.log_level.as_deref());
            info!(path = %path.display(), "Configuration loaded");

            println!("Configuration is valid.");
            println!("  Owner:            {}", cfg.host.owner_email);
            println!(
                "  Curtain mode:     {}",
                if cfg.host.require_curtain {
                    "required"
                } else {
                    "off"
                }
            );
            let max_duration = cfg.host.max_session_duration();
            if max_duration.is_zero() {
                println!("  Session limit:    unlimited");
            } else {
                println!("  Session limit:    {}", format_duration(max_duration));
            }
            let protocols: Vec<String> = cfg.host.protocols.iter().map(|p| p.to_string()).collect();
            println!("  Transports:       {}", protocols.join(", "));
            println!(
                "  Logging:          {} ({})",
                cfg.logging.level, cfg.logging.format
            );
            match &cfg.audit.log_path {
                Some(path) => println!("  Audit log:        {}", path.display()),
                None => println!("  Audit log:        disabled"),
            }
            println!(
                "  Metrics:          {}",
                if cfg.metrics.enabled { "enabled" } else { "disabled" }
            );
            Ok(())
        }
    }
}
