//! Audioclip CLI
//!
//! Command-line interface for the audioclip transcode pipeline.

use anyhow::Context;
use clap::Parser;
use env_logger::Env;
use log::{error, info};

use audioclip::cli::{commands, Cli, Commands};
use audioclip::ClipError;

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize logger
    let default_filter = if cli.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(Env::default().default_filter_or(default_filter)).init();

    info!("Audioclip v{}", env!("CARGO_PKG_VERSION"));

    match cli.command {
        Some(cmd) => handle_command(cmd),
        None => {
            println!("Audioclip v{}", env!("CARGO_PKG_VERSION"));
            println!("Use --help for available commands");
            Ok(())
        }
    }
}

fn handle_command(cmd: Commands) -> anyhow::Result<()> {
    match cmd {
        Commands::Process(args) => {
            commands::process(&args)
                .map_err(report)
                .with_context(|| format!("failed to process {}", args.input.display()))?;
        }
        Commands::Probe { input } => {
            commands::probe(&input)
                .map_err(report)
                .with_context(|| format!("failed to probe {}", input.display()))?;
        }
    }
    Ok(())
}

/// Log the error code and recovery hints before handing the error to anyhow
fn report(err: ClipError) -> ClipError {
    error!("[{}] {}", err.error_code(), err);
    for suggestion in err.recovery_suggestions() {
        info!("  - {}", suggestion);
    }
    err
}
