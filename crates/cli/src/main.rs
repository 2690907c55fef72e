//! # CAN Streamer CLI
//!
//! Command-line entry point.
//!
//! Provides:
//! - Configuration loading, overrides and validation
//! - The streamer loop with graceful shutdown
//! - A synthetic telemetry generator

mod cli;
mod commands;
mod error;
mod settings;
mod shutdown;

use anyhow::Result;
use clap::Parser;
use tracing::info;

use cli::{Cli, Commands};
use observability::ObservabilityConfig;
use commands::{run_generate, run_info, run_streamer, run_validate};

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present
    dotenvy::dotenv().ok();

    let cli = Cli::parse();

    // Initialize logging based on CLI options
    init_logging(&cli)?;

    info!(
        version = env!("CARGO_PKG_VERSION"),
        "CAN Streamer CLI starting"
    );

    // Execute command
    let result = match &cli.command {
        Commands::Run(args) => run_streamer(args).await,
        Commands::Validate(args) => run_validate(args),
        Commands::Info(args) => run_info(args),
        Commands::Generate(args) => run_generate(args).await,
    };

    if let Err(ref e) = result {
        tracing::error!(error = %e, "Command failed");
    }

    result
}

/// Initialize logging based on CLI options
///
/// `RUST_LOG` takes precedence over `-v`/`-q`. The metrics exporter is
/// started by `run`, not here.
fn init_logging(cli: &Cli) -> Result<()> {
    let default_log_level = if cli.quiet {
        "warn"
    } else {
        match cli.verbose {
            0 => "info",
            1 => "debug",
            _ => "trace",
        }
    };

    observability::init_with_config(ObservabilityConfig {
        log_format: cli.log_format.clone().into(),
        metrics_port: None,
        default_log_level: default_log_level.to_string(),
    })
}
