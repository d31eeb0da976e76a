//! Spendcast CLI - Per-category spending forecasts
//!
//! Usage:
//!   spendcast forecast --file tx.csv --year 2025 --month 3
//!   spendcast retrain --file new.json
//!   spendcast bootstrap [--force]
//!   spendcast status
//!   spendcast serve --port 3000

mod cli;
mod commands;


use anyhow::Result;
use clap::Parser;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use cli::*;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Set up logging
    // Priority: RUST_LOG env var > --verbose flag > default (info)
    let filter = if std::env::var("RUST_LOG").is_ok() {
        EnvFilter::from_default_env()
    } else if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(false).compact())
        .init();

    let env = commands::Env::new(cli.model_dir, cli.config.as_deref())?;

    match cli.command {
        Commands::Forecast {
            file,
            year,
            month,
            json,
        } => commands::cmd_forecast(&env, &file, year, month, json),
        Commands::Retrain { file } => commands::cmd_retrain(&env, &file),
        Commands::Bootstrap { force } => commands::cmd_bootstrap(&env, force),
        Commands::Status => commands::cmd_status(&env),
        Commands::Serve { port, host } => commands::cmd_serve(&env, &host, port).await,
    }
}
