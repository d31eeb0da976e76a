//! CLI argument definitions using clap
//!
//! This module contains all the clap structs and enums for parsing CLI arguments.
//! The actual command implementations are in the `commands` module.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// Spendcast - Forecast next month's spending per category
#[derive(Parser)]
#[command(name = "spendcast")]
#[command(about = "Per-category spending forecasts from transaction history", long_about = None)]
#[command(version)]
pub struct Cli {
    /// Model directory (defaults to $SPENDCAST_MODEL_DIR or the platform data dir)
    #[arg(long, global = true)]
    pub model_dir: Option<PathBuf>,

    /// Forecast config file (TOML); embedded defaults are used when absent
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Forecast spending for a target month
    Forecast {
        /// Transaction history (.csv or .json)
        #[arg(short, long)]
        file: PathBuf,

        /// Target year
        #[arg(short, long)]
        year: i32,

        /// Target month (1-12)
        #[arg(short, long)]
        month: u32,

        /// Print the forecast as JSON
        #[arg(long)]
        json: bool,
    },

    /// Merge new transactions into the training history and refit the model
    Retrain {
        /// New transactions (.csv or .json)
        #[arg(short, long)]
        file: PathBuf,
    },

    /// Train a model on synthetic history
    Bootstrap {
        /// Replace an existing usable model
        #[arg(long)]
        force: bool,
    },

    /// Show the live model
    Status,

    /// Start the web server
    Serve {
        /// Port to listen on
        #[arg(short, long, default_value = "3000")]
        port: u16,

        /// Host to bind to
        #[arg(long, default_value = "127.0.0.1")]
        host: String,
    },
}
