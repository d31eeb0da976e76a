//! CLI command implementations
//!
//! Commands are organized by domain:
//! - `forecast` - Forecast and retrain commands
//! - `model` - Model lifecycle commands (bootstrap, status)
//! - `serve` - Web server command

pub mod forecast;
pub mod model;
pub mod serve;

// Re-export command functions for main.rs
pub use forecast::*;
pub use model::*;
pub use serve::*;

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use spendcast_core::{default_model_dir, ForecastConfig, ModelStore};

/// Resolved global options shared by every command
pub struct Env {
    pub model_dir: PathBuf,
    pub config: ForecastConfig,
}

impl Env {
    pub fn new(model_dir: Option<PathBuf>, config_path: Option<&Path>) -> Result<Self> {
        let config = ForecastConfig::load(config_path).context("Failed to load forecast config")?;
        Ok(Self {
            model_dir: model_dir.unwrap_or_else(default_model_dir),
            config,
        })
    }

    /// Open the model store, bootstrapping a model if none is usable
    pub fn open_store(&self) -> Result<ModelStore> {
        ModelStore::open(&self.model_dir, self.config.clone()).with_context(|| {
            format!("Failed to open model directory {}", self.model_dir.display())
        })
    }
}
