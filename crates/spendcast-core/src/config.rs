//! Forecast engine configuration
//!
//! Config is loaded with a two-layer resolution:
//! 1. An explicit path, or the override in the data dir
//!    (~/.local/share/spendcast/config/forecast.toml)
//! 2. Fall back to embedded defaults (compiled into binary)
//!
//! Keys missing from a file keep their built-in defaults.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::error::{Error, Result};
use crate::trend::SeasonalTable;
use crate::vocabulary::Vocabulary;

/// Embedded default config (compiled into binary)
const DEFAULT_CONFIG: &str = include_str!("../../../config/forecast.toml");

/// Environment variable overriding the model directory
pub const MODEL_DIR_ENV: &str = "SPENDCAST_MODEL_DIR";

/// Sequence model shape
#[derive(Debug, Clone, PartialEq)]
pub struct ModelConfig {
    /// Months consumed per prediction
    pub window: usize,
    pub hidden_size: usize,
    pub seed: u64,
    /// Maximum autoregressive steps past the last observed month
    pub horizon: usize,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            window: 12,
            hidden_size: 16,
            seed: 7,
            horizon: 24,
        }
    }
}

/// Training loop settings
#[derive(Debug, Clone, PartialEq)]
pub struct TrainingConfig {
    pub max_epochs: usize,
    pub patience: usize,
    pub validation_split: f64,
    pub learning_rate: f64,
    pub batch_size: usize,
    pub clip_norm: f64,
    pub max_history_months: usize,
}

impl Default for TrainingConfig {
    fn default() -> Self {
        Self {
            max_epochs: 100,
            patience: 10,
            validation_split: 0.2,
            learning_rate: 0.01,
            batch_size: 32,
            clip_norm: 1.0,
            max_history_months: 60,
        }
    }
}

/// Synthetic bootstrap data settings
#[derive(Debug, Clone, PartialEq)]
pub struct BootstrapConfig {
    pub months: usize,
    pub seed: u64,
}

impl Default for BootstrapConfig {
    fn default() -> Self {
        Self {
            months: 24,
            seed: 42,
        }
    }
}

/// Fixed confidence reported per forecast method
#[derive(Debug, Clone, PartialEq)]
pub struct ConfidenceConfig {
    pub sequence_model: f64,
    pub trend_fallback: f64,
}

impl Default for ConfidenceConfig {
    fn default() -> Self {
        Self {
            sequence_model: 0.8,
            trend_fallback: 0.6,
        }
    }
}

/// Complete engine configuration
#[derive(Debug, Clone, PartialEq)]
pub struct ForecastConfig {
    pub model: ModelConfig,
    pub training: TrainingConfig,
    pub bootstrap: BootstrapConfig,
    pub confidence: ConfidenceConfig,
    /// Generations kept on disk, including the live one
    pub retain_generations: usize,
    pub vocabulary: Vocabulary,
    pub seasonality: SeasonalTable,
}

impl Default for ForecastConfig {
    fn default() -> Self {
        Self {
            model: ModelConfig::default(),
            training: TrainingConfig::default(),
            bootstrap: BootstrapConfig::default(),
            confidence: ConfidenceConfig::default(),
            retain_generations: 3,
            vocabulary: Vocabulary::default(),
            seasonality: SeasonalTable::default(),
        }
    }
}

impl ForecastConfig {
    /// Load from an explicit path, the default override location, or the
    /// embedded defaults, in that order
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let content = match path {
            Some(path) => fs::read_to_string(path).map_err(|e| {
                Error::Config(format!("Failed to read config {}: {}", path.display(), e))
            })?,
            None => match default_config_path() {
                Some(default_path) if default_path.exists() => fs::read_to_string(&default_path)
                    .map_err(|e| Error::Config(format!("Failed to read config: {}", e)))?,
                _ => DEFAULT_CONFIG.to_string(),
            },
        };

        parse_config(&content)
    }

    /// The compiled-in configuration
    pub fn embedded() -> Result<Self> {
        parse_config(DEFAULT_CONFIG)
    }

    fn validate(&self) -> Result<()> {
        let m = &self.model;
        let t = &self.training;
        if m.window < 2 {
            return Err(Error::Config("model.window must be at least 2".into()));
        }
        if m.hidden_size == 0 {
            return Err(Error::Config("model.hidden_size must be positive".into()));
        }
        if m.horizon == 0 {
            return Err(Error::Config("model.horizon must be positive".into()));
        }
        if t.max_epochs == 0 || t.batch_size == 0 {
            return Err(Error::Config(
                "training.max_epochs and training.batch_size must be positive".into(),
            ));
        }
        if !(0.0..1.0).contains(&t.validation_split) {
            return Err(Error::Config(
                "training.validation_split must be in [0, 1)".into(),
            ));
        }
        if !(t.learning_rate.is_finite() && t.learning_rate > 0.0) {
            return Err(Error::Config("training.learning_rate must be positive".into()));
        }
        if !(t.clip_norm.is_finite() && t.clip_norm > 0.0) {
            return Err(Error::Config("training.clip_norm must be positive".into()));
        }
        if t.max_history_months <= m.window {
            return Err(Error::Config(
                "training.max_history_months must exceed model.window".into(),
            ));
        }
        if self.bootstrap.months <= m.window {
            return Err(Error::Config(
                "bootstrap.months must exceed model.window".into(),
            ));
        }
        for c in [self.confidence.sequence_model, self.confidence.trend_fallback] {
            if !(0.0..=1.0).contains(&c) {
                return Err(Error::Config("confidence values must be in [0, 1]".into()));
            }
        }
        if self.retain_generations == 0 {
            return Err(Error::Config("store.retain_generations must be positive".into()));
        }
        Ok(())
    }
}

/// Default config override path
pub fn default_config_path() -> Option<PathBuf> {
    dirs::data_local_dir().map(|d| d.join("spendcast").join("config").join("forecast.toml"))
}

/// Model directory: `SPENDCAST_MODEL_DIR` if set, else the platform data dir
pub fn default_model_dir() -> PathBuf {
    if let Some(dir) = std::env::var_os(MODEL_DIR_ENV).filter(|v| !v.is_empty()) {
        return PathBuf::from(dir);
    }
    dirs::data_local_dir()
        .map(|d| d.join("spendcast").join("models"))
        .unwrap_or_else(|| PathBuf::from("models"))
}

/// Raw config structure for TOML parsing
#[derive(Debug, Deserialize)]
struct RawConfig {
    model: Option<RawModel>,
    training: Option<RawTraining>,
    bootstrap: Option<RawBootstrap>,
    confidence: Option<RawConfidence>,
    store: Option<RawStore>,
    vocabulary: Option<RawVocabulary>,
    seasonality: Option<HashMap<String, HashMap<String, f64>>>,
}

#[derive(Debug, Deserialize)]
struct RawModel {
    window: Option<usize>,
    hidden_size: Option<usize>,
    seed: Option<u64>,
    horizon: Option<usize>,
}

#[derive(Debug, Deserialize)]
struct RawTraining {
    max_epochs: Option<usize>,
    patience: Option<usize>,
    validation_split: Option<f64>,
    learning_rate: Option<f64>,
    batch_size: Option<usize>,
    clip_norm: Option<f64>,
    max_history_months: Option<usize>,
}

#[derive(Debug, Deserialize)]
struct RawBootstrap {
    months: Option<usize>,
    seed: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct RawConfidence {
    sequence_model: Option<f64>,
    trend_fallback: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct RawStore {
    retain_generations: Option<usize>,
}

#[derive(Debug, Deserialize)]
struct RawVocabulary {
    categories: Vec<String>,
}

/// Parse config from TOML content
fn parse_config(content: &str) -> Result<ForecastConfig> {
    let raw: RawConfig = toml::from_str(content)
        .map_err(|e| Error::Config(format!("Invalid config TOML: {}", e)))?;

    let mut config = ForecastConfig::default();

    if let Some(model) = raw.model {
        let m = &mut config.model;
        m.window = model.window.unwrap_or(m.window);
        m.hidden_size = model.hidden_size.unwrap_or(m.hidden_size);
        m.seed = model.seed.unwrap_or(m.seed);
        m.horizon = model.horizon.unwrap_or(m.horizon);
    }

    if let Some(training) = raw.training {
        let t = &mut config.training;
        t.max_epochs = training.max_epochs.unwrap_or(t.max_epochs);
        t.patience = training.patience.unwrap_or(t.patience);
        t.validation_split = training.validation_split.unwrap_or(t.validation_split);
        t.learning_rate = training.learning_rate.unwrap_or(t.learning_rate);
        t.batch_size = training.batch_size.unwrap_or(t.batch_size);
        t.clip_norm = training.clip_norm.unwrap_or(t.clip_norm);
        t.max_history_months = training.max_history_months.unwrap_or(t.max_history_months);
    }

    if let Some(bootstrap) = raw.bootstrap {
        config.bootstrap.months = bootstrap.months.unwrap_or(config.bootstrap.months);
        config.bootstrap.seed = bootstrap.seed.unwrap_or(config.bootstrap.seed);
    }

    if let Some(confidence) = raw.confidence {
        let c = &mut config.confidence;
        c.sequence_model = confidence.sequence_model.unwrap_or(c.sequence_model);
        c.trend_fallback = confidence.trend_fallback.unwrap_or(c.trend_fallback);
    }

    if let Some(store) = raw.store {
        config.retain_generations = store.retain_generations.unwrap_or(config.retain_generations);
    }

    if let Some(vocabulary) = raw.vocabulary {
        config.vocabulary = Vocabulary::new(&vocabulary.categories)?;
    }

    // A seasonality section replaces the built-in table entirely
    if let Some(seasonality) = raw.seasonality {
        let mut table = SeasonalTable::flat();
        for (category, months) in seasonality {
            for (month_key, multiplier) in months {
                let month: u32 = month_key
                    .trim()
                    .parse()
                    .ok()
                    .filter(|m| (1..=12).contains(m))
                    .ok_or_else(|| {
                        Error::Config(format!(
                            "seasonality.{}: invalid month '{}'",
                            category, month_key
                        ))
                    })?;
                if !(multiplier.is_finite() && multiplier >= 0.0) {
                    return Err(Error::Config(format!(
                        "seasonality.{}.{}: multiplier must be non-negative",
                        category, month
                    )));
                }
                table.set(&category, month, multiplier);
            }
        }
        config.seasonality = table;
    }

    config.validate()?;
    Ok(config)
}
