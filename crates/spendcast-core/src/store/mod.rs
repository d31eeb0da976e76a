//! Model store
//!
//! Owns the live [`ForecastContext`] and its on-disk generations.
//!
//! # Lifecycle
//!
//! - `open` loads the generation named by `CURRENT`. Anything missing,
//!   corrupt or inconsistent with the configuration is logged and replaced
//!   by a freshly bootstrapped model.
//! - `retrain` splices new observations into the persisted history, fits a
//!   new model from scratch, writes it as a new generation and swaps it in.
//!   Bootstrap months are only kept while they lead directly into the
//!   observed months (see [`splice`]).
//!
//! # Concurrency
//!
//! Forecasts clone an `Arc` of the live context and never block on training.
//! Retrains are serialized by a dedicated lock; the live context is only
//! write-locked for the pointer swap.

mod artifacts;
mod history;

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, RwLock};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

pub use artifacts::{Manifest, FORMAT_VERSION};
pub use history::{splice, Spliced};

use crate::aggregate::{aggregate, MonthlyMatrix};
use crate::config::ForecastConfig;
use crate::error::{Error, Result};
use crate::forecast::Forecaster;
use crate::models::{ForecastResult, TransactionRecord, YearMonth};
use crate::scaler::ScalerState;
use crate::sequence::{synthetic_history, SequenceModel, TrainingReport};
use crate::vocabulary::Vocabulary;

use artifacts::GenerationArtifacts;

/// Trained state needed to serve forecasts
#[derive(Debug, Clone)]
pub struct ForecastContext {
    pub model: SequenceModel,
    /// Scaler fitted on the training history
    pub scaler: ScalerState,
    pub vocabulary: Vocabulary,
    /// Working matrix the model was trained on
    pub history: MonthlyMatrix,
    /// Last synthetic month in `history`; later months were observed
    pub synthetic_until: Option<YearMonth>,
    pub generation: u64,
    pub created_at: DateTime<Utc>,
    pub report: TrainingReport,
}

/// Public description of the live model
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelInfo {
    pub generation: u64,
    pub created_at: DateTime<Utc>,
    pub vocabulary: Vec<String>,
    pub window: usize,
    pub hidden_size: usize,
    pub months_of_history: usize,
    pub history_start: Option<String>,
    pub history_end: Option<String>,
    pub synthetic_until: Option<String>,
    pub training: TrainingReport,
}

/// Outcome of a successful retrain
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrainReport {
    pub generation: u64,
    /// Transaction rows supplied to this retrain
    pub new_samples: usize,
    /// Months in the merged training history
    pub months_used: usize,
    pub training: TrainingReport,
}

impl ForecastContext {
    /// Fit a new model on `history`
    pub fn train(
        history: MonthlyMatrix,
        synthetic_until: Option<YearMonth>,
        config: &ForecastConfig,
        generation: u64,
    ) -> Result<Self> {
        let vocabulary = config.vocabulary.clone();
        let (model, scaler, report) = SequenceModel::fit(&history, &vocabulary, config)?;
        Ok(Self {
            model,
            scaler,
            vocabulary,
            history,
            synthetic_until,
            generation,
            created_at: Utc::now(),
            report,
        })
    }

    /// Train on synthetic history ending the month before `anchor`
    pub fn bootstrap(config: &ForecastConfig, anchor: YearMonth, generation: u64) -> Result<Self> {
        let history = synthetic_history(
            &config.vocabulary,
            anchor,
            config.bootstrap.months,
            config.bootstrap.seed,
        )?;
        info!(
            months = history.len(),
            anchor = %anchor,
            "Bootstrapping model from synthetic history"
        );
        let synthetic_until = history.last_month();
        Self::train(history, synthetic_until, config, generation)
    }

    pub fn info(&self) -> ModelInfo {
        ModelInfo {
            generation: self.generation,
            created_at: self.created_at,
            vocabulary: self.vocabulary.categories().to_vec(),
            window: self.model.window(),
            hidden_size: self.model.hidden_size(),
            months_of_history: self.history.len(),
            history_start: self.history.first_month().map(|m| m.to_string()),
            history_end: self.history.last_month().map(|m| m.to_string()),
            synthetic_until: self.synthetic_until.map(|m| m.to_string()),
            training: self.report.clone(),
        }
    }

    fn to_artifacts(&self) -> GenerationArtifacts {
        GenerationArtifacts {
            generation: self.generation,
            created_at: self.created_at,
            model: self.model.clone(),
            scaler: self.scaler.clone(),
            vocabulary: self.vocabulary.clone(),
            history: self.history.clone(),
            synthetic_until: self.synthetic_until,
            report: self.report.clone(),
        }
    }

    fn from_artifacts(artifacts: GenerationArtifacts) -> Self {
        Self {
            model: artifacts.model,
            scaler: artifacts.scaler,
            vocabulary: artifacts.vocabulary,
            history: artifacts.history,
            synthetic_until: artifacts.synthetic_until,
            generation: artifacts.generation,
            created_at: artifacts.created_at,
            report: artifacts.report,
        }
    }
}

/// Persistent, swappable home of the live model
pub struct ModelStore {
    dir: PathBuf,
    config: ForecastConfig,
    forecaster: Forecaster,
    current: RwLock<Arc<ForecastContext>>,
    retrain_lock: Mutex<()>,
}

impl ModelStore {
    /// Open the store, anchoring any bootstrap on the current month
    pub fn open(dir: impl Into<PathBuf>, config: ForecastConfig) -> Result<Self> {
        let anchor = YearMonth::from_date(Utc::now().date_naive());
        Self::open_at(dir, config, anchor)
    }

    /// Open the store, bootstrapping with history ending before `anchor` if
    /// no usable generation exists
    pub fn open_at(dir: impl Into<PathBuf>, config: ForecastConfig, anchor: YearMonth) -> Result<Self> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir).map_err(|e| {
            Error::ModelLoad(format!(
                "Failed to create model directory {}: {}",
                dir.display(),
                e
            ))
        })?;

        let context = match load(&dir, &config) {
            Ok(context) => {
                info!(
                    generation = context.generation,
                    dir = %dir.display(),
                    "Loaded model generation"
                );
                context
            }
            Err(e) => {
                warn!(error = %e, dir = %dir.display(), "No usable model on disk, re-bootstrapping");
                let generation = next_generation(&dir)?;
                let context = ForecastContext::bootstrap(&config, anchor, generation)?;
                artifacts::write_generation(&dir, &context.to_artifacts())?;
                prune_quietly(&dir, generation, config.retain_generations);
                context
            }
        };

        Ok(Self {
            forecaster: Forecaster::new(&config),
            dir,
            config,
            current: RwLock::new(Arc::new(context)),
            retrain_lock: Mutex::new(()),
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn config(&self) -> &ForecastConfig {
        &self.config
    }

    /// Snapshot of the live context
    pub fn context(&self) -> Arc<ForecastContext> {
        // The guarded value is a single Arc, so a poisoned lock still holds
        // a complete context
        match self.current.read() {
            Ok(guard) => Arc::clone(&guard),
            Err(poisoned) => Arc::clone(&poisoned.into_inner()),
        }
    }

    /// Forecast against the live model
    pub fn forecast(
        &self,
        transactions: &[TransactionRecord],
        target_year: i32,
        target_month: u32,
    ) -> Result<ForecastResult> {
        let context = self.context();
        self.forecaster
            .forecast(&context, transactions, target_year, target_month)
    }

    /// Splice `transactions` into the training history, refit, persist and
    /// swap in the new model
    ///
    /// On any failure the live model and the files on disk stay as they were.
    pub fn retrain(&self, transactions: &[TransactionRecord]) -> Result<RetrainReport> {
        let _guard = self.retrain_lock.lock().unwrap_or_else(|p| p.into_inner());
        let current = self.context();

        let observed = aggregate(transactions, &current.vocabulary)?;
        let Spliced {
            history,
            synthetic_until,
        } = splice(
            &current.history,
            current.synthetic_until,
            &observed,
            self.config.training.max_history_months,
        )?;

        let generation = next_generation(&self.dir)?.max(current.generation + 1);
        info!(
            generation,
            rows = transactions.len(),
            observed_months = observed.len(),
            months = history.len(),
            synthetic_until = ?synthetic_until,
            "Retraining model"
        );

        let context = ForecastContext::train(history, synthetic_until, &self.config, generation)?;
        let report = RetrainReport {
            generation,
            new_samples: transactions.len(),
            months_used: context.history.len(),
            training: context.report.clone(),
        };
        self.install(context)?;
        Ok(report)
    }

    /// Replace the live model with a freshly bootstrapped one
    pub fn rebootstrap(&self) -> Result<Arc<ForecastContext>> {
        let _guard = self.retrain_lock.lock().unwrap_or_else(|p| p.into_inner());
        let current = self.context();
        let anchor = YearMonth::from_date(Utc::now().date_naive());
        let generation = next_generation(&self.dir)?.max(current.generation + 1);

        let context = ForecastContext::bootstrap(&self.config, anchor, generation)?;
        self.install(context)?;
        Ok(self.context())
    }

    /// Persist `context` as a new generation, then make it live
    fn install(&self, context: ForecastContext) -> Result<()> {
        artifacts::write_generation(&self.dir, &context.to_artifacts())?;
        let generation = context.generation;

        {
            let mut live = self.current.write().unwrap_or_else(|p| p.into_inner());
            *live = Arc::new(context);
        }
        info!(generation, "Model swapped in");

        prune_quietly(&self.dir, generation, self.config.retain_generations);
        Ok(())
    }
}

/// Load and cross-check the generation named by `CURRENT`
pub fn load(dir: &Path, config: &ForecastConfig) -> Result<ForecastContext> {
    let generation = artifacts::read_current(dir)?;
    let (manifest, artifacts) = artifacts::read_generation(dir, generation)?;

    let vocabulary = &artifacts.vocabulary;
    if *vocabulary != config.vocabulary {
        return Err(Error::ModelLoad(
            "persisted vocabulary differs from the configured vocabulary".into(),
        ));
    }
    if manifest.categories != vocabulary.categories()
        || manifest.window != artifacts.model.window()
        || manifest.hidden_size != artifacts.model.hidden_size()
    {
        return Err(Error::ModelLoad("manifest disagrees with the model artifacts".into()));
    }
    artifacts.model.validate(vocabulary, config)?;
    if artifacts.scaler.width() != vocabulary.len() || artifacts.history.width() != vocabulary.len() {
        return Err(Error::ModelLoad(
            "scaler or history width differs from the vocabulary".into(),
        ));
    }

    Ok(ForecastContext::from_artifacts(artifacts))
}

fn next_generation(dir: &Path) -> Result<u64> {
    let highest = artifacts::list_generations(dir)?.last().copied().unwrap_or(0);
    Ok(highest + 1)
}

fn prune_quietly(dir: &Path, current: u64, retain: usize) {
    if let Err(e) = artifacts::prune(dir, current, retain) {
        warn!(error = %e, "Failed to prune old model generations");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn quick_config() -> ForecastConfig {
        let mut config = ForecastConfig::default();
        config.model.hidden_size = 6;
        config.training.max_epochs = 8;
        config
    }

    fn anchor() -> YearMonth {
        YearMonth::new(2025, 1).unwrap()
    }

    fn open(dir: &Path) -> ModelStore {
        ModelStore::open_at(dir, quick_config(), anchor()).unwrap()
    }

    fn spend(category: &str, amount: f64, year: i32, months: std::ops::RangeInclusive<u32>) -> Vec<TransactionRecord> {
        months
            .map(|m| TransactionRecord::new(category, -amount, &format!("{}-{:02}-10", year, m)))
            .collect()
    }

    #[test]
    fn test_open_bootstraps_empty_dir() {
        let dir = TempDir::new().unwrap();
        let store = open(dir.path());
        let ctx = store.context();

        assert_eq!(ctx.generation, 1);
        assert_eq!(ctx.history.len(), 24);
        assert_eq!(ctx.history.last_month(), Some(YearMonth::new(2024, 12).unwrap()));
        assert!(dir.path().join("CURRENT").exists());
        assert!(dir.path().join("gen-000001").join("manifest.json").exists());
    }

    #[test]
    fn test_reopen_loads_same_generation() {
        let dir = TempDir::new().unwrap();
        let first = open(dir.path()).context();
        let second = open(dir.path()).context();

        assert_eq!(second.generation, first.generation);
        assert_eq!(second.model, first.model);
        assert_eq!(second.scaler, first.scaler);
        assert_eq!(second.history, first.history);
        assert_eq!(second.report, first.report);
    }

    #[test]
    fn test_retrain_appends_and_swaps() {
        let dir = TempDir::new().unwrap();
        let store = open(dir.path());
        let before = store.context();

        let txns = spend("food", 120.0, 2025, 1..=3);
        let report = store.retrain(&txns).unwrap();

        assert_eq!(report.generation, 2);
        assert_eq!(report.new_samples, 3);
        assert_eq!(report.months_used, 27);
        let after = store.context();
        assert_eq!(after.generation, 2);
        assert_eq!(after.history.last_month(), Some(YearMonth::new(2025, 3).unwrap()));
        assert_eq!(before.generation, 1);

        let reopened = open(dir.path()).context();
        assert_eq!(reopened.generation, 2);
        assert_eq!(reopened.history, after.history);
    }

    #[test]
    fn test_retrain_caps_history() {
        let dir = TempDir::new().unwrap();
        let mut config = quick_config();
        config.training.max_history_months = 26;
        let store = ModelStore::open_at(dir.path(), config, anchor()).unwrap();

        let report = store.retrain(&spend("food", 50.0, 2025, 1..=6)).unwrap();
        assert_eq!(report.months_used, 26);
        let ctx = store.context();
        assert_eq!(ctx.history.first_month(), Some(YearMonth::new(2023, 5).unwrap()));
    }

    #[test]
    fn test_retrain_on_old_data_never_fabricates_months() {
        let dir = TempDir::new().unwrap();
        let store = open(dir.path());

        let mut txns = spend("food", 999.0, 2015, 1..=12);
        txns.extend(spend("food", 999.0, 2016, 1..=12));
        let report = store.retrain(&txns).unwrap();

        assert_eq!(report.months_used, 24);
        let ctx = store.context();
        assert_eq!(ctx.synthetic_until, None);
        assert_eq!(ctx.history.first_month(), Some(YearMonth::new(2015, 1).unwrap()));
        assert_eq!(ctx.history.last_month(), Some(YearMonth::new(2016, 12).unwrap()));
        assert!(ctx.history.column(0).all(|v| v == 999.0));
        assert!(!ctx.history.rows().iter().any(|r| r.iter().all(|v| *v == 0.0)));
    }

    #[test]
    fn test_retrain_on_short_old_data_keeps_live_model() {
        let dir = TempDir::new().unwrap();
        let store = open(dir.path());

        let result = store.retrain(&spend("food", 50.0, 2015, 1..=12));
        assert!(matches!(result, Err(Error::InsufficientTrainingData(_))));
        assert_eq!(store.context().generation, 1);
        assert_eq!(store.context().history.len(), 24);
    }

    #[test]
    fn test_retrain_rejects_data_older_than_observed_history() {
        let dir = TempDir::new().unwrap();
        let store = open(dir.path());
        store.retrain(&spend("food", 50.0, 2025, 1..=3)).unwrap();

        let result = store.retrain(&spend("food", 50.0, 2015, 1..=12));
        assert!(matches!(result, Err(Error::MalformedInput(_))));
        assert_eq!(store.context().generation, 2);
    }

    #[test]
    fn test_synthetic_boundary_survives_reopen() {
        let dir = TempDir::new().unwrap();
        let store = open(dir.path());
        assert_eq!(store.context().synthetic_until, Some(YearMonth::new(2024, 12).unwrap()));

        store.retrain(&spend("food", 50.0, 2025, 1..=2)).unwrap();
        let reopened = open(dir.path()).context();
        assert_eq!(reopened.synthetic_until, Some(YearMonth::new(2024, 12).unwrap()));
        assert_eq!(reopened.info().synthetic_until.as_deref(), Some("2024-12"));
    }

    #[test]
    fn test_retrain_rejects_malformed_rows() {
        let dir = TempDir::new().unwrap();
        let store = open(dir.path());
        let bad = vec![TransactionRecord::new("food", -5.0, "yesterday")];
        assert!(matches!(store.retrain(&bad), Err(Error::MalformedInput(_))));
        assert_eq!(store.context().generation, 1);
    }

    #[test]
    fn test_prunes_to_retention() {
        let dir = TempDir::new().unwrap();
        let store = open(dir.path());
        for month in 1..=4 {
            store.retrain(&spend("travel", 80.0, 2025, month..=month)).unwrap();
        }
        assert_eq!(store.context().generation, 5);
        assert_eq!(artifacts::list_generations(dir.path()).unwrap(), vec![3, 4, 5]);
    }

    #[test]
    fn test_vocabulary_change_rebootstraps() {
        let dir = TempDir::new().unwrap();
        open(dir.path());

        let mut config = quick_config();
        config.vocabulary = Vocabulary::new(&["food", "rent", "other"]).unwrap();
        let store = ModelStore::open_at(dir.path(), config, anchor()).unwrap();
        let ctx = store.context();
        assert_eq!(ctx.generation, 2);
        assert_eq!(ctx.vocabulary.len(), 3);
    }

    #[test]
    fn test_corrupt_current_rebootstraps() {
        let dir = TempDir::new().unwrap();
        open(dir.path());
        fs::write(dir.path().join("CURRENT"), "gen-000042").unwrap();

        let ctx = open(dir.path()).context();
        assert_eq!(ctx.generation, 2);
    }

    #[test]
    fn test_model_info() {
        let dir = TempDir::new().unwrap();
        let info = open(dir.path()).context().info();
        assert_eq!(info.generation, 1);
        assert_eq!(info.window, 12);
        assert_eq!(info.hidden_size, 6);
        assert_eq!(info.months_of_history, 24);
        assert_eq!(info.history_start.as_deref(), Some("2023-01"));
        assert_eq!(info.history_end.as_deref(), Some("2024-12"));
        assert_eq!(info.vocabulary.len(), 10);
    }
}
