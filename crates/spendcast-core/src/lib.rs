//! Spendcast Core Library
//!
//! Next-month spending forecasts per category:
//! - Aggregation of raw transactions into a monthly category matrix
//! - Min-max feature scaling with inversion
//! - A GRU sequence forecaster trained in-process
//! - A mean x seasonality fallback for short histories
//! - Forecast orchestration over a swappable model context
//! - Generational, checksummed model persistence with retraining

pub mod aggregate;
pub mod config;
pub mod error;
pub mod forecast;
pub mod import;
pub mod models;
pub mod scaler;
pub mod sequence;
pub mod store;
pub mod trend;
pub mod vocabulary;

pub use aggregate::{aggregate, MonthlyMatrix};
pub use config::{default_model_dir, ForecastConfig, MODEL_DIR_ENV};
pub use error::{Error, Result};
pub use forecast::{ForecastMode, Forecaster, History, Predictor, PredictorOutput};
pub use import::{read_transactions_file, TransactionFormat};
pub use models::{
    Amount, CategoryForecast, ForecastMethod, ForecastResult, TransactionRecord, YearMonth,
};
pub use scaler::ScalerState;
pub use sequence::{SequenceModel, SequencePredictor, TrainingReport};
pub use store::{ForecastContext, ModelInfo, ModelStore, RetrainReport};
pub use trend::{SeasonalTable, TrendFallback};
pub use vocabulary::Vocabulary;
