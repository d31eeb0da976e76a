//! Error types for Spendcast

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    /// Unparseable date/amount in a transaction, or an invalid request
    /// parameter. Aborts the offending request only.
    #[error("Malformed input: {0}")]
    MalformedInput(String),

    /// Persisted model artifacts are missing, corrupt, or inconsistent.
    /// The model store recovers from this by re-bootstrapping.
    #[error("Model load error: {0}")]
    ModelLoad(String),

    /// Non-finite loss or gradient while fitting. The previously persisted
    /// model is left untouched.
    #[error("Training diverged: {0}")]
    TrainingDivergence(String),

    #[error("Insufficient training data: {0}")]
    InsufficientTrainingData(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("CSV parsing error: {0}")]
    Csv(#[from] csv::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    /// Whether the error was caused by the caller's input rather than by the
    /// engine itself
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            Error::MalformedInput(_) | Error::InsufficientTrainingData(_) | Error::Csv(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, Error>;
