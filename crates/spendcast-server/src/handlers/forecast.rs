//! Forecast and retrain handlers

use std::sync::Arc;

use axum::{extract::State, Json};
use serde::{Deserialize, Serialize};
use tracing::info;

use spendcast_core::{ForecastResult, TransactionRecord};

use crate::{AppError, AppState};

/// Request body for POST /api/forecast
#[derive(Debug, Deserialize)]
pub struct ForecastRequest {
    pub transactions: Vec<TransactionRecord>,
    pub target_year: i32,
    pub target_month: u32,
}

/// Request body for POST /api/retrain
#[derive(Debug, Deserialize)]
pub struct RetrainRequest {
    pub transactions: Vec<TransactionRecord>,
}

/// Response for a successful retrain
#[derive(Debug, Serialize)]
pub struct RetrainResponse {
    pub status: &'static str,
    pub generation: u64,
    pub new_samples: usize,
    pub months_used: usize,
    pub epochs: usize,
    pub train_loss: f64,
    pub validation_loss: Option<f64>,
}

/// POST /api/forecast - Forecast spending for the target month
pub async fn forecast(
    State(state): State<Arc<AppState>>,
    Json(req): Json<ForecastRequest>,
) -> Result<Json<ForecastResult>, AppError> {
    let min = state.config.min_transactions;
    if req.transactions.len() < min {
        return Err(AppError::bad_request(&format!(
            "At least {} transactions are required, got {}",
            min,
            req.transactions.len()
        )));
    }

    let result = state
        .store
        .forecast(&req.transactions, req.target_year, req.target_month)
        .map_err(AppError::from_core)?;

    Ok(Json(result))
}

/// POST /api/retrain - Merge transactions into the history and refit
///
/// Training runs on the blocking pool; forecasts keep using the previous
/// model until the new one is swapped in.
pub async fn retrain(
    State(state): State<Arc<AppState>>,
    Json(req): Json<RetrainRequest>,
) -> Result<Json<RetrainResponse>, AppError> {
    if req.transactions.is_empty() {
        return Err(AppError::bad_request("No transactions supplied"));
    }

    let store = Arc::clone(&state.store);
    let report = tokio::task::spawn_blocking(move || store.retrain(&req.transactions))
        .await?
        .map_err(AppError::from_core)?;

    info!(
        generation = report.generation,
        months = report.months_used,
        "Retrain request completed"
    );

    Ok(Json(RetrainResponse {
        status: "success",
        generation: report.generation,
        new_samples: report.new_samples,
        months_used: report.months_used,
        epochs: report.training.epochs_run,
        train_loss: report.training.train_loss,
        validation_loss: report.training.validation_loss,
    }))
}
