//! Model status handlers

use std::sync::Arc;

use axum::{extract::State, Json};
use serde::Serialize;

use spendcast_core::ModelInfo;

use crate::AppState;

/// Health check response
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    /// Generation of the live model
    pub generation: u64,
}

/// GET /health
pub async fn health(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy",
        generation: state.store.context().generation,
    })
}

/// GET /api/model - Describe the live model
pub async fn get_model(State(state): State<Arc<AppState>>) -> Json<ModelInfo> {
    Json(state.store.context().info())
}
