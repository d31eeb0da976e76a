//! Spendcast Web Server
//!
//! Axum-based HTTP adapter over the forecast engine.
//!
//! - `GET  /health`        liveness and live model generation
//! - `POST /api/forecast`  next-month forecast for a transaction history
//! - `POST /api/retrain`   merge new observations and refit the model
//! - `GET  /api/model`     description of the live model
//!
//! Security features:
//! - Restrictive CORS policy (explicit allowed origins only)
//! - Request body size limit
//! - Sanitized error responses

use std::sync::Arc;

use axum::{
    http::{header, HeaderValue, Method, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use tower_http::{
    cors::CorsLayer, limit::RequestBodyLimitLayer, set_header::SetResponseHeaderLayer,
    trace::TraceLayer,
};
use tracing::{error, info, warn};

use spendcast_core::{Error as CoreError, ModelStore};

mod handlers;

/// Maximum request body size (10 MB)
pub const MAX_BODY_SIZE: usize = 10 * 1024 * 1024;

/// Default minimum number of transactions a forecast request must carry
pub const DEFAULT_MIN_TRANSACTIONS: usize = 15;

/// Environment variable overriding the forecast transaction minimum
pub const MIN_TRANSACTIONS_ENV: &str = "SPENDCAST_MIN_TRANSACTIONS";

/// Environment variable listing allowed CORS origins (comma-separated)
pub const ALLOWED_ORIGINS_ENV: &str = "SPENDCAST_ALLOWED_ORIGINS";

/// Server configuration
#[derive(Clone, Debug)]
pub struct ServerConfig {
    /// Allowed CORS origins (empty = same-origin only)
    pub allowed_origins: Vec<String>,
    /// Forecast requests with fewer transactions are rejected
    pub min_transactions: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            allowed_origins: vec![],
            min_transactions: DEFAULT_MIN_TRANSACTIONS,
        }
    }
}

impl ServerConfig {
    /// Defaults overridden by `SPENDCAST_MIN_TRANSACTIONS` and
    /// `SPENDCAST_ALLOWED_ORIGINS`
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(raw) = std::env::var(MIN_TRANSACTIONS_ENV) {
            match raw.trim().parse() {
                Ok(min) => config.min_transactions = min,
                Err(_) => warn!(value = %raw, "Ignoring invalid {}", MIN_TRANSACTIONS_ENV),
            }
        }

        if let Ok(raw) = std::env::var(ALLOWED_ORIGINS_ENV) {
            config.allowed_origins = raw
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect();
        }

        config
    }
}

/// Shared application state
pub struct AppState {
    pub store: Arc<ModelStore>,
    pub config: ServerConfig,
}

/// Create the application router
pub fn create_router(store: Arc<ModelStore>, config: ServerConfig) -> Router {
    let state = Arc::new(AppState {
        store,
        config: config.clone(),
    });

    let api_routes = Router::new()
        .route("/forecast", post(handlers::forecast))
        .route("/retrain", post(handlers::retrain))
        .route("/model", get(handlers::get_model));

    // Build CORS layer
    let cors = if config.allowed_origins.is_empty() {
        // Restrictive default: only allow same-origin
        CorsLayer::new()
            .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
            .allow_headers([header::CONTENT_TYPE])
    } else {
        let origins: Vec<HeaderValue> = config
            .allowed_origins
            .iter()
            .filter_map(|o| o.parse().ok())
            .collect();
        CorsLayer::new()
            .allow_origin(origins)
            .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
            .allow_headers([header::CONTENT_TYPE])
    };

    Router::new()
        .route("/health", get(handlers::health))
        .nest("/api", api_routes)
        .with_state(state)
        .layer(RequestBodyLimitLayer::new(MAX_BODY_SIZE))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        // Security headers
        .layer(SetResponseHeaderLayer::overriding(
            header::X_CONTENT_TYPE_OPTIONS,
            HeaderValue::from_static("nosniff"),
        ))
        .layer(SetResponseHeaderLayer::overriding(
            header::X_FRAME_OPTIONS,
            HeaderValue::from_static("DENY"),
        ))
}

/// Start the server with configuration from the environment
pub async fn serve(store: Arc<ModelStore>, host: &str, port: u16) -> anyhow::Result<()> {
    serve_with_config(store, host, port, ServerConfig::from_env()).await
}

/// Start the server with custom configuration
pub async fn serve_with_config(
    store: Arc<ModelStore>,
    host: &str,
    port: u16,
    config: ServerConfig,
) -> anyhow::Result<()> {
    let context = store.context();
    info!(
        generation = context.generation,
        model_dir = %store.dir().display(),
        min_transactions = config.min_transactions,
        "Serving forecasts"
    );

    let app = create_router(store, config);
    let addr = format!("{}:{}", host, port);

    info!("Starting server at http://{}", addr);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

// ============================================================================
// Error Handling
// ============================================================================

/// Application error type with proper HTTP status codes
pub struct AppError {
    status: StatusCode,
    message: String,
    internal: Option<anyhow::Error>,
}

impl AppError {
    pub fn bad_request(msg: &str) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message: msg.to_string(),
            internal: None,
        }
    }

    pub fn unprocessable(msg: &str) -> Self {
        Self {
            status: StatusCode::UNPROCESSABLE_ENTITY,
            message: msg.to_string(),
            internal: None,
        }
    }

    /// Map an engine error onto a status code
    ///
    /// Caller mistakes are echoed back; engine failures are logged and
    /// replaced by a generic message.
    pub fn from_core(err: CoreError) -> Self {
        match err {
            CoreError::TrainingDivergence(_) => Self::unprocessable(&err.to_string()),
            e if e.is_client_error() => Self::bad_request(&e.to_string()),
            e => Self {
                status: StatusCode::INTERNAL_SERVER_ERROR,
                message: "An internal error occurred".to_string(),
                internal: Some(e.into()),
            },
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        // Log the full internal error if present
        if let Some(err) = &self.internal {
            error!(error = %err, "Internal error");
        }

        let body = Json(serde_json::json!({
            "success": false,
            "error": self.message
        }));

        (self.status, body).into_response()
    }
}

impl<E> From<E> for AppError
where
    E: Into<anyhow::Error>,
{
    fn from(err: E) -> Self {
        let err = err.into();
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            // Return generic message to client
            message: "An internal error occurred".to_string(),
            // Keep full error for logging
            internal: Some(err),
        }
    }
}
