//! API error types with HTTP response mapping.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use orchestrator::OrchestratorError;
use thiserror::Error;

use crate::routes::ApiResponse;

/// API-level error type that maps to HTTP responses.
#[derive(Debug)]
pub enum ApiError {
    /// Missing or rejected credentials.
    Unauthorized(String),
    /// Bad request from the client.
    BadRequest(String),
    /// Orchestration failure.
    Orchestration(OrchestratorError),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::Unauthorized(msg) => (StatusCode::UNAUTHORIZED, msg),
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            ApiError::Orchestration(err) => orchestrator_error_to_response(err),
        };

        metrics::counter!("api_errors_total", "status" => status.as_u16().to_string())
            .increment(1);
        (status, axum::Json(ApiResponse::<()>::failure(message))).into_response()
    }
}

fn orchestrator_error_to_response(err: OrchestratorError) -> (StatusCode, String) {
    let status = match &err {
        OrchestratorError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
        OrchestratorError::NotFound(_) => StatusCode::NOT_FOUND,
        OrchestratorError::Upstream { .. } => StatusCode::BAD_GATEWAY,
        OrchestratorError::Validation(_) => StatusCode::BAD_REQUEST,
        OrchestratorError::Ledger(e) => {
            tracing::error!(error = %e, "ledger failure");
            StatusCode::INTERNAL_SERVER_ERROR
        }
    };
    (status, err.to_string())
}

impl From<OrchestratorError> for ApiError {
    fn from(err: OrchestratorError) -> Self {
        ApiError::Orchestration(err)
    }
}

/// Errors that abort server startup.
#[derive(Debug, Error)]
pub enum StartupError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to install metrics recorder: {0}")]
    Metrics(String),
}
