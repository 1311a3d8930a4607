//! Errors for the bus tracker
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum TrackerError {
    #[error("invalid input: {message}")]
    InvalidInput { message: String },

    #[error("vehicle {vehicle_id} not found")]
    NotFound { vehicle_id: String },

    #[error("location store unavailable: {0}")]
    StoreUnavailable(String),

    #[error("Configuration error: {message}")]
    ConfigurationError { message: String },

    #[error("Configuration error")]
    ConfigError(#[from] config::ConfigError),

    #[error("Serialization error")]
    SerdeError(#[from] serde_json::Error),

    #[error("IO error")]
    IoError(#[from] std::io::Error),

    #[error("Database error")]
    DatabaseError(#[from] sqlx::Error),

    #[error("Database migration error: {0}")]
    MigrationError(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl TrackerError {
    fn status(&self) -> StatusCode {
        match self {
            TrackerError::InvalidInput { .. } => StatusCode::BAD_REQUEST,
            TrackerError::NotFound { .. } => StatusCode::NOT_FOUND,
            TrackerError::StoreUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Machine-readable reason for the ingest/query response body
    fn reason(&self) -> &'static str {
        match self {
            TrackerError::InvalidInput { .. } => "invalid-input",
            TrackerError::NotFound { .. } => "not-found",
            TrackerError::StoreUnavailable(_) => "store-unavailable",
            _ => "internal-error",
        }
    }
}

impl IntoResponse for TrackerError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(error = %self, "request failed");
        }
        let body = Json(json!({
            "error": self.to_string(),
            "reason": self.reason(),
        }));
        (status, body).into_response()
    }
}
