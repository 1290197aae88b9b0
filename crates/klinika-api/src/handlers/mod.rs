//! HTTP request handlers

pub mod health;
pub mod resources;

use axum::{http::StatusCode, response::Json};
use klinika_core::Error;
use serde::{Deserialize, Serialize};
use tracing::{error, warn};

/// Error response structure
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// Error message
    pub error: String,
    /// Error code
    pub code: String,
    /// Additional details
    pub details: Option<serde_json::Value>,
}

/// Rejection returned by every handler
pub type ApiError = (StatusCode, Json<ErrorResponse>);

/// Map a core error onto a status code and JSON body
///
/// Database details are logged but never sent to the client.
#[must_use]
pub fn api_error(err: Error) -> ApiError {
    let (status, response) = match err {
        Error::Validation { field, message } => {
            warn!("Validation failed on {}: {}", field, message);
            (
                StatusCode::BAD_REQUEST,
                ErrorResponse {
                    error: format!("{field}: {message}"),
                    code: "VALIDATION_ERROR".to_string(),
                    details: Some(serde_json::json!({ "field": field, "message": message })),
                },
            )
        }
        Error::NotFound { resource } => (
            StatusCode::NOT_FOUND,
            ErrorResponse {
                error: format!("{resource} not found"),
                code: "NOT_FOUND".to_string(),
                details: None,
            },
        ),
        Error::Database(msg) => {
            error!("Database error: {}", msg);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                ErrorResponse {
                    error: "Database operation failed".to_string(),
                    code: "DATABASE_ERROR".to_string(),
                    details: None,
                },
            )
        }
        other => {
            error!("Request failed: {}", other);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                ErrorResponse {
                    error: "Internal server error".to_string(),
                    code: "INTERNAL_ERROR".to_string(),
                    details: None,
                },
            )
        }
    };
    (status, Json(response))
}
