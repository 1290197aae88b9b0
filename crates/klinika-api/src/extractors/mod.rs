//! Custom extractors for request processing

pub mod pagination;
pub mod validated_json;

pub use pagination::Pagination;
pub use validated_json::ValidatedJson;

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use std::fmt;

use crate::handlers::{ApiError, ErrorResponse};

/// Custom error type for extractors
#[derive(Debug)]
pub struct ExtractorError {
    /// Error message
    pub message: String,
    /// HTTP status code
    pub status: StatusCode,
    /// Error code for API responses
    pub code: String,
    /// Additional context
    pub details: Option<serde_json::Value>,
}

impl ExtractorError {
    /// Create a new extractor error
    pub fn new(message: impl Into<String>, status: StatusCode, code: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            status,
            code: code.into(),
            details: None,
        }
    }

    /// Create a bad request error
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(message, StatusCode::BAD_REQUEST, "BAD_REQUEST")
    }

    /// Create a validation error naming the offending field
    pub fn validation(field: &str, message: &str) -> Self {
        Self {
            message: format!("{field}: {message}"),
            status: StatusCode::BAD_REQUEST,
            code: "VALIDATION_ERROR".to_string(),
            details: Some(serde_json::json!({ "field": field, "message": message })),
        }
    }

    /// Convert into the handler rejection type
    #[must_use]
    pub fn into_api_error(self) -> ApiError {
        (
            self.status,
            Json(ErrorResponse {
                error: self.message,
                code: self.code,
                details: self.details,
            }),
        )
    }
}

impl fmt::Display for ExtractorError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.code, self.message)
    }
}

impl std::error::Error for ExtractorError {}

impl IntoResponse for ExtractorError {
    fn into_response(self) -> Response {
        self.into_api_error().into_response()
    }
}
