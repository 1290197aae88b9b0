//! Error types for the Klinika client

use std::collections::BTreeMap;
use thiserror::Error;

/// Result type alias for client operations
pub type ClientResult<T> = Result<T, ClientError>;

/// Per-field messages produced by client-side validation, keyed by field identifier
pub type FieldErrors = BTreeMap<String, String>;

/// Errors that can occur while talking to the Klinika API
#[derive(Error, Debug)]
pub enum ClientError {
    /// Operation has no endpoint configured; no request was sent
    #[error("Operation '{operation}' is not configured for {resource}")]
    NotConfigured {
        /// Resource the service was built for
        resource: String,
        /// Requested operation
        operation: String,
    },

    /// Client-side validation failed; no request was sent
    #[error("Validation failed for {} field(s)", .errors.len())]
    Validation {
        /// Message per offending field
        errors: FieldErrors,
    },

    /// The server rejected the payload
    #[error("{message}")]
    ServerValidation {
        /// Message extracted from the error response
        message: String,
        /// Offending field, when the server named one
        field: Option<String>,
    },

    /// The requested record or route does not exist
    #[error("Not found: {message}")]
    NotFound {
        /// Message extracted from the error response
        message: String,
    },

    /// The server answered with an unexpected status
    #[error("Server error ({status}): {message}")]
    Server {
        /// HTTP status code
        status: u16,
        /// Message extracted from the error response
        message: String,
    },

    /// The request never completed
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    /// A body could not be encoded or decoded
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// An edit form was submitted although its record never loaded
    #[error("Record could not be loaded: {message}")]
    NotLoaded {
        /// Why the load failed
        message: String,
    },

    /// Invalid client configuration such as a malformed base URL
    #[error("Invalid configuration: {message}")]
    Configuration {
        /// Error message
        message: String,
    },
}

impl From<klinika_core::Error> for ClientError {
    fn from(err: klinika_core::Error) -> Self {
        match err {
            klinika_core::Error::Validation { field, message } => Self::field(field, message),
            klinika_core::Error::NotFound { resource } => Self::NotFound {
                message: format!("{resource} not found"),
            },
            other => Self::configuration(other.to_string()),
        }
    }
}

impl ClientError {
    /// Create a not-configured error
    pub fn not_configured(resource: impl Into<String>, operation: impl Into<String>) -> Self {
        Self::NotConfigured {
            resource: resource.into(),
            operation: operation.into(),
        }
    }

    /// Create a single-field validation error
    pub fn field(field: impl Into<String>, message: impl Into<String>) -> Self {
        let mut errors = FieldErrors::new();
        errors.insert(field.into(), message.into());
        Self::Validation { errors }
    }

    /// Create a configuration error
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// Whether the server reported the record as missing
    #[must_use]
    pub const fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    /// Whether the request was stopped before reaching the network
    #[must_use]
    pub const fn is_local(&self) -> bool {
        matches!(
            self,
            Self::NotConfigured { .. }
                | Self::Validation { .. }
                | Self::NotLoaded { .. }
                | Self::Configuration { .. }
        )
    }

    /// Reduce the error to one message fit for a global error banner
    #[must_use]
    pub fn display_message(&self) -> String {
        match self {
            Self::Validation { errors } => errors
                .iter()
                .next()
                .map_or_else(|| self.to_string(), |(field, message)| format!("{field}: {message}")),
            Self::ServerValidation { message, .. }
            | Self::NotFound { message }
            | Self::Server { message, .. } => message.clone(),
            Self::Network(err) if err.is_timeout() => "The server took too long to respond".to_string(),
            Self::Network(err) if err.is_connect() => "Unable to reach the server".to_string(),
            _ => self.to_string(),
        }
    }
}

#[cfg(test)]
#[allow(clippy::missing_panics_doc)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_error_creation() {
        let err = ClientError::not_configured("HelpCenter", "bulk_delete");
        assert!(err.is_local());
        assert_eq!(
            err.to_string(),
            "Operation 'bulk_delete' is not configured for HelpCenter"
        );

        let err = ClientError::field("email", "must be a valid email");
        assert!(matches!(err, ClientError::Validation { ref errors } if errors.len() == 1));
    }

    #[test]
    fn test_display_message() {
        let err = ClientError::field("email", "must be a valid email");
        assert_eq!(err.display_message(), "email: must be a valid email");

        let err = ClientError::ServerValidation {
            message: "categoryId: referenced record does not exist".to_string(),
            field: Some("categoryId".to_string()),
        };
        assert_eq!(
            err.display_message(),
            "categoryId: referenced record does not exist"
        );

        let err = ClientError::NotFound {
            message: "HelpCenter not found".to_string(),
        };
        assert!(err.is_not_found());
        assert!(!err.is_local());
        assert_eq!(err.display_message(), "HelpCenter not found");
    }

    #[test]
    fn test_json_error_conversion() {
        let err: ClientError = serde_json::from_str::<u32>("nope").unwrap_err().into();
        assert!(err.display_message().starts_with("JSON error"));
    }
}
