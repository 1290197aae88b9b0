//! Pagination extractor for query parameters

use crate::extractors::ExtractorError;
use axum::{async_trait, extract::FromRequestParts, http::request::Parts};
use klinika_core::{PageRequest, config::ApiConfig};
use serde::{Deserialize, Serialize};
use validator::Validate;

/// `page`, `pageSize` and `search` query parameters
#[derive(Debug, Clone, Default, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct Pagination {
    /// Page number (1-based)
    #[validate(range(min = 1))]
    pub page: Option<u32>,

    /// Number of items per page
    #[validate(range(min = 1))]
    pub page_size: Option<u32>,

    /// Case-insensitive substring filter
    #[validate(length(max = 200))]
    pub search: Option<String>,
}

impl Pagination {
    /// Resolve defaults and limits into a page request
    ///
    /// # Errors
    ///
    /// Returns a bad request when `pageSize` exceeds the configured maximum.
    pub fn to_request(&self, api: &ApiConfig) -> Result<PageRequest, ExtractorError> {
        let page_size = self.page_size.unwrap_or(api.default_page_size);
        if page_size > api.max_page_size {
            return Err(ExtractorError::validation(
                "pageSize",
                &format!("must be at most {}", api.max_page_size),
            ));
        }

        PageRequest::new(self.page.unwrap_or(1), page_size, self.search.clone())
            .map_err(|e| ExtractorError::bad_request(e.to_string()))
    }
}

#[async_trait]
impl<S> FromRequestParts<S> for Pagination
where
    S: Send + Sync,
{
    type Rejection = ExtractorError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let query = parts.uri.query().unwrap_or_default();

        let pagination: Self = serde_urlencoded::from_str(query).map_err(|e| {
            ExtractorError::bad_request(format!("Invalid pagination parameters: {e}"))
        })?;

        if let Err(validation_errors) = pagination.validate() {
            return Err(match klinika_core::Error::from(validation_errors) {
                klinika_core::Error::Validation { field, message } => {
                    ExtractorError::validation(&field, &message)
                }
                other => ExtractorError::bad_request(other.to_string()),
            });
        }

        Ok(pagination)
    }
}
