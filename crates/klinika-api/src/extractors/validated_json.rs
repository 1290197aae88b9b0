//! JSON body extractor that runs the payload's validation rules

use crate::extractors::ExtractorError;
use axum::{
    Json, async_trait,
    extract::{FromRequest, Request},
};
use serde::de::DeserializeOwned;
use validator::Validate;

/// Validated JSON extractor that combines JSON parsing with validation
#[derive(Debug)]
pub struct ValidatedJson<T>(pub T);

#[async_trait]
impl<T, S> FromRequest<S> for ValidatedJson<T>
where
    T: DeserializeOwned + Validate + Send,
    S: Send + Sync,
{
    type Rejection = ExtractorError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let Json(data) = Json::<T>::from_request(req, state)
            .await
            .map_err(|err| ExtractorError::bad_request(format!("Invalid JSON: {}", err.body_text())))?;

        data.validate()
            .map_err(|errors| match klinika_core::Error::from(errors) {
                klinika_core::Error::Validation { field, message } => {
                    ExtractorError::validation(&field, &message)
                }
                other => ExtractorError::bad_request(other.to_string()),
            })?;

        Ok(Self(data))
    }
}

impl<T> std::ops::Deref for ValidatedJson<T> {
    type Target = T;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}
