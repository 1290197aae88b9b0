//! Generic CRUD endpoints, instantiated once per resource
//!
//! Each handler is generic over the resource type; `routes::resource_routes`
//! mounts one copy per entity under `/api/{Resource}`.

use crate::{
    extractors::{ExtractorError, Pagination, ValidatedJson},
    handlers::{ApiError, api_error},
    state::AppState,
};
use axum::{
    extract::{Path, State, rejection::JsonRejection},
    http::StatusCode,
    response::Json,
};
use klinika_core::{Page, Resource};
use klinika_database::PgResource;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info};

/// Body returned by delete and bulk delete
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeleteResponse {
    /// Number of records deleted, not counting cascaded dependants
    pub deleted: u64,
}

fn parse_id<R: Resource>(raw: &str) -> Result<R::Id, ApiError> {
    raw.parse::<R::Id>().map_err(|_| {
        ExtractorError::validation("id", &format!("'{raw}' is not a valid {} id", R::NAME))
            .into_api_error()
    })
}

/// `GET /api/{Resource}/paginate?page&pageSize&search`
///
/// # Errors
///
/// * `BAD_REQUEST` - Invalid paging parameters
/// * `INTERNAL_SERVER_ERROR` - Storage failure
pub async fn paginate<R: PgResource>(
    State(state): State<Arc<AppState>>,
    pagination: Pagination,
) -> Result<Json<Page<R>>, ApiError> {
    let request = pagination
        .to_request(&state.config.api)
        .map_err(ExtractorError::into_api_error)?;

    let page = state.store.paginate::<R>(&request).await.map_err(api_error)?;

    debug!(
        "Listed {} page {}/{} ({} records)",
        R::NAME,
        page.page,
        page.total_pages,
        page.data.len()
    );
    Ok(Json(page))
}

/// `GET /api/{Resource}/getAll`, the reference list used by select inputs
///
/// # Errors
///
/// * `INTERNAL_SERVER_ERROR` - Storage failure
pub async fn get_all<R: PgResource>(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<R>>, ApiError> {
    let records = state.store.list_all::<R>().await.map_err(api_error)?;
    Ok(Json(records))
}

/// `GET /api/{Resource}/get/:id`
///
/// # Errors
///
/// * `NOT_FOUND` - No record with this id
pub async fn get<R: PgResource>(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<R>, ApiError> {
    let id = parse_id::<R>(&id)?;
    let record = state.store.get::<R>(id).await.map_err(api_error)?;
    Ok(Json(record))
}

/// `POST /api/{Resource}/create`
///
/// # Errors
///
/// * `BAD_REQUEST` - Invalid payload or unknown referenced record
pub async fn create<R: PgResource>(
    State(state): State<Arc<AppState>>,
    ValidatedJson(payload): ValidatedJson<R::Payload>,
) -> Result<(StatusCode, Json<R>), ApiError> {
    let record = state.store.create::<R>(payload).await.map_err(api_error)?;
    info!("Created {} {}", R::NAME, record.id());
    Ok((StatusCode::CREATED, Json(record)))
}

/// `PUT /api/{Resource}/update/:id`
///
/// # Errors
///
/// * `NOT_FOUND` - No record with this id
/// * `BAD_REQUEST` - Invalid payload
pub async fn update<R: PgResource>(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    ValidatedJson(payload): ValidatedJson<R::Payload>,
) -> Result<Json<R>, ApiError> {
    let id = parse_id::<R>(&id)?;
    let record = state
        .store
        .update::<R>(id, payload)
        .await
        .map_err(api_error)?;
    info!("Updated {} {}", R::NAME, id);
    Ok(Json(record))
}

/// `DELETE /api/{Resource}/delete/:id`
///
/// # Errors
///
/// * `NOT_FOUND` - No record with this id
pub async fn delete<R: PgResource>(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<DeleteResponse>, ApiError> {
    let id = parse_id::<R>(&id)?;
    state.store.delete::<R>(id).await.map_err(api_error)?;
    info!("Deleted {} {}", R::NAME, id);
    Ok(Json(DeleteResponse { deleted: 1 }))
}

/// `POST /api/{Resource}/bulkDelete` with a JSON array of ids
///
/// Nothing is deleted unless every id exists.
///
/// # Errors
///
/// * `BAD_REQUEST` - Body is not an array of ids
/// * `NOT_FOUND` - One of the ids does not exist
pub async fn bulk_delete<R: PgResource>(
    State(state): State<Arc<AppState>>,
    body: Result<Json<Vec<R::Id>>, JsonRejection>,
) -> Result<Json<DeleteResponse>, ApiError> {
    let Json(ids) = body.map_err(|e| {
        ExtractorError::bad_request(format!("Expected a JSON array of ids: {}", e.body_text()))
            .into_api_error()
    })?;

    let deleted = state
        .store
        .bulk_delete::<R>(&ids)
        .await
        .map_err(api_error)?;
    info!("Bulk deleted {} {} records", deleted, R::NAME);
    Ok(Json(DeleteResponse { deleted }))
}
