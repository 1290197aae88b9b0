//! API route definitions

use crate::{
    handlers::{self, ErrorResponse, resources},
    state::AppState,
};
use axum::{
    Json, Router,
    http::{HeaderValue, Method, StatusCode},
    routing::{delete, get, post, put},
};
use klinika_core::{
    config::ApiConfig,
    types::{
        Block, HelpCenter, HelpCenterCategory, Reservation, ServiceDesk, Specialization, User,
    },
};
use klinika_database::PgResource;
use std::{sync::Arc, time::Duration};
use tower::ServiceBuilder;
use tower_http::{
    compression::CompressionLayer,
    cors::{AllowOrigin, Any, CorsLayer},
    limit::RequestBodyLimitLayer,
    timeout::TimeoutLayer,
    trace::TraceLayer,
};
use tracing::warn;

/// CRUD routes for one resource, relative to `/api/{Resource}`
pub fn resource_routes<R: PgResource>() -> Router<Arc<AppState>> {
    Router::new()
        .route("/paginate", get(resources::paginate::<R>))
        .route("/getAll", get(resources::get_all::<R>))
        .route("/get/:id", get(resources::get::<R>))
        .route("/create", post(resources::create::<R>))
        .route("/update/:id", put(resources::update::<R>))
        .route("/delete/:id", delete(resources::delete::<R>))
        .route("/bulkDelete", post(resources::bulk_delete::<R>))
}

fn mount<R: PgResource>(router: Router<Arc<AppState>>) -> Router<Arc<AppState>> {
    router.nest(&format!("/api/{}", R::NAME), resource_routes::<R>())
}

/// Every resource's CRUD routes
pub fn api_routes() -> Router<Arc<AppState>> {
    let router = Router::new();
    let router = mount::<HelpCenterCategory>(router);
    let router = mount::<HelpCenter>(router);
    let router = mount::<Specialization>(router);
    let router = mount::<Block>(router);
    let router = mount::<ServiceDesk>(router);
    let router = mount::<User>(router);
    mount::<Reservation>(router)
}

/// Build health check routes
pub fn health_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/health", get(handlers::health::health_check))
        .route("/ready", get(handlers::health::readiness_check))
}

/// CORS policy from configuration
#[must_use]
pub fn cors_layer(api: &ApiConfig) -> CorsLayer {
    let layer = CorsLayer::new()
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::DELETE,
        ])
        .allow_headers(Any);

    if api.cors_origins.iter().any(|o| o == "*") {
        return layer.allow_origin(Any);
    }

    let origins: Vec<HeaderValue> = api
        .cors_origins
        .iter()
        .filter_map(|origin| match origin.parse() {
            Ok(value) => Some(value),
            Err(_) => {
                warn!("Ignoring invalid CORS origin: {}", origin);
                None
            }
        })
        .collect();
    layer.allow_origin(AllowOrigin::list(origins))
}

/// Combine all routes into a single router with the middleware stack
pub fn build_router(api: &ApiConfig) -> Router<Arc<AppState>> {
    let router = Router::new()
        .merge(api_routes())
        .merge(health_routes())
        // Fallback handler for unknown routes
        .fallback(not_found_handler)
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                // Timeout needs a `Default` response body, so it sits inside the limit
                .layer(RequestBodyLimitLayer::new(api.max_body_size))
                .layer(TimeoutLayer::new(Duration::from_secs(api.request_timeout)))
                .layer(CompressionLayer::new()),
        );

    if api.enable_cors {
        router.layer(cors_layer(api))
    } else {
        router
    }
}

/// Handle 404 Not Found errors
async fn not_found_handler() -> (StatusCode, Json<ErrorResponse>) {
    (
        StatusCode::NOT_FOUND,
        Json(ErrorResponse {
            error: "The requested endpoint does not exist".to_string(),
            code: "ROUTE_NOT_FOUND".to_string(),
            details: None,
        }),
    )
}
