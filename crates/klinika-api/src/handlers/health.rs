//! Liveness and readiness endpoints

use crate::state::AppState;
use axum::{extract::State, http::StatusCode, response::Json};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::{sync::Arc, time::Instant};
use tracing::{debug, error};

/// Body of `GET /health`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    /// `healthy` or `unhealthy`
    pub status: String,
    /// Server version
    pub version: String,
    /// When the check ran
    pub timestamp: DateTime<Utc>,
    /// Storage backend status
    pub database: StoreHealth,
    /// Seconds since the router was built
    pub uptime_seconds: u64,
}

/// Result of checking the storage backend
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoreHealth {
    /// `postgres` or `memory`
    pub backend: String,
    /// Whether the backend answered
    pub connected: bool,
    /// Round trip in milliseconds
    pub latency_ms: u64,
}

/// Body of `GET /ready`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReadinessResponse {
    /// Whether requests can be served
    pub ready: bool,
    /// Storage backend name
    pub backend: String,
}

async fn check_store(state: &AppState) -> StoreHealth {
    let started = Instant::now();
    let connected = match state.store.health_check().await {
        Ok(()) => true,
        Err(e) => {
            error!("Storage check failed: {}", e);
            false
        }
    };
    StoreHealth {
        backend: state.store.backend_name().to_string(),
        connected,
        latency_ms: u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX),
    }
}

/// Report version, uptime and storage status
///
/// Answers 503 with the same body when the storage backend does not respond.
///
/// ```json
/// {
///   "status": "healthy",
///   "version": "0.1.0",
///   "timestamp": "2024-03-15T14:25:30Z",
///   "database": { "backend": "postgres", "connected": true, "latencyMs": 3 },
///   "uptimeSeconds": 3600
/// }
/// ```
pub async fn health_check(State(state): State<Arc<AppState>>) -> (StatusCode, Json<HealthResponse>) {
    let database = check_store(&state).await;
    debug!("Health check took {}ms", database.latency_ms);

    let (status, label) = if database.connected {
        (StatusCode::OK, "healthy")
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, "unhealthy")
    };

    let body = HealthResponse {
        status: label.to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        timestamp: Utc::now(),
        database,
        uptime_seconds: state.uptime_seconds(),
    };
    (status, Json(body))
}

/// Whether the server can take traffic; 503 until storage answers
pub async fn readiness_check(State(state): State<Arc<AppState>>) -> (StatusCode, Json<ReadinessResponse>) {
    let database = check_store(&state).await;
    let status = if database.connected {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (
        status,
        Json(ReadinessResponse {
            ready: database.connected,
            backend: database.backend,
        }),
    )
}

#[cfg(test)]
#[allow(clippy::missing_panics_doc)]
mod tests {
    use super::*;
    use klinika_core::{Config, config::DatabaseConfig};
    use klinika_database::{Database, Store};
    use pretty_assertions::assert_eq;

    fn unreachable_store() -> Store {
        let config = DatabaseConfig {
            url: "postgresql://klinika@127.0.0.1:1/klinika".to_string(),
            connect_timeout: 1,
            ..DatabaseConfig::default()
        };
        Store::Postgres(Database::connect_lazy(&config).unwrap())
    }

    #[tokio::test]
    async fn test_health_with_memory_store() {
        let state = Arc::new(AppState::new(Config::in_memory(), Store::memory()));

        let (status, Json(health)) = health_check(State(state)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(health.status, "healthy");
        assert_eq!(health.database.backend, "memory");
        assert!(health.database.connected);
    }

    #[tokio::test]
    async fn test_unreachable_database_is_unhealthy() {
        let state = Arc::new(AppState::new(Config::default(), unreachable_store()));

        let (status, Json(health)) = health_check(State(Arc::clone(&state))).await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(health.status, "unhealthy");
        assert_eq!(health.database.backend, "postgres");

        let (status, Json(ready)) = readiness_check(State(state)).await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert!(!ready.ready);
    }

    #[test]
    fn test_health_body_is_camel_case() {
        let body = StoreHealth {
            backend: "memory".to_string(),
            connected: true,
            latency_ms: 0,
        };
        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(json["latencyMs"], 0);
    }
}
