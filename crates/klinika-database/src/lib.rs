//! Storage backends for the Klinika clinic manager

#![forbid(unsafe_code)]
#![warn(
    clippy::all,
    clippy::pedantic,
    clippy::nursery,
    missing_docs,
    rust_2018_idioms
)]

pub mod memory;
pub mod models;
pub mod queries;
pub mod store;

pub use memory::MemoryDatabase;
pub use queries::{PgResource, SqlValue};
pub use store::Store;

use klinika_core::{Error, Result, config::DatabaseConfig};
use sqlx::postgres::{PgConnectOptions, PgPoolOptions};
use std::{str::FromStr, time::Duration};
use tracing::info;

pub use sqlx::PgPool;

/// `PostgreSQL` pool plus the schema it serves
#[derive(Debug, Clone)]
pub struct Database {
    pool: PgPool,
}

fn db_error(action: &str, err: impl std::fmt::Display) -> Error {
    Error::Database(format!("{action}: {err}"))
}

fn pool_options(config: &DatabaseConfig) -> PgPoolOptions {
    PgPoolOptions::new()
        .max_connections(config.max_connections)
        .min_connections(config.min_connections)
        .acquire_timeout(Duration::from_secs(config.connect_timeout))
        .idle_timeout(Duration::from_secs(config.idle_timeout))
}

impl Database {
    /// Open a pool to `config.url`
    ///
    /// # Errors
    ///
    /// Returns an error if the URL is malformed or no connection can be made.
    pub async fn connect(config: &DatabaseConfig) -> Result<Self> {
        let options = PgConnectOptions::from_str(&config.url)
            .map_err(|e| db_error("Invalid database URL", e))?;
        let pool = pool_options(config)
            .connect_with(options)
            .await
            .map_err(|e| db_error("Connection failed", e))?;
        Ok(Self { pool })
    }

    /// Pool that connects on first use
    ///
    /// # Errors
    ///
    /// Returns an error if the URL is malformed.
    pub fn connect_lazy(config: &DatabaseConfig) -> Result<Self> {
        let options = PgConnectOptions::from_str(&config.url)
            .map_err(|e| db_error("Invalid database URL", e))?;
        Ok(Self {
            pool: pool_options(config).connect_lazy_with(options),
        })
    }

    /// Underlying pool, for the query functions
    #[must_use]
    pub const fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Apply pending migrations from `migrations/`
    ///
    /// # Errors
    ///
    /// Returns an error if a migration fails.
    pub async fn migrate(&self) -> Result<()> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| db_error("Migration failed", e))
    }

    /// Migrate when `run_migrations` is set, then check the connection
    ///
    /// # Errors
    ///
    /// Returns the migration or health check error.
    pub async fn prepare(&self, run_migrations: bool) -> Result<()> {
        if run_migrations {
            info!("Running database migrations");
            self.migrate().await?;
        }
        self.health_check().await?;
        info!("Database connection established");
        Ok(())
    }

    /// Round-trip a trivial query
    ///
    /// # Errors
    ///
    /// Returns an error if the database does not answer.
    pub async fn health_check(&self) -> Result<()> {
        sqlx::query_scalar::<_, i32>("SELECT 1")
            .fetch_one(&self.pool)
            .await
            .map(|_| ())
            .map_err(|e| db_error("Health check failed", e))
    }
}

#[cfg(test)]
#[allow(clippy::missing_panics_doc)]
mod tests {
    use super::*;

    fn unreachable() -> DatabaseConfig {
        DatabaseConfig {
            url: "postgresql://klinika@127.0.0.1:1/klinika".to_string(),
            connect_timeout: 1,
            ..DatabaseConfig::default()
        }
    }

    #[tokio::test]
    async fn test_malformed_url_is_rejected_before_connecting() {
        let config = DatabaseConfig {
            url: "invalid://url".to_string(),
            ..DatabaseConfig::default()
        };

        let err = Database::connect(&config).await.unwrap_err();
        assert!(matches!(err, Error::Database(ref msg) if msg.starts_with("Invalid database URL")));
        assert!(Database::connect_lazy(&config).is_err());
    }

    #[tokio::test]
    async fn test_unreachable_database_fails_health_check() {
        let db = Database::connect_lazy(&unreachable()).unwrap();

        let err = db.health_check().await.unwrap_err();
        assert!(matches!(err, Error::Database(ref msg) if msg.starts_with("Health check failed")));
    }

    #[tokio::test]
    async fn test_prepare_reports_migration_failure() {
        let db = Database::connect_lazy(&unreachable()).unwrap();

        let err = db.prepare(true).await.unwrap_err();
        assert!(matches!(err, Error::Database(ref msg) if msg.starts_with("Migration failed")));
    }
}
