//! Backend-agnostic store used by the API

use klinika_core::{
    Config, Page, PageRequest, Result,
    config::DatabaseBackend,
};
use std::sync::Arc;
use tracing::info;

use crate::{Database, MemoryDatabase, queries, queries::PgResource};

/// A configured storage backend
#[derive(Debug, Clone)]
pub enum Store {
    /// `PostgreSQL` through a connection pool
    Postgres(Database),
    /// Process-local tables
    Memory(Arc<MemoryDatabase>),
}

impl Store {
    /// Open the backend selected by the configuration
    ///
    /// For `PostgreSQL` this connects, runs migrations when enabled and
    /// checks the connection.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be reached or migrated.
    pub async fn connect(config: &Config) -> Result<Self> {
        match config.database.backend {
            DatabaseBackend::Memory => {
                info!("Using in-memory store");
                Ok(Self::memory())
            }
            DatabaseBackend::Postgres => {
                let db = Database::connect(&config.database).await?;
                db.prepare(config.database.run_migrations).await?;
                Ok(Self::Postgres(db))
            }
        }
    }

    /// Fresh in-memory store with every table registered
    #[must_use]
    pub fn memory() -> Self {
        Self::Memory(Arc::new(MemoryDatabase::new()))
    }

    /// Name of the backend, as reported by the health endpoint
    #[must_use]
    pub const fn backend_name(&self) -> &'static str {
        match self {
            Self::Postgres(_) => "postgres",
            Self::Memory(_) => "memory",
        }
    }

    /// Check that the backend can serve requests
    ///
    /// # Errors
    ///
    /// Returns an error if the database does not answer.
    pub async fn health_check(&self) -> Result<()> {
        match self {
            Self::Postgres(db) => db.health_check().await,
            Self::Memory(_) => Ok(()),
        }
    }

    /// One page of records
    ///
    /// # Errors
    ///
    /// Returns an error if the backend fails.
    pub async fn paginate<R: PgResource>(&self, request: &PageRequest) -> Result<Page<R>> {
        match self {
            Self::Postgres(db) => queries::paginate::<R>(db.pool(), request).await,
            Self::Memory(mem) => mem.paginate::<R>(request),
        }
    }

    /// Every record, ordered by id
    ///
    /// # Errors
    ///
    /// Returns an error if the backend fails.
    pub async fn list_all<R: PgResource>(&self) -> Result<Vec<R>> {
        match self {
            Self::Postgres(db) => queries::list_all::<R>(db.pool()).await,
            Self::Memory(mem) => mem.list_all::<R>(),
        }
    }

    /// Record by id
    ///
    /// # Errors
    ///
    /// Returns [`klinika_core::Error::NotFound`] if no record has this id.
    pub async fn get<R: PgResource>(&self, id: R::Id) -> Result<R> {
        match self {
            Self::Postgres(db) => queries::find_by_id::<R>(db.pool(), id).await,
            Self::Memory(mem) => mem.get::<R>(id),
        }
    }

    /// Validate and store a new record
    ///
    /// # Errors
    ///
    /// Returns a validation error if the payload or its references are invalid.
    pub async fn create<R: PgResource>(&self, payload: R::Payload) -> Result<R> {
        match self {
            Self::Postgres(db) => queries::insert::<R>(db.pool(), payload).await,
            Self::Memory(mem) => mem.create::<R>(payload),
        }
    }

    /// Validate and apply an update
    ///
    /// # Errors
    ///
    /// Returns [`klinika_core::Error::NotFound`] or a validation error.
    pub async fn update<R: PgResource>(&self, id: R::Id, payload: R::Payload) -> Result<R> {
        match self {
            Self::Postgres(db) => queries::update::<R>(db.pool(), id, payload).await,
            Self::Memory(mem) => mem.update::<R>(id, payload),
        }
    }

    /// Delete a record and its dependants
    ///
    /// # Errors
    ///
    /// Returns [`klinika_core::Error::NotFound`] if no record has this id.
    pub async fn delete<R: PgResource>(&self, id: R::Id) -> Result<()> {
        match self {
            Self::Postgres(db) => queries::delete::<R>(db.pool(), id).await,
            Self::Memory(mem) => mem.delete::<R>(id),
        }
    }

    /// Delete several records, all or nothing
    ///
    /// # Errors
    ///
    /// Returns [`klinika_core::Error::NotFound`] for the first missing id.
    pub async fn bulk_delete<R: PgResource>(&self, ids: &[R::Id]) -> Result<u64> {
        match self {
            Self::Postgres(db) => queries::bulk_delete::<R>(db.pool(), ids).await,
            Self::Memory(mem) => mem.bulk_delete::<R>(ids),
        }
    }
}

#[cfg(test)]
#[allow(clippy::missing_panics_doc)]
mod tests {
    use super::*;
    use klinika_core::types::{HelpCenterCategory, HelpCenterCategoryPayload};
    use pretty_assertions::assert_eq;

    #[tokio::test]
    async fn test_connect_memory_backend() {
        let store = Store::connect(&Config::in_memory()).await.unwrap();
        assert_eq!(store.backend_name(), "memory");
        assert!(store.health_check().await.is_ok());
    }

    #[tokio::test]
    async fn test_memory_store_crud() {
        let store = Store::memory();
        let created = store
            .create::<HelpCenterCategory>(HelpCenterCategoryPayload {
                name: "General".to_string(),
                created_by: "admin".to_string(),
            })
            .await
            .unwrap();

        let fetched = store.get::<HelpCenterCategory>(created.id).await.unwrap();
        assert_eq!(fetched, created);
        assert_eq!(store.list_all::<HelpCenterCategory>().await.unwrap().len(), 1);

        store.delete::<HelpCenterCategory>(created.id).await.unwrap();
        assert!(
            store
                .delete::<HelpCenterCategory>(created.id)
                .await
                .unwrap_err()
                .is_not_found()
        );
    }

    #[tokio::test]
    async fn test_connect_unreachable_postgres_fails() {
        let mut config = Config::default();
        config.database.url = "postgresql://invalid:5432/nonexistent".to_string();
        config.database.connect_timeout = 1;

        assert!(Store::connect(&config).await.is_err());
    }
}
