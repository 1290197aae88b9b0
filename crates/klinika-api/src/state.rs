//! Application state management

use klinika_core::{Config, context_error, context_error::Result};
use klinika_database::Store;
use std::time::Instant;

/// Shared application state
#[derive(Debug, Clone)]
pub struct AppState {
    /// Application configuration
    pub config: Config,
    /// Storage backend
    pub store: Store,
    /// When the state was built, for uptime reporting
    pub started_at: Instant,
}

impl AppState {
    /// Create new application state
    #[must_use]
    pub fn new(config: Config, store: Store) -> Self {
        Self {
            config,
            store,
            started_at: Instant::now(),
        }
    }

    /// Check if the application is properly configured
    ///
    /// # Errors
    ///
    /// Returns an error if the API limits are inconsistent.
    pub fn validate(&self) -> Result<()> {
        let api = &self.config.api;
        if api.default_page_size == 0 || api.default_page_size > api.max_page_size {
            return Err(context_error!(
                "Invalid page size limits: default {} / max {}",
                api.default_page_size,
                api.max_page_size
            ));
        }
        if api.max_body_size == 0 {
            return Err(context_error!("Request body limit must be positive"));
        }
        Ok(())
    }

    /// Seconds since the state was built
    #[must_use]
    pub fn uptime_seconds(&self) -> u64 {
        self.started_at.elapsed().as_secs()
    }
}
