//! Klinika API server library
//!
//! Serves the CRUD endpoints of every Klinika resource under
//! `/api/{Resource}` plus `/health` and `/ready`.

#![forbid(unsafe_code)]
#![warn(
    clippy::all,
    clippy::pedantic,
    clippy::nursery,
    missing_docs,
    rust_2018_idioms
)]

pub mod extractors;
pub mod handlers;
pub mod routes;
pub mod state;

pub use state::AppState;

use axum::Router;
use klinika_core::Config;
use klinika_core::context_error::Result;
use klinika_database::Store;
use std::sync::Arc;

/// Build the API router with all routes and middleware
///
/// # Errors
///
/// Returns an error if the application state validation fails.
pub fn build_router(config: Config, store: Store) -> Result<Router> {
    let state = Arc::new(AppState::new(config, store));

    // Validate the application state
    state.validate()?;

    Ok(routes::build_router(&state.config.api).with_state(state))
}

/// Router backed by a fresh in-memory store
///
/// # Errors
///
/// Returns an error if the default configuration is invalid.
pub fn build_memory_router() -> Result<Router> {
    build_router(Config::in_memory(), Store::memory())
}
