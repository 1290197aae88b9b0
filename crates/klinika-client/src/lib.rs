//! Typed client for the Klinika API
//!
//! [`ApiService`] talks HTTP to one resource. [`Table`], [`CreateForm`] and
//! [`EditForm`] hold the list and modal state of an admin screen, and
//! [`ResourcePage`] wires them together per resource. Everything talks to
//! the server through the [`ResourceApi`] trait, so [`MockResourceApi`] can
//! stand in for the network in tests.

#![forbid(unsafe_code)]
#![warn(
    clippy::all,
    clippy::pedantic,
    clippy::nursery,
    missing_docs,
    rust_2018_idioms
)]

pub mod api;
pub mod error;
pub mod form;
pub mod mock;
pub mod pages;
pub mod schema;
pub mod table;

pub use api::{ApiService, DEFAULT_BASE_URL, Endpoints, Operation, ResourceApi};
pub use error::{ClientError, ClientResult, FieldErrors};
pub use form::{CreateForm, EditForm, FormError, FormModel, FormState};
pub use mock::MockResourceApi;
pub use pages::{
    OptionSource, PageDefinition, PageResource, ResourcePage, all_definitions, definition_for,
};
pub use schema::{Field, FieldKind, FormSchema, FormValues, SelectOption};
pub use table::{Confirm, DeleteOutcome, Table, TableConfig, TableState};
