//! The `Resource` abstraction shared by every CRUD-managed entity
//!
//! A resource knows its route segment, its storage table, how to build and
//! update itself from a validated payload, which text it can be searched by
//! and which other records it points at. Stores use this to implement
//! pagination, search and referential integrity generically.

use chrono::{DateTime, Utc};
use serde::{Serialize, de::DeserializeOwned};
use std::{fmt, hash::Hash, str::FromStr};
use uuid::Uuid;
use validator::Validate;

use crate::Result;

/// Type-erased primary key, used where tables of different id types meet
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Key {
    /// Integer key assigned from a sequence
    Int(i32),
    /// UUID key assigned by the application
    Uuid(Uuid),
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Int(id) => write!(f, "{id}"),
            Self::Uuid(id) => write!(f, "{id}"),
        }
    }
}

/// Primary key type of a resource
pub trait RecordId:
    Copy
    + Ord
    + Hash
    + fmt::Debug
    + fmt::Display
    + FromStr
    + Serialize
    + DeserializeOwned
    + Send
    + Sync
    + 'static
{
    /// True when the database assigns the id on insert
    const SEQUENTIAL: bool;

    /// Id for a new record; `sequence` is the store's next counter value
    fn assign(sequence: i32) -> Self;

    /// Erased form of this id
    fn key(&self) -> Key;

    /// Recover a typed id from its erased form
    fn from_key(key: Key) -> Option<Self>;
}

impl RecordId for i32 {
    const SEQUENTIAL: bool = true;

    fn assign(sequence: i32) -> Self {
        sequence
    }

    fn key(&self) -> Key {
        Key::Int(*self)
    }

    fn from_key(key: Key) -> Option<Self> {
        match key {
            Key::Int(id) => Some(id),
            Key::Uuid(_) => None,
        }
    }
}

impl RecordId for Uuid {
    const SEQUENTIAL: bool = false;

    fn assign(_sequence: i32) -> Self {
        Self::new_v4()
    }

    fn key(&self) -> Key {
        Key::Uuid(*self)
    }

    fn from_key(key: Key) -> Option<Self> {
        match key {
            Key::Uuid(id) => Some(id),
            Key::Int(_) => None,
        }
    }
}

/// A foreign key held by a record
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Reference {
    /// Payload field holding the key, reported in validation errors
    pub field: &'static str,
    /// Table the key points into
    pub table: &'static str,
    /// The key, `None` for an unset nullable reference
    pub key: Option<Key>,
    /// Role the target row must carry, see [`Resource::role`]
    pub role: Option<&'static str>,
}

impl Reference {
    /// Reference to `table` through `field`
    #[must_use]
    pub fn to(field: &'static str, table: &'static str, id: impl RecordId) -> Self {
        Self {
            field,
            table,
            key: Some(id.key()),
            role: None,
        }
    }

    /// Nullable reference to `table` through `field`
    #[must_use]
    pub fn optional<I: RecordId>(field: &'static str, table: &'static str, id: Option<I>) -> Self {
        Self {
            field,
            table,
            key: id.map(|id| id.key()),
            role: None,
        }
    }

    /// Require the target row to carry `role`
    #[must_use]
    pub const fn with_role(mut self, role: &'static str) -> Self {
        self.role = Some(role);
        self
    }
}

/// A CRUD-manageable entity
pub trait Resource:
    Clone + fmt::Debug + Serialize + DeserializeOwned + Send + Sync + 'static
{
    /// Primary key type
    type Id: RecordId;

    /// Body accepted by create and update
    type Payload: Validate + Clone + fmt::Debug + Serialize + DeserializeOwned + Send + Sync + 'static;

    /// Route segment, e.g. `HelpCenter`
    const NAME: &'static str;

    /// Storage table
    const TABLE: &'static str;

    /// This record's id
    fn id(&self) -> Self::Id;

    /// Build a new record from a validated payload
    ///
    /// # Errors
    ///
    /// Returns a validation error when the payload lacks something only
    /// creation requires.
    fn create(id: Self::Id, payload: Self::Payload, now: DateTime<Utc>) -> Result<Self>;

    /// Overwrite the mutable fields from a validated payload
    ///
    /// # Errors
    ///
    /// Returns a validation error when the payload cannot be applied.
    fn apply(&mut self, payload: Self::Payload) -> Result<()>;

    /// Text fields matched by the search term
    fn search_fields(&self) -> Vec<&str>;

    /// Case-insensitive substring match over [`Resource::search_fields`]
    ///
    /// An empty term matches everything.
    fn matches(&self, term: &str) -> bool {
        let term = term.trim();
        if term.is_empty() {
            return true;
        }
        let needle = term.to_lowercase();
        self.search_fields()
            .iter()
            .any(|field| field.to_lowercase().contains(&needle))
    }

    /// Foreign keys this record holds; deleting a target cascades to this record
    fn references(&self) -> Vec<Reference> {
        Vec::new()
    }

    /// Role label of this row, for tables split by role
    fn role(&self) -> Option<&'static str> {
        None
    }

    /// Column/value pairs that must be unique across the table
    fn unique_keys(&self) -> Vec<(&'static str, String)> {
        Vec::new()
    }
}

/// Validate a payload and convert failures into [`crate::Error::Validation`]
///
/// # Errors
///
/// Returns the first failing field.
pub fn validate_payload<P: Validate>(payload: &P) -> Result<()> {
    payload.validate().map_err(crate::Error::from)
}
