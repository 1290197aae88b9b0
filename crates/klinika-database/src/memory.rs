//! In-memory storage backend
//!
//! Holds every table in one map behind a single lock, so each operation sees
//! and leaves a consistent state. Referential rules match the `PostgreSQL`
//! schema: references must exist on write, unique keys are enforced, and a
//! delete cascades to every record that points at a removed one.

use chrono::Utc;
use klinika_core::{
    Error, Key, Page, PageRequest, RecordId, Resource, Result,
    resource::validate_payload,
    types::{
        Block, HelpCenter, HelpCenterCategory, Reservation, ServiceDesk, Specialization, User,
    },
};
use parking_lot::RwLock;
use std::{
    any::Any,
    collections::{BTreeMap, BTreeSet},
    fmt,
};
use tracing::debug;

trait ErasedTable: Send + Sync {
    fn as_any(&self) -> &dyn Any;
    fn as_any_mut(&mut self) -> &mut dyn Any;
    fn contains(&self, key: Key) -> bool;
    fn remove(&mut self, key: Key) -> bool;
    fn len(&self) -> usize;
    fn role_of(&self, key: Key) -> Option<&'static str>;
    /// Keys of rows holding a reference to `key` in `table`
    fn dependents_of(&self, table: &str, key: Key) -> Vec<Key>;
}

struct Table<R> {
    rows: BTreeMap<Key, R>,
    next_id: i32,
}

impl<R> Default for Table<R> {
    fn default() -> Self {
        Self {
            rows: BTreeMap::new(),
            next_id: 1,
        }
    }
}

impl<R: Resource> ErasedTable for Table<R> {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }

    fn contains(&self, key: Key) -> bool {
        self.rows.contains_key(&key)
    }

    fn remove(&mut self, key: Key) -> bool {
        self.rows.remove(&key).is_some()
    }

    fn len(&self) -> usize {
        self.rows.len()
    }

    fn role_of(&self, key: Key) -> Option<&'static str> {
        self.rows.get(&key).and_then(Resource::role)
    }

    fn dependents_of(&self, table: &str, key: Key) -> Vec<Key> {
        self.rows
            .iter()
            .filter(|(_, row)| {
                row.references()
                    .iter()
                    .any(|r| r.table == table && r.key == Some(key))
            })
            .map(|(k, _)| *k)
            .collect()
    }
}

type Tables = BTreeMap<&'static str, Box<dyn ErasedTable>>;

/// Process-local store with the same semantics as the `PostgreSQL` backend
pub struct MemoryDatabase {
    tables: RwLock<Tables>,
}

impl Default for MemoryDatabase {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for MemoryDatabase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let tables = self.tables.read();
        let mut map = f.debug_map();
        for (name, table) in tables.iter() {
            map.entry(name, &table.len());
        }
        map.finish()
    }
}

fn table<R: Resource>(tables: &Tables) -> Result<&Table<R>> {
    tables
        .get(R::TABLE)
        .and_then(|t| t.as_any().downcast_ref::<Table<R>>())
        .ok_or_else(|| Error::Database(format!("table {} is not registered", R::TABLE)))
}

fn table_mut<R: Resource>(tables: &mut Tables) -> Result<&mut Table<R>> {
    tables
        .get_mut(R::TABLE)
        .and_then(|t| t.as_any_mut().downcast_mut::<Table<R>>())
        .ok_or_else(|| Error::Database(format!("table {} is not registered", R::TABLE)))
}

fn check_integrity<R: Resource>(tables: &Tables, record: &R) -> Result<()> {
    for reference in record.references() {
        let Some(key) = reference.key else {
            continue;
        };
        let Some(target) = tables.get(reference.table).filter(|t| t.contains(key)) else {
            return Err(Error::validation(
                reference.field,
                "referenced record does not exist",
            ));
        };
        if reference.role.is_some() && target.role_of(key) != reference.role {
            return Err(Error::validation(reference.field, "value is not allowed"));
        }
    }

    let own_key = record.id().key();
    let unique = record.unique_keys();
    if unique.is_empty() {
        return Ok(());
    }
    for (key, other) in &table::<R>(tables)?.rows {
        if *key == own_key {
            continue;
        }
        for (column, value) in other.unique_keys() {
            if unique.iter().any(|(c, v)| *c == column && *v == value) {
                return Err(Error::validation(column, "value is already taken"));
            }
        }
    }
    Ok(())
}

/// Remove a row and everything that transitively references it
fn cascade_delete(tables: &mut Tables, table: &'static str, key: Key) -> usize {
    let mut pending = vec![(table, key)];
    let mut removed = 0;

    while let Some((table, key)) = pending.pop() {
        let Some(target) = tables.get_mut(table) else {
            continue;
        };
        if !target.remove(key) {
            continue;
        }
        removed += 1;

        for (name, other) in tables.iter() {
            pending.extend(other.dependents_of(table, key).into_iter().map(|k| (*name, k)));
        }
    }

    removed
}

impl MemoryDatabase {
    /// Store with every Klinika table registered
    #[must_use]
    pub fn new() -> Self {
        let db = Self::empty();
        db.register::<HelpCenterCategory>();
        db.register::<HelpCenter>();
        db.register::<Specialization>();
        db.register::<Block>();
        db.register::<ServiceDesk>();
        db.register::<User>();
        db.register::<Reservation>();
        db
    }

    /// Store with no tables
    #[must_use]
    pub fn empty() -> Self {
        Self {
            tables: RwLock::new(BTreeMap::new()),
        }
    }

    /// Register the table for `R`; registering twice keeps the existing rows
    pub fn register<R: Resource>(&self) {
        self.tables
            .write()
            .entry(R::TABLE)
            .or_insert_with(|| Box::new(Table::<R>::default()));
    }

    /// Number of rows in `R`'s table
    ///
    /// # Errors
    ///
    /// Returns an error if the table is not registered.
    pub fn count<R: Resource>(&self) -> Result<usize> {
        Ok(table::<R>(&self.tables.read())?.rows.len())
    }

    /// One page of records matching the request's search term, ordered by id
    ///
    /// # Errors
    ///
    /// Returns an error if the table is not registered.
    pub fn paginate<R: Resource>(&self, request: &PageRequest) -> Result<Page<R>> {
        let tables = self.tables.read();
        let term = request.search_term().unwrap_or_default();
        let matching: Vec<R> = table::<R>(&tables)?
            .rows
            .values()
            .filter(|row| row.matches(term))
            .cloned()
            .collect();
        Ok(Page::from_all(matching, request))
    }

    /// Every record, ordered by id
    ///
    /// # Errors
    ///
    /// Returns an error if the table is not registered.
    pub fn list_all<R: Resource>(&self) -> Result<Vec<R>> {
        Ok(table::<R>(&self.tables.read())?.rows.values().cloned().collect())
    }

    /// Record by id
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] if no record has this id.
    pub fn get<R: Resource>(&self, id: R::Id) -> Result<R> {
        table::<R>(&self.tables.read())?
            .rows
            .get(&id.key())
            .cloned()
            .ok_or_else(|| Error::not_found(R::NAME, id))
    }

    /// Validate a payload and store the new record
    ///
    /// # Errors
    ///
    /// Returns a validation error for an invalid payload, a missing referenced
    /// record or a duplicate unique value.
    pub fn create<R: Resource>(&self, payload: R::Payload) -> Result<R> {
        validate_payload(&payload)?;
        let mut tables = self.tables.write();

        let sequence = table::<R>(&tables)?.next_id;
        let record = R::create(R::Id::assign(sequence), payload, Utc::now())?;
        check_integrity(&tables, &record)?;

        let target = table_mut::<R>(&mut tables)?;
        if R::Id::SEQUENTIAL {
            target.next_id += 1;
        }
        target.rows.insert(record.id().key(), record.clone());

        debug!(resource = R::NAME, id = %record.id(), "Created record");
        Ok(record)
    }

    /// Validate a payload and overwrite the record's mutable fields
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] if no record has this id, or a validation error.
    pub fn update<R: Resource>(&self, id: R::Id, payload: R::Payload) -> Result<R> {
        validate_payload(&payload)?;
        let mut tables = self.tables.write();

        let mut record = table::<R>(&tables)?
            .rows
            .get(&id.key())
            .cloned()
            .ok_or_else(|| Error::not_found(R::NAME, id))?;
        record.apply(payload)?;
        check_integrity(&tables, &record)?;

        table_mut::<R>(&mut tables)?
            .rows
            .insert(id.key(), record.clone());
        Ok(record)
    }

    /// Delete a record and cascade to its dependants
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] if no record has this id.
    pub fn delete<R: Resource>(&self, id: R::Id) -> Result<()> {
        let mut tables = self.tables.write();
        if !table::<R>(&tables)?.rows.contains_key(&id.key()) {
            return Err(Error::not_found(R::NAME, id));
        }
        let removed = cascade_delete(&mut tables, R::TABLE, id.key());
        debug!(resource = R::NAME, id = %id, removed, "Deleted record");
        Ok(())
    }

    /// Delete several records, all or nothing
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] for the first missing id; nothing is deleted.
    pub fn bulk_delete<R: Resource>(&self, ids: &[R::Id]) -> Result<u64> {
        let unique: BTreeSet<R::Id> = ids.iter().copied().collect();
        let mut tables = self.tables.write();

        let existing = table::<R>(&tables)?;
        if let Some(missing) = unique.iter().find(|id| !existing.rows.contains_key(&id.key())) {
            return Err(Error::not_found(R::NAME, missing));
        }

        for id in &unique {
            cascade_delete(&mut tables, R::TABLE, id.key());
        }
        Ok(u64::try_from(unique.len()).unwrap_or(u64::MAX))
    }
}

#[cfg(test)]
#[allow(clippy::missing_panics_doc)]
mod tests {
    use super::*;
    use chrono::{Duration, NaiveDate};
    use klinika_core::types::{
        BlockPayload, HelpCenterCategoryPayload, HelpCenterPayload, ReservationPayload, Role,
        ServiceDeskPayload, SpecializationPayload, UserPayload,
    };
    use pretty_assertions::assert_eq;

    fn category(db: &MemoryDatabase, name: &str) -> HelpCenterCategory {
        db.create::<HelpCenterCategory>(HelpCenterCategoryPayload {
            name: name.to_string(),
            created_by: "admin".to_string(),
        })
        .unwrap()
    }

    fn ticket_payload(category_id: i32, subject: &str) -> HelpCenterPayload {
        HelpCenterPayload {
            name: "Ann".to_string(),
            email: "a@b.com".to_string(),
            subject: subject.to_string(),
            message: "M".to_string(),
            category_id,
        }
    }

    fn specialization(db: &MemoryDatabase) -> Specialization {
        db.create::<Specialization>(SpecializationPayload {
            name: "Cardiology".to_string(),
            created_by: "admin".to_string(),
        })
        .unwrap()
    }

    fn user_payload(email: &str, role: Role, specialization_id: Option<i32>) -> UserPayload {
        UserPayload {
            email: email.to_string(),
            first_name: "Dora".to_string(),
            last_name: "Ko".to_string(),
            gender: "female".to_string(),
            birth_date: NaiveDate::from_ymd_opt(1980, 1, 2).unwrap(),
            role,
            specialization_id,
            service_desk_id: None,
            password: Some("long enough".to_string()),
        }
    }

    #[test]
    fn test_create_assigns_sequential_ids() {
        let db = MemoryDatabase::new();
        let cat = category(&db, "General");

        let ticket = db.create::<HelpCenter>(ticket_payload(cat.id, "S")).unwrap();
        assert_eq!(ticket.id, 1);
        assert_eq!(ticket.email, "a@b.com");

        let second = db.create::<HelpCenter>(ticket_payload(cat.id, "T")).unwrap();
        assert_eq!(second.id, 2);
    }

    #[test]
    fn test_paginate_twenty_five_records() {
        let db = MemoryDatabase::new();
        let cat = category(&db, "General");
        for i in 0..25 {
            db.create::<HelpCenter>(ticket_payload(cat.id, &format!("Subject {i}")))
                .unwrap();
        }

        let first = db
            .paginate::<HelpCenter>(&PageRequest::new(1, 10, None).unwrap())
            .unwrap();
        assert_eq!(first.data.len(), 10);
        assert_eq!(first.total_pages, 3);
        assert_eq!(first.data[0].id, 1);

        let last = db
            .paginate::<HelpCenter>(&PageRequest::new(3, 10, None).unwrap())
            .unwrap();
        assert_eq!(last.data.len(), 5);
        assert_eq!(last.data[0].id, 21);
    }

    #[test]
    fn test_paginate_filters_by_search() {
        let db = MemoryDatabase::new();
        let cat = category(&db, "General");
        db.create::<HelpCenter>(ticket_payload(cat.id, "Billing question"))
            .unwrap();
        db.create::<HelpCenter>(ticket_payload(cat.id, "Lost card")).unwrap();

        let page = db
            .paginate::<HelpCenter>(&PageRequest::new(1, 10, Some("BILLING".to_string())).unwrap())
            .unwrap();
        assert_eq!(page.total_count, 1);
        assert_eq!(page.data[0].subject, "Billing question");
    }

    #[test]
    fn test_missing_reference_is_validation_error() {
        let db = MemoryDatabase::new();
        let err = db.create::<HelpCenter>(ticket_payload(99, "S")).unwrap_err();

        match err {
            Error::Validation { field, .. } => assert_eq!(field, "categoryId"),
            other => panic!("Expected Validation error, got {other:?}"),
        }
        assert_eq!(db.count::<HelpCenter>().unwrap(), 0);
    }

    #[test]
    fn test_invalid_payload_is_not_stored() {
        let db = MemoryDatabase::new();
        let cat = category(&db, "General");
        let mut payload = ticket_payload(cat.id, "S");
        payload.email = "not-an-email".to_string();

        assert!(matches!(
            db.create::<HelpCenter>(payload),
            Err(Error::Validation { .. })
        ));
        assert_eq!(db.count::<HelpCenter>().unwrap(), 0);
    }

    #[test]
    fn test_repeat_delete_is_not_found() {
        let db = MemoryDatabase::new();
        let cat = category(&db, "General");

        db.delete::<HelpCenterCategory>(cat.id).unwrap();
        let err = db.delete::<HelpCenterCategory>(cat.id).unwrap_err();
        assert!(err.is_not_found());
    }

    #[test]
    fn test_delete_cascades_to_dependants() {
        let db = MemoryDatabase::new();
        let cat = category(&db, "General");
        let other = category(&db, "Other");
        db.create::<HelpCenter>(ticket_payload(cat.id, "A")).unwrap();
        db.create::<HelpCenter>(ticket_payload(cat.id, "B")).unwrap();
        let kept = db.create::<HelpCenter>(ticket_payload(other.id, "C")).unwrap();

        db.delete::<HelpCenterCategory>(cat.id).unwrap();

        let remaining = db.list_all::<HelpCenter>().unwrap();
        assert_eq!(remaining, vec![kept]);
    }

    #[test]
    fn test_bulk_delete_parent_and_child_together() {
        let db = MemoryDatabase::new();
        let cardiology = specialization(&db);
        let parent = db
            .create::<Block>(BlockPayload {
                name: "Main".to_string(),
                parent_block_id: None,
                specialization_id: cardiology.id,
            })
            .unwrap();
        let child = db
            .create::<Block>(BlockPayload {
                name: "Wing".to_string(),
                parent_block_id: Some(parent.id),
                specialization_id: cardiology.id,
            })
            .unwrap();

        let deleted = db.bulk_delete::<Block>(&[parent.id, child.id]).unwrap();

        assert_eq!(deleted, 2);
        assert!(db.get::<Block>(parent.id).unwrap_err().is_not_found());
        assert!(db.get::<Block>(child.id).unwrap_err().is_not_found());
    }

    #[test]
    fn test_cascade_follows_chains_and_nested_blocks() {
        let db = MemoryDatabase::new();
        let cardiology = specialization(&db);
        let outer = db
            .create::<Block>(BlockPayload {
                name: "Main".to_string(),
                parent_block_id: None,
                specialization_id: cardiology.id,
            })
            .unwrap();
        let inner = db
            .create::<Block>(BlockPayload {
                name: "Wing".to_string(),
                parent_block_id: Some(outer.id),
                specialization_id: cardiology.id,
            })
            .unwrap();
        db.create::<ServiceDesk>(ServiceDeskPayload {
            name: "Front".to_string(),
            email: "desk@klinika.test".to_string(),
            operating_hours: "08-16".to_string(),
            block_id: inner.id,
        })
        .unwrap();
        let doctor = db
            .create::<User>(user_payload(
                "doc@klinika.test",
                Role::SpecializedDoctor,
                Some(cardiology.id),
            ))
            .unwrap();

        db.delete::<Specialization>(cardiology.id).unwrap();

        assert_eq!(db.count::<Block>().unwrap(), 0);
        assert_eq!(db.count::<ServiceDesk>().unwrap(), 0);
        assert!(db.get::<User>(doctor.id).unwrap_err().is_not_found());
    }

    #[test]
    fn test_bulk_delete_is_all_or_nothing() {
        let db = MemoryDatabase::new();
        let a = category(&db, "A");
        let b = category(&db, "B");

        let err = db
            .bulk_delete::<HelpCenterCategory>(&[a.id, 42, b.id])
            .unwrap_err();
        assert!(err.is_not_found());
        assert_eq!(db.count::<HelpCenterCategory>().unwrap(), 2);

        let deleted = db
            .bulk_delete::<HelpCenterCategory>(&[a.id, b.id, a.id])
            .unwrap();
        assert_eq!(deleted, 2);
        assert_eq!(db.count::<HelpCenterCategory>().unwrap(), 0);
    }

    #[test]
    fn test_update_unknown_id_is_not_found() {
        let db = MemoryDatabase::new();
        let err = db
            .update::<HelpCenterCategory>(
                5,
                HelpCenterCategoryPayload {
                    name: "X".to_string(),
                    created_by: "admin".to_string(),
                },
            )
            .unwrap_err();
        assert!(err.is_not_found());
    }

    #[test]
    fn test_update_keeps_id_and_creation_date() {
        let db = MemoryDatabase::new();
        let cat = category(&db, "General");
        let ticket = db.create::<HelpCenter>(ticket_payload(cat.id, "S")).unwrap();

        let updated = db
            .update::<HelpCenter>(ticket.id, ticket_payload(cat.id, "New subject"))
            .unwrap();
        assert_eq!(updated.id, ticket.id);
        assert_eq!(updated.subject, "New subject");
        assert_eq!(updated.creation_date, ticket.creation_date);
    }

    #[test]
    fn test_user_email_is_unique_ignoring_case() {
        let db = MemoryDatabase::new();
        let first = db
            .create::<User>(user_payload("ann@klinika.test", Role::Patient, None))
            .unwrap();

        let err = db
            .create::<User>(user_payload("ANN@klinika.test", Role::Patient, None))
            .unwrap_err();
        assert!(matches!(err, Error::Validation { ref field, .. } if field == "email"));

        // Updating a user with its own email is not a conflict
        db.update::<User>(first.id, user_payload("ann@klinika.test", Role::Patient, None))
            .unwrap();
    }

    #[test]
    fn test_reservation_cascades_with_patient() {
        let db = MemoryDatabase::new();
        let cardiology = specialization(&db);
        let patient = db
            .create::<User>(user_payload("pat@klinika.test", Role::Patient, None))
            .unwrap();
        db.create::<Reservation>(ReservationPayload {
            patient_id: patient.id,
            specialization_id: cardiology.id,
            doctor_id: None,
            reason_of_consult: "Checkup".to_string(),
            appointment_date: Utc::now() + Duration::days(3),
        })
        .unwrap();

        db.delete::<User>(patient.id).unwrap();
        assert_eq!(db.count::<Reservation>().unwrap(), 0);
    }

    #[test]
    fn test_reservation_checks_user_roles() {
        let db = MemoryDatabase::new();
        let cardiology = specialization(&db);
        let patient = db
            .create::<User>(user_payload("pat@klinika.test", Role::Patient, None))
            .unwrap();
        let gp = db
            .create::<User>(user_payload(
                "gp@klinika.test",
                Role::PrimaryCareDoctor,
                Some(cardiology.id),
            ))
            .unwrap();
        let specialist = db
            .create::<User>(user_payload(
                "heart@klinika.test",
                Role::SpecializedDoctor,
                Some(cardiology.id),
            ))
            .unwrap();
        let booking = |patient_id, doctor_id| ReservationPayload {
            patient_id,
            specialization_id: cardiology.id,
            doctor_id,
            reason_of_consult: "Checkup".to_string(),
            appointment_date: Utc::now() + Duration::days(3),
        };

        let err = db
            .create::<Reservation>(booking(specialist.id, None))
            .unwrap_err();
        assert!(matches!(err, Error::Validation { ref field, .. } if field == "patientId"));

        let err = db
            .create::<Reservation>(booking(patient.id, Some(gp.id)))
            .unwrap_err();
        assert!(matches!(err, Error::Validation { ref field, .. } if field == "doctorId"));

        let reservation = db
            .create::<Reservation>(booking(patient.id, Some(specialist.id)))
            .unwrap();
        let err = db
            .update::<Reservation>(reservation.id, booking(gp.id, Some(specialist.id)))
            .unwrap_err();
        assert!(matches!(err, Error::Validation { ref field, .. } if field == "patientId"));
        assert_eq!(db.count::<Reservation>().unwrap(), 1);
    }

    #[test]
    fn test_unregistered_table_is_database_error() {
        let db = MemoryDatabase::empty();
        let err = db.list_all::<HelpCenter>().unwrap_err();
        assert!(matches!(err, Error::Database(_)));

        db.register::<HelpCenter>();
        assert!(db.list_all::<HelpCenter>().unwrap().is_empty());
    }

    #[test]
    fn test_get_returns_same_record() {
        let db = MemoryDatabase::new();
        let cat = category(&db, "General");
        assert_eq!(db.get::<HelpCenterCategory>(cat.id).unwrap(), cat);
    }
}
