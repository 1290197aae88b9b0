//! In-memory [`ResourceApi`] for exercising tables, forms and pages without a server

use crate::api::ResourceApi;
use crate::error::{ClientError, ClientResult};
use async_trait::async_trait;
use chrono::Utc;
use indexmap::IndexMap;
use klinika_core::{Page, PageRequest, RecordId, Resource, resource::validate_payload};
use parking_lot::Mutex;
use serde_json::Value;
use std::{
    collections::BTreeMap,
    sync::atomic::{AtomicI32, AtomicUsize, Ordering},
};

/// Mock resource API backed by a map
///
/// Mirrors the server contract: search, pagination totals, not-found on
/// missing ids and all-or-nothing bulk delete. Every call is counted so tests
/// can assert that no request was made.
#[derive(Debug)]
pub struct MockResourceApi<R: Resource> {
    records: Mutex<BTreeMap<R::Id, R>>,
    options: Mutex<IndexMap<String, Vec<Value>>>,
    next_id: AtomicI32,
    calls: AtomicUsize,
    failure: Mutex<Option<String>>,
}

impl<R: Resource> Default for MockResourceApi<R> {
    fn default() -> Self {
        Self::new()
    }
}

impl<R: Resource> MockResourceApi<R> {
    /// Create an empty mock
    #[must_use]
    pub fn new() -> Self {
        Self {
            records: Mutex::new(BTreeMap::new()),
            options: Mutex::new(IndexMap::new()),
            next_id: AtomicI32::new(1),
            calls: AtomicUsize::new(0),
            failure: Mutex::new(None),
        }
    }

    /// Seed with existing records
    #[must_use]
    pub fn with_records(records: impl IntoIterator<Item = R>) -> Self {
        let mock = Self::new();
        {
            let mut map = mock.records.lock();
            for record in records {
                map.insert(record.id(), record);
            }
        }
        mock
    }

    /// Serve `records` as the choices of `field`
    #[must_use]
    pub fn with_options(self, field: impl Into<String>, records: Vec<Value>) -> Self {
        self.options.lock().insert(field.into(), records);
        self
    }

    /// Make every following call fail with a server error, or stop failing
    pub fn set_failure(&self, message: Option<&str>) {
        *self.failure.lock() = message.map(str::to_string);
    }

    /// Number of calls made so far
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Snapshot of every stored record, ordered by id
    pub fn records(&self) -> Vec<R> {
        self.records.lock().values().cloned().collect()
    }

    fn begin(&self) -> ClientResult<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match self.failure.lock().as_ref() {
            Some(message) => Err(ClientError::Server {
                status: 500,
                message: message.clone(),
            }),
            None => Ok(()),
        }
    }

    fn not_found(id: R::Id) -> ClientError {
        ClientError::NotFound {
            message: format!("{} {id} not found", R::NAME),
        }
    }

    fn server_validation(payload: &R::Payload) -> ClientResult<()> {
        validate_payload(payload).map_err(|err| match err {
            klinika_core::Error::Validation { field, message } => ClientError::ServerValidation {
                message: format!("{field}: {message}"),
                field: Some(field),
            },
            other => ClientError::from(other),
        })
    }
}

#[async_trait]
impl<R: Resource> ResourceApi<R> for MockResourceApi<R> {
    async fn paginate(&self, page: u32, page_size: u32, search: &str) -> ClientResult<Page<R>> {
        self.begin()?;
        let request = PageRequest::new(page, page_size, Some(search.to_string()))?;
        let matching: Vec<R> = {
            let records = self.records.lock();
            match request.search_term() {
                Some(term) => records.values().filter(|r| r.matches(term)).cloned().collect(),
                None => records.values().cloned().collect(),
            }
        };
        Ok(Page::from_all(matching, &request))
    }

    async fn get(&self, id: R::Id) -> ClientResult<R> {
        self.begin()?;
        self.records
            .lock()
            .get(&id)
            .cloned()
            .ok_or_else(|| Self::not_found(id))
    }

    async fn create(&self, payload: &R::Payload) -> ClientResult<R> {
        self.begin()?;
        Self::server_validation(payload)?;
        let id = R::Id::assign(self.next_id.fetch_add(1, Ordering::SeqCst));
        let record = R::create(id, payload.clone(), Utc::now())?;
        self.records.lock().insert(record.id(), record.clone());
        Ok(record)
    }

    async fn update(&self, id: R::Id, payload: &R::Payload) -> ClientResult<R> {
        self.begin()?;
        Self::server_validation(payload)?;
        let mut records = self.records.lock();
        let record = records.get_mut(&id).ok_or_else(|| Self::not_found(id))?;
        record.apply(payload.clone())?;
        Ok(record.clone())
    }

    async fn delete(&self, id: R::Id) -> ClientResult<u64> {
        self.begin()?;
        self.records
            .lock()
            .remove(&id)
            .map(|_| 1)
            .ok_or_else(|| Self::not_found(id))
    }

    async fn bulk_delete(&self, ids: &[R::Id]) -> ClientResult<u64> {
        self.begin()?;
        let mut records = self.records.lock();
        if let Some(missing) = ids.iter().find(|id| !records.contains_key(*id)) {
            return Err(Self::not_found(*missing));
        }
        let removed = ids.iter().filter(|id| records.remove(*id).is_some()).count();
        Ok(u64::try_from(removed).unwrap_or(u64::MAX))
    }

    async fn options(&self, field: &str) -> ClientResult<Vec<Value>> {
        self.begin()?;
        self.options
            .lock()
            .get(field)
            .cloned()
            .ok_or_else(|| ClientError::not_configured(R::NAME, format!("options({field})")))
    }
}
