//! Typed HTTP facade over one resource's CRUD endpoints

use crate::error::{ClientError, ClientResult};
use async_trait::async_trait;
use indexmap::IndexMap;
use klinika_core::{Page, PageRequest, Resource};
use reqwest::{Client, Method, RequestBuilder, StatusCode};
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use serde_json::Value;
use std::{fmt, marker::PhantomData, time::Duration};
use tracing::{debug, warn};

/// Default API root used by the admin CLI
pub const DEFAULT_BASE_URL: &str = "http://127.0.0.1:8080/api";

/// CRUD operations a service can be configured with
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    /// `GET {path}?page&pageSize&search`
    Paginate,
    /// `GET {path}/{id}`
    Get,
    /// `POST {path}`
    Create,
    /// `PUT {path}/{id}`
    Update,
    /// `DELETE {path}/{id}`
    Delete,
    /// `POST {path}` with a JSON array of ids
    BulkDelete,
}

impl Operation {
    /// Every operation, in declaration order
    pub const ALL: [Self; 6] = [
        Self::Paginate,
        Self::Get,
        Self::Create,
        Self::Update,
        Self::Delete,
        Self::BulkDelete,
    ];

    /// Name used in configuration errors
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Paginate => "paginate",
            Self::Get => "get",
            Self::Create => "create",
            Self::Update => "update",
            Self::Delete => "delete",
            Self::BulkDelete => "bulk_delete",
        }
    }

    /// Route segment the server mounts this operation under
    #[must_use]
    pub const fn route(self) -> &'static str {
        match self {
            Self::Paginate => "paginate",
            Self::Get => "get",
            Self::Create => "create",
            Self::Update => "update",
            Self::Delete => "delete",
            Self::BulkDelete => "bulkDelete",
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Mapping of operation to endpoint path, relative to the API root
///
/// Reference endpoints feeding `select` fields are keyed by the field
/// identifier they populate, e.g. `categoryId → HelpCenterCategory/getAll`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Endpoints {
    operations: IndexMap<Operation, String>,
    options: IndexMap<String, String>,
}

impl Endpoints {
    /// No operation configured
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Every operation under `{resource}/{route}`
    #[must_use]
    pub fn standard(resource: &str) -> Self {
        Operation::ALL
            .into_iter()
            .fold(Self::new(), |endpoints, op| {
                endpoints.with(op, format!("{resource}/{}", op.route()))
            })
    }

    /// Configure one operation
    #[must_use]
    pub fn with(mut self, operation: Operation, path: impl Into<String>) -> Self {
        self.operations.insert(operation, path.into());
        self
    }

    /// Configure the reference endpoint listing the choices of `field`
    #[must_use]
    pub fn with_options(mut self, field: impl Into<String>, path: impl Into<String>) -> Self {
        self.options.insert(field.into(), path.into());
        self
    }

    /// Path of a configured operation
    #[must_use]
    pub fn path(&self, operation: Operation) -> Option<&str> {
        self.operations.get(&operation).map(String::as_str)
    }

    /// Path of the reference endpoint for `field`
    #[must_use]
    pub fn options_path(&self, field: &str) -> Option<&str> {
        self.options.get(field).map(String::as_str)
    }

    /// Fields with a configured reference endpoint
    pub fn option_fields(&self) -> impl Iterator<Item = &str> {
        self.options.keys().map(String::as_str)
    }
}

/// The CRUD surface of one resource
///
/// Implemented over HTTP by [`ApiService`] and in memory by
/// [`MockResourceApi`](crate::mock::MockResourceApi).
#[async_trait]
pub trait ResourceApi<R: Resource>: Send + Sync {
    /// One page of records matching `search`
    async fn paginate(&self, page: u32, page_size: u32, search: &str) -> ClientResult<Page<R>>;

    /// A single record
    async fn get(&self, id: R::Id) -> ClientResult<R>;

    /// Create a record; the server assigns id and timestamps
    async fn create(&self, payload: &R::Payload) -> ClientResult<R>;

    /// Replace a record's editable fields
    async fn update(&self, id: R::Id, payload: &R::Payload) -> ClientResult<R>;

    /// Delete one record, returning how many rows went away
    async fn delete(&self, id: R::Id) -> ClientResult<u64>;

    /// Delete several records; all or nothing
    async fn bulk_delete(&self, ids: &[R::Id]) -> ClientResult<u64>;

    /// Every record of the reference resource behind `field`
    async fn options(&self, field: &str) -> ClientResult<Vec<Value>>;
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    details: Option<ErrorDetails>,
}

#[derive(Debug, Deserialize)]
struct ErrorDetails {
    #[serde(default)]
    field: Option<String>,
}

#[derive(Debug, Deserialize)]
struct DeleteResponse {
    deleted: u64,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct PaginateQuery<'a> {
    page: u32,
    page_size: u32,
    search: &'a str,
}

/// HTTP implementation of [`ResourceApi`]
pub struct ApiService<R> {
    client: Client,
    base_url: String,
    endpoints: Endpoints,
    _resource: PhantomData<fn() -> R>,
}

impl<R> Clone for ApiService<R> {
    fn clone(&self) -> Self {
        Self {
            client: self.client.clone(),
            base_url: self.base_url.clone(),
            endpoints: self.endpoints.clone(),
            _resource: PhantomData,
        }
    }
}

impl<R: Resource> fmt::Debug for ApiService<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ApiService")
            .field("resource", &R::NAME)
            .field("base_url", &self.base_url)
            .field("endpoints", &self.endpoints)
            .finish_non_exhaustive()
    }
}

impl<R: Resource> ApiService<R> {
    /// Create a service rooted at `base_url`, e.g. `http://localhost:8080/api`
    pub fn new(base_url: impl Into<String>, endpoints: Endpoints) -> Self {
        Self::with_client(Client::new(), base_url, endpoints)
    }

    /// Create a service sharing an existing HTTP client
    pub fn with_client(client: Client, base_url: impl Into<String>, endpoints: Endpoints) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Self {
            client,
            base_url,
            endpoints,
            _resource: PhantomData,
        }
    }

    /// Create a service whose requests give up after `timeout`
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn with_timeout(
        base_url: impl Into<String>,
        endpoints: Endpoints,
        timeout: Duration,
    ) -> ClientResult<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ClientError::configuration(format!("HTTP client: {e}")))?;
        Ok(Self::with_client(client, base_url, endpoints))
    }

    /// Configured endpoints
    #[must_use]
    pub const fn endpoints(&self) -> &Endpoints {
        &self.endpoints
    }

    fn url(&self, operation: Operation) -> ClientResult<String> {
        let path = self
            .endpoints
            .path(operation)
            .ok_or_else(|| ClientError::not_configured(R::NAME, operation.as_str()))?;
        Ok(self.join(path))
    }

    fn join(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    fn request(&self, method: Method, url: &str) -> RequestBuilder {
        debug!("{} {}", method, url);
        self.client.request(method, url)
    }
}

async fn send<T: DeserializeOwned>(request: RequestBuilder) -> ClientResult<T> {
    let response = request.send().await?;
    decode(response).await
}

async fn decode<T: DeserializeOwned>(response: reqwest::Response) -> ClientResult<T> {
    let status = response.status();
    let bytes = response.bytes().await?;

    if status.is_success() {
        return Ok(serde_json::from_slice(&bytes)?);
    }

    let body: Option<ErrorBody> = serde_json::from_slice(&bytes).ok();
    let text = String::from_utf8_lossy(&bytes).trim().to_string();
    let message = body
        .as_ref()
        .and_then(|b| b.error.clone())
        .filter(|m| !m.is_empty())
        .or_else(|| (!text.is_empty()).then(|| text.clone()))
        .unwrap_or_else(|| status.canonical_reason().unwrap_or("Request failed").to_string());

    warn!("API request failed with {}: {}", status, message);

    Err(match status {
        StatusCode::NOT_FOUND => ClientError::NotFound { message },
        StatusCode::BAD_REQUEST | StatusCode::UNPROCESSABLE_ENTITY | StatusCode::CONFLICT => {
            ClientError::ServerValidation {
                message,
                field: body.and_then(|b| b.details).and_then(|d| d.field),
            }
        }
        _ => ClientError::Server {
            status: status.as_u16(),
            message,
        },
    })
}

#[async_trait]
impl<R: Resource> ResourceApi<R> for ApiService<R> {
    async fn paginate(&self, page: u32, page_size: u32, search: &str) -> ClientResult<Page<R>> {
        let url = self.url(Operation::Paginate)?;
        PageRequest::new(page, page_size, None)?;

        let query = PaginateQuery {
            page,
            page_size,
            search,
        };
        send(self.request(Method::GET, &url).query(&query)).await
    }

    async fn get(&self, id: R::Id) -> ClientResult<R> {
        let url = self.url(Operation::Get)?;
        send(self.request(Method::GET, &format!("{url}/{id}"))).await
    }

    async fn create(&self, payload: &R::Payload) -> ClientResult<R> {
        let url = self.url(Operation::Create)?;
        send(self.request(Method::POST, &url).json(payload)).await
    }

    async fn update(&self, id: R::Id, payload: &R::Payload) -> ClientResult<R> {
        let url = self.url(Operation::Update)?;
        send(self.request(Method::PUT, &format!("{url}/{id}")).json(payload)).await
    }

    async fn delete(&self, id: R::Id) -> ClientResult<u64> {
        let url = self.url(Operation::Delete)?;
        let response: DeleteResponse =
            send(self.request(Method::DELETE, &format!("{url}/{id}"))).await?;
        Ok(response.deleted)
    }

    async fn bulk_delete(&self, ids: &[R::Id]) -> ClientResult<u64> {
        let url = self.url(Operation::BulkDelete)?;
        let response: DeleteResponse = send(self.request(Method::POST, &url).json(ids)).await?;
        Ok(response.deleted)
    }

    async fn options(&self, field: &str) -> ClientResult<Vec<Value>> {
        let path = self
            .endpoints
            .options_path(field)
            .ok_or_else(|| ClientError::not_configured(R::NAME, format!("options({field})")))?;
        send(self.request(Method::GET, &self.join(path))).await
    }
}
