//! # Gateway Module
//!
//! Contract of the remote backend this client talks to: table CRUD, file
//! storage, authentication and realtime change feeds. The core only depends
//! on the [`DataGateway`] and [`AuthGateway`] traits; [`supabase`] holds the
//! concrete HTTP/websocket implementation.

pub mod store;
pub mod subscription;
pub mod supabase;

#[cfg(test)]
pub(crate) mod mock;

use std::sync::Arc;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde_json::Value;
use url::Url;

use crate::auth::models::{AuthChangeEvent, Provider, Session, TokenPair};
use crate::error::AppResult;

pub use subscription::Subscription;

// ============================================================================
// QUERY TYPES
// ============================================================================

/// Equality filter on a single column
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Filter {
    pub column: String,
    pub value: String,
}

impl Filter {
    pub fn eq(column: impl Into<String>, value: impl ToString) -> Self {
        Self {
            column: column.into(),
            value: value.to_string(),
        }
    }

    /// `column=eq.value`, the form used by both the REST and realtime APIs
    pub fn expression(&self) -> String {
        format!("{}=eq.{}", self.column, self.value)
    }

    pub fn matches(&self, row: &Value) -> bool {
        match row.get(&self.column) {
            Some(Value::String(s)) => *s == self.value,
            Some(Value::Null) | None => false,
            Some(other) => other.to_string() == self.value,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Order {
    pub column: String,
    pub ascending: bool,
}

impl Order {
    pub fn asc(column: impl Into<String>) -> Self {
        Self {
            column: column.into(),
            ascending: true,
        }
    }

    pub fn desc(column: impl Into<String>) -> Self {
        Self {
            column: column.into(),
            ascending: false,
        }
    }
}

/// A list query against one table
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Query {
    pub table: String,
    pub filters: Vec<Filter>,
    pub order: Vec<Order>,
    pub limit: Option<usize>,
}

impl Query {
    pub fn table(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            filters: Vec::new(),
            order: Vec::new(),
            limit: None,
        }
    }

    pub fn eq(mut self, column: impl Into<String>, value: impl ToString) -> Self {
        self.filters.push(Filter::eq(column, value));
        self
    }

    pub fn filter(mut self, filter: Filter) -> Self {
        self.filters.push(filter);
        self
    }

    pub fn order(mut self, order: Order) -> Self {
        self.order.push(order);
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }
}

// ============================================================================
// CHANGE FEED
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeKind {
    Insert,
    Update,
    Delete,
}

impl ChangeKind {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.to_ascii_uppercase().as_str() {
            "INSERT" => Some(Self::Insert),
            "UPDATE" => Some(Self::Update),
            "DELETE" => Some(Self::Delete),
            _ => None,
        }
    }
}

/// One row-level change reported by the realtime feed
#[derive(Debug, Clone, PartialEq)]
pub struct ChangeEvent {
    pub table: String,
    pub kind: ChangeKind,
    pub record: Option<Value>,
    pub old_record: Option<Value>,
}

pub type ChangeCallback = Arc<dyn Fn(ChangeEvent) + Send + Sync>;

pub type AuthCallback = Arc<dyn Fn(AuthChangeEvent, Option<Session>) + Send + Sync>;

// ============================================================================
// STORAGE & AUTH REQUESTS
// ============================================================================

/// File bytes to store in a bucket
#[derive(Clone)]
pub struct FileUpload {
    pub bucket: String,
    pub path: String,
    pub bytes: Vec<u8>,
    pub content_type: String,
}

impl std::fmt::Debug for FileUpload {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FileUpload")
            .field("bucket", &self.bucket)
            .field("path", &self.path)
            .field("len", &self.bytes.len())
            .field("content_type", &self.content_type)
            .finish()
    }
}

/// Parameters for starting a provider sign-in
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OAuthRequest {
    pub provider: Provider,
    pub redirect_uri: String,
    pub query_params: Vec<(String, String)>,
}

// ============================================================================
// GATEWAY TRAITS
// ============================================================================

/// Table, storage and change-feed access
#[async_trait]
pub trait DataGateway: Send + Sync {
    async fn select(&self, query: &Query) -> AppResult<Vec<Value>>;

    /// Insert one row and return it as stored
    async fn insert(&self, table: &str, row: Value) -> AppResult<Value>;

    async fn update(&self, table: &str, patch: Value, filters: &[Filter]) -> AppResult<Vec<Value>>;

    async fn delete(&self, table: &str, filters: &[Filter]) -> AppResult<()>;

    /// Watch a table (optionally narrowed by `filter`); `on_change` fires for
    /// every insert, update or delete until the handle is released.
    async fn subscribe(
        &self,
        table: &str,
        filter: Option<Filter>,
        on_change: ChangeCallback,
    ) -> AppResult<Subscription>;

    /// Store a file and return a URL it can be fetched from
    async fn upload_file(&self, upload: FileUpload) -> AppResult<String>;
}

/// Identity side of the gateway
#[async_trait]
pub trait AuthGateway: Send + Sync {
    /// Current session from persisted storage, refreshed if it had expired
    async fn get_session(&self) -> AppResult<Option<Session>>;

    /// Register a listener for sign-in, sign-out and token refresh
    fn on_auth_state_change(&self, callback: AuthCallback) -> Subscription;

    /// Authorization URL for the provider, bound to `redirect_uri`
    async fn sign_in_with_oauth(&self, request: &OAuthRequest) -> AppResult<Url>;

    /// Establish a session from tokens returned by the provider redirect
    async fn set_session(&self, tokens: &TokenPair) -> AppResult<Session>;

    async fn sign_out(&self) -> AppResult<()>;
}

/// Decode gateway rows into typed records
pub fn decode_rows<T: DeserializeOwned>(rows: Vec<Value>) -> AppResult<Vec<T>> {
    rows.into_iter()
        .map(|row| serde_json::from_value(row).map_err(Into::into))
        .collect()
}

pub fn decode_row<T: DeserializeOwned>(row: Value) -> AppResult<T> {
    Ok(serde_json::from_value(row)?)
}
