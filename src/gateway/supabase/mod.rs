//! # Supabase Gateway
//!
//! HTTP and websocket implementation of the gateway traits against a
//! Supabase project:
//! - `rest`: table CRUD through PostgREST (`/rest/v1`)
//! - `auth`: OAuth URL, session validation, refresh and sign-out (`/auth/v1`)
//! - `storage`: attachment uploads and signed URLs (`/storage/v1`)
//! - `realtime`: Phoenix-channel change feed (`/realtime/v1/websocket`)

pub mod auth;
pub mod realtime;
pub mod rest;
pub mod storage;

#[cfg(test)]
pub(crate) mod test_server;

use std::sync::Arc;
use crate::gateway::AuthGateway;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use reqwest::{Client, Method, RequestBuilder, Response};
use serde_json::Value;
use tracing::debug;
use url::Url;

use crate::auth::models::Session;
use crate::config::GatewayConfig;
use crate::error::{AppError, AppResult};
use crate::gateway::store::SessionStore;
use crate::gateway::{ChangeCallback, DataGateway, FileUpload, Filter, Query, Subscription};

pub use auth::SupabaseAuth;
pub use realtime::RealtimeClient;

/// Base URL, API key and HTTP client shared by every sub-API
#[derive(Clone)]
pub(crate) struct Endpoint {
    http: Client,
    base: Url,
    anon_key: String,
}

impl Endpoint {
    pub(crate) fn new(base: &Url, anon_key: &str, timeout: Duration) -> AppResult<Self> {
        let http = Client::builder().timeout(timeout).build()?;

        // `Url::join` replaces the last segment unless the base ends in '/'
        let mut base = base.clone();
        if !base.path().ends_with('/') {
            let path = format!("{}/", base.path());
            base.set_path(&path);
        }

        Ok(Self {
            http,
            base,
            anon_key: anon_key.to_string(),
        })
    }

    pub(crate) fn base(&self) -> &Url {
        &self.base
    }

    pub(crate) fn anon_key(&self) -> &str {
        &self.anon_key
    }

    pub(crate) fn url(&self, path: &str) -> AppResult<Url> {
        self.base
            .join(path)
            .map_err(|e| AppError::Config(format!("invalid gateway path '{}': {}", path, e)))
    }

    /// Request carrying the API key and either the user's token or the anon key
    pub(crate) fn request(&self, method: Method, url: Url, bearer: Option<&str>) -> RequestBuilder {
        self.http
            .request(method, url)
            .header("apikey", &self.anon_key)
            .bearer_auth(bearer.unwrap_or(&self.anon_key))
    }
}

/// Turn a non-success response into [`AppError::Gateway`]
pub(crate) async fn check(response: Response) -> AppResult<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    let message = serde_json::from_str::<Value>(&body)
        .ok()
        .and_then(|v| {
            ["message", "msg", "error_description", "error"]
                .iter()
                .find_map(|key| v.get(*key).and_then(Value::as_str).map(str::to_string))
        })
        .unwrap_or(body);

    debug!("Gateway responded {}: {}", status, message);
    Err(AppError::gateway(status.as_u16(), message))
}

/// Supabase-backed [`DataGateway`]
pub struct SupabaseClient {
    endpoint: Endpoint,
    auth: Arc<SupabaseAuth>,
    realtime: Arc<RealtimeClient>,
    storage_bucket: String,
    signed_url_ttl: Duration,
    /// Keeps realtime topics on the current access token
    _token_listener: Mutex<Subscription>,
}

impl SupabaseClient {
    pub fn new(config: &GatewayConfig, store: Arc<dyn SessionStore>) -> AppResult<Self> {
        let endpoint = Endpoint::new(&config.url, &config.anon_key, config.http_timeout)?;
        let auth = Arc::new(SupabaseAuth::new(endpoint.clone(), store));
        let realtime = Arc::new(RealtimeClient::new(&endpoint, config.heartbeat_interval)?);

        let token_listener = {
            let realtime = Arc::downgrade(&realtime);
            let anon_key = config.anon_key.clone();
            auth.on_auth_state_change(Arc::new(move |event, session: Option<Session>| {
                let Some(realtime) = realtime.upgrade() else { return };
                debug!("Forwarding {:?} token to realtime", event);
                let token = session.map(|s| s.access_token).unwrap_or_else(|| anon_key.clone());
                realtime.set_auth(&token);
            }))
        };

        Ok(Self {
            endpoint,
            auth,
            realtime,
            storage_bucket: config.storage_bucket.clone(),
            signed_url_ttl: config.signed_url_ttl,
            _token_listener: Mutex::new(token_listener),
        })
    }

    /// The auth side of this client, shared with the session manager
    pub fn auth(&self) -> Arc<SupabaseAuth> {
        Arc::clone(&self.auth)
    }

    pub fn storage_bucket(&self) -> &str {
        &self.storage_bucket
    }

    fn bearer(&self) -> Option<String> {
        self.auth.access_token()
    }
}

#[async_trait]
impl DataGateway for SupabaseClient {
    async fn select(&self, query: &Query) -> AppResult<Vec<Value>> {
        rest::select(&self.endpoint, self.bearer().as_deref(), query).await
    }

    async fn insert(&self, table: &str, row: Value) -> AppResult<Value> {
        rest::insert(&self.endpoint, self.bearer().as_deref(), table, row).await
    }

    async fn update(&self, table: &str, patch: Value, filters: &[Filter]) -> AppResult<Vec<Value>> {
        rest::update(&self.endpoint, self.bearer().as_deref(), table, patch, filters).await
    }

    async fn delete(&self, table: &str, filters: &[Filter]) -> AppResult<()> {
        rest::delete(&self.endpoint, self.bearer().as_deref(), table, filters).await
    }

    async fn subscribe(
        &self,
        table: &str,
        filter: Option<Filter>,
        on_change: ChangeCallback,
    ) -> AppResult<Subscription> {
        let token = self
            .bearer()
            .unwrap_or_else(|| self.endpoint.anon_key().to_string());
        self.realtime.subscribe(table, filter, &token, on_change).await
    }

    async fn upload_file(&self, upload: FileUpload) -> AppResult<String> {
        let bearer = self.bearer();
        storage::upload(&self.endpoint, bearer.as_deref(), &upload).await?;
        storage::create_signed_url(
            &self.endpoint,
            bearer.as_deref(),
            &upload.bucket,
            &upload.path,
            self.signed_url_ttl,
        )
        .await
    }
}
