//! In-memory gateway and browser doubles for tests.
//!
//! Every call is appended to a shared log so tests can assert on exact call
//! counts and ordering (e.g. unsubscribe before subscribe on scope change).

use std::cmp::Ordering as CmpOrdering;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::{Value, json};
use tokio::sync::oneshot;
use url::Url;
use uuid::Uuid;

use crate::auth::browser::{BrowserFlow, BrowserOutcome};
use crate::auth::jwt::ClaimsReader;
use crate::auth::models::{AuthChangeEvent, Session, TokenPair, User};
use crate::error::{AppError, AppResult};
use crate::gateway::{
    AuthCallback, AuthGateway, ChangeCallback, ChangeEvent, ChangeKind, DataGateway, FileUpload, Filter,
    OAuthRequest, Query, Subscription,
};

type Log = Arc<Mutex<Vec<String>>>;

struct Watch {
    table: String,
    filter: Option<Filter>,
    callback: ChangeCallback,
}

#[derive(Default)]
pub(crate) struct MockGateway {
    tables: Mutex<HashMap<String, Vec<Value>>>,
    log: Log,
    watches: Arc<Mutex<HashMap<u64, Watch>>>,
    next_id: AtomicU64,
    pub fail_select: AtomicBool,
    pub fail_insert: AtomicBool,

    session: Mutex<Option<Session>>,
    auth_listeners: Arc<Mutex<HashMap<u64, AuthCallback>>>,
    session_gate: Mutex<Option<oneshot::Receiver<()>>>,
    pub fail_get_session: AtomicBool,
    pub fail_set_session: AtomicBool,
    pub fail_sign_out: AtomicBool,
}

impl MockGateway {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            next_id: AtomicU64::new(1),
            ..Default::default()
        })
    }

    pub fn seed(&self, table: &str, rows: Vec<Value>) {
        self.tables.lock().insert(table.to_string(), rows);
    }

    pub fn rows(&self, table: &str) -> Vec<Value> {
        self.tables.lock().get(table).cloned().unwrap_or_default()
    }

    pub fn log(&self) -> Vec<String> {
        self.log.lock().clone()
    }

    /// Number of logged calls starting with `prefix`
    pub fn count(&self, prefix: &str) -> usize {
        self.log.lock().iter().filter(|l| l.starts_with(prefix)).count()
    }

    pub fn active_watches(&self) -> usize {
        self.watches.lock().len()
    }

    pub fn active_auth_listeners(&self) -> usize {
        self.auth_listeners.lock().len()
    }

    /// Make `get_session` wait until the returned sender fires
    pub fn hold_session_fetch(&self) -> oneshot::Sender<()> {
        let (tx, rx) = oneshot::channel();
        *self.session_gate.lock() = Some(rx);
        tx
    }

    pub fn store_session(&self, session: Option<Session>) {
        *self.session.lock() = session;
    }

    /// Deliver a row change to every matching watch
    pub fn emit_change(&self, table: &str, kind: ChangeKind, record: Value) {
        let callbacks: Vec<ChangeCallback> = self
            .watches
            .lock()
            .values()
            .filter(|w| w.table == table && w.filter.as_ref().is_none_or(|f| f.matches(&record)))
            .map(|w| w.callback.clone())
            .collect();
        for callback in callbacks {
            callback(ChangeEvent {
                table: table.to_string(),
                kind,
                record: Some(record.clone()),
                old_record: None,
            });
        }
    }

    /// Deliver an auth-state change to every listener
    pub fn emit_auth(&self, event: AuthChangeEvent, session: Option<Session>) {
        let callbacks: Vec<AuthCallback> = self.auth_listeners.lock().values().cloned().collect();
        for callback in callbacks {
            callback(event, session.clone());
        }
    }

    fn record(&self, entry: String) {
        self.log.lock().push(entry);
    }
}

fn compare(a: Option<&Value>, b: Option<&Value>) -> CmpOrdering {
    match (a.and_then(Value::as_f64), b.and_then(Value::as_f64)) {
        (Some(x), Some(y)) => x.partial_cmp(&y).unwrap_or(CmpOrdering::Equal),
        _ => {
            let x = a.map(|v| v.to_string()).unwrap_or_default();
            let y = b.map(|v| v.to_string()).unwrap_or_default();
            x.cmp(&y)
        }
    }
}

#[async_trait]
impl DataGateway for MockGateway {
    async fn select(&self, query: &Query) -> AppResult<Vec<Value>> {
        self.record(format!("select:{}", query.table));
        if self.fail_select.load(Ordering::SeqCst) {
            return Err(AppError::gateway(500, "select failed"));
        }

        let mut rows: Vec<Value> = self
            .rows(&query.table)
            .into_iter()
            .filter(|row| query.filters.iter().all(|f| f.matches(row)))
            .collect();
        rows.sort_by(|a, b| {
            query
                .order
                .iter()
                .map(|o| {
                    let ord = compare(a.get(&o.column), b.get(&o.column));
                    if o.ascending { ord } else { ord.reverse() }
                })
                .find(|ord| *ord != CmpOrdering::Equal)
                .unwrap_or(CmpOrdering::Equal)
        });
        if let Some(limit) = query.limit {
            rows.truncate(limit);
        }
        Ok(rows)
    }

    async fn insert(&self, table: &str, mut row: Value) -> AppResult<Value> {
        self.record(format!("insert:{}", table));
        if self.fail_insert.load(Ordering::SeqCst) {
            return Err(AppError::gateway(500, "insert failed"));
        }
        if row.get("id").is_none_or(Value::is_null) {
            row["id"] = json!(Uuid::new_v4().to_string());
        }
        self.tables.lock().entry(table.to_string()).or_default().push(row.clone());
        Ok(row)
    }

    async fn update(&self, table: &str, patch: Value, filters: &[Filter]) -> AppResult<Vec<Value>> {
        self.record(format!("update:{}", table));
        let mut tables = self.tables.lock();
        let mut updated = Vec::new();
        for row in tables.entry(table.to_string()).or_default().iter_mut() {
            if filters.iter().all(|f| f.matches(row)) {
                if let (Some(target), Some(changes)) = (row.as_object_mut(), patch.as_object()) {
                    for (k, v) in changes {
                        target.insert(k.clone(), v.clone());
                    }
                }
                updated.push(row.clone());
            }
        }
        Ok(updated)
    }

    async fn delete(&self, table: &str, filters: &[Filter]) -> AppResult<()> {
        self.record(format!("delete:{}", table));
        self.tables
            .lock()
            .entry(table.to_string())
            .or_default()
            .retain(|row| !filters.iter().all(|f| f.matches(row)));
        Ok(())
    }

    async fn subscribe(
        &self,
        table: &str,
        filter: Option<Filter>,
        on_change: ChangeCallback,
    ) -> AppResult<Subscription> {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let scope = filter.as_ref().map(Filter::expression).unwrap_or_else(|| "*".to_string());
        self.record(format!("subscribe:{}:{}#{}", table, scope, id));
        self.watches.lock().insert(
            id,
            Watch {
                table: table.to_string(),
                filter,
                callback: on_change,
            },
        );

        let watches = Arc::clone(&self.watches);
        let log = Arc::clone(&self.log);
        Ok(Subscription::new(id, move || {
            watches.lock().remove(&id);
            log.lock().push(format!("unsubscribe:#{}", id));
        }))
    }

    async fn upload_file(&self, upload: FileUpload) -> AppResult<String> {
        self.record(format!("upload:{}/{}", upload.bucket, upload.path));
        Ok(format!("https://files.example.com/{}/{}?token=signed", upload.bucket, upload.path))
    }
}

#[async_trait]
impl AuthGateway for MockGateway {
    async fn get_session(&self) -> AppResult<Option<Session>> {
        self.record("auth:get_session".to_string());
        let gate = self.session_gate.lock().take();
        if let Some(gate) = gate {
            let _ = gate.await;
        }
        if self.fail_get_session.load(Ordering::SeqCst) {
            return Err(AppError::gateway(503, "storage unavailable"));
        }
        Ok(self.session.lock().clone())
    }

    fn on_auth_state_change(&self, callback: AuthCallback) -> Subscription {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        self.record(format!("auth:listen#{}", id));
        self.auth_listeners.lock().insert(id, callback);

        let listeners = Arc::clone(&self.auth_listeners);
        let log = Arc::clone(&self.log);
        Subscription::new(id, move || {
            listeners.lock().remove(&id);
            log.lock().push(format!("auth:unlisten#{}", id));
        })
    }

    async fn sign_in_with_oauth(&self, request: &OAuthRequest) -> AppResult<Url> {
        self.record("auth:authorize".to_string());
        let mut url = Url::parse("https://auth.example.com/authorize").expect("static url");
        url.query_pairs_mut()
            .append_pair("provider", request.provider.as_str())
            .append_pair("redirect_to", &request.redirect_uri);
        Ok(url)
    }

    async fn set_session(&self, tokens: &TokenPair) -> AppResult<Session> {
        self.record("auth:set_session".to_string());
        if self.fail_set_session.load(Ordering::SeqCst) {
            return Err(AppError::gateway(401, "invalid token"));
        }
        let session = ClaimsReader::new().session_from_tokens(tokens).unwrap_or_else(|_| Session {
            access_token: tokens.access_token.clone(),
            refresh_token: tokens.refresh_token.clone(),
            expires_at: None,
            token_type: "bearer".to_string(),
            user: User {
                id: Uuid::new_v4(),
                email: None,
            },
        });
        *self.session.lock() = Some(session.clone());
        self.emit_auth(AuthChangeEvent::SignedIn, Some(session.clone()));
        Ok(session)
    }

    async fn sign_out(&self) -> AppResult<()> {
        self.record("auth:sign_out".to_string());
        if self.fail_sign_out.load(Ordering::SeqCst) {
            return Err(AppError::gateway(500, "logout failed"));
        }
        *self.session.lock() = None;
        self.emit_auth(AuthChangeEvent::SignedOut, None);
        Ok(())
    }
}

/// Browser double returning a preset outcome
pub(crate) struct MockBrowser {
    outcome: Mutex<BrowserOutcome>,
    pub opened: Mutex<Vec<(String, String)>>,
}

impl MockBrowser {
    pub fn returning(outcome: BrowserOutcome) -> Arc<Self> {
        Arc::new(Self {
            outcome: Mutex::new(outcome),
            opened: Mutex::new(Vec::new()),
        })
    }

    pub fn set_outcome(&self, outcome: BrowserOutcome) {
        *self.outcome.lock() = outcome;
    }
}

#[async_trait]
impl BrowserFlow for MockBrowser {
    async fn open_auth_session(&self, auth_url: &Url, redirect_uri: &str) -> BrowserOutcome {
        self.opened
            .lock()
            .push((auth_url.to_string(), redirect_uri.to_string()));
        self.outcome.lock().clone()
    }
}
