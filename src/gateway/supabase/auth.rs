//! Supabase auth (GoTrue) client.
//!
//! Holds the current session, persists it through a [`SessionStore`] and
//! fans auth-state changes out to registered listeners.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use dashmap::DashMap;
use parking_lot::{Mutex, RwLock};
use reqwest::Method;
use serde::Deserialize;
use serde_json::json;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use url::Url;

use super::{Endpoint, check};
use crate::auth::jwt::ClaimsReader;
use crate::auth::models::{AuthChangeEvent, Session, TokenPair, User};
use crate::error::{AppError, AppResult, AuthError};
use crate::gateway::store::SessionStore;
use crate::gateway::{AuthCallback, AuthGateway, OAuthRequest, Subscription};

/// Refresh this many seconds before the access token expires
const REFRESH_MARGIN_SECS: i64 = 60;

/// Token endpoint payload
#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    refresh_token: String,
    #[serde(default)]
    expires_in: Option<i64>,
    #[serde(default)]
    expires_at: Option<i64>,
    #[serde(default)]
    token_type: Option<String>,
    user: User,
}

impl From<TokenResponse> for Session {
    fn from(t: TokenResponse) -> Self {
        let expires_at = t
            .expires_at
            .or_else(|| t.expires_in.map(|secs| Utc::now().timestamp() + secs));
        Session {
            access_token: t.access_token,
            refresh_token: t.refresh_token,
            expires_at,
            token_type: t.token_type.unwrap_or_else(|| "bearer".to_string()),
            user: t.user,
        }
    }
}

pub struct SupabaseAuth {
    endpoint: Endpoint,
    store: Arc<dyn SessionStore>,
    claims: ClaimsReader,
    current: RwLock<Option<Session>>,
    /// Bumped whenever the session is replaced or removed; a refresh that
    /// started under an older generation is discarded
    generation: AtomicU64,
    /// Serializes every change to `current` and the store
    commit: tokio::sync::Mutex<()>,
    listeners: Arc<DashMap<u64, AuthCallback>>,
    next_listener: AtomicU64,
    /// Listeners see one change at a time
    delivery: Mutex<()>,
}

impl SupabaseAuth {
    pub(crate) fn new(endpoint: Endpoint, store: Arc<dyn SessionStore>) -> Self {
        Self {
            endpoint,
            store,
            claims: ClaimsReader::new(),
            current: RwLock::new(None),
            generation: AtomicU64::new(0),
            commit: tokio::sync::Mutex::new(()),
            listeners: Arc::new(DashMap::new()),
            next_listener: AtomicU64::new(1),
            delivery: Mutex::new(()),
        }
    }

    /// Access token of the current session, if any
    pub fn access_token(&self) -> Option<String> {
        self.current.read().as_ref().map(|s| s.access_token.clone())
    }

    pub(super) fn emit(&self, event: AuthChangeEvent, session: Option<Session>) {
        let _serialized = self.delivery.lock();
        // Snapshot first so a listener may unsubscribe from inside its callback
        let callbacks: Vec<AuthCallback> = self.listeners.iter().map(|e| e.value().clone()).collect();
        debug!("Auth event {:?} delivered to {} listener(s)", event, callbacks.len());
        for callback in callbacks {
            callback(event, session.clone());
        }
    }

    async fn store_session(&self, session: &Session) -> AppResult<()> {
        self.store.save(session).await?;
        *self.current.write() = Some(session.clone());
        Ok(())
    }

    async fn fetch_user(&self, access_token: &str) -> AppResult<User> {
        let url = self.endpoint.url("auth/v1/user")?;
        let response = self
            .endpoint
            .request(Method::GET, url, Some(access_token))
            .send()
            .await?;
        Ok(check(response).await?.json::<User>().await?)
    }

    async fn exchange_refresh_token(&self, refresh_token: &str) -> AppResult<Session> {
        let mut url = self.endpoint.url("auth/v1/token")?;
        url.query_pairs_mut().append_pair("grant_type", "refresh_token");
        let response = self
            .endpoint
            .request(Method::POST, url, None)
            .json(&json!({ "refresh_token": refresh_token }))
            .send()
            .await?;
        let token: TokenResponse = check(response).await?.json().await?;
        Ok(token.into())
    }

    /// Store a refreshed session and announce it, unless the session it
    /// came from was replaced or removed since `generation`
    async fn commit_refresh(&self, generation: u64, session: Session) -> AppResult<Session> {
        let _commit = self.commit.lock().await;
        if self.generation.load(Ordering::SeqCst) != generation {
            debug!("Discarding refreshed tokens, the session changed meanwhile");
            return Err(AuthError::Superseded.into());
        }
        self.store_session(&session).await?;
        self.emit(AuthChangeEvent::TokenRefreshed, Some(session.clone()));
        Ok(session)
    }

    /// Exchange the current refresh token for a new session
    pub async fn refresh_session(&self) -> AppResult<Session> {
        let generation = self.generation.load(Ordering::SeqCst);
        let refresh_token = self
            .current
            .read()
            .as_ref()
            .map(|s| s.refresh_token.clone())
            .ok_or(AuthError::NotAuthenticated)?;

        let fresh = self.exchange_refresh_token(&refresh_token).await?;
        let session = self.commit_refresh(generation, fresh).await?;
        info!("Session refreshed for user {}", session.user.id);
        Ok(session)
    }

    /// Periodically refresh the session shortly before it expires.
    ///
    /// The task stops once the auth client is dropped.
    pub fn spawn_auto_refresh(self: &Arc<Self>, tick: Duration) -> JoinHandle<()> {
        let weak: Weak<Self> = Arc::downgrade(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(tick);
            loop {
                ticker.tick().await;
                let Some(auth) = weak.upgrade() else { break };

                let due = auth
                    .current
                    .read()
                    .as_ref()
                    .is_some_and(|s| s.expires_within(REFRESH_MARGIN_SECS));
                if due {
                    match auth.refresh_session().await {
                        Ok(_) | Err(AppError::Auth(AuthError::Superseded)) => {}
                        Err(e) => warn!("Automatic token refresh failed: {}", e),
                    }
                }
            }
            debug!("Auto-refresh task stopped");
        })
    }
}

#[async_trait]
impl AuthGateway for SupabaseAuth {
    async fn get_session(&self) -> AppResult<Option<Session>> {
        let generation = self.generation.load(Ordering::SeqCst);
        let cached = self.current.read().clone();
        let session = match cached {
            Some(session) => session,
            None => match self.store.load().await? {
                Some(session) => session,
                None => return Ok(None),
            },
        };

        if !session.expires_within(REFRESH_MARGIN_SECS) {
            let _commit = self.commit.lock().await;
            if self.generation.load(Ordering::SeqCst) == generation {
                *self.current.write() = Some(session);
            }
            let current = self.current.read().clone();
            return Ok(current);
        }

        let outcome = match self.exchange_refresh_token(&session.refresh_token).await {
            Ok(fresh) => self.commit_refresh(generation, fresh).await.map(Some),
            Err(e) => {
                warn!("Stored session could not be refreshed, discarding it: {}", e);
                let _commit = self.commit.lock().await;
                if self.generation.load(Ordering::SeqCst) == generation {
                    self.generation.fetch_add(1, Ordering::SeqCst);
                    self.store.clear().await?;
                    *self.current.write() = None;
                }
                Ok(None)
            }
        };

        match outcome {
            Err(AppError::Auth(AuthError::Superseded)) => {
                let current = self.current.read().clone();
                Ok(current)
            }
            other => other,
        }
    }

    fn on_auth_state_change(&self, callback: AuthCallback) -> Subscription {
        let id = self.next_listener.fetch_add(1, Ordering::SeqCst);
        self.listeners.insert(id, callback);

        let listeners = Arc::clone(&self.listeners);
        Subscription::new(id, move || {
            listeners.remove(&id);
        })
    }

    async fn sign_in_with_oauth(&self, request: &OAuthRequest) -> AppResult<Url> {
        let mut url = self.endpoint.url("auth/v1/authorize")?;
        {
            let mut pairs = url.query_pairs_mut();
            pairs.append_pair("provider", request.provider.as_str());
            pairs.append_pair("redirect_to", &request.redirect_uri);
            for (key, value) in &request.query_params {
                pairs.append_pair(key, value);
            }
        }
        Ok(url)
    }

    async fn set_session(&self, tokens: &TokenPair) -> AppResult<Session> {
        let claims = self.claims.read(&tokens.access_token)?;

        let session = if claims.exp <= Utc::now().timestamp() {
            self.exchange_refresh_token(&tokens.refresh_token).await?
        } else {
            let user = self.fetch_user(&tokens.access_token).await?;
            Session {
                access_token: tokens.access_token.clone(),
                refresh_token: tokens.refresh_token.clone(),
                expires_at: Some(claims.exp),
                token_type: "bearer".to_string(),
                user,
            }
        };

        let _commit = self.commit.lock().await;
        self.generation.fetch_add(1, Ordering::SeqCst);
        self.store_session(&session).await?;
        info!("Signed in as user {}", session.user.id);
        self.emit(AuthChangeEvent::SignedIn, Some(session.clone()));
        Ok(session)
    }

    async fn sign_out(&self) -> AppResult<()> {
        if let Some(token) = self.access_token() {
            let url = self.endpoint.url("auth/v1/logout")?;
            let response = self.endpoint.request(Method::POST, url, Some(&token)).send().await?;
            match check(response).await {
                Ok(_) => {}
                // Token already invalid on the server side: still sign out locally
                Err(AppError::Gateway { status: 401 | 403 | 404, .. }) => {}
                Err(e) => return Err(e),
            }
        }

        let _commit = self.commit.lock().await;
        self.generation.fetch_add(1, Ordering::SeqCst);
        self.store.clear().await?;
        *self.current.write() = None;
        info!("Signed out");
        self.emit(AuthChangeEvent::SignedOut, None);
        Ok(())
    }
}
