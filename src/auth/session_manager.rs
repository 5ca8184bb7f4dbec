//! Session Manager
//!
//! Single source of truth for "who is signed in". Starts in a loading state,
//! fetches the persisted session once, and from then on mirrors every
//! auth-state notification from the gateway. Consumers observe it through a
//! [`watch`] channel.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;
use tokio::sync::watch;
use tracing::{debug, error, info};

use crate::auth::browser::BrowserFlow;
use crate::auth::models::{AuthState, Session};
use crate::auth::oauth::OAuthFlow;
use crate::config::OAuthConfig;
use crate::error::AppResult;
use crate::gateway::{AuthGateway, Subscription};

pub struct SessionManager {
    auth: Arc<dyn AuthGateway>,
    oauth: OAuthFlow,
    state: Arc<watch::Sender<AuthState>>,
    /// Bumped on every auth event; lets the initial fetch detect it was overtaken
    revision: Arc<AtomicU64>,
    listener: Mutex<Option<Subscription>>,
}

impl SessionManager {
    /// Create the manager and register for auth-state changes.
    ///
    /// Registration happens here, before the initial fetch is issued, so no
    /// event can fall between the two.
    pub fn new(auth: Arc<dyn AuthGateway>, browser: Arc<dyn BrowserFlow>, oauth: OAuthConfig) -> Self {
        let (tx, _) = watch::channel(AuthState::loading());
        let state = Arc::new(tx);
        let revision = Arc::new(AtomicU64::new(0));

        let listener = {
            let state = Arc::clone(&state);
            let revision = Arc::clone(&revision);
            auth.on_auth_state_change(Arc::new(move |event, session: Option<Session>| {
                revision.fetch_add(1, Ordering::SeqCst);
                debug!(
                    "Auth event {:?}, user: {:?}",
                    event,
                    session.as_ref().map(|s| s.user.id)
                );
                state.send_modify(|current| current.session = session);
            }))
        };

        Self {
            oauth: OAuthFlow::new(Arc::clone(&auth), browser, oauth),
            auth,
            state,
            revision,
            listener: Mutex::new(Some(listener)),
        }
    }

    /// Fetch the persisted session and leave the loading state.
    ///
    /// If an auth event arrived while the fetch was in flight, the event's
    /// session is kept and the fetched one discarded. A failed fetch is
    /// logged and resolves to signed out.
    pub async fn restore(&self) {
        let seen = self.revision.load(Ordering::SeqCst);
        let result = self.auth.get_session().await;

        let fetched = match result {
            Ok(session) => session,
            Err(e) => {
                error!("Failed to restore session: {}", e);
                None
            }
        };

        let revision = &self.revision;
        self.state.send_modify(|current| {
            if revision.load(Ordering::SeqCst) == seen {
                current.session = fetched;
            } else {
                debug!("Initial session fetch overtaken by an auth event, keeping the newer session");
            }
            current.loading = false;
        });

        let user = self.state.borrow().user().map(|u| u.id);
        match user {
            Some(id) => info!("👤 Session restored for user {}", id),
            None => info!("No active session"),
        }
    }

    /// Observe the auth state. The receiver starts at the current value.
    pub fn subscribe(&self) -> watch::Receiver<AuthState> {
        self.state.subscribe()
    }

    pub fn state(&self) -> AuthState {
        self.state.borrow().clone()
    }

    pub fn session(&self) -> Option<Session> {
        self.state.borrow().session.clone()
    }

    pub fn is_loading(&self) -> bool {
        self.state.borrow().loading
    }

    /// Sign in with the configured provider (Google by default).
    ///
    /// Errors are logged and returned; the session is only ever changed by
    /// the gateway's notification.
    pub async fn sign_in_with_google(&self) -> AppResult<Session> {
        self.oauth.sign_in().await.inspect_err(|e| error!("Error signing in: {}", e))
    }

    /// Sign out. A failure is logged and the session is left as it was.
    pub async fn sign_out(&self) {
        match self.auth.sign_out().await {
            Ok(()) => info!("👋 Signed out"),
            Err(e) => error!("Error signing out: {}", e),
        }
    }

    /// Stop listening for auth-state changes. Safe to call more than once.
    pub fn shutdown(&self) {
        if let Some(listener) = self.listener.lock().take() {
            listener.unsubscribe();
            debug!("Session manager detached from auth notifications");
        }
    }
}

impl Drop for SessionManager {
    fn drop(&mut self) {
        self.shutdown();
    }
}
