//! Guarded navigation.
//!
//! Protected screens render only for a signed-in user. While the session is
//! still being restored nothing is rendered and no redirect happens; once it
//! is known that nobody is signed in, the guard replaces the current route
//! with the login route, once per transition into that state.

use std::sync::Arc;

use tokio::sync::watch;
use tracing::info;

use crate::auth::models::{AuthState, Session};
use crate::navigation::{Navigator, Route};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GuardDecision {
    /// Session not known yet; render nothing
    Suspend,
    /// Not signed in; navigation to the login route was requested
    Redirect,
    Render(Session),
}

pub struct RouteGuard {
    navigator: Arc<dyn Navigator>,
    login: Route,
    redirected: bool,
}

impl RouteGuard {
    pub fn new(navigator: Arc<dyn Navigator>) -> Self {
        Self {
            navigator,
            login: Route::Login,
            redirected: false,
        }
    }

    pub fn evaluate(&mut self, state: &AuthState) -> GuardDecision {
        if state.loading {
            return GuardDecision::Suspend;
        }
        match &state.session {
            Some(session) => {
                self.redirected = false;
                GuardDecision::Render(session.clone())
            }
            None => {
                if !self.redirected {
                    self.redirected = true;
                    info!("No session, redirecting to {}", self.login);
                    self.navigator.replace(self.login.clone());
                }
                GuardDecision::Redirect
            }
        }
    }

    /// Re-evaluate on every auth-state change and hand each decision to
    /// `render`. Returns when the state channel closes.
    pub async fn run<F>(mut self, mut states: watch::Receiver<AuthState>, mut render: F)
    where
        F: FnMut(GuardDecision),
    {
        loop {
            let state = states.borrow_and_update().clone();
            render(self.evaluate(&state));
            if states.changed().await.is_err() {
                break;
            }
        }
    }
}
