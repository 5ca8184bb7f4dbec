//! # Authentication Module
//!
//! Session state, the OAuth sign-in round-trip and access-token claims.
//! [`SessionManager`] is the entry point for the rest of the application.

pub mod browser;
pub mod jwt;
pub mod models;
pub mod oauth;
pub mod session_manager;

pub use browser::{BrowserFlow, BrowserOutcome, LoopbackBrowser};
pub use models::{AuthChangeEvent, AuthState, Session, User};
pub use oauth::OAuthFlow;
pub use session_manager::SessionManager;
