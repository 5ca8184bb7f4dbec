//! Authentication Models
//!
//! Session, user identity and auth-state types shared by the session manager,
//! the sign-in flow and the gateway implementations.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Authenticated user identity carried by a session
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: Uuid,
    #[serde(default)]
    pub email: Option<String>,
}

/// Token bundle issued by the identity gateway
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    pub access_token: String,
    pub refresh_token: String,
    /// Expiry as unix seconds
    #[serde(default)]
    pub expires_at: Option<i64>,
    #[serde(default = "default_token_type")]
    pub token_type: String,
    pub user: User,
}

fn default_token_type() -> String {
    "bearer".to_string()
}

impl Session {
    /// Whether the access token expires within `margin_secs` from now
    pub fn expires_within(&self, margin_secs: i64) -> bool {
        match self.expires_at {
            Some(exp) => exp - margin_secs <= Utc::now().timestamp(),
            None => false,
        }
    }

    pub fn is_expired(&self) -> bool {
        self.expires_within(0)
    }

    pub fn user_id(&self) -> Uuid {
        self.user.id
    }
}

/// Access/refresh token pair extracted from an OAuth redirect
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
}

impl std::fmt::Debug for TokenPair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenPair")
            .field("access_token", &"<redacted>")
            .field("refresh_token", &"<redacted>")
            .finish()
    }
}

/// Kind of change reported by the gateway's auth-state notification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AuthChangeEvent {
    InitialSession,
    SignedIn,
    SignedOut,
    TokenRefreshed,
}

/// What the session manager exposes to the rest of the application
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthState {
    /// True only until the persisted session has been fetched once
    pub loading: bool,
    pub session: Option<Session>,
}

impl AuthState {
    pub fn loading() -> Self {
        Self {
            loading: true,
            session: None,
        }
    }

    pub fn is_authenticated(&self) -> bool {
        !self.loading && self.session.is_some()
    }

    pub fn user(&self) -> Option<&User> {
        self.session.as_ref().map(|s| &s.user)
    }
}

/// Identity providers supported by the sign-in flow
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Provider {
    Google,
    Other(String),
}

impl Provider {
    pub fn as_str(&self) -> &str {
        match self {
            Self::Google => "google",
            Self::Other(name) => name,
        }
    }
}

impl From<&str> for Provider {
    fn from(name: &str) -> Self {
        match name.to_ascii_lowercase().as_str() {
            "google" => Self::Google,
            other => Self::Other(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session_expiring_at(expires_at: Option<i64>) -> Session {
        Session {
            access_token: "a".into(),
            refresh_token: "r".into(),
            expires_at,
            token_type: "bearer".into(),
            user: User {
                id: Uuid::new_v4(),
                email: None,
            },
        }
    }

    #[test]
    fn expiry_checks() {
        let now = Utc::now().timestamp();
        assert!(session_expiring_at(Some(now - 10)).is_expired());
        assert!(!session_expiring_at(Some(now + 3600)).is_expired());
        assert!(session_expiring_at(Some(now + 30)).expires_within(60));
        assert!(!session_expiring_at(None).is_expired());
    }

    #[test]
    fn token_pair_debug_hides_secrets() {
        let pair = TokenPair {
            access_token: "secret-access".into(),
            refresh_token: "secret-refresh".into(),
        };
        let printed = format!("{:?}", pair);
        assert!(!printed.contains("secret"));
    }

    #[test]
    fn auth_state_flags() {
        let state = AuthState::loading();
        assert!(state.loading);
        assert!(!state.is_authenticated());
    }

    #[test]
    fn session_deserializes_gateway_payload() {
        let json = serde_json::json!({
            "access_token": "a",
            "refresh_token": "r",
            "expires_in": 3600,
            "expires_at": 1_700_000_000,
            "user": { "id": "7c9e6679-7425-40de-944b-e07fc1f90ae7", "email": "ana@example.com", "aud": "authenticated" }
        });
        let session: Session = serde_json::from_value(json).unwrap();
        assert_eq!(session.token_type, "bearer");
        assert_eq!(session.user.email.as_deref(), Some("ana@example.com"));
    }
}
