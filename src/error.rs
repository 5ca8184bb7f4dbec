//! Error types for the Chamonix client core.
//!
//! Gateway failures, authentication failures, missing records and form
//! validation failures are kept apart so that each screen can decide how to
//! surface them (alert, inline message, or a dedicated "not found" state).

use chrono::NaiveDate;
use thiserror::Error;

/// Application-wide error type.
#[derive(Error, Debug)]
pub enum AppError {
    /// The gateway answered with a non-success status
    #[error("Gateway error ({status}): {message}")]
    Gateway { status: u16, message: String },

    /// The request never produced a response
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    /// Authentication or sign-in failure
    #[error(transparent)]
    Auth(#[from] AuthError),

    /// Requested record does not exist (or is not visible to the user)
    #[error("{entity} '{id}' not found")]
    NotFound { entity: &'static str, id: String },

    /// Form input rejected before any request was sent
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// Row or payload could not be (de)serialized
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Local storage failure (persisted session file)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Realtime channel failure
    #[error("Realtime error: {0}")]
    Realtime(String),

    /// Missing or invalid configuration
    #[error("Configuration error: {0}")]
    Config(String),
}

impl AppError {
    pub fn gateway(status: u16, message: impl Into<String>) -> Self {
        Self::Gateway {
            status,
            message: message.into(),
        }
    }

    pub fn not_found(entity: &'static str, id: impl Into<String>) -> Self {
        Self::NotFound {
            entity,
            id: id.into(),
        }
    }

    pub fn realtime(message: impl Into<String>) -> Self {
        Self::Realtime(message.into())
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    pub fn is_validation(&self) -> bool {
        matches!(self, Self::Validation(_))
    }

    /// Text shown to the user in an alert or inline message.
    ///
    /// Validation failures are shown verbatim since they describe what the
    /// user must fix. Everything else collapses to a generic message; the
    /// details go to the log at the call site.
    pub fn user_message(&self) -> String {
        match self {
            Self::Validation(err) => err.to_string(),
            Self::NotFound { entity, .. } => format!("{} not found", capitalize(entity)),
            Self::Auth(AuthError::NotAuthenticated) => "Please sign in to continue".to_string(),
            Self::Auth(_) => "Failed to sign in. Please try again.".to_string(),
            _ => "Something went wrong. Please try again.".to_string(),
        }
    }
}

fn capitalize(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

/// Failures of the sign-in flow and of session handling.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AuthError {
    #[error("Sign-in was cancelled")]
    Cancelled,

    #[error("Sign-in window was dismissed")]
    Dismissed,

    #[error("Browser flow failed: {0}")]
    Browser(String),

    #[error("Redirect URI is missing the '{0}' parameter")]
    MissingToken(&'static str),

    #[error("Malformed redirect URI: {0}")]
    MalformedRedirect(String),

    #[error("Identity provider returned an error: {code}: {description}")]
    Provider { code: String, description: String },

    #[error("Access token could not be decoded: {0}")]
    InvalidToken(String),

    #[error("No authenticated session")]
    NotAuthenticated,

    /// The user signed in or out while a token refresh was in flight
    #[error("Session changed during token refresh")]
    Superseded,

    #[error("Auth gateway error: {0}")]
    Gateway(String),
}

/// Form validation failures. Raised before any gateway call is made.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ValidationError {
    /// Carries the field with its article, e.g. "a location"
    #[error("Please enter {0}")]
    MissingField(&'static str),

    #[error("End date ({end}) cannot be before start date ({start})")]
    DateRange { start: NaiveDate, end: NaiveDate },

    #[error("'{0}' is not a valid email address")]
    InvalidEmail(String),

    #[error("Day must be 1 or later (got {0})")]
    InvalidDay(i32),

    #[error("Coordinates out of range: {latitude}, {longitude}")]
    InvalidCoordinates { latitude: f64, longitude: f64 },
}

/// A type alias for `Result<T, AppError>`.
pub type AppResult<T> = std::result::Result<T, AppError>;

/// A type alias for `Result<T, AuthError>`.
pub type AuthResult<T> = std::result::Result<T, AuthError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validation_messages_are_shown_verbatim() {
        let err = AppError::from(ValidationError::MissingField("a location"));
        assert_eq!(err.user_message(), "Please enter a location");
        assert!(err.is_validation());
    }

    #[test]
    fn gateway_failures_collapse_to_generic_alert() {
        let err = AppError::gateway(500, "relation \"trips\" does not exist");
        assert_eq!(err.user_message(), "Something went wrong. Please try again.");
    }

    #[test]
    fn not_found_is_distinct() {
        let err = AppError::not_found("trip", "42");
        assert!(err.is_not_found());
        assert_eq!(err.user_message(), "Trip not found");
        assert_eq!(err.to_string(), "trip '42' not found");
    }

    #[test]
    fn auth_failures_keep_user_on_sign_in() {
        let err = AppError::from(AuthError::Cancelled);
        assert_eq!(err.user_message(), "Failed to sign in. Please try again.");
    }
}
