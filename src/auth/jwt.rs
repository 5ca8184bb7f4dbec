//! Access Token Claims
//!
//! Reads identity and expiry from the gateway-issued access token. The
//! signature is not verified here: the gateway verifies every request, the
//! client only needs to know who it is and when to refresh.

use jsonwebtoken::{DecodingKey, Validation, decode};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::auth::models::{Session, TokenPair, User};
use crate::error::{AuthError, AuthResult};

/// Claims the gateway puts into its access tokens
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Claims {
    /// User unique identifier
    pub sub: Uuid,
    #[serde(default)]
    pub email: Option<String>,
    /// Token expiration timestamp
    pub exp: i64,
    #[serde(default)]
    pub role: Option<String>,
}

/// Decoder for access-token claims
#[derive(Clone)]
pub struct ClaimsReader {
    key: DecodingKey,
    validation: Validation,
}

impl Default for ClaimsReader {
    fn default() -> Self {
        Self::new()
    }
}

impl ClaimsReader {
    pub fn new() -> Self {
        let mut validation = Validation::default();
        validation.insecure_disable_signature_validation();
        validation.validate_exp = false;
        validation.validate_aud = false;
        validation.required_spec_claims.clear();

        Self {
            key: DecodingKey::from_secret(&[]),
            validation,
        }
    }

    /// Extract claims from a token without checking its signature
    pub fn read(&self, token: &str) -> AuthResult<Claims> {
        decode::<Claims>(token, &self.key, &self.validation)
            .map(|data| data.claims)
            .map_err(|e| AuthError::InvalidToken(e.to_string()))
    }

    /// Build a session from a token pair using the access token's claims
    pub fn session_from_tokens(&self, tokens: &TokenPair) -> AuthResult<Session> {
        let claims = self.read(&tokens.access_token)?;
        Ok(Session {
            access_token: tokens.access_token.clone(),
            refresh_token: tokens.refresh_token.clone(),
            expires_at: Some(claims.exp),
            token_type: "bearer".to_string(),
            user: User {
                id: claims.sub,
                email: claims.email,
            },
        })
    }
}

/// Mint an HS256 access token for tests
#[cfg(test)]
pub(crate) fn test_token(user_id: Uuid, email: &str, exp: i64) -> String {
    use jsonwebtoken::{EncodingKey, Header, encode};

    let claims = Claims {
        sub: user_id,
        email: Some(email.to_string()),
        exp,
        role: Some("authenticated".to_string()),
    };
    encode(&Header::default(), &claims, &EncodingKey::from_secret(b"test-secret"))
        .expect("encode test token")
}
