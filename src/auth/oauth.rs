//! OAuth sign-in flow.
//!
//! Asks the auth gateway for the provider's authorization URL, runs the
//! browser round-trip, pulls the token pair out of the redirect and hands it
//! back to the gateway to establish the session.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::{debug, info, warn};
use url::Url;

use crate::auth::browser::{BrowserFlow, BrowserOutcome};
use crate::auth::models::{Provider, Session, TokenPair};
use crate::config::OAuthConfig;
use crate::error::{AppResult, AuthError, AuthResult};
use crate::gateway::{AuthGateway, OAuthRequest};

pub struct OAuthFlow {
    auth: Arc<dyn AuthGateway>,
    browser: Arc<dyn BrowserFlow>,
    config: OAuthConfig,
}

impl OAuthFlow {
    pub fn new(auth: Arc<dyn AuthGateway>, browser: Arc<dyn BrowserFlow>, config: OAuthConfig) -> Self {
        Self { auth, browser, config }
    }

    /// Authorization request for the configured provider.
    ///
    /// Offline access with forced consent so the provider always issues a
    /// refresh token.
    pub fn request(&self) -> OAuthRequest {
        OAuthRequest {
            provider: Provider::from(self.config.provider.as_str()),
            redirect_uri: self.config.redirect_uri(),
            query_params: vec![
                ("access_type".to_string(), "offline".to_string()),
                ("prompt".to_string(), "consent".to_string()),
            ],
        }
    }

    /// Run the full sign-in round-trip.
    ///
    /// The session itself is published by the gateway's auth-state
    /// notification; the returned value is for the caller's convenience.
    pub async fn sign_in(&self) -> AppResult<Session> {
        let request = self.request();
        info!("Starting {} sign-in (redirect: {})", request.provider.as_str(), request.redirect_uri);

        let auth_url = self.auth.sign_in_with_oauth(&request).await?;
        debug!("Authorization URL: {}", auth_url);

        let redirect = match self.browser.open_auth_session(&auth_url, &request.redirect_uri).await {
            BrowserOutcome::Success { url } => url,
            BrowserOutcome::Cancel => return Err(AuthError::Cancelled.into()),
            BrowserOutcome::Dismiss => return Err(AuthError::Dismissed.into()),
            BrowserOutcome::Error(message) => return Err(AuthError::Browser(message).into()),
        };

        let tokens = parse_redirect(&redirect)?;
        let session = self.auth.set_session(&tokens).await?;
        info!("✅ Signed in as {}", session.user.email.as_deref().unwrap_or("<no email>"));
        Ok(session)
    }
}

/// Extract the token pair from a redirect URI.
///
/// Parameters are read from the fragment first, then the query string. An
/// `error` parameter from the provider wins over any tokens.
pub fn parse_redirect(redirect: &str) -> AuthResult<TokenPair> {
    let url = Url::parse(redirect).map_err(|e| AuthError::MalformedRedirect(e.to_string()))?;

    let mut params: HashMap<String, String> = HashMap::new();
    if let Some(fragment) = url.fragment() {
        for (key, value) in url::form_urlencoded::parse(fragment.as_bytes()) {
            params.entry(key.into_owned()).or_insert_with(|| value.into_owned());
        }
    }
    for (key, value) in url.query_pairs() {
        params.entry(key.into_owned()).or_insert_with(|| value.into_owned());
    }

    if let Some(code) = params.get("error") {
        let description = params.get("error_description").cloned().unwrap_or_default();
        warn!("Provider rejected sign-in: {} {}", code, description);
        return Err(AuthError::Provider {
            code: code.clone(),
            description,
        });
    }

    let token = |key: &'static str| {
        params
            .get(key)
            .filter(|v| !v.is_empty())
            .cloned()
            .ok_or(AuthError::MissingToken(key))
    };

    Ok(TokenPair {
        access_token: token("access_token")?,
        refresh_token: token("refresh_token")?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::jwt::test_token;
    use crate::error::AppError;
    use crate::gateway::mock::{MockBrowser, MockGateway};
    use chrono::Utc;
    use uuid::Uuid;

    fn flow(gateway: Arc<MockGateway>, browser: Arc<MockBrowser>) -> OAuthFlow {
        OAuthFlow::new(gateway, browser, OAuthConfig::default())
    }

    #[test]
    fn tokens_come_from_fragment() {
        let tokens = parse_redirect("chamonix://auth/callback#access_token=abc&refresh_token=def&expires_in=3600").unwrap();
        assert_eq!(tokens.access_token, "abc");
        assert_eq!(tokens.refresh_token, "def");
    }

    #[test]
    fn query_is_used_when_fragment_lacks_tokens() {
        let tokens = parse_redirect("chamonix://auth/callback?access_token=q1&refresh_token=q2").unwrap();
        assert_eq!(tokens.access_token, "q1");

        let mixed = parse_redirect("chamonix://auth/callback?access_token=old&refresh_token=r#access_token=new").unwrap();
        assert_eq!(mixed.access_token, "new");
        assert_eq!(mixed.refresh_token, "r");
    }

    #[test]
    fn missing_tokens_are_reported_by_name() {
        assert_eq!(
            parse_redirect("chamonix://auth/callback#refresh_token=r"),
            Err(AuthError::MissingToken("access_token"))
        );
        assert_eq!(
            parse_redirect("chamonix://auth/callback#access_token=a&refresh_token="),
            Err(AuthError::MissingToken("refresh_token"))
        );
        assert!(matches!(parse_redirect("not a url"), Err(AuthError::MalformedRedirect(_))));
    }

    #[test]
    fn provider_error_is_explicit() {
        let err = parse_redirect("chamonix://auth/callback#error=access_denied&error_description=User+denied").unwrap_err();
        assert_eq!(
            err,
            AuthError::Provider {
                code: "access_denied".into(),
                description: "User denied".into()
            }
        );
    }

    #[test]
    fn request_asks_for_offline_access() {
        let flow = flow(MockGateway::new(), MockBrowser::returning(BrowserOutcome::Cancel));
        let request = flow.request();
        assert_eq!(request.provider, Provider::Google);
        assert_eq!(request.redirect_uri, "chamonix://auth/callback");
        assert!(request.query_params.contains(&("access_type".into(), "offline".into())));
        assert!(request.query_params.contains(&("prompt".into(), "consent".into())));
    }

    #[tokio::test]
    async fn successful_round_trip_sets_session() {
        let gateway = MockGateway::new();
        let user = Uuid::new_v4();
        let access = test_token(user, "ana@example.com", Utc::now().timestamp() + 3600);
        let browser = MockBrowser::returning(BrowserOutcome::Success {
            url: format!("chamonix://auth/callback#access_token={}&refresh_token=r1", access),
        });

        let session = flow(gateway.clone(), browser.clone()).sign_in().await.unwrap();

        assert_eq!(session.user.id, user);
        assert_eq!(gateway.count("auth:set_session"), 1);
        let opened = browser.opened.lock();
        assert_eq!(opened.len(), 1);
        assert_eq!(opened[0].1, "chamonix://auth/callback");
    }

    #[tokio::test]
    async fn cancel_and_dismiss_never_touch_the_session() {
        let gateway = MockGateway::new();
        let browser = MockBrowser::returning(BrowserOutcome::Cancel);
        let flow = flow(gateway.clone(), browser.clone());

        let err = flow.sign_in().await.unwrap_err();
        assert!(matches!(err, AppError::Auth(AuthError::Cancelled)));

        browser.set_outcome(BrowserOutcome::Dismiss);
        let err = flow.sign_in().await.unwrap_err();
        assert!(matches!(err, AppError::Auth(AuthError::Dismissed)));

        assert_eq!(gateway.count("auth:set_session"), 0);
        assert_eq!(gateway.get_session().await.unwrap(), None);
    }

    #[tokio::test]
    async fn redirect_without_access_token_is_rejected() {
        let gateway = MockGateway::new();
        let browser = MockBrowser::returning(BrowserOutcome::Success {
            url: "chamonix://auth/callback#refresh_token=r1".into(),
        });

        let err = flow(gateway.clone(), browser).sign_in().await.unwrap_err();

        assert!(matches!(err, AppError::Auth(AuthError::MissingToken("access_token"))));
        assert_eq!(gateway.count("auth:set_session"), 0);
    }
}
