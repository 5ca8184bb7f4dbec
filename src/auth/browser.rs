//! Browser step of the OAuth sign-in.
//!
//! [`BrowserFlow`] opens the provider's authorization URL and waits until
//! the provider redirects back to the app (or the user gives up).
//! [`LoopbackBrowser`] is the desktop/headless implementation: it listens on
//! `127.0.0.1` for the redirect and hands the final URL back to the caller.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axum::{
    Router,
    extract::{RawQuery, State},
    response::Html,
    routing::get,
};
use parking_lot::Mutex;
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};
use url::Url;

/// Capture endpoint for a callback path: `<callback>/complete`, so the two
/// routes never overlap whatever the callback path is
fn capture_path(callback_path: &str) -> String {
    format!("{}/complete", callback_path.trim_end_matches('/'))
}

/// How the browser round-trip ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BrowserOutcome {
    /// The provider redirected back; `url` is the full redirect URL
    Success { url: String },
    Cancel,
    Dismiss,
    Error(String),
}

#[async_trait]
pub trait BrowserFlow: Send + Sync {
    /// Open `auth_url` and wait for a redirect to `redirect_uri`
    async fn open_auth_session(&self, auth_url: &Url, redirect_uri: &str) -> BrowserOutcome;
}

/// Receives the redirect on a local HTTP listener
#[derive(Debug, Clone)]
pub struct LoopbackBrowser {
    port: u16,
    timeout: Duration,
}

#[derive(Clone)]
struct CaptureState {
    redirect_uri: String,
    sender: Arc<Mutex<Option<oneshot::Sender<String>>>>,
}

impl LoopbackBrowser {
    pub fn new(port: u16, timeout: Duration) -> Self {
        Self { port, timeout }
    }

    fn router(callback_path: &str, state: CaptureState) -> Router {
        Router::new()
            .route(callback_path, get(relay_page))
            .route(&capture_path(callback_path), get(capture))
            .layer(ServiceBuilder::new().layer(TraceLayer::new_for_http()))
            .with_state(state)
    }
}

#[async_trait]
impl BrowserFlow for LoopbackBrowser {
    async fn open_auth_session(&self, auth_url: &Url, redirect_uri: &str) -> BrowserOutcome {
        let callback_path = match Url::parse(redirect_uri) {
            Ok(url) => url.path().to_string(),
            Err(e) => return BrowserOutcome::Error(format!("invalid redirect URI: {}", e)),
        };

        let addr = SocketAddr::from(([127, 0, 0, 1], self.port));
        let listener = match TcpListener::bind(addr).await {
            Ok(listener) => listener,
            Err(e) => return BrowserOutcome::Error(format!("cannot listen on {}: {}", addr, e)),
        };

        let (tx, rx) = oneshot::channel::<String>();
        let state = CaptureState {
            redirect_uri: redirect_uri.to_string(),
            sender: Arc::new(Mutex::new(Some(tx))),
        };
        let app = Self::router(&callback_path, state);

        let (stop_tx, stop_rx) = oneshot::channel::<()>();
        let server = tokio::spawn(async move {
            axum::serve(listener, app)
                .with_graceful_shutdown(async {
                    let _ = stop_rx.await;
                })
                .await
        });

        info!("🔑 Open this URL in your browser to sign in:");
        info!("{}", auth_url);

        let outcome = match tokio::time::timeout(self.timeout, rx).await {
            Ok(Ok(url)) => BrowserOutcome::Success { url },
            Ok(Err(_)) => BrowserOutcome::Error("redirect listener stopped".to_string()),
            Err(_) => {
                warn!("No redirect within {:?}, treating sign-in as dismissed", self.timeout);
                BrowserOutcome::Dismiss
            }
        };

        let _ = stop_tx.send(());
        match server.await {
            Ok(Err(e)) => warn!("Redirect listener error: {}", e),
            Err(e) => warn!("Redirect listener task failed: {}", e),
            Ok(Ok(())) => {}
        }
        outcome
    }
}

/// The provider puts tokens in the URL fragment, which never reaches the
/// server, so this page re-sends fragment and query as a query string to
/// the capture endpoint below its own path.
async fn relay_page() -> Html<&'static str> {
    Html(
        r#"<!doctype html>
<html><body><p>Completing sign-in…</p>
<script>
  var parts = [];
  if (window.location.hash.length > 1) parts.push(window.location.hash.substring(1));
  if (window.location.search.length > 1) parts.push(window.location.search.substring(1));
  var capture = window.location.pathname.replace(/\/+$/, '') + '/complete';
  window.location.replace(capture + '?' + parts.join('&'));
</script>
</body></html>"#,
    )
}

async fn capture(State(state): State<CaptureState>, RawQuery(query): RawQuery) -> Html<&'static str> {
    let redirect = format!("{}#{}", state.redirect_uri, query.unwrap_or_default());
    if let Some(sender) = state.sender.lock().take() {
        let _ = sender.send(redirect);
    }
    Html("<!doctype html><html><body><p>Sign-in complete. You can close this window.</p></body></html>")
}
