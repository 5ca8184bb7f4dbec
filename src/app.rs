//! # App Module
//!
//! Builds the shared application state: gateway, session manager and the
//! per-screen services.

use std::sync::Arc;
use std::time::Duration;

use tracing::info;

use crate::auth::{BrowserFlow, LoopbackBrowser, SessionManager};
use crate::config::{Config, OAuthConfig};
use crate::error::AppResult;
use crate::gateway::store::FileSessionStore;
use crate::gateway::supabase::SupabaseClient;
use crate::gateway::{AuthGateway, DataGateway};
use crate::services::{BookingService, CityIndex, MapService, PlannerService, ShareService, TripService};

/// Port the loopback redirect listener uses when none is configured
const DEFAULT_LOOPBACK_PORT: u16 = 54321;

/// How often the session is checked for an upcoming expiry
const AUTO_REFRESH_TICK: Duration = Duration::from_secs(30);

/// Application state shared by every screen
#[derive(Clone)]
pub struct AppState {
    pub sessions: Arc<SessionManager>,
    pub trips: Arc<TripService>,
    pub bookings: Arc<BookingService>,
    pub planner: Arc<PlannerService>,
    pub map: Arc<MapService>,
    pub sharing: Arc<ShareService>,
    pub cities: Arc<CityIndex>,
}

impl AppState {
    /// Assemble the state from already-built gateways.
    ///
    /// The session manager is registered for auth changes here but the
    /// persisted session is not fetched yet; call
    /// [`SessionManager::restore`] once the host is ready.
    pub fn new(
        data: Arc<dyn DataGateway>,
        auth: Arc<dyn AuthGateway>,
        browser: Arc<dyn BrowserFlow>,
        oauth: OAuthConfig,
        storage_bucket: &str,
    ) -> AppResult<Self> {
        Ok(Self {
            sessions: Arc::new(SessionManager::new(auth, browser, oauth)),
            trips: Arc::new(TripService::new(Arc::clone(&data))),
            bookings: Arc::new(BookingService::new(Arc::clone(&data), storage_bucket)),
            planner: Arc::new(PlannerService::new(Arc::clone(&data))),
            map: Arc::new(MapService::new(Arc::clone(&data))),
            sharing: Arc::new(ShareService::new(data)),
            cities: Arc::new(CityIndex::bundled()?),
        })
    }

    /// Desktop/headless entry: connect to the configured project, sign in
    /// through a loopback listener (`OAUTH_LOOPBACK_PORT`, else
    /// [`DEFAULT_LOOPBACK_PORT`]) and restore the persisted session.
    ///
    /// Hosts with their own browser flow and app-scheme redirect build the
    /// state with [`AppState::new`] instead.
    pub async fn start(config: &Config) -> AppResult<Self> {
        let store = Arc::new(FileSessionStore::new(&config.session_file));
        let client = Arc::new(SupabaseClient::new(&config.gateway, store)?);
        info!("🌐 Gateway: {}", config.gateway.url);

        let auth = client.auth();
        auth.spawn_auto_refresh(AUTO_REFRESH_TICK);

        let oauth = config.oauth.clone().loopback_or(DEFAULT_LOOPBACK_PORT);
        let port = oauth.loopback_port.unwrap_or(DEFAULT_LOOPBACK_PORT);
        let browser = Arc::new(LoopbackBrowser::new(port, oauth.timeout));

        let state = Self::new(client.clone(), auth, browser, oauth, client.storage_bucket())?;
        state.sessions.restore().await;
        Ok(state)
    }
}
