//! # Chamonix runner
//!
//! Headless front end for the trip-planner core: restores the saved session,
//! signs in through the browser when needed, then prints the trips list and
//! keeps it live until Ctrl+C.
//!
//! ## Environment Setup
//! ```bash
//! SUPABASE_URL=https://<project>.supabase.co
//! SUPABASE_ANON_KEY=<anon key>
//! OAUTH_LOOPBACK_PORT=54321   # redirect URL registered with the provider
//! ```
//!
//! ## Running
//! ```bash
//! cargo run              # sign in if needed, then watch trips
//! cargo run -- sign-out  # forget the saved session
//! ```

use std::sync::Arc;

use anyhow::{Context, Result};
use chamonix::AppState;
use chamonix::config::CONFIG;
use chamonix::models::Trip;
use chamonix::navigation::{GuardDecision, Navigator, Route, RouteGuard, TripTab};
use chamonix::views::ViewState;
use tracing::{error, info, warn};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

/// Logs navigation requests; the runner has a single screen
struct ConsoleNavigator;

impl Navigator for ConsoleNavigator {
    fn replace(&self, route: Route) {
        info!("➡️  Navigate to {}", route);
    }
}

fn print_trips(state: &ViewState<Vec<Trip>>) {
    match state {
        ViewState::Loading => info!("Loading trips..."),
        ViewState::Ready(trips) if trips.is_empty() => info!("No trips yet"),
        ViewState::Ready(trips) => {
            info!("🧳 {} trip(s):", trips.len());
            for trip in trips {
                info!(
                    "  {}  {} → {}  {}",
                    trip.location,
                    trip.start_date,
                    trip.end_date,
                    Route::trip(trip.id, TripTab::Planner)
                );
            }
        }
        ViewState::NotFound => warn!("Trips not found"),
        ViewState::Failed(message) => error!("{}", message),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false) // Don't show module targets for cleaner output
                .compact(),
        )
        .init();

    info!("🏁 Starting Chamonix...");
    info!("📦 Package: {} v{}", env!("CARGO_PKG_NAME"), env!("CARGO_PKG_VERSION"));

    let app = AppState::start(&CONFIG).await.context("Failed to start client")?;

    if std::env::args().nth(1).as_deref() == Some("sign-out") {
        app.sessions.sign_out().await;
        return Ok(());
    }

    // Gate the trips screen on the session
    let guard = RouteGuard::new(Arc::new(ConsoleNavigator));
    let gate = tokio::spawn(guard.run(app.sessions.subscribe(), |decision| match decision {
        GuardDecision::Suspend => info!("⏳ Waiting for session"),
        GuardDecision::Redirect => info!("🔒 Sign-in required"),
        GuardDecision::Render(session) => {
            info!("👤 {}", session.user.email.as_deref().unwrap_or("signed in"))
        }
    }));

    if app.sessions.session().is_none() {
        if let Err(e) = app.sessions.sign_in_with_google().await {
            error!("{}", e.user_message());
            return Ok(());
        }
    }

    let trips = app.trips.watch().await.context("Failed to open trips list")?;
    let mut state = trips.state();
    print_trips(&state.borrow_and_update());

    loop {
        tokio::select! {
            changed = state.changed() => {
                if changed.is_err() {
                    break;
                }
                print_trips(&state.borrow_and_update());
            }
            _ = tokio::signal::ctrl_c() => {
                info!("Shutting down");
                break;
            }
        }
    }

    trips.close();
    app.sessions.shutdown();
    gate.abort();
    Ok(())
}
