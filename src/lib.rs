//! # Chamonix
//!
//! Client core of a trip planner backed by a hosted Postgres gateway
//! (REST, auth, storage and realtime).
//!
//! ## Modules
//! - `auth`: session manager, OAuth sign-in round-trip, token claims
//! - `gateway`: backend contract and the Supabase implementation
//! - `views`: live lists and one-shot loads with teardown guarantees
//! - `navigation`: routes and the sign-in gate for protected screens
//! - `services`: trips, bookings, planner, map, sharing, city search
//! - `models`: table rows and form drafts
//! - `config` / `error`: environment configuration and error types

pub mod app;
pub mod auth;
pub mod config;
pub mod error;
pub mod gateway;
pub mod models;
pub mod navigation;
pub mod services;
pub mod views;

pub use app::AppState;
pub use error::{AppError, AppResult};
