//! # Navigation Module
//!
//! Routes of the app and the gate in front of the protected ones.

pub mod guard;
pub mod route;

pub use guard::{GuardDecision, RouteGuard};
pub use route::{Route, TripTab};

/// Host-provided navigation
pub trait Navigator: Send + Sync {
    /// Replace the current route without adding a history entry
    fn replace(&self, route: Route);
}
