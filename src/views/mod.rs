//! # Views Module
//!
//! Screen-side data holders. [`LiveQuery`] keeps a list in sync with the
//! gateway by refetching on every change notification; [`Mounted`] loads a
//! single record for a detail screen. Both stop applying results once the
//! owning view is gone.

pub mod live_query;
pub mod loader;

pub use live_query::{ListSpec, LiveQuery};
pub use loader::Mounted;

use crate::error::AppResult;

/// What a screen renders for one piece of remote data
#[derive(Debug, Clone, PartialEq)]
pub enum ViewState<T> {
    Loading,
    Ready(T),
    NotFound,
    /// Fetch failed; carries the message shown to the user
    Failed(String),
}

impl<T> ViewState<T> {
    pub fn from_result(result: AppResult<T>) -> Self {
        match result {
            Ok(value) => Self::Ready(value),
            Err(e) if e.is_not_found() => Self::NotFound,
            Err(e) => Self::Failed(e.user_message()),
        }
    }

    pub fn is_loading(&self) -> bool {
        matches!(self, Self::Loading)
    }

    pub fn ready(&self) -> Option<&T> {
        match self {
            Self::Ready(value) => Some(value),
            _ => None,
        }
    }
}
