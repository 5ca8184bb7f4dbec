//! Cancellable subscription handles.
//!
//! Every "watch" call on the gateway (auth-state listener, realtime change
//! feed) hands back a [`Subscription`]. Releasing it runs the gateway's
//! unsubscribe action exactly once, whether the owner calls
//! [`Subscription::unsubscribe`] or simply drops the handle.

use std::fmt;

type Unsubscribe = Box<dyn FnOnce() + Send + 'static>;

pub struct Subscription {
    id: u64,
    unsubscribe: Option<Unsubscribe>,
}

impl Subscription {
    pub fn new<F>(id: u64, unsubscribe: F) -> Self
    where
        F: FnOnce() + Send + 'static,
    {
        Self {
            id,
            unsubscribe: Some(Box::new(unsubscribe)),
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn is_active(&self) -> bool {
        self.unsubscribe.is_some()
    }

    /// Release the subscription now.
    pub fn unsubscribe(mut self) {
        self.release();
    }

    fn release(&mut self) {
        if let Some(unsubscribe) = self.unsubscribe.take() {
            unsubscribe();
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.release();
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("id", &self.id)
            .field("active", &self.is_active())
            .finish()
    }
}
