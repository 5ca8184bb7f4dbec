//! One-shot loads for detail screens.

use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error};

use crate::error::AppResult;
use crate::views::ViewState;

/// A fetch tied to the lifetime of the view that started it.
///
/// Once the view unmounts (or the value is dropped) the fetch is cancelled
/// and a late result is discarded.
pub struct Mounted<T> {
    state: watch::Receiver<ViewState<T>>,
    mounted: Arc<AtomicBool>,
    task: JoinHandle<()>,
}

impl<T> Mounted<T>
where
    T: Send + Sync + 'static,
{
    pub fn load<F>(what: &'static str, fetch: F) -> Self
    where
        F: Future<Output = AppResult<T>> + Send + 'static,
    {
        let (tx, rx) = watch::channel(ViewState::Loading);
        let mounted = Arc::new(AtomicBool::new(true));
        let alive = Arc::clone(&mounted);

        let task = tokio::spawn(async move {
            let result = fetch.await;
            if !alive.load(Ordering::SeqCst) {
                debug!("View unmounted, dropping {} result", what);
                return;
            }
            if let Err(e) = &result {
                error!("Error fetching {}: {}", what, e);
            }
            tx.send_replace(ViewState::from_result(result));
        });

        Self {
            state: rx,
            mounted,
            task,
        }
    }
}

impl<T> Mounted<T> {
    pub fn state(&self) -> watch::Receiver<ViewState<T>> {
        self.state.clone()
    }

    pub fn current(&self) -> ViewState<T>
    where
        T: Clone,
    {
        self.state.borrow().clone()
    }

    pub fn unmount(self) {}
}

impl<T> Drop for Mounted<T> {
    fn drop(&mut self) {
        self.mounted.store(false, Ordering::SeqCst);
        self.task.abort();
    }
}
