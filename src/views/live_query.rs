//! Live lists backed by a change subscription.
//!
//! A [`LiveQuery`] fetches its list once, subscribes to the table's change
//! feed and refetches the whole list on every notification. Changing the
//! scope key (e.g. the trip id) releases the old subscription before the new
//! one is opened. Results that belong to an old scope, or that arrive after
//! the query was closed, are dropped.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::de::DeserializeOwned;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error};
use uuid::Uuid;

use crate::error::AppResult;
use crate::gateway::{ChangeCallback, ChangeEvent, DataGateway, Filter, Order, Query, Subscription, decode_rows};
use crate::views::ViewState;

/// Which table a live list reads, how it is scoped and ordered
#[derive(Debug, Clone)]
pub struct ListSpec {
    pub table: &'static str,
    /// Column the scope key filters on; `None` for lists that are not scoped
    pub scope_column: Option<&'static str>,
    pub order: Vec<Order>,
}

impl ListSpec {
    pub fn new(table: &'static str) -> Self {
        Self {
            table,
            scope_column: None,
            order: Vec::new(),
        }
    }

    pub fn scoped_by(mut self, column: &'static str) -> Self {
        self.scope_column = Some(column);
        self
    }

    pub fn order(mut self, order: Order) -> Self {
        self.order.push(order);
        self
    }

    /// A scoped list has nothing to show until it has a key
    fn accepts(&self, scope: Option<Uuid>) -> bool {
        self.scope_column.is_none() || scope.is_some()
    }

    fn filter(&self, scope: Option<Uuid>) -> Option<Filter> {
        self.scope_column.zip(scope).map(|(column, key)| Filter::eq(column, key))
    }

    pub fn query(&self, scope: Option<Uuid>) -> Query {
        let mut query = Query::table(self.table);
        if let Some(filter) = self.filter(scope) {
            query = query.filter(filter);
        }
        for order in &self.order {
            query = query.order(order.clone());
        }
        query
    }
}

#[derive(Debug, Clone, Copy)]
struct Refetch {
    epoch: u64,
    scope: Option<Uuid>,
}

pub struct LiveQuery<T> {
    gateway: Arc<dyn DataGateway>,
    spec: ListSpec,
    scope: Option<Uuid>,
    subscription: Option<Subscription>,
    /// Bumped on scope change and on close; results tagged with an older
    /// epoch are never applied
    epoch: Arc<AtomicU64>,
    requests: mpsc::UnboundedSender<Refetch>,
    state: Arc<watch::Sender<ViewState<Vec<T>>>>,
    worker: JoinHandle<()>,
}

impl<T> LiveQuery<T>
where
    T: DeserializeOwned + Send + Sync + 'static,
{
    /// Subscribe and issue the initial fetch
    pub async fn open(gateway: Arc<dyn DataGateway>, spec: ListSpec, scope: Option<Uuid>) -> AppResult<Self> {
        let (state, _) = watch::channel(ViewState::Loading);
        let state = Arc::new(state);
        let epoch = Arc::new(AtomicU64::new(0));
        let (requests, queue) = mpsc::unbounded_channel();

        let worker = tokio::spawn(refetch_loop(
            Arc::clone(&gateway),
            spec.clone(),
            Arc::clone(&epoch),
            queue,
            Arc::clone(&state),
        ));

        let mut live = Self {
            gateway,
            spec,
            scope,
            subscription: None,
            epoch,
            requests,
            state,
            worker,
        };
        live.attach().await?;
        Ok(live)
    }

    async fn attach(&mut self) -> AppResult<()> {
        if !self.spec.accepts(self.scope) {
            debug!("No scope key for {}, nothing to load", self.spec.table);
            return Ok(());
        }

        let request = Refetch {
            epoch: self.epoch.load(Ordering::SeqCst),
            scope: self.scope,
        };
        let table = self.spec.table;
        let requests = self.requests.clone();
        let on_change: ChangeCallback = Arc::new(move |change: ChangeEvent| {
            debug!("{:?} on {}, refetching", change.kind, table);
            let _ = requests.send(request);
        });

        match self.gateway.subscribe(table, self.spec.filter(self.scope), on_change).await {
            Ok(subscription) => self.subscription = Some(subscription),
            Err(e) => {
                error!("Error subscribing to {}: {}", table, e);
                self.state.send_replace(ViewState::Failed(e.user_message()));
                return Err(e);
            }
        }

        let _ = self.requests.send(request);
        Ok(())
    }

    /// Point the list at a different scope key.
    ///
    /// The current subscription is released first, then the new one is
    /// opened and fetched. Same key is a no-op.
    pub async fn set_scope(&mut self, scope: Option<Uuid>) -> AppResult<()> {
        if scope == self.scope {
            return Ok(());
        }

        let epoch = &self.epoch;
        self.state.send_modify(|state| {
            epoch.fetch_add(1, Ordering::SeqCst);
            *state = ViewState::Loading;
        });
        if let Some(previous) = self.subscription.take() {
            previous.unsubscribe();
        }

        self.scope = scope;
        self.attach().await
    }

    /// Queue a full refetch, as if a change had been received
    pub fn refresh(&self) {
        if self.spec.accepts(self.scope) {
            let _ = self.requests.send(Refetch {
                epoch: self.epoch.load(Ordering::SeqCst),
                scope: self.scope,
            });
        }
    }
}

impl<T> LiveQuery<T> {
    pub fn state(&self) -> watch::Receiver<ViewState<Vec<T>>> {
        self.state.subscribe()
    }

    pub fn current(&self) -> ViewState<Vec<T>>
    where
        T: Clone,
    {
        self.state.borrow().clone()
    }

    pub fn scope(&self) -> Option<Uuid> {
        self.scope
    }

    /// Release the subscription and stop applying results
    pub fn close(self) {}
}

impl<T> Drop for LiveQuery<T> {
    fn drop(&mut self) {
        self.epoch.fetch_add(1, Ordering::SeqCst);
        if let Some(subscription) = self.subscription.take() {
            subscription.unsubscribe();
        }
        self.worker.abort();
        debug!("Live query on {} closed", self.spec.table);
    }
}

async fn fetch<T: DeserializeOwned>(
    gateway: &dyn DataGateway,
    spec: &ListSpec,
    scope: Option<Uuid>,
) -> AppResult<Vec<T>> {
    let rows = gateway.select(&spec.query(scope)).await?;
    decode_rows(rows)
}

async fn refetch_loop<T>(
    gateway: Arc<dyn DataGateway>,
    spec: ListSpec,
    epoch: Arc<AtomicU64>,
    mut queue: mpsc::UnboundedReceiver<Refetch>,
    state: Arc<watch::Sender<ViewState<Vec<T>>>>,
) where
    T: DeserializeOwned + Send + Sync + 'static,
{
    while let Some(mut request) = queue.recv().await {
        // A burst of notifications needs only one fetch
        while let Ok(next) = queue.try_recv() {
            request = next;
        }
        if request.epoch != epoch.load(Ordering::SeqCst) {
            continue;
        }

        let result = fetch::<T>(gateway.as_ref(), &spec, request.scope).await;
        if let Err(e) = &result {
            error!("Error fetching {}: {}", spec.table, e);
        }

        let next = ViewState::from_result(result);
        let applied = state.send_if_modified(|current| {
            if epoch.load(Ordering::SeqCst) != request.epoch {
                return false;
            }
            *current = next;
            true
        });
        if !applied {
            debug!("Dropped stale {} result", spec.table);
        }
    }
}
