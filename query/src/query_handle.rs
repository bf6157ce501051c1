use std::cell::{Cell, RefCell};
use std::rc::{Rc, Weak};
use std::time::Duration;

use futures::future::{FutureExt, LocalBoxFuture};
use leptos::{logging, RwSignal, SignalUpdate, SignalWithUntracked};
use serde_json::Value;

use crate::{
    BindError, FetchMoreOptions, MergeFn, NetworkStatus, QueryError, QuerySubscription,
    QueryUpdate, RenderState, UpdateSource, VariableSet,
};

/// State shared between a handle and the listener it gave to the client.
pub(crate) struct HandleShared {
    operation: Rc<str>,
    generation: u64,
    current_generation: Rc<Cell<u64>>,
    active: Cell<bool>,
    has_data: Cell<bool>,
    variables: RefCell<VariableSet>,
    polling: Cell<Option<Duration>>,
    keep_previous_data: Rc<Cell<bool>>,
    state: RwSignal<RenderState>,
    subscription: RefCell<Option<Weak<dyn QuerySubscription>>>,
    pending_merges: RefCell<Vec<(VariableSet, MergeFn)>>,
}

impl HandleShared {
    pub(crate) fn new(
        operation: Rc<str>,
        generation: u64,
        current_generation: Rc<Cell<u64>>,
        variables: VariableSet,
        keep_previous_data: Rc<Cell<bool>>,
        state: RwSignal<RenderState>,
    ) -> Self {
        Self {
            operation,
            generation,
            current_generation,
            active: Cell::new(true),
            has_data: Cell::new(false),
            variables: RefCell::new(variables),
            polling: Cell::new(None),
            keep_previous_data,
            state,
            subscription: RefCell::new(None),
            pending_merges: RefCell::new(Vec::new()),
        }
    }

    /// Whether this handle may still publish state.
    pub(crate) fn is_current(&self) -> bool {
        self.active.get() && self.current_generation.get() == self.generation
    }

    pub(crate) fn variables(&self) -> VariableSet {
        self.variables.borrow().clone()
    }

    /// Publishes an update, unless it belongs to a superseded handle or variables.
    pub(crate) fn deliver(&self, update: QueryUpdate) {
        if !self.is_current() {
            logging::debug_warn!(
                "Dropped update for '{}' from a superseded subscription.",
                self.operation
            );
            return;
        }

        if update.source == UpdateSource::FetchMore && !update.network_status.is_in_flight() {
            self.merge_more(update);
        } else {
            self.publish(update);
        }
    }

    fn publish(&self, update: QueryUpdate) {
        let tracked = *self.variables.borrow() == update.variables;
        if !tracked {
            logging::debug_warn!(
                "Dropped update for '{}' produced for superseded variables.",
                self.operation
            );
            return;
        }

        if update.data.is_some() {
            self.has_data.set(true);
        }

        let keep_previous_data = self.keep_previous_data.get();
        self.state.update(|state| state.apply(update, keep_previous_data));
    }

    /// Merges a settled `fetch_more` result into the current data and writes
    /// the merged result back to the client.
    fn merge_more(&self, update: QueryUpdate) {
        let pending = {
            let mut merges = self.pending_merges.borrow_mut();
            merges
                .iter()
                .position(|(variables, _)| *variables == update.variables)
                .map(|index| merges.remove(index))
        };
        let Some((variables, merge)) = pending else {
            logging::debug_warn!(
                "Dropped fetch_more result for '{}' that this binding did not request.",
                self.operation
            );
            return;
        };

        let merged = match (update.data, update.error) {
            (Some(incremental), None) => {
                let previous = self
                    .state
                    .with_untracked(|state| state.data.clone())
                    .unwrap_or(Value::Null);
                Some(merge(&previous, &incremental, &variables))
            }
            _ => None,
        };

        // Failures only settle the status. The request's future reports the error.
        self.publish(QueryUpdate {
            network_status: NetworkStatus::Ready,
            source: UpdateSource::FetchMore,
            data: merged.clone(),
            error: None,
            variables: self.variables(),
        });

        let subscription = self.subscription.borrow().as_ref().and_then(Weak::upgrade);
        if let (Some(merged), Some(subscription)) = (merged, subscription) {
            subscription.update_local_result(Box::new(move |_, _| merged));
        }
    }
}

/// The single live subscription of a binding.
#[derive(Clone)]
pub(crate) struct QueryHandle {
    inner: Rc<HandleInner>,
}

struct HandleInner {
    subscription: Rc<dyn QuerySubscription>,
    shared: Rc<HandleShared>,
}

impl std::fmt::Debug for QueryHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueryHandle")
            .field("operation", &self.inner.shared.operation)
            .field("generation", &self.inner.shared.generation)
            .field("active", &self.inner.shared.active.get())
            .field("subscription", &"...")
            .finish()
    }
}

impl QueryHandle {
    pub(crate) fn new(subscription: Box<dyn QuerySubscription>, shared: Rc<HandleShared>) -> Self {
        let subscription: Rc<dyn QuerySubscription> = Rc::from(subscription);
        *shared.subscription.borrow_mut() = Some(Rc::downgrade(&subscription));
        Self {
            inner: Rc::new(HandleInner {
                subscription,
                shared,
            }),
        }
    }

    pub(crate) fn generation(&self) -> u64 {
        self.inner.shared.generation
    }

    pub(crate) fn polling(&self) -> Option<Duration> {
        self.inner.shared.polling.get()
    }

    /// Re-executes the query, optionally adopting new variables.
    pub(crate) fn refetch(
        &self,
        variables: Option<VariableSet>,
    ) -> LocalBoxFuture<'static, Result<Value, QueryError>> {
        let shared = self.inner.shared.clone();

        // New variables are overlaid on the tracked ones.
        let variables = variables.map(|variables| {
            let mut merged = shared.variables();
            merged.extend(variables);
            *shared.variables.borrow_mut() = merged.clone();
            // Pages fetched for the old variables no longer apply.
            shared.pending_merges.borrow_mut().clear();
            merged
        });
        shared.deliver(QueryUpdate::in_flight(
            NetworkStatus::Refetch,
            shared.variables(),
        ));

        let request = self.inner.subscription.refetch(variables);
        async move {
            let result = request.await;
            if !shared.is_current() {
                logging::debug_warn!(
                    "Refetch of '{}' settled after its subscription was released.",
                    shared.operation
                );
            }
            result
        }
        .boxed_local()
    }

    /// Executes an additional query on top of the tracked variables.
    ///
    /// The result is merged here once the client publishes it.
    pub(crate) fn fetch_more(
        &self,
        options: FetchMoreOptions,
    ) -> LocalBoxFuture<'static, Result<Value, QueryError>> {
        let FetchMoreOptions { variables, merge } = options;
        let shared = &self.inner.shared;

        let mut request = shared.variables();
        if let Some(variables) = variables {
            request.extend(variables);
        }

        shared
            .pending_merges
            .borrow_mut()
            .push((request.clone(), merge));
        shared.deliver(QueryUpdate::in_flight(
            NetworkStatus::FetchMore,
            shared.variables(),
        ));

        self.inner.subscription.fetch_more(request)
    }

    /// Patches the local result without a network request.
    pub(crate) fn update_query(
        &self,
        transform: impl FnOnce(&Value, &VariableSet) -> Value,
    ) -> Result<(), BindError> {
        let premature = || BindError::PrematureUpdate {
            operation: self.inner.shared.operation.to_string(),
        };

        if !self.inner.shared.has_data.get() {
            return Err(premature());
        }

        if self
            .inner
            .subscription
            .update_local_result(Box::new(transform))
        {
            Ok(())
        } else {
            Err(premature())
        }
    }

    pub(crate) fn start_polling(&self, interval: Duration) {
        self.inner.shared.polling.set(Some(interval));
        self.inner.subscription.start_polling(interval);
    }

    pub(crate) fn stop_polling(&self) {
        if self.inner.shared.polling.take().is_some() {
            self.inner.subscription.stop_polling();
        }
    }

    /// Stops polling and unsubscribes. Later deliveries are dropped.
    pub(crate) fn release(&self) {
        if !self.inner.shared.active.replace(false) {
            return;
        }
        self.stop_polling();
        self.inner.subscription.unsubscribe();
    }
}
