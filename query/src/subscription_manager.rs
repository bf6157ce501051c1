use std::cell::{Cell, RefCell};
use std::rc::Rc;
use std::time::Duration;

use leptos::{logging, RwSignal, SignalGetUntracked, SignalSet, SignalWithUntracked};

use crate::query_handle::{HandleShared, QueryHandle};
use crate::{
    GraphqlClient, Listener, QueryDocument, QueryRequest, RenderState, ResolvedQuery,
};

/// Lifecycle of a binding's subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ManagerState {
    /// No subscription. Before mount and after unmount.
    Unbound,
    /// Suspended by `skip`. No subscription.
    Skipped,
    /// A subscription is delivering state.
    Bound,
}

/// Decides on every lifecycle event whether the current handle is kept,
/// replaced or released.
///
/// The old handle is always released before a new subscription is created,
/// and each handle carries a generation so late deliveries from a released
/// handle are dropped.
pub(crate) struct SubscriptionManager {
    client: GraphqlClient,
    document: Rc<QueryDocument>,
    operation: Rc<str>,
    state: RwSignal<RenderState>,
    phase: RwSignal<ManagerState>,
    current: Rc<RefCell<Option<QueryHandle>>>,
    generation: Rc<Cell<u64>>,
    keep_previous_data: Rc<Cell<bool>>,
    mounted: Cell<bool>,
    last: RefCell<Option<ResolvedQuery>>,
}

impl SubscriptionManager {
    pub(crate) fn new(
        client: GraphqlClient,
        document: Rc<QueryDocument>,
        state: RwSignal<RenderState>,
        phase: RwSignal<ManagerState>,
    ) -> Self {
        let operation: Rc<str> = Rc::from(document.operation_name());
        Self {
            client,
            document,
            operation,
            state,
            phase,
            current: Rc::new(RefCell::new(None)),
            generation: Rc::new(Cell::new(0)),
            keep_previous_data: Rc::new(Cell::new(true)),
            mounted: Cell::new(false),
            last: RefCell::new(None),
        }
    }

    /// The cell actions read the active handle from.
    pub(crate) fn current(&self) -> Rc<RefCell<Option<QueryHandle>>> {
        self.current.clone()
    }

    pub(crate) fn operation(&self) -> Rc<str> {
        self.operation.clone()
    }

    pub(crate) fn mount(&self, resolved: ResolvedQuery) {
        if self.mounted.replace(true) {
            logging::debug_warn!("'{}' is already mounted.", self.operation);
            return;
        }
        self.transition(resolved);
    }

    /// Runs one props cycle.
    pub(crate) fn sync(&self, resolved: ResolvedQuery) {
        if !self.mounted.get() {
            logging::debug_warn!(
                "Ignored props update for '{}' after unmount.",
                self.operation
            );
            return;
        }
        self.transition(resolved);
    }

    /// Releases the subscription. Nothing is delivered afterwards.
    pub(crate) fn unmount(&self) {
        if !self.mounted.replace(false) {
            return;
        }
        self.release();
        self.last.replace(None);
        self.set_phase(ManagerState::Unbound);
    }

    fn transition(&self, resolved: ResolvedQuery) {
        self.keep_previous_data.set(resolved.keep_previous_data);
        let previous = self.last.replace(Some(resolved.clone()));

        if resolved.skip {
            if self.phase.get_untracked() != ManagerState::Skipped {
                self.release();
                self.set_phase(ManagerState::Skipped);
                self.state.set(RenderState::skipped(resolved.variables));
            }
            return;
        }

        match (self.phase.get_untracked(), previous) {
            (ManagerState::Bound, Some(previous)) if previous.variables == resolved.variables => {
                if previous.poll_interval != resolved.poll_interval {
                    self.restart_polling(resolved.poll_interval);
                }
            }
            (ManagerState::Bound, _) => {
                let next = self.state.with_untracked(|state| {
                    state.with_new_variables(resolved.variables.clone(), resolved.keep_previous_data)
                });
                self.release();
                self.subscribe(resolved, next);
            }
            (ManagerState::Unbound | ManagerState::Skipped, _) => {
                let next = RenderState::loading(resolved.variables.clone());
                self.subscribe(resolved, next);
            }
        }
    }

    fn subscribe(&self, resolved: ResolvedQuery, initial: RenderState) {
        let ResolvedQuery {
            variables,
            poll_interval,
            ..
        } = resolved;

        let generation = self.generation.get() + 1;
        self.generation.set(generation);

        // Set before watching: the client may deliver a cached result synchronously.
        self.state.set(initial);

        let shared = Rc::new(HandleShared::new(
            self.operation.clone(),
            generation,
            self.generation.clone(),
            variables.clone(),
            self.keep_previous_data.clone(),
            self.state,
        ));
        let listener: Listener = {
            let shared = shared.clone();
            Box::new(move |update| shared.deliver(update))
        };

        let request = QueryRequest {
            document: self.document.clone(),
            variables,
        };
        let subscription = self.client.watch_query(request, listener);
        let handle = QueryHandle::new(subscription, shared);

        if let Some(interval) = poll_interval {
            handle.start_polling(interval);
        }

        *self.current.borrow_mut() = Some(handle);
        self.set_phase(ManagerState::Bound);
    }

    fn release(&self) {
        let handle = self.current.borrow_mut().take();
        if let Some(handle) = handle {
            handle.release();
        }
        self.generation.set(self.generation.get() + 1);
    }

    fn restart_polling(&self, interval: Option<Duration>) {
        let handle = self.current.borrow().clone();
        if let Some(handle) = handle {
            handle.stop_polling();
            if let Some(interval) = interval {
                handle.start_polling(interval);
            }
        }
    }

    fn set_phase(&self, phase: ManagerState) {
        if self.phase.get_untracked() != phase {
            self.phase.set(phase);
        }
    }
}
