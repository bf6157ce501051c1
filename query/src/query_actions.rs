use std::cell::RefCell;
use std::rc::Rc;
use std::time::Duration;

use futures::future::{self, FutureExt, LocalBoxFuture};
use leptos::logging;
use serde_json::Value;

use crate::query_handle::QueryHandle;
use crate::{BindError, FetchMoreOptions, QueryError, VariableSet};

/// Imperative controls of a binding.
///
/// Every action acts on the subscription that is active when it is invoked,
/// so an instance cloned at mount keeps working after the variables change.
#[derive(Clone)]
pub struct QueryActions {
    operation: Rc<str>,
    current: Rc<RefCell<Option<QueryHandle>>>,
}

impl std::fmt::Debug for QueryActions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueryActions")
            .field("operation", &self.operation)
            .field("active", &self.is_active())
            .finish()
    }
}

impl PartialEq for QueryActions {
    fn eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.current, &other.current)
    }
}

impl QueryActions {
    pub(crate) fn new(operation: Rc<str>, current: Rc<RefCell<Option<QueryHandle>>>) -> Self {
        Self { operation, current }
    }

    fn active(&self) -> Option<QueryHandle> {
        self.current.borrow().clone()
    }

    /// Whether a subscription is currently active.
    pub fn is_active(&self) -> bool {
        self.current.borrow().is_some()
    }

    /// Re-executes the query.
    ///
    /// New variables are overlaid on the current ones and used for this and
    /// every later request until the props produce different variables.
    /// `loading` becomes true while the previous data stays visible.
    ///
    /// Resolves to the fresh result, or the query error.
    pub fn refetch(
        &self,
        variables: Option<VariableSet>,
    ) -> LocalBoxFuture<'static, Result<Value, QueryError>> {
        match self.active() {
            Some(handle) => handle.refetch(variables),
            None => {
                logging::debug_warn!("refetch called on inactive query '{}'.", self.operation);
                future::ready(Err(QueryError::Inactive)).boxed_local()
            }
        }
    }

    /// Executes an additional query, e.g. the next page.
    ///
    /// The variables are overlaid on the current ones. The merge function
    /// combines the previous data with the incremental result before the new
    /// state is published. `loading` is not touched.
    ///
    /// Resolves to the incremental result, not the merged one.
    pub fn fetch_more(
        &self,
        options: FetchMoreOptions,
    ) -> LocalBoxFuture<'static, Result<Value, QueryError>> {
        match self.active() {
            Some(handle) => handle.fetch_more(options),
            None => {
                logging::debug_warn!("fetch_more called on inactive query '{}'.", self.operation);
                future::ready(Err(QueryError::Inactive)).boxed_local()
            }
        }
    }

    /// Synchronously replaces the current data with `transform(previous, variables)`.
    ///
    /// No network request is made. Fails with [`BindError::PrematureUpdate`]
    /// if no result has been received yet.
    pub fn update_query(
        &self,
        transform: impl FnOnce(&Value, &VariableSet) -> Value,
    ) -> Result<(), BindError> {
        match self.active() {
            Some(handle) => handle.update_query(transform),
            None => Err(BindError::Inactive {
                operation: self.operation.to_string(),
            }),
        }
    }

    /// Starts refetching on an interval.
    pub fn start_polling(&self, interval: Duration) {
        match self.active() {
            Some(handle) => handle.start_polling(interval),
            None => {
                logging::debug_warn!(
                    "start_polling called on inactive query '{}'.",
                    self.operation
                );
            }
        }
    }

    /// Stops polling. Safe to call at any time.
    pub fn stop_polling(&self) {
        if let Some(handle) = self.active() {
            handle.stop_polling();
        }
    }

    /// The current poll interval, if polling.
    pub fn poll_interval(&self) -> Option<Duration> {
        self.active().and_then(|handle| handle.polling())
    }
}

#[cfg(test)]
mod tests {
    use futures::FutureExt;
    use serde_json::json;

    use super::*;

    fn inactive() -> QueryActions {
        QueryActions::new(Rc::from("people"), Rc::new(RefCell::new(None)))
    }

    #[test]
    fn inactive_requests_fail() {
        let actions = inactive();

        assert!(!actions.is_active());
        assert_eq!(
            Some(Err(QueryError::Inactive)),
            actions.refetch(None).now_or_never()
        );
        assert_eq!(
            Some(Err(QueryError::Inactive)),
            actions
                .fetch_more(FetchMoreOptions::new(|previous, _, _| previous.clone()))
                .now_or_never()
        );
    }

    #[test]
    fn inactive_update_query() {
        let actions = inactive();

        assert_eq!(
            Err(BindError::Inactive {
                operation: "people".to_string()
            }),
            actions.update_query(|_, _| json!(null))
        );
    }

    #[test]
    fn clones_are_equal() {
        let actions = inactive();

        assert_eq!(actions, actions.clone());
        assert_ne!(actions, inactive());
    }

    #[test]
    fn polling_is_a_no_op_when_inactive() {
        let actions = inactive();

        actions.start_polling(Duration::from_secs(1));
        actions.stop_polling();

        assert_eq!(None, actions.poll_interval());
    }
}
