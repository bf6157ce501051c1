use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::{QueryError, QueryUpdate, VariableSet};

/// Where a subscription is in its request lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum NetworkStatus {
    /// The first fetch is in flight.
    #[default]
    Loading,
    /// The variables changed and the new result is in flight.
    SetVariables,
    /// A `fetch_more` request is in flight.
    FetchMore,
    /// A `refetch` is in flight.
    Refetch,
    /// A polling refetch is in flight.
    Poll,
    /// The latest request completed.
    Ready,
    /// The latest request failed.
    Error,
}

impl NetworkStatus {
    /// Whether the primary query shows as loading.
    /// Pagination and polling happen in the background.
    pub fn is_loading(self) -> bool {
        matches!(
            self,
            NetworkStatus::Loading | NetworkStatus::SetVariables | NetworkStatus::Refetch
        )
    }

    /// Whether any request is in flight.
    pub fn is_in_flight(self) -> bool {
        !matches!(self, NetworkStatus::Ready | NetworkStatus::Error)
    }
}

/// A synchronously readable snapshot of a binding's query.
#[derive(Debug, Clone, PartialEq)]
pub struct RenderState {
    /// True while the primary query is loading.
    /// May be true while `data` still holds the previous result.
    pub loading: bool,
    /// Detailed request status.
    pub network_status: NetworkStatus,
    /// The latest result. `None` until the first result arrives.
    pub data: Option<Value>,
    /// The latest query error.
    pub error: Option<QueryError>,
    /// The variables the state belongs to.
    pub variables: VariableSet,
}

impl Default for RenderState {
    fn default() -> Self {
        Self {
            loading: true,
            network_status: NetworkStatus::Loading,
            data: None,
            error: None,
            variables: VariableSet::new(),
        }
    }
}

impl RenderState {
    /// State of a freshly created subscription.
    pub(crate) fn loading(variables: VariableSet) -> Self {
        Self {
            variables,
            ..Self::default()
        }
    }

    /// State of a suspended binding.
    pub(crate) fn skipped(variables: VariableSet) -> Self {
        Self {
            loading: false,
            network_status: NetworkStatus::Ready,
            data: None,
            error: None,
            variables,
        }
    }

    /// State for a subscription that replaces this one after a variable change.
    pub(crate) fn with_new_variables(&self, variables: VariableSet, keep_previous_data: bool) -> Self {
        Self {
            loading: true,
            network_status: NetworkStatus::SetVariables,
            data: if keep_previous_data {
                self.data.clone()
            } else {
                None
            },
            error: None,
            variables,
        }
    }

    /// Folds a client update into the state.
    ///
    /// Primary requests drive `loading`. While one is in flight the previous
    /// data stays unless `keep_previous_data` is false. Background updates
    /// (polls, `fetch_more`, local patches) never clear data and never touch
    /// `loading`, so a pending refetch keeps showing as loading.
    /// Failed requests keep the last good data.
    pub(crate) fn apply(&mut self, update: QueryUpdate, keep_previous_data: bool) {
        let QueryUpdate {
            network_status,
            source,
            data,
            error,
            variables,
        } = update;

        if source.is_background() {
            self.apply_background(network_status, data, error);
        } else if network_status.is_in_flight() {
            self.loading = network_status.is_loading();
            match data {
                Some(data) => self.data = Some(data),
                None if keep_previous_data => {}
                None => self.data = None,
            }
            self.network_status = network_status;
        } else {
            self.loading = false;
            match data {
                Some(data) => self.data = Some(data),
                None if error.is_some() => {}
                None => self.data = None,
            }
            self.error = error;
            self.network_status = self.settled_status();
        }
        self.variables = variables;
    }

    fn apply_background(
        &mut self,
        network_status: NetworkStatus,
        data: Option<Value>,
        error: Option<QueryError>,
    ) {
        if network_status.is_in_flight() {
            if let Some(data) = data {
                self.data = Some(data);
            }
            if !self.loading {
                self.network_status = network_status;
            }
            return;
        }

        match (data, error) {
            (_, Some(error)) => self.error = Some(error),
            (Some(data), None) => {
                self.data = Some(data);
                self.error = None;
            }
            (None, None) => {}
        }
        // A pending primary request keeps its status.
        if !self.loading {
            self.network_status = self.settled_status();
        }
    }

    fn settled_status(&self) -> NetworkStatus {
        if self.error.is_some() {
            NetworkStatus::Error
        } else {
            NetworkStatus::Ready
        }
    }

    /// A top level field of the result.
    pub fn field(&self, name: &str) -> Option<&Value> {
        self.data.as_ref().and_then(|data| data.get(name))
    }

    /// Deserializes the result into a typed value.
    pub fn data_as<T: DeserializeOwned>(&self) -> Option<Result<T, serde_json::Error>> {
        self.data.clone().map(serde_json::from_value)
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::UpdateSource;

    fn vars(value: Value) -> VariableSet {
        value.as_object().cloned().unwrap_or_default()
    }

    #[test]
    fn initial_state_is_loading_without_data() {
        let state = RenderState::loading(vars(json!({ "first": 1 })));

        assert!(state.loading);
        assert_eq!(None, state.data);
        assert_eq!(NetworkStatus::Loading, state.network_status);
    }

    #[test]
    fn ready_update_settles_state() {
        let mut state = RenderState::loading(vars(json!({ "first": 1 })));
        state.apply(
            QueryUpdate::ready(vars(json!({ "first": 1 })), json!({ "people": [] })),
            true,
        );

        assert!(!state.loading);
        assert_eq!(Some(json!({ "people": [] })), state.data);
        assert_eq!(NetworkStatus::Ready, state.network_status);
    }

    #[test]
    fn refetch_keeps_previous_data() {
        let mut state = RenderState::loading(VariableSet::new());
        state.apply(QueryUpdate::ready(VariableSet::new(), json!(1)), true);
        state.apply(
            QueryUpdate::in_flight(NetworkStatus::Refetch, VariableSet::new()),
            true,
        );

        assert!(state.loading);
        assert_eq!(Some(json!(1)), state.data);
    }

    #[test]
    fn refetch_clears_data_when_configured() {
        let mut state = RenderState::loading(VariableSet::new());
        state.apply(QueryUpdate::ready(VariableSet::new(), json!(1)), false);
        state.apply(
            QueryUpdate::in_flight(NetworkStatus::Refetch, VariableSet::new()),
            false,
        );

        assert!(state.loading);
        assert_eq!(None, state.data);
    }

    #[test]
    fn background_requests_do_not_flip_loading() {
        let mut state = RenderState::loading(VariableSet::new());
        state.apply(QueryUpdate::ready(VariableSet::new(), json!(1)), true);

        for status in [NetworkStatus::FetchMore, NetworkStatus::Poll] {
            state.apply(QueryUpdate::in_flight(status, VariableSet::new()), true);
            assert!(!state.loading, "{status:?} should not show as loading");
            assert_eq!(status, state.network_status);
        }
    }

    #[test]
    fn background_requests_keep_data_without_keep_previous_data() {
        let mut state = RenderState::loading(VariableSet::new());
        state.apply(QueryUpdate::ready(VariableSet::new(), json!(1)), false);

        for status in [NetworkStatus::FetchMore, NetworkStatus::Poll] {
            state.apply(QueryUpdate::in_flight(status, VariableSet::new()), false);
            assert_eq!(Some(json!(1)), state.data, "{status:?} should keep data");
        }
    }

    #[test]
    fn background_results_leave_pending_refetch_loading() {
        let mut state = RenderState::loading(VariableSet::new());
        state.apply(QueryUpdate::ready(VariableSet::new(), json!([1])), true);
        state.apply(
            QueryUpdate::in_flight(NetworkStatus::Refetch, VariableSet::new()),
            true,
        );

        state.apply(
            QueryUpdate::ready(VariableSet::new(), json!([1, 2])).with_source(UpdateSource::FetchMore),
            true,
        );
        assert!(state.loading);
        assert_eq!(NetworkStatus::Refetch, state.network_status);
        assert_eq!(Some(json!([1, 2])), state.data);

        state.apply(
            QueryUpdate::ready(VariableSet::new(), json!([3])).with_source(UpdateSource::Poll),
            true,
        );
        assert!(state.loading);

        state.apply(QueryUpdate::ready(VariableSet::new(), json!([4])), true);
        assert!(!state.loading);
        assert_eq!(NetworkStatus::Ready, state.network_status);
    }

    #[test]
    fn error_keeps_last_data() {
        let mut state = RenderState::loading(VariableSet::new());
        state.apply(QueryUpdate::ready(VariableSet::new(), json!(1)), true);
        state.apply(
            QueryUpdate::failed(VariableSet::new(), QueryError::Network("boo".into())),
            true,
        );

        assert!(!state.loading);
        assert_eq!(Some(json!(1)), state.data);
        assert_eq!(Some(QueryError::Network("boo".into())), state.error);
        assert_eq!(NetworkStatus::Error, state.network_status);
    }

    #[test]
    fn new_variables_carry_data() {
        let mut state = RenderState::loading(vars(json!({ "first": 1 })));
        state.apply(QueryUpdate::ready(vars(json!({ "first": 1 })), json!(1)), true);

        let kept = state.with_new_variables(vars(json!({ "first": 2 })), true);
        assert!(kept.loading);
        assert_eq!(Some(json!(1)), kept.data);
        assert_eq!(NetworkStatus::SetVariables, kept.network_status);

        let cleared = state.with_new_variables(vars(json!({ "first": 2 })), false);
        assert_eq!(None, cleared.data);
    }

    #[test]
    fn typed_access() {
        #[derive(Debug, PartialEq, serde::Deserialize)]
        struct Person {
            name: String,
        }

        let mut state = RenderState::loading(VariableSet::new());
        state.apply(
            QueryUpdate::ready(VariableSet::new(), json!({ "person": { "name": "Luke" } })),
            true,
        );

        assert_eq!(Some(&json!({ "name": "Luke" })), state.field("person"));
        let person: Person = serde_json::from_value(state.field("person").cloned().unwrap()).unwrap();
        assert_eq!("Luke", person.name);
    }
}
