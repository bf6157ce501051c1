use std::rc::Rc;
use std::time::Duration;

use futures::future::LocalBoxFuture;
use leptos::{create_memo, Signal, SignalWith};
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::{
    BindError, FetchMoreOptions, NetworkStatus, QueryActions, QueryError, RenderState, VariableSet,
};

/// The default props a binding passes to its component.
///
/// The render state merged with the imperative actions.
#[derive(Clone, Debug, PartialEq)]
pub struct QueryProps {
    /// True while the primary query is loading.
    pub loading: bool,
    /// Detailed request status.
    pub network_status: NetworkStatus,
    /// The latest result.
    pub data: Option<Value>,
    /// The latest query error.
    pub error: Option<QueryError>,
    /// The variables of the current subscription.
    pub variables: VariableSet,
    /// Imperative controls, always bound to the current subscription.
    pub actions: QueryActions,
}

impl QueryProps {
    /// Combines a render state with the actions.
    pub fn new(state: &RenderState, actions: QueryActions) -> Self {
        Self {
            loading: state.loading,
            network_status: state.network_status,
            data: state.data.clone(),
            error: state.error.clone(),
            variables: state.variables.clone(),
            actions,
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

    /// See [`QueryActions::refetch`].
    pub fn refetch(
        &self,
        variables: Option<VariableSet>,
    ) -> LocalBoxFuture<'static, Result<Value, QueryError>> {
        self.actions.refetch(variables)
    }

    /// See [`QueryActions::fetch_more`].
    pub fn fetch_more(
        &self,
        options: FetchMoreOptions,
    ) -> LocalBoxFuture<'static, Result<Value, QueryError>> {
        self.actions.fetch_more(options)
    }

    /// See [`QueryActions::update_query`].
    pub fn update_query(
        &self,
        transform: impl FnOnce(&Value, &VariableSet) -> Value,
    ) -> Result<(), BindError> {
        self.actions.update_query(transform)
    }

    /// See [`QueryActions::start_polling`].
    pub fn start_polling(&self, interval: Duration) {
        self.actions.start_polling(interval)
    }

    /// See [`QueryActions::stop_polling`].
    pub fn stop_polling(&self) {
        self.actions.stop_polling()
    }
}

/// What a custom projection receives on every render.
#[derive(Debug)]
pub struct ProjectionInput<'a, P> {
    /// The default props.
    pub data: &'a QueryProps,
    /// The props the wrapped component was given.
    pub own_props: &'a P,
}

/// Maps render state and own props to the props of the wrapped component.
pub struct Projector<P, T> {
    project: Rc<dyn Fn(ProjectionInput<'_, P>) -> T>,
}

impl<P, T> Clone for Projector<P, T> {
    fn clone(&self) -> Self {
        Self {
            project: self.project.clone(),
        }
    }
}

impl<P, T> std::fmt::Debug for Projector<P, T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Projector").finish_non_exhaustive()
    }
}

impl<P> Default for Projector<P, QueryProps> {
    fn default() -> Self {
        Self {
            project: Rc::new(|input: ProjectionInput<'_, P>| input.data.clone()),
        }
    }
}

impl<P, T> Projector<P, T> {
    /// A projection whose output replaces the default props entirely.
    pub fn custom(project: impl Fn(ProjectionInput<'_, P>) -> T + 'static) -> Self {
        Self {
            project: Rc::new(project),
        }
    }

    /// Projects one snapshot.
    pub fn project(&self, state: &RenderState, own_props: &P, actions: &QueryActions) -> T {
        let data = QueryProps::new(state, actions.clone());
        (self.project)(ProjectionInput {
            data: &data,
            own_props,
        })
    }
}

impl<P: 'static, T: PartialEq + 'static> Projector<P, T> {
    /// Re-projects whenever the render state or the own props change.
    ///
    /// The projection is memoized. Readers share one projected value and are
    /// only notified when it changes.
    pub fn derive(
        &self,
        state: Signal<RenderState>,
        own_props: Signal<P>,
        actions: QueryActions,
    ) -> Signal<T> {
        let projector = self.clone();
        create_memo(move |_| {
            state.with(|state| own_props.with(|own| projector.project(state, own, &actions)))
        })
        .into()
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;

    use leptos::*;
    use serde_json::json;

    use super::*;

    fn actions() -> QueryActions {
        QueryActions::new(Rc::from("people"), Rc::new(RefCell::new(None)))
    }

    fn settled(data: Value) -> RenderState {
        RenderState {
            loading: false,
            network_status: NetworkStatus::Ready,
            data: Some(data),
            error: None,
            variables: VariableSet::new(),
        }
    }

    #[test]
    fn default_projection_passes_state_through() {
        let _ = create_runtime();
        let state = settled(json!({ "person": { "name": "Luke" } }));

        let props = Projector::<(), QueryProps>::default().project(&state, &(), &actions());

        assert!(!props.loading);
        assert_eq!(Some(&json!({ "name": "Luke" })), props.field("person"));
        assert_eq!(None, props.field("planet"));
    }

    #[test]
    fn custom_projection_sees_own_props() {
        let _ = create_runtime();
        let projector = Projector::custom(|input: ProjectionInput<'_, String>| {
            format!(
                "{} {}",
                input.own_props,
                input.data.field("count").cloned().unwrap_or_default()
            )
        });

        let label = projector.project(&settled(json!({ "count": 3 })), &"count".to_string(), &actions());

        assert_eq!("count 3", label);
    }

    #[test]
    fn derived_signal_tracks_state() {
        let _ = create_runtime();
        let state = RwSignal::new(RenderState::default());
        let own = RwSignal::new(1);
        let projector = Projector::custom(|input: ProjectionInput<'_, i32>| {
            (input.data.loading, *input.own_props)
        });

        let derived = projector.derive(state.into(), own.into(), actions());
        assert_eq!((true, 1), derived.get_untracked());

        state.set(settled(json!(null)));
        own.set(2);
        assert_eq!((false, 2), derived.get_untracked());
    }

    #[test]
    fn projection_runs_once_per_change() {
        let _ = create_runtime();
        let state = RwSignal::new(RenderState::default());
        let runs = Rc::new(std::cell::Cell::new(0));
        let projector = Projector::custom({
            let runs = runs.clone();
            move |input: ProjectionInput<'_, ()>| {
                runs.set(runs.get() + 1);
                input.data.data.clone()
            }
        });

        let derived = projector.derive(state.into(), Signal::derive(|| ()), actions());
        for _ in 0..3 {
            derived.with_untracked(|data| assert_eq!(None, *data));
        }
        assert_eq!(1, runs.get());

        state.set(settled(json!({ "count": 1 })));
        derived.with_untracked(|_| ());
        derived.with_untracked(|_| ());
        assert_eq!(2, runs.get());
    }

    #[test]
    fn inactive_actions() {
        let _ = create_runtime();
        let props = QueryProps::new(&RenderState::default(), actions());

        assert_eq!(
            Some(Err(QueryError::Inactive)),
            futures::FutureExt::now_or_never(props.refetch(None))
        );
        assert!(matches!(
            props.update_query(|previous, _| previous.clone()),
            Err(BindError::Inactive { .. })
        ));
        props.stop_polling();
    }
}
