use std::rc::Rc;

use leptos::*;

use crate::subscription_manager::{ManagerState, SubscriptionManager};
use crate::{
    resolve_query, use_query_client, BindError, OptionsSource, PropSource, QueryActions,
    QueryDocument, RenderState,
};

/// Reactive result of a binding.
#[derive(Clone, Debug)]
pub struct GraphqlResult {
    /// The latest render state.
    pub state: Signal<RenderState>,
    /// Imperative controls, always bound to the current subscription.
    pub actions: QueryActions,
    /// Whether the binding is subscribed, skipped or torn down.
    pub phase: Signal<ManagerState>,
}

/// Binds a query to the current reactive owner.
///
/// The query subscribes immediately and follows `props`: whenever the props
/// resolve to different variables the subscription is replaced, and while
/// `skip` is set there is no subscription at all. The subscription is
/// released when the owner is disposed.
///
/// Fails when no client is provided, or when a required variable is missing
/// from the props at mount. A later props update that loses a required
/// variable is logged and the current subscription is kept.
///
/// Example
/// ```
/// use std::rc::Rc;
///
/// use leptos::*;
/// use leptos_graphql::*;
/// use serde_json::json;
///
/// #[component]
/// fn Person(id: i64) -> impl IntoView {
///     let document = Rc::new(
///         QueryDocument::new("person", "query person($id: ID!) { person(id: $id) { name } }")
///             .variable("id", "ID!"),
///     );
///     let props = Signal::derive(move || json!({ "id": id }));
///
///     match use_graphql(document, OptionsSource::default(), props) {
///         Ok(GraphqlResult { state, .. }) => view! {
///             <p>
///                 {move || state.with(|state| {
///                     state.field("person").map(|person| person["name"].to_string())
///                 })}
///             </p>
///         }
///         .into_view(),
///         Err(error) => view! { <p>{error.to_string()}</p> }.into_view(),
///     }
/// }
/// ```
pub fn use_graphql<P>(
    document: Rc<QueryDocument>,
    options: OptionsSource<P>,
    props: Signal<P>,
) -> Result<GraphqlResult, BindError>
where
    P: PropSource + 'static,
{
    mount_binding(document, options, props, "use_graphql")
}

pub(crate) fn mount_binding<P>(
    document: Rc<QueryDocument>,
    options: OptionsSource<P>,
    props: Signal<P>,
    component: &str,
) -> Result<GraphqlResult, BindError>
where
    P: PropSource + 'static,
{
    let client = use_query_client().ok_or_else(|| BindError::MissingClient {
        operation: document.operation_name().to_string(),
    })?;

    let resolve = {
        let document = document.clone();
        let component: Rc<str> = Rc::from(component);
        move |props: &P| resolve_query(&document, props, options.evaluate(props), &component)
    };

    // Configuration errors surface before anything is created.
    let resolved = props.with_untracked(&resolve)?;

    let state = RwSignal::new(RenderState::loading(resolved.variables.clone()));
    let phase = RwSignal::new(ManagerState::Unbound);
    let manager = Rc::new(SubscriptionManager::new(client, document, state, phase));
    manager.mount(resolved);

    create_isomorphic_effect({
        let manager = manager.clone();
        move |prev: Option<()>| {
            // Mount already ran the first cycle.
            if prev.is_none() {
                props.track();
                return;
            }
            match props.with(&resolve) {
                Ok(resolved) => manager.sync(resolved),
                Err(error) => logging::error!("{error}"),
            }
        }
    });

    let actions = QueryActions::new(manager.operation(), manager.current());

    on_cleanup(move || manager.unmount());

    Ok(GraphqlResult {
        state: state.into(),
        actions,
        phase: phase.into(),
    })
}
