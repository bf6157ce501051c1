use std::rc::Rc;

use leptos::Signal;

use crate::use_graphql::mount_binding;
use crate::{
    BindError, OptionsSource, ProjectionInput, Projector, PropSource, QueryDocument, QueryOptions,
    QueryProps,
};

/// Creates a binder that attaches a query to a component.
///
/// The wrapped component receives its own props together with the projected
/// query state, and re-renders whenever either changes.
///
/// # Example
///
/// ```
/// use leptos::*;
/// use leptos_graphql::*;
/// use serde_json::{json, Value};
///
/// fn people_list(props: GraphqlProps<Value, QueryProps>) -> impl IntoView {
///     let data = props.data;
///     move || {
///         data.with(|data| {
///             if data.loading {
///                 "Loading...".to_string()
///             } else {
///                 data.field("allPeople").map(Value::to_string).unwrap_or_default()
///             }
///         })
///     }
/// }
///
/// #[component]
/// pub fn App() -> impl IntoView {
///     let people = graphql(
///         QueryDocument::new(
///             "people",
///             "query people($first: Int!) { allPeople(first: $first) { people { name } } }",
///         )
///         .variable("first", "Int!"),
///     )
///     .wrap(people_list);
///
///     people(Signal::derive(|| json!({ "first": 10 })))
///         .map(IntoView::into_view)
///         .unwrap_or_else(|error| error.to_string().into_view())
/// }
/// ```
pub fn graphql<P>(document: QueryDocument) -> Graphql<P, QueryProps>
where
    P: PropSource + 'static,
{
    Graphql {
        document: Rc::new(document),
        options: OptionsSource::default(),
        projector: Projector::default(),
        display_name: None,
    }
}

/// Configuration of a query binding. See [`graphql()`].
pub struct Graphql<P: 'static, T: 'static = QueryProps> {
    document: Rc<QueryDocument>,
    options: OptionsSource<P>,
    projector: Projector<P, T>,
    display_name: Option<String>,
}

impl<P: 'static, T: 'static> std::fmt::Debug for Graphql<P, T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Graphql")
            .field("document", &self.document.operation_name())
            .field("options", &self.options)
            .field("display_name", &self.display_name)
            .finish()
    }
}

/// Props of a wrapped component.
pub struct GraphqlProps<P: 'static, T: 'static> {
    /// The props the wrapped component was given.
    pub own_props: Signal<P>,
    /// The projected query state.
    pub data: Signal<T>,
}

impl<P: 'static, T: 'static> Clone for GraphqlProps<P, T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<P: 'static, T: 'static> Copy for GraphqlProps<P, T> {}

impl<P: 'static, T: 'static> std::fmt::Debug for GraphqlProps<P, T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GraphqlProps").finish_non_exhaustive()
    }
}

impl<P, T> Graphql<P, T>
where
    P: PropSource + 'static,
    T: PartialEq + 'static,
{
    /// The same options for every props cycle.
    pub fn options(self, options: QueryOptions) -> Self {
        Graphql {
            options: options.into(),
            ..self
        }
    }

    /// Options computed from the current props.
    pub fn options_fn(self, options: impl Fn(&P) -> QueryOptions + 'static) -> Self {
        Graphql {
            options: OptionsSource::from_fn(options),
            ..self
        }
    }

    /// Replaces the default props with a custom projection.
    ///
    /// The projection is memoized, so the component is only notified when
    /// its output changes.
    pub fn props<U: PartialEq + 'static>(
        self,
        project: impl Fn(ProjectionInput<'_, P>) -> U + 'static,
    ) -> Graphql<P, U> {
        Graphql {
            document: self.document,
            options: self.options,
            projector: Projector::custom(project),
            display_name: self.display_name,
        }
    }

    /// The component name used in error messages.
    /// Defaults to the name of the wrapped function.
    pub fn display_name(self, display_name: impl Into<String>) -> Self {
        Graphql {
            display_name: Some(display_name.into()),
            ..self
        }
    }

    /// Wraps a component.
    ///
    /// Every call of the returned function mounts a new binding under the
    /// current reactive owner, with its own subscription. Panics of the
    /// component are not caught.
    pub fn wrap<C, V>(self, component: C) -> impl Fn(Signal<P>) -> Result<V, BindError>
    where
        C: Fn(GraphqlProps<P, T>) -> V + 'static,
    {
        let Graphql {
            document,
            options,
            projector,
            display_name,
        } = self;
        let display_name = display_name.unwrap_or_else(|| short_type_name::<C>());

        move |own_props: Signal<P>| {
            let result = mount_binding(document.clone(), options.clone(), own_props, &display_name)?;
            let data = projector.derive(result.state, own_props, result.actions);
            Ok(component(GraphqlProps { own_props, data }))
        }
    }
}

fn short_type_name<C>() -> String {
    let name = std::any::type_name::<C>();
    let path = name.split('<').next().unwrap_or(name);
    path.rsplit("::")
        .find(|segment| !segment.starts_with('{'))
        .unwrap_or(path)
        .to_string()
}
