use std::{
    collections::{BTreeMap, HashMap},
    hash::BuildHasher,
    time::Duration,
};

use serde_json::Value;

use crate::{BindError, QueryDocument, QueryOptions};

/// Variables sent with a query, keyed by name.
///
/// Two sets are equal when they hold the same keys with structurally equal values.
pub type VariableSet = serde_json::Map<String, Value>;

/// Props that variables can be looked up on by name.
///
/// The default implementation exposes nothing, which is enough for props
/// whose bindings always supply variables through [`QueryOptions::variables`].
pub trait PropSource {
    /// Returns the prop with the given name, if present.
    /// An explicit `null` is present.
    fn prop(&self, name: &str) -> Option<Value> {
        let _ = name;
        None
    }
}

impl PropSource for () {}

impl PropSource for VariableSet {
    fn prop(&self, name: &str) -> Option<Value> {
        self.get(name).cloned()
    }
}

impl PropSource for Value {
    fn prop(&self, name: &str) -> Option<Value> {
        self.as_object().and_then(|props| props.get(name)).cloned()
    }
}

impl<S: BuildHasher> PropSource for HashMap<String, Value, S> {
    fn prop(&self, name: &str) -> Option<Value> {
        self.get(name).cloned()
    }
}

impl PropSource for BTreeMap<String, Value> {
    fn prop(&self, name: &str) -> Option<Value> {
        self.get(name).cloned()
    }
}

/// The outcome of resolving one props cycle.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedQuery {
    /// Variables for the subscription.
    pub variables: VariableSet,
    /// Whether the binding is suspended.
    pub skip: bool,
    /// Interval between automatic refetches.
    pub poll_interval: Option<Duration>,
    /// Keep previous data while loading.
    pub keep_previous_data: bool,
}

/// Looks up every declared variable on the props.
///
/// Optional variables that are absent are omitted.
/// A missing required variable fails with [`BindError::MissingVariable`].
pub fn variables_from_props<P>(
    document: &QueryDocument,
    props: &P,
    component: &str,
) -> Result<VariableSet, BindError>
where
    P: PropSource + ?Sized,
{
    let mut variables = VariableSet::new();
    for definition in document.variables() {
        match props.prop(&definition.name) {
            Some(value) => {
                variables.insert(definition.name.clone(), value);
            }
            None if definition.is_required() => {
                return Err(BindError::MissingVariable {
                    operation: document.operation_name().to_string(),
                    variable: definition.name.clone(),
                    component: component.to_string(),
                });
            }
            None => {}
        }
    }
    Ok(variables)
}

/// Resolves the variables and settings for one props cycle.
///
/// Variables from the options are used verbatim. Skipped cycles do not
/// require their variables, so a query can wait for a prop to appear.
pub fn resolve_query<P>(
    document: &QueryDocument,
    props: &P,
    options: QueryOptions,
    component: &str,
) -> Result<ResolvedQuery, BindError>
where
    P: PropSource + ?Sized,
{
    let QueryOptions {
        variables,
        skip,
        poll_interval,
        keep_previous_data,
    } = options;

    let variables = match variables {
        Some(variables) => variables,
        None if skip => {
            variables_from_props(document, props, component).unwrap_or_default()
        }
        None => variables_from_props(document, props, component)?,
    };

    Ok(ResolvedQuery {
        variables,
        skip,
        poll_interval,
        keep_previous_data,
    })
}
