use std::{rc::Rc, time::Duration};

use crate::VariableSet;

/// Default options for all bindings under this client.
#[derive(Debug, Clone, Copy)]
pub struct DefaultQueryOptions {
    /// Interval between automatic refetches. `None` disables polling.
    pub poll_interval: Option<Duration>,
    /// Keep showing the previous data while new variables or a refetch are loading.
    pub keep_previous_data: bool,
}

impl Default for DefaultQueryOptions {
    fn default() -> Self {
        Self {
            poll_interval: None,
            keep_previous_data: true,
        }
    }
}

/**
 * Options for a binding, see [`graphql()`](crate::graphql()) and [`use_graphql()`](crate::use_graphql()).
 */
#[derive(Debug, Clone, PartialEq)]
pub struct QueryOptions {
    /// Variables to use verbatim.
    /// If `None`, the declared variables are looked up on the props by name.
    pub variables: Option<VariableSet>,
    /// Suspend the binding. No subscription exists while skipped.
    pub skip: bool,
    /// Interval between automatic refetches. `None` disables polling.
    pub poll_interval: Option<Duration>,
    /// Keep showing the previous data while new variables or a refetch are loading.
    /// If false, data is cleared as soon as the variables change.
    pub keep_previous_data: bool,
}

impl QueryOptions {
    /// Set the variables.
    pub fn set_variables(self, variables: Option<VariableSet>) -> Self {
        QueryOptions { variables, ..self }
    }

    /// Set skip.
    pub fn set_skip(self, skip: bool) -> Self {
        QueryOptions { skip, ..self }
    }

    /// Set the poll interval.
    pub fn set_poll_interval(self, poll_interval: Option<Duration>) -> Self {
        QueryOptions {
            poll_interval,
            ..self
        }
    }

    /// Set whether previous data is kept during loads.
    pub fn set_keep_previous_data(self, keep_previous_data: bool) -> Self {
        QueryOptions {
            keep_previous_data,
            ..self
        }
    }

    /// Ensures a zero poll interval disables polling instead of spinning.
    pub fn validate(self) -> Self {
        let poll_interval = match self.poll_interval {
            Some(interval) if interval.is_zero() => {
                leptos::logging::debug_warn!("poll_interval of zero disables polling.");
                None
            }
            interval => interval,
        };

        QueryOptions {
            poll_interval,
            ..self
        }
    }
}

impl Default for QueryOptions {
    fn default() -> Self {
        // Use client wide defaults if they exist.
        let default_options = leptos::use_context::<crate::GraphqlClient>()
            .map(|c| c.default_options())
            .unwrap_or_default();
        Self {
            variables: None,
            skip: false,
            poll_interval: default_options.poll_interval,
            keep_previous_data: default_options.keep_previous_data,
        }
        .validate()
    }
}

/// Where a binding gets its [`QueryOptions`] from on each props cycle.
pub enum OptionsSource<P> {
    /// [`QueryOptions::default()`], read from context at evaluation time.
    Inherit,
    /// The same options for every cycle.
    Static(QueryOptions),
    /// Options computed from the current props.
    FromProps(Rc<dyn Fn(&P) -> QueryOptions>),
}

impl<P> OptionsSource<P> {
    /// Wraps a function of the props.
    pub fn from_fn(options: impl Fn(&P) -> QueryOptions + 'static) -> Self {
        OptionsSource::FromProps(Rc::new(options))
    }

    /// Evaluates the options for the given props.
    pub fn evaluate(&self, props: &P) -> QueryOptions {
        match self {
            OptionsSource::Inherit => QueryOptions::default(),
            OptionsSource::Static(options) => options.clone().validate(),
            OptionsSource::FromProps(options) => options(props).validate(),
        }
    }
}

impl<P> Clone for OptionsSource<P> {
    fn clone(&self) -> Self {
        match self {
            OptionsSource::Inherit => OptionsSource::Inherit,
            OptionsSource::Static(options) => OptionsSource::Static(options.clone()),
            OptionsSource::FromProps(options) => OptionsSource::FromProps(options.clone()),
        }
    }
}

impl<P> Default for OptionsSource<P> {
    fn default() -> Self {
        OptionsSource::Inherit
    }
}

impl<P> From<QueryOptions> for OptionsSource<P> {
    fn from(options: QueryOptions) -> Self {
        OptionsSource::Static(options)
    }
}

impl<P> std::fmt::Debug for OptionsSource<P> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Inherit => write!(f, "Inherit"),
            Self::Static(options) => f.debug_tuple("Static").field(options).finish(),
            Self::FromProps(_) => write!(f, "FromProps(..)"),
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::{provide_query_client_with_options, testing::MockClient};

    use super::*;

    #[test]
    fn validate_zero_poll_interval() {
        let options = QueryOptions {
            variables: None,
            skip: false,
            poll_interval: Some(Duration::ZERO),
            keep_previous_data: true,
        }
        .validate();

        assert_eq!(options.poll_interval, None, "Zero interval should disable polling");
    }

    #[test]
    fn validate_keeps_poll_interval() {
        let options = QueryOptions {
            variables: None,
            skip: false,
            poll_interval: Some(Duration::from_millis(75)),
            keep_previous_data: true,
        }
        .validate();

        assert_eq!(options.poll_interval, Some(Duration::from_millis(75)));
    }

    #[test]
    fn test_default() {
        let _ = leptos::create_runtime();

        provide_query_client_with_options(
            MockClient::new(),
            DefaultQueryOptions {
                poll_interval: Some(Duration::from_secs(3)),
                keep_previous_data: false,
            },
        );

        let default_options = QueryOptions::default();

        assert_eq!(
            default_options.poll_interval,
            Some(Duration::from_secs(3)),
            "Default poll_interval should match the provided client's default"
        );
        assert!(
            !default_options.keep_previous_data,
            "Default keep_previous_data should match the provided client's default"
        );
        assert!(!default_options.skip);
        assert_eq!(default_options.variables, None);
    }

    #[test]
    fn default_without_client() {
        let _ = leptos::create_runtime();

        let default_options = QueryOptions::default();

        assert_eq!(default_options.poll_interval, None);
        assert!(default_options.keep_previous_data);
    }

    #[test]
    fn options_from_props() {
        let _ = leptos::create_runtime();

        let source = OptionsSource::from_fn(|first: &i64| {
            QueryOptions::default().set_skip(*first == 0)
        });

        assert!(source.evaluate(&0).skip);
        assert!(!source.evaluate(&1).skip);
    }
}
