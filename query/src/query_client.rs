use std::{rc::Rc, time::Duration};

use futures::future::LocalBoxFuture;
use leptos::{provide_context, use_context};
use serde_json::Value;

use crate::{DefaultQueryOptions, NetworkStatus, QueryDocument, QueryError, VariableSet};

/// Provides a query client to the current scope.
pub fn provide_query_client(client: impl QueryClient + 'static) {
    provide_query_client_with_options(client, DefaultQueryOptions::default());
}

/// Provides a query client to the current scope with custom default options.
pub fn provide_query_client_with_options(
    client: impl QueryClient + 'static,
    options: DefaultQueryOptions,
) {
    provide_context(GraphqlClient::new(client, options));
}

/// Retrieves the query client from the current scope.
pub fn use_query_client() -> Option<GraphqlClient> {
    use_context::<GraphqlClient>()
}

/// The query execution engine a binding subscribes to.
///
/// Parsing, transport, caching and request deduplication all live behind
/// this trait.
pub trait QueryClient {
    /// Starts watching a query.
    ///
    /// The listener receives every state change of the query until the
    /// returned subscription is unsubscribed. It may be called before this
    /// method returns, for example on a cache hit.
    fn watch_query(&self, request: QueryRequest, listener: Listener) -> Box<dyn QuerySubscription>;
}

/// One live query subscription.
///
/// Every completed fetch must publish exactly one [`QueryUpdate`] to the
/// listener, tagged with the variables it was produced for.
pub trait QuerySubscription {
    /// Re-executes the query. New variables replace the tracked ones.
    fn refetch(&self, variables: Option<VariableSet>) -> LocalBoxFuture<'static, Result<Value, QueryError>>;

    /// Executes an additional query with the given variables.
    ///
    /// The outcome is published as a [`QueryUpdate`] with
    /// [`UpdateSource::FetchMore`], carrying the incremental result unmerged and
    /// tagged with these variables. The binding merges it into the current
    /// result and writes the merged result back through
    /// [`update_local_result`](Self::update_local_result).
    ///
    /// Resolves to the incremental result.
    fn fetch_more(&self, variables: VariableSet) -> LocalBoxFuture<'static, Result<Value, QueryError>>;

    /// Starts refetching on an interval.
    fn start_polling(&self, interval: Duration);

    /// Stops polling. Must be a no-op when not polling.
    fn stop_polling(&self);

    /// Replaces the current result with `transform(previous, variables)` without a network request.
    ///
    /// Returns false when there is no result to transform.
    fn update_local_result(
        &self,
        transform: Box<dyn FnOnce(&Value, &VariableSet) -> Value + '_>,
    ) -> bool;

    /// Stops delivering updates. Must be idempotent.
    fn unsubscribe(&self);
}

/// Receives query updates from the client.
///
/// The listener may call back into the subscription, so it must not be
/// invoked while the client holds a borrow of its own state.
pub type Listener = Box<dyn Fn(QueryUpdate)>;

/// Combines the previous result with a `fetch_more` result.
pub type MergeFn = Rc<dyn Fn(&Value, &Value, &VariableSet) -> Value>;

/// A request to watch a query.
#[derive(Debug, Clone, PartialEq)]
pub struct QueryRequest {
    /// The document to execute.
    pub document: Rc<QueryDocument>,
    /// Variables for the first execution.
    pub variables: VariableSet,
}

/// Which request a [`QueryUpdate`] belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum UpdateSource {
    /// The primary query: the first fetch, a variable change or a refetch.
    #[default]
    Query,
    /// A polling refetch.
    Poll,
    /// A `fetch_more` request.
    FetchMore,
    /// A local patch made with `update_local_result`.
    Local,
}

impl UpdateSource {
    /// Background updates never change the primary `loading` flag.
    pub fn is_background(self) -> bool {
        !matches!(self, UpdateSource::Query)
    }
}

/// A state change reported by the client.
#[derive(Debug, Clone, PartialEq)]
pub struct QueryUpdate {
    /// Request status.
    pub network_status: NetworkStatus,
    /// The request this update belongs to.
    pub source: UpdateSource,
    /// Result data, if any.
    pub data: Option<Value>,
    /// Failure, if any.
    pub error: Option<QueryError>,
    /// The variables this update was produced for.
    pub variables: VariableSet,
}

impl QueryUpdate {
    /// A completed request of the primary query.
    pub fn ready(variables: VariableSet, data: Value) -> Self {
        Self {
            network_status: NetworkStatus::Ready,
            source: UpdateSource::Query,
            data: Some(data),
            error: None,
            variables,
        }
    }

    /// A failed request of the primary query.
    pub fn failed(variables: VariableSet, error: QueryError) -> Self {
        Self {
            network_status: NetworkStatus::Error,
            source: UpdateSource::Query,
            data: None,
            error: Some(error),
            variables,
        }
    }

    /// A request that has started. The source follows from the status.
    pub fn in_flight(network_status: NetworkStatus, variables: VariableSet) -> Self {
        let source = match network_status {
            NetworkStatus::Poll => UpdateSource::Poll,
            NetworkStatus::FetchMore => UpdateSource::FetchMore,
            _ => UpdateSource::Query,
        };
        Self {
            network_status,
            source,
            data: None,
            error: None,
            variables,
        }
    }

    /// Set the source.
    pub fn with_source(self, source: UpdateSource) -> Self {
        QueryUpdate { source, ..self }
    }
}

/// Options for [`QueryActions::fetch_more`](crate::QueryActions::fetch_more).
#[derive(Clone)]
pub struct FetchMoreOptions {
    /// Variables overlaid on the current ones.
    pub variables: Option<VariableSet>,
    /// Merges `(previous, incremental, variables)` into the new result.
    pub merge: MergeFn,
}

impl FetchMoreOptions {
    /// Creates options with a merge function.
    pub fn new(merge: impl Fn(&Value, &Value, &VariableSet) -> Value + 'static) -> Self {
        Self {
            variables: None,
            merge: Rc::new(merge),
        }
    }

    /// Set the variables.
    pub fn set_variables(self, variables: Option<VariableSet>) -> Self {
        FetchMoreOptions { variables, ..self }
    }
}

impl std::fmt::Debug for FetchMoreOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FetchMoreOptions")
            .field("variables", &self.variables)
            .field("merge", &"...")
            .finish()
    }
}

/// The query client provided through context, with its default options.
#[derive(Clone)]
pub struct GraphqlClient {
    client: Rc<dyn QueryClient>,
    default_options: DefaultQueryOptions,
}

impl GraphqlClient {
    /// Wraps a client.
    pub fn new(client: impl QueryClient + 'static, default_options: DefaultQueryOptions) -> Self {
        Self {
            client: Rc::new(client),
            default_options,
        }
    }

    /// The defaults applied by [`QueryOptions::default()`](crate::QueryOptions).
    pub fn default_options(&self) -> DefaultQueryOptions {
        self.default_options
    }

    pub(crate) fn watch_query(
        &self,
        request: QueryRequest,
        listener: Listener,
    ) -> Box<dyn QuerySubscription> {
        self.client.watch_query(request, listener)
    }
}

impl std::fmt::Debug for GraphqlClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GraphqlClient")
            .field("client", &"...")
            .field("default_options", &self.default_options)
            .finish()
    }
}
