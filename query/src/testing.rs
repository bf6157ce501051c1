//! A deterministic in-memory [`QueryClient`].
//!
//! Requests are queued until the test resolves them, so every interleaving of
//! responses can be reproduced.

use std::{
    cell::RefCell,
    collections::{HashMap, VecDeque},
    rc::Rc,
    time::Duration,
};

use futures::future::{FutureExt, LocalBoxFuture};
use futures_channel::oneshot;
use serde_json::Value;
use slotmap::{new_key_type, SlotMap};

use crate::{
    Listener, NetworkStatus, QueryClient, QueryError, QueryRequest, QuerySubscription,
    QueryUpdate, UpdateSource, VariableSet,
};

new_key_type! {
    struct WatchKey;
}

type ResponseKey = (String, String);

fn response_key(operation: &str, variables: &VariableSet) -> ResponseKey {
    (
        operation.to_string(),
        Value::Object(variables.clone()).to_string(),
    )
}

/// An in-memory client with scripted responses.
///
/// Clones share the same state.
#[derive(Clone, Default)]
pub struct MockClient {
    state: Rc<RefCell<MockState>>,
}

#[derive(Default)]
struct MockState {
    watches: SlotMap<WatchKey, Watch>,
    responses: HashMap<ResponseKey, VecDeque<Result<Value, QueryError>>>,
    cache: HashMap<ResponseKey, Value>,
    pending: VecDeque<Pending>,
    requests: Vec<(String, VariableSet)>,
    deliver_after_unsubscribe: bool,
}

struct Watch {
    operation: String,
    variables: VariableSet,
    data: Option<Value>,
    listener: Rc<dyn Fn(QueryUpdate)>,
    polling: Option<Duration>,
    active: bool,
}

enum RequestKind {
    Query,
    Poll,
    Refetch(oneshot::Sender<Result<Value, QueryError>>),
    FetchMore(oneshot::Sender<Result<Value, QueryError>>),
}

struct Pending {
    watch: WatchKey,
    variables: VariableSet,
    kind: RequestKind,
}

impl std::fmt::Debug for MockClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.borrow();
        f.debug_struct("MockClient")
            .field("watches", &state.watches.len())
            .field("pending", &state.pending.len())
            .finish()
    }
}

impl MockClient {
    /// Creates a client without responses.
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues a successful response.
    ///
    /// The last queued response for an operation and variables is reused by
    /// every later request.
    pub fn mock_result(&self, operation: &str, variables: VariableSet, data: Value) {
        self.push_response(operation, &variables, Ok(data));
    }

    /// Queues a failed response.
    pub fn mock_error(&self, operation: &str, variables: VariableSet, error: QueryError) {
        self.push_response(operation, &variables, Err(error));
    }

    /// Seeds the cache. Watching a cached query delivers the result synchronously.
    pub fn cache_result(&self, operation: &str, variables: VariableSet, data: Value) {
        self.state
            .borrow_mut()
            .cache
            .insert(response_key(operation, &variables), data);
    }

    /// Makes released subscriptions keep receiving results, like a client
    /// that does not cancel in-flight requests.
    pub fn set_deliver_after_unsubscribe(&self, deliver: bool) {
        self.state.borrow_mut().deliver_after_unsubscribe = deliver;
    }

    fn push_response(
        &self,
        operation: &str,
        variables: &VariableSet,
        response: Result<Value, QueryError>,
    ) {
        self.state
            .borrow_mut()
            .responses
            .entry(response_key(operation, variables))
            .or_default()
            .push_back(response);
    }

    /// Resolves the oldest pending request. Returns false if none is pending.
    pub fn resolve_next(&self) -> bool {
        let pending = self.state.borrow_mut().pending.pop_front();
        match pending {
            Some(pending) => {
                self.resolve(pending);
                true
            }
            None => false,
        }
    }

    /// Resolves the newest pending request. Returns false if none is pending.
    pub fn resolve_newest(&self) -> bool {
        let pending = self.state.borrow_mut().pending.pop_back();
        match pending {
            Some(pending) => {
                self.resolve(pending);
                true
            }
            None => false,
        }
    }

    /// Resolves pending requests in order until none is left.
    pub fn resolve_all(&self) -> usize {
        let mut resolved = 0;
        while self.resolve_next() {
            resolved += 1;
        }
        resolved
    }

    /// Fires one poll for every polling subscription. Returns the number of polls.
    pub fn tick_polls(&self) -> usize {
        let polls: Vec<(WatchKey, VariableSet, Rc<dyn Fn(QueryUpdate)>)> = {
            let state = self.state.borrow();
            state
                .watches
                .iter()
                .filter(|(_, watch)| watch.active && watch.polling.is_some())
                .map(|(key, watch)| (key, watch.variables.clone(), watch.listener.clone()))
                .collect()
        };

        for (key, variables, listener) in &polls {
            listener(QueryUpdate::in_flight(NetworkStatus::Poll, variables.clone()));
            self.enqueue(*key, variables.clone(), RequestKind::Poll);
        }
        polls.len()
    }

    /// Number of unresolved requests.
    pub fn pending_requests(&self) -> usize {
        self.state.borrow().pending.len()
    }

    /// Every request sent so far, as operation name and variables.
    pub fn requests(&self) -> Vec<(String, VariableSet)> {
        self.state.borrow().requests.clone()
    }

    /// Number of `watch_query` calls so far.
    pub fn watch_count(&self) -> usize {
        self.state.borrow().watches.len()
    }

    /// Number of subscriptions that have not been unsubscribed.
    pub fn active_subscriptions(&self) -> usize {
        self.state
            .borrow()
            .watches
            .values()
            .filter(|watch| watch.active)
            .count()
    }

    /// Poll intervals of the active subscriptions that are polling.
    pub fn polling_intervals(&self) -> Vec<Duration> {
        self.state
            .borrow()
            .watches
            .values()
            .filter(|watch| watch.active)
            .filter_map(|watch| watch.polling)
            .collect()
    }

    fn enqueue(&self, watch: WatchKey, variables: VariableSet, kind: RequestKind) {
        let mut state = self.state.borrow_mut();
        let operation = match state.watches.get(watch) {
            Some(watch) => watch.operation.clone(),
            None => return,
        };
        state.requests.push((operation, variables.clone()));
        state.pending.push_back(Pending {
            watch,
            variables,
            kind,
        });
    }

    fn next_response(&self, operation: &str, variables: &VariableSet) -> Result<Value, QueryError> {
        let mut state = self.state.borrow_mut();
        let queue = state.responses.get_mut(&response_key(operation, variables));
        match queue {
            Some(queue) if queue.len() > 1 => queue
                .pop_front()
                .unwrap_or_else(|| Err(QueryError::Network("empty response queue".into()))),
            Some(queue) => queue
                .front()
                .cloned()
                .unwrap_or_else(|| Err(QueryError::Network("empty response queue".into()))),
            None => Err(QueryError::Network(format!(
                "No more mocked responses for the query '{operation}' with variables {}",
                Value::Object(variables.clone())
            ))),
        }
    }

    fn resolve(&self, pending: Pending) {
        let Pending {
            watch,
            variables,
            kind,
        } = pending;

        let (operation, listener, deliver) = {
            let state = self.state.borrow();
            let Some(entry) = state.watches.get(watch) else {
                return;
            };
            (
                entry.operation.clone(),
                entry.listener.clone(),
                entry.active || state.deliver_after_unsubscribe,
            )
        };
        let response = self.next_response(&operation, &variables);

        let (update, reply) = match kind {
            RequestKind::Query => (self.settle(watch, &variables, &response), None),
            RequestKind::Poll => (
                self.settle(watch, &variables, &response)
                    .with_source(UpdateSource::Poll),
                None,
            ),
            RequestKind::Refetch(reply) => (self.settle(watch, &variables, &response), Some(reply)),
            // Merging is up to the subscriber.
            RequestKind::FetchMore(reply) => {
                let update = match &response {
                    Ok(incremental) => QueryUpdate::ready(variables, incremental.clone()),
                    Err(error) => QueryUpdate::failed(variables, error.clone()),
                };
                (update.with_source(UpdateSource::FetchMore), Some(reply))
            }
        };

        if deliver {
            listener(update);
        }
        if let Some(reply) = reply {
            let _ = reply.send(response);
        }
    }

    fn settle(
        &self,
        watch: WatchKey,
        variables: &VariableSet,
        response: &Result<Value, QueryError>,
    ) -> QueryUpdate {
        match response {
            Ok(data) => {
                let tracked = self
                    .state
                    .borrow()
                    .watches
                    .get(watch)
                    .is_some_and(|entry| entry.variables == *variables);
                if tracked {
                    self.set_data(watch, data.clone());
                }
                QueryUpdate::ready(variables.clone(), data.clone())
            }
            Err(error) => QueryUpdate::failed(variables.clone(), error.clone()),
        }
    }

    fn set_data(&self, watch: WatchKey, data: Value) {
        if let Some(entry) = self.state.borrow_mut().watches.get_mut(watch) {
            entry.data = Some(data);
        }
    }
}

impl QueryClient for MockClient {
    fn watch_query(&self, request: QueryRequest, listener: Listener) -> Box<dyn QuerySubscription> {
        let QueryRequest {
            document,
            variables,
        } = request;
        let operation = document.operation_name().to_string();
        let listener: Rc<dyn Fn(QueryUpdate)> = Rc::from(listener);

        let cached = self
            .state
            .borrow()
            .cache
            .get(&response_key(&operation, &variables))
            .cloned();

        let key = self.state.borrow_mut().watches.insert(Watch {
            operation,
            variables: variables.clone(),
            data: cached.clone(),
            listener: listener.clone(),
            polling: None,
            active: true,
        });

        match cached {
            Some(data) => listener(QueryUpdate::ready(variables, data)),
            None => self.enqueue(key, variables, RequestKind::Query),
        }

        Box::new(MockSubscription {
            key,
            client: self.clone(),
        })
    }
}

struct MockSubscription {
    key: WatchKey,
    client: MockClient,
}

impl MockSubscription {
    fn with_watch<T>(&self, f: impl FnOnce(&mut Watch) -> T) -> Option<T> {
        self.client.state.borrow_mut().watches.get_mut(self.key).map(f)
    }
}

fn reply_future(
    receiver: oneshot::Receiver<Result<Value, QueryError>>,
) -> LocalBoxFuture<'static, Result<Value, QueryError>> {
    receiver
        .map(|result| {
            result.unwrap_or_else(|_| Err(QueryError::Network("request was dropped".into())))
        })
        .boxed_local()
}

impl QuerySubscription for MockSubscription {
    fn refetch(&self, variables: Option<VariableSet>) -> LocalBoxFuture<'static, Result<Value, QueryError>> {
        let variables = self
            .with_watch(|watch| {
                if let Some(variables) = variables {
                    watch.variables = variables;
                }
                watch.variables.clone()
            })
            .unwrap_or_default();

        let (sender, receiver) = oneshot::channel();
        self.client
            .enqueue(self.key, variables, RequestKind::Refetch(sender));
        reply_future(receiver)
    }

    fn fetch_more(&self, variables: VariableSet) -> LocalBoxFuture<'static, Result<Value, QueryError>> {
        if self.with_watch(|_| ()).is_none() {
            return futures::future::ready(Err(QueryError::Inactive)).boxed_local();
        }

        let (sender, receiver) = oneshot::channel();
        self.client
            .enqueue(self.key, variables, RequestKind::FetchMore(sender));
        reply_future(receiver)
    }

    fn start_polling(&self, interval: Duration) {
        self.with_watch(|watch| watch.polling = Some(interval));
    }

    fn stop_polling(&self) {
        self.with_watch(|watch| watch.polling = None);
    }

    fn update_local_result(
        &self,
        transform: Box<dyn FnOnce(&Value, &VariableSet) -> Value + '_>,
    ) -> bool {
        let current = self.with_watch(|watch| {
            watch
                .data
                .clone()
                .map(|data| (data, watch.variables.clone(), watch.listener.clone()))
        });
        let Some(Some((data, variables, listener))) = current else {
            return false;
        };

        let next = transform(&data, &variables);
        self.client.set_data(self.key, next.clone());
        listener(QueryUpdate::ready(variables, next).with_source(UpdateSource::Local));
        true
    }

    fn unsubscribe(&self) {
        self.with_watch(|watch| {
            watch.active = false;
            watch.polling = None;
        });
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;

    use futures::FutureExt;
    use serde_json::json;

    use super::*;
    use crate::QueryDocument;

    fn vars(value: Value) -> VariableSet {
        value.as_object().cloned().unwrap_or_default()
    }

    fn watch(client: &MockClient, variables: Value) -> (Box<dyn QuerySubscription>, Rc<RefCell<Vec<QueryUpdate>>>) {
        let updates = Rc::new(RefCell::new(Vec::new()));
        let listener: Listener = {
            let updates = updates.clone();
            Box::new(move |update| updates.borrow_mut().push(update))
        };
        let request = QueryRequest {
            document: Rc::new(QueryDocument::new("hero", "query hero { hero { name } }")),
            variables: vars(variables),
        };
        (client.watch_query(request, listener), updates)
    }

    #[test]
    fn queued_until_resolved() {
        let client = MockClient::new();
        client.mock_result("hero", vars(json!({})), json!({ "hero": "R2" }));
        let (_subscription, updates) = watch(&client, json!({}));

        assert!(updates.borrow().is_empty());
        assert_eq!(1, client.pending_requests());

        assert_eq!(1, client.resolve_all());
        assert_eq!(
            vec![QueryUpdate::ready(vars(json!({})), json!({ "hero": "R2" }))],
            *updates.borrow()
        );
    }

    #[test]
    fn cached_result_is_synchronous() {
        let client = MockClient::new();
        client.cache_result("hero", vars(json!({})), json!(1));
        let (_subscription, updates) = watch(&client, json!({}));

        assert_eq!(1, updates.borrow().len());
        assert_eq!(0, client.pending_requests());
    }

    #[test]
    fn unmocked_request_fails() {
        let client = MockClient::new();
        let (_subscription, updates) = watch(&client, json!({}));
        client.resolve_all();

        let updates = updates.borrow();
        assert_eq!(NetworkStatus::Error, updates[0].network_status);
        assert!(matches!(updates[0].error, Some(QueryError::Network(_))));
    }

    #[test]
    fn unsubscribed_watch_is_silent() {
        let client = MockClient::new();
        client.mock_result("hero", vars(json!({})), json!(1));
        let (subscription, updates) = watch(&client, json!({}));

        subscription.unsubscribe();
        client.resolve_all();

        assert!(updates.borrow().is_empty());
        assert_eq!(0, client.active_subscriptions());
    }

    #[test]
    fn refetch_resolves_future() {
        let client = MockClient::new();
        client.mock_result("hero", vars(json!({ "id": 1 })), json!(1));
        client.mock_result("hero", vars(json!({ "id": 2 })), json!(2));
        let (subscription, _updates) = watch(&client, json!({ "id": 1 }));
        client.resolve_all();

        let mut refetch = subscription.refetch(Some(vars(json!({ "id": 2 }))));
        assert!((&mut refetch).now_or_never().is_none());

        client.resolve_all();
        assert_eq!(Some(Ok(json!(2))), refetch.now_or_never());
        assert_eq!(
            vec![
                ("hero".to_string(), vars(json!({ "id": 1 }))),
                ("hero".to_string(), vars(json!({ "id": 2 }))),
            ],
            client.requests()
        );
    }

    #[test]
    fn fetch_more_publishes_the_unmerged_result() {
        let client = MockClient::new();
        client.mock_result("hero", vars(json!({})), json!(["A"]));
        client.mock_result("hero", vars(json!({ "offset": 1 })), json!(["B"]));
        let (subscription, updates) = watch(&client, json!({}));
        client.resolve_all();

        let more = subscription.fetch_more(vars(json!({ "offset": 1 })));
        client.resolve_all();

        assert_eq!(Some(Ok(json!(["B"]))), more.now_or_never());
        assert_eq!(
            Some(
                QueryUpdate::ready(vars(json!({ "offset": 1 })), json!(["B"]))
                    .with_source(UpdateSource::FetchMore)
            ),
            updates.borrow().last().cloned()
        );
        assert!(subscription.update_local_result(Box::new(|previous: &Value, _: &VariableSet| {
            assert_eq!(json!(["A"]), *previous);
            previous.clone()
        })));
    }

    #[test]
    fn update_local_result_requires_data() {
        let client = MockClient::new();
        client.mock_result("hero", vars(json!({})), json!(1));
        let (subscription, updates) = watch(&client, json!({}));

        assert!(!subscription.update_local_result(Box::new(|_: &Value, _: &VariableSet| json!(0))));

        client.resolve_all();
        assert!(subscription.update_local_result(Box::new(|previous: &Value, _: &VariableSet| {
            json!(previous.as_i64().unwrap_or_default() + 1)
        })));
        assert_eq!(Some(json!(2)), updates.borrow().last().and_then(|u| u.data.clone()));
    }
}
