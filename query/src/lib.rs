#![warn(missing_docs)]
#![forbid(unsafe_code)]

//! # About Leptos GraphQL
//!
//!
//! Leptos GraphQL binds GraphQL queries to [Leptos](https://github.com/leptos-rs/leptos) components.
//!
//! A binding keeps a component's props in sync with the result of a remote query for as long as
//! the component is mounted.
//!
//! A binding provides:
//! - variables resolved from the component's props
//! - one live subscription per mounted instance, replaced when the variables change
//! - stale-while-revalidate rendering
//! - refetching, pagination with `fetch_more`, and local result patches
//! - polling
//! - skipping until a query can run
//! - teardown when the owner is disposed
//!
//! Executing queries is left to a [`QueryClient`], provided through context.
//!
//! ## The main entry points are:
//! - [`graphql`](crate::graphql::graphql()) - **Recommended**: Wraps a component so that it receives the query state as props.
//! - [`use_graphql`][crate::use_graphql::use_graphql()] - The binding primitive, for use inside a component.
//!
//! # Feature Flags
//! - `testing` - Exposes [`testing::MockClient`], a deterministic in-memory client.
//!
//! # A Simple Example
//!
//! In the root of your App, provide a query client with [provide_query_client] or [provide_query_client_with_options] if you want to override the default options.
//!
//! ```rust
//! use leptos::*;
//! use leptos_graphql::*;
//!
//! #[component]
//! pub fn App(client: GraphqlClient) -> impl IntoView {
//!     // Provides the query client for the entire app.
//!     provide_context(client);
//!
//!     // Rest of App...
//! }
//! ```
//!
//! Then wrap a component with [`graphql`][crate::graphql::graphql()]. Its variables are looked up on
//! the props by name.
//!
//! ```
//! use leptos::*;
//! use leptos_graphql::*;
//! use serde_json::{json, Value};
//!
//! fn person_view(props: GraphqlProps<Value, QueryProps>) -> impl IntoView {
//!     let data = props.data;
//!     move || {
//!         data.with(|data| match data.field("person") {
//!             Some(person) => person["name"].to_string(),
//!             None if data.loading => "Loading...".to_string(),
//!             None => "Not found".to_string(),
//!         })
//!     }
//! }
//!
//! #[component]
//! fn Person(id: i64) -> impl IntoView {
//!     let person = graphql(
//!         QueryDocument::new("person", "query person($id: ID!) { person(id: $id) { name } }")
//!             .variable("id", "ID!"),
//!     )
//!     .options(QueryOptions::default().set_keep_previous_data(true))
//!     .wrap(person_view);
//!
//!     person(Signal::derive(move || json!({ "id": id })))
//!         .map(IntoView::into_view)
//!         .unwrap_or_else(|error| error.to_string().into_view())
//! }
//! ```
//!

mod document;
mod error;
mod graphql;
mod projection;
mod query_actions;
mod query_client;
mod query_handle;
mod query_options;
mod query_state;
mod subscription_manager;
/// A deterministic query client for tests.
#[cfg(any(test, feature = "testing"))]
pub mod testing;
mod use_graphql;
mod variables;

pub use document::*;
pub use error::*;
pub use graphql::*;
pub use projection::*;
pub use query_actions::*;
pub use query_client::*;
pub use query_options::*;
pub use query_state::*;
pub use subscription_manager::ManagerState;
pub use use_graphql::*;
pub use variables::*;
