use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors raised by the binding itself.
///
/// These are usage errors: they are returned synchronously and are never
/// folded into a [`RenderState`](crate::RenderState).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BindError {
    /// A required variable could not be found in the props.
    #[error(
        "The operation '{operation}' wrapping '{component}' is expecting a variable: '{variable}' but it was not found in the props passed to '{component}'"
    )]
    MissingVariable {
        /// Operation name of the query document.
        operation: String,
        /// Name of the missing variable.
        variable: String,
        /// Display name of the bound component.
        component: String,
    },

    /// No query client was provided by an ancestor.
    #[error("The operation '{operation}' could not find a query client. Call `provide_query_client` in an ancestor.")]
    MissingClient {
        /// Operation name of the query document.
        operation: String,
    },

    /// `update_query` was called before any result was received.
    #[error("update_query was called on '{operation}' before any result was received")]
    PrematureUpdate {
        /// Operation name of the query document.
        operation: String,
    },

    /// An action was invoked while the binding had no live subscription.
    #[error("The operation '{operation}' has no active subscription")]
    Inactive {
        /// Operation name of the query document.
        operation: String,
    },
}

/// Failures reported by the query client.
///
/// Query errors are never returned from the binding's mount path. They are
/// delivered through [`RenderState::error`](crate::RenderState::error).
#[derive(Debug, Clone, PartialEq, Error)]
pub enum QueryError {
    /// Transport level failure.
    #[error("Network error: {0}")]
    Network(String),
    /// Errors reported by the server in the response body.
    #[error("GraphQL error: {}", .0.iter().map(|e| e.message.as_str()).collect::<Vec<_>>().join("; "))]
    GraphQL(Vec<GraphQLError>),
    /// The binding that issued the request is no longer active.
    #[error("the query binding is no longer active")]
    Inactive,
}

/// A single error entry of a GraphQL response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphQLError {
    /// Human readable description.
    pub message: String,
    /// Path of the response field that failed, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<Vec<serde_json::Value>>,
}

impl GraphQLError {
    /// Creates an error with only a message.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            path: None,
        }
    }
}
