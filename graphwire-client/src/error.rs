//! GraphQL client error types.

use graphwire_transport::TransportError;
use thiserror::Error;

use crate::{AggregateError, GraphQLResponseError};

/// Result type for GraphQL client operations.
pub type Result<T> = std::result::Result<T, GraphQLError>;

/// GraphQL client errors.
#[derive(Debug, Error)]
pub enum GraphQLError {
    /// The operation could not be encoded into a request body.
    #[error("Encode error: {0}")]
    Encode(String),

    /// Copying a file attachment into the request body failed.
    #[error("Failed to copy file part: {0}")]
    FileCopy(#[source] std::io::Error),

    /// The HTTP exchange failed.
    #[error("Transport error: {0}")]
    Transport(TransportError),

    /// The server answered with a non-2xx status and an undecodable body.
    #[error("server returned a non-200 status code: {status}")]
    Status {
        /// HTTP status code.
        status: u16,
    },

    /// The response body could not be decoded.
    #[error("Decode error (status {status}): {source}")]
    Decode {
        /// HTTP status code of the response.
        status: u16,
        /// Underlying JSON error.
        #[source]
        source: serde_json::Error,
    },

    /// GraphQL errors returned by the server.
    #[error("{0}")]
    GraphQL(AggregateError),

    /// Application-level retries ran out.
    #[error("Operation failed after {attempts} attempts: {last}")]
    RetryExhausted {
        /// Number of physical attempts made.
        attempts: u32,
        /// Failure observed on the last attempt.
        last: Box<GraphQLError>,
    },

    /// The server rejected the subscription handshake.
    #[error("Subscription handshake failed: {0}")]
    Handshake(String),

    /// The server answered the handshake with something other than an ack.
    #[error("server did not acknowledge the connection")]
    NotAcknowledged,

    /// WebSocket error (for subscriptions).
    #[error("WebSocket error: {0}")]
    WebSocket(String),

    /// The subscription connection is closed.
    #[error("Connection closed")]
    ConnectionClosed,

    /// Timed out waiting for the named step.
    #[error("Timed out waiting for {0}")]
    Timeout(&'static str),

    /// The caller cancelled the operation.
    #[error("Operation cancelled")]
    Cancelled,

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(String),
}

impl From<TransportError> for GraphQLError {
    fn from(err: TransportError) -> Self {
        match err {
            TransportError::Cancelled => Self::Cancelled,
            other => Self::Transport(other),
        }
    }
}

impl GraphQLError {
    /// Check if this is a network error.
    pub fn is_network_error(&self) -> bool {
        matches!(
            self,
            Self::Transport(_) | Self::WebSocket(_) | Self::ConnectionClosed
        )
    }

    /// Check if this is a GraphQL error (server-side).
    pub fn is_graphql_error(&self) -> bool {
        self.graphql_errors().is_some()
    }

    /// Check if the operation was cancelled.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }

    /// Check if this is a timeout error.
    pub fn is_timeout(&self) -> bool {
        match self {
            Self::Timeout(_) => true,
            Self::Transport(e) => e.is_timeout(),
            _ => false,
        }
    }

    /// Get GraphQL errors if this is a GraphQL error.
    pub fn graphql_errors(&self) -> Option<&[GraphQLResponseError]> {
        match self {
            Self::GraphQL(errors) => Some(errors.errors()),
            Self::RetryExhausted { last, .. } => last.graphql_errors(),
            _ => None,
        }
    }
}
