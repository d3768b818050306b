//! GraphQL subscription support.
//!
//! A [`SubscriptionClient`] owns one websocket connection speaking the
//! graphql-ws protocol and multiplexes any number of [`Subscription`]s over
//! it, routing inbound frames by operation id.

mod multiplexer;
pub mod protocol;

pub use multiplexer::SubscriptionClient;

use futures::Stream;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::pin::Pin;
use std::sync::Weak;
use std::task::{Context, Poll};
use tokio::sync::mpsc;

use crate::{AggregateError, Envelope, GraphQLError, GraphQLResponseError, Result};

/// One delivery to a subscription consumer.
#[derive(Debug, Clone, PartialEq)]
pub enum SubscriptionPayload {
    /// Payload of a `data` frame, usually a `{data, errors}` envelope.
    Data(Value),
    /// Payload of an `error` frame.
    Error(Value),
}

impl SubscriptionPayload {
    /// Decode the payload into `T`.
    ///
    /// `error` frames and envelopes carrying errors become
    /// [`GraphQLError::GraphQL`].
    pub fn decode<T: DeserializeOwned>(self) -> Result<T> {
        match self {
            Self::Data(value) => {
                let envelope: Envelope<T> = serde_json::from_value(value)?;
                match envelope.into_result()? {
                    Some(data) => Ok(data),
                    None => Ok(serde_json::from_value(Value::Null)?),
                }
            }
            Self::Error(value) => Err(GraphQLError::GraphQL(AggregateError::new(
                error_list(value),
            ))),
        }
    }
}

fn error_list(value: Value) -> Vec<GraphQLResponseError> {
    let items = match value {
        Value::Array(items) => items,
        other => vec![other],
    };
    items
        .into_iter()
        .map(|item| {
            serde_json::from_value(item.clone())
                .unwrap_or_else(|_| GraphQLResponseError::new(item.to_string()))
        })
        .collect()
}

/// Lifecycle of a subscription handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubscriptionState {
    /// Registered and receiving frames.
    Active,
    /// Delivery ended: completed by the server, unsubscribed, or the
    /// connection closed.
    Completed,
}

/// Receiving side of one subscription.
#[derive(Debug)]
pub struct Subscription {
    id: String,
    connection: Weak<multiplexer::Shared>,
    receiver: mpsc::Receiver<SubscriptionPayload>,
    state: SubscriptionState,
}

impl Subscription {
    pub(crate) fn new(
        id: String,
        connection: Weak<multiplexer::Shared>,
        receiver: mpsc::Receiver<SubscriptionPayload>,
    ) -> Self {
        Self {
            id,
            connection,
            receiver,
            state: SubscriptionState::Active,
        }
    }

    /// Operation id on the connection.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Current lifecycle state, as observed by this handle.
    pub fn state(&self) -> SubscriptionState {
        self.state
    }

    /// Receive the next payload, or `None` once delivery has ended.
    pub async fn next(&mut self) -> Option<SubscriptionPayload> {
        let item = self.receiver.recv().await;
        if item.is_none() {
            self.state = SubscriptionState::Completed;
        }
        item
    }

    pub(crate) fn belongs_to(&self, shared: &std::sync::Arc<multiplexer::Shared>) -> bool {
        std::ptr::eq(self.connection.as_ptr(), std::sync::Arc::as_ptr(shared))
    }
}

impl Stream for Subscription {
    type Item = SubscriptionPayload;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        let poll = this.receiver.poll_recv(cx);
        if let Poll::Ready(None) = poll {
            this.state = SubscriptionState::Completed;
        }
        poll
    }
}
