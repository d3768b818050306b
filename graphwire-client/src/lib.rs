//! # Graphwire Client
//!
//! A GraphQL client with retrying unary execution, multipart file uploads
//! and graphql-ws subscriptions multiplexed over one connection.
//!
//! ## Features
//!
//! - **Queries & Mutations**: JSON or multipart (file upload) request bodies
//! - **Retries**: transport-level (5xx, 429, timeouts) and application-level
//!   (`capacity_exceeded`, `service_unavailable`, `service_failure`,
//!   `internal_error`) retries share one attempt budget
//! - **Subscriptions**: many subscriptions over a single websocket
//! - **Cancellation**: every operation can be aborted mid-flight or mid-backoff
//! - **Type Safety**: decode responses into your own types, or run
//!   `graphql_client` generated query bodies
//!
//! ## Query Example
//!
//! ```rust,no_run
//! use graphwire_client::{GraphQLClient, Operation};
//! use serde::Deserialize;
//!
//! #[derive(Deserialize)]
//! struct UserData {
//!     user: User,
//! }
//!
//! #[derive(Deserialize)]
//! struct User {
//!     id: String,
//!     name: String,
//! }
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let client = GraphQLClient::new("https://api.example.com/graphql")?;
//!
//!     let data: UserData = client
//!         .run(Operation::new("query GetUser($id: ID!) { user(id: $id) { id name } }").var("id", "123"))
//!         .await?;
//!
//!     println!("User: {}", data.user.name);
//!     Ok(())
//! }
//! ```
//!
//! ## Retries
//!
//! ```rust,no_run
//! use graphwire_client::{GraphQLClient, GraphQLClientConfig, RetryPolicy};
//! use std::time::Duration;
//!
//! # fn main() -> Result<(), graphwire_client::GraphQLError> {
//! let config = GraphQLClientConfig::builder()
//!     .endpoint("https://api.example.com/graphql")
//!     .retry(RetryPolicy::exponential(5, Duration::from_millis(100), Duration::from_secs(5)))
//!     .logger(|line| eprintln!("{line}"))
//!     .build();
//! let client = GraphQLClient::with_config(config)?;
//! # let _ = client;
//! # Ok(())
//! # }
//! ```
//!
//! ## Subscription Example
//!
//! ```rust,no_run
//! use graphwire_client::{GraphQLClient, Operation};
//!
//! # #[tokio::main]
//! # async fn main() -> Result<(), graphwire_client::GraphQLError> {
//! let client = GraphQLClient::new("https://api.example.com/graphql")?;
//! let connection = client.subscription_client().await?;
//!
//! let mut messages = connection
//!     .subscribe(&Operation::new("subscription { messageAdded { id text } }"))
//!     .await?;
//!
//! while let Some(payload) = messages.next().await {
//!     let data: serde_json::Value = payload.decode()?;
//!     println!("New message: {data}");
//! }
//!
//! connection.close().await?;
//! # Ok(())
//! # }
//! ```

mod client;
mod config;
pub mod encode;
mod error;
mod log;
mod operation;
mod request;
pub mod resolve;
mod response;
pub mod subscription;

pub use client::GraphQLClient;
pub use config::{
    GRAPHQL_WS_PROTOCOL, GraphQLClientConfig, GraphQLClientConfigBuilder, SubscriptionConfig,
};
pub use encode::{BodyMode, EncodedBody};
pub use error::{GraphQLError, Result};
pub use log::Logger;
pub use operation::{FileUpload, Operation};
pub use request::QueryBuilder;
pub use resolve::Resolution;
pub use response::{
    AggregateError, Envelope, ErrorKind, ErrorLocation, GraphQLResponseError, PathSegment,
    format_path,
};
pub use subscription::{
    Subscription, SubscriptionClient, SubscriptionPayload, SubscriptionState,
};

pub use graphwire_transport::{CancellationToken, RetryAttempt, RetryKind, RetryPolicy, TransportConfig};
