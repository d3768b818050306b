//! # Graphwire Transport
//!
//! A retry-aware HTTP transport. One logical operation is executed across
//! one or more sequential physical attempts, replaying the same request body
//! every time.
//!
//! ## Features
//!
//! - **Retry Policies**: none, linear (constant interval) or exponential
//!   (doubling interval capped at a maximum)
//! - **Status Classification**: any 5xx or 429 by default, or an explicit set
//! - **Replayable Bodies**: reader-backed bodies are captured on first send
//! - **Cancellation**: every exchange and every backoff wait races a
//!   [`CancellationToken`]
//! - **Observer Hook**: inspect each failed attempt before it is retried
//! - **Compression**: optional gzip request bodies
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use graphwire_transport::{
//!     CancellationToken, HttpRequest, RetryPolicy, Transport, TransportConfig,
//! };
//! use std::time::Duration;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = TransportConfig::builder()
//!         .retry(RetryPolicy::exponential(
//!             5,
//!             Duration::from_millis(100),
//!             Duration::from_secs(5),
//!         ))
//!         .build();
//!     let transport = Transport::new(config)?;
//!
//!     let mut request = HttpRequest::post("https://api.example.com/graphql")?
//!         .header("Content-Type", "application/json")?
//!         .body(r#"{"query":"{ me { id } }"}"#.to_string())
//!         .build();
//!
//!     let response = transport
//!         .execute(&mut request, &CancellationToken::new())
//!         .await?;
//!     println!("Status: {}", response.status());
//!     Ok(())
//! }
//! ```

mod body;
mod client;
mod config;
mod error;
mod request;
mod response;
mod retry;

pub use body::ReplayableBody;
pub use client::Transport;
pub use config::{TransportConfig, TransportConfigBuilder};
pub use error::{Result, TransportError};
pub use request::{HttpRequest, HttpRequestBuilder};
pub use response::Response;
pub use retry::{BeforeRetry, RetryAttempt, RetryKind, RetryPolicy, RetryState, wait};

pub use tokio_util::sync::CancellationToken;
