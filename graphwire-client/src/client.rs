//! GraphQL client implementation.

use graphwire_transport::{
    CancellationToken, HttpRequest, RetryAttempt, RetryState, Transport,
};
use http::header::{ACCEPT, CONTENT_TYPE};
use serde::de::DeserializeOwned;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use crate::encode::{JSON_CONTENT_TYPE, encode};
use crate::resolve::{Resolution, resolve};
use crate::{
    GraphQLClientConfig, GraphQLError, Logger, Operation, QueryBuilder, Result,
    SubscriptionClient,
};

/// GraphQL client.
#[derive(Clone)]
pub struct GraphQLClient {
    transport: Transport,
    config: Arc<GraphQLClientConfig>,
}

impl GraphQLClient {
    /// Create a new GraphQL client with the given endpoint.
    pub fn new(endpoint: impl Into<String>) -> Result<Self> {
        Self::with_config(GraphQLClientConfig::new(endpoint))
    }

    /// Create a new GraphQL client with custom configuration.
    pub fn with_config(config: GraphQLClientConfig) -> Result<Self> {
        let transport = Transport::new(config.transport.clone())?;
        Ok(Self {
            transport,
            config: Arc::new(config),
        })
    }

    /// Create a client that sends requests through an existing reqwest client.
    pub fn with_http_client(http_client: reqwest::Client, config: GraphQLClientConfig) -> Self {
        let transport = Transport::with_client(http_client, config.transport.clone());
        Self {
            transport,
            config: Arc::new(config),
        }
    }

    /// Get the configuration.
    pub fn config(&self) -> &GraphQLClientConfig {
        &self.config
    }

    /// Get the underlying transport.
    pub fn transport(&self) -> &Transport {
        &self.transport
    }

    /// Create a query builder.
    pub fn query(&self, query: impl Into<String>) -> QueryBuilder<'_> {
        QueryBuilder::new(self, Operation::new(query))
    }

    /// Create a mutation builder.
    pub fn mutation(&self, mutation: impl Into<String>) -> QueryBuilder<'_> {
        QueryBuilder::new(self, Operation::new(mutation))
    }

    /// Run an operation and decode its data into `T`.
    pub async fn run<T: DeserializeOwned>(&self, operation: Operation) -> Result<T> {
        self.execute(operation, None, &CancellationToken::new()).await
    }

    /// Run an operation, aborting when `cancel` fires.
    pub async fn run_with_cancel<T: DeserializeOwned>(
        &self,
        operation: Operation,
        cancel: &CancellationToken,
    ) -> Result<T> {
        self.execute(operation, None, cancel).await
    }

    /// Open a subscription connection to the configured websocket endpoint.
    ///
    /// Default headers of the HTTP transport are sent with the handshake.
    pub async fn subscription_client(&self) -> Result<SubscriptionClient> {
        let url = self.config.websocket_endpoint()?;
        let mut subscription = self.config.subscription.clone();
        let mut headers = self.config.transport.default_headers.clone();
        headers.append(&mut subscription.headers);
        subscription.headers = headers;

        SubscriptionClient::connect_with_logger(&url, subscription, self.config.logger.clone())
            .await
    }

    /// Encode, send, resolve and, for retry-eligible application errors,
    /// re-run the exchange from the same retry budget.
    pub(crate) async fn execute<T: DeserializeOwned>(
        &self,
        mut operation: Operation,
        timeout: Option<Duration>,
        cancel: &CancellationToken,
    ) -> Result<T> {
        if cancel.is_cancelled() {
            return Err(GraphQLError::Cancelled);
        }

        self.trace_operation(&operation);
        let body = encode(&mut operation, self.config.body_mode, self.transport.inner()).await?;

        let mut builder = HttpRequest::post(&self.config.endpoint)?
            .header(CONTENT_TYPE, &body.content_type)?
            .header(ACCEPT, JSON_CONTENT_TYPE)?
            .headers(operation.headers().iter().map(|(k, v)| (k.as_str(), v.as_str())))?
            .body(body.bytes);
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }
        let mut request = builder.build();

        let mut state = RetryState::new(self.transport.config().retry.clone());
        loop {
            let response = self
                .transport
                .execute_with_state(&mut request, &mut state, cancel)
                .await?;
            self.log(format_args!("<< {}", response.text_lossy()));

            let errors = match resolve::<T>(&response)? {
                Resolution::Data(data) => return Ok(data),
                Resolution::Retry(errors) => errors,
            };

            if !state.policy().is_enabled() {
                return Err(GraphQLError::GraphQL(errors));
            }
            if !state.can_retry() {
                warn!(attempts = state.attempts(), "Operation retries exhausted");
                return Err(GraphQLError::RetryExhausted {
                    attempts: state.attempts(),
                    last: Box::new(GraphQLError::GraphQL(errors)),
                });
            }

            debug!(
                attempt = state.attempts(),
                delay = ?state.next_delay(),
                errors = errors.errors().len(),
                "Retrying operation after application error"
            );
            state.policy().notify(&RetryAttempt {
                request: &request,
                response: Some(&response),
                error: None,
                attempt: state.attempts(),
            });
            state.wait(cancel).await?;
        }
    }

    fn trace_operation(&self, operation: &Operation) {
        debug!(
            operation = operation.operation_name().as_deref().unwrap_or("<anonymous>"),
            files = operation.file_count(),
            mode = ?self.config.body_mode,
            "Executing GraphQL operation"
        );
        if self.config.logger.is_none() {
            return;
        }

        if let Some(variables) = operation.variables() {
            self.log(format_args!(
                ">> variables: {}",
                serde_json::Value::Object(variables.clone())
            ));
        }
        if operation.has_files() {
            self.log(format_args!(">> files: {}", operation.file_count()));
        }
        self.log(format_args!(">> query: {}", operation.query()));
    }

    fn log(&self, args: fmt::Arguments<'_>) {
        Logger::log_fmt(self.config.logger.as_ref(), args);
    }
}
