//! GraphQL client configuration.

use graphwire_transport::{RetryPolicy, TransportConfig};
use serde_json::Value;
use std::time::Duration;
use url::Url;

use crate::{BodyMode, GraphQLError, Logger, Result};

/// Sub-protocol negotiated for subscription connections.
pub const GRAPHQL_WS_PROTOCOL: &str = "graphql-ws";

/// GraphQL client configuration.
#[derive(Debug, Clone)]
pub struct GraphQLClientConfig {
    /// GraphQL endpoint URL.
    pub endpoint: String,
    /// WebSocket endpoint for subscriptions. Derived from `endpoint` if unset.
    pub ws_endpoint: Option<String>,
    /// Wire mode for unary operations.
    pub body_mode: BodyMode,
    /// HTTP transport settings, including the retry policy.
    pub transport: TransportConfig,
    /// Optional trace callback.
    pub logger: Option<Logger>,
    /// Subscription connection settings.
    pub subscription: SubscriptionConfig,
}

impl Default for GraphQLClientConfig {
    fn default() -> Self {
        Self {
            endpoint: "http://localhost:4000/graphql".to_string(),
            ws_endpoint: None,
            body_mode: BodyMode::Json,
            transport: TransportConfig {
                user_agent: format!("graphwire-client/{}", env!("CARGO_PKG_VERSION")),
                ..TransportConfig::default()
            },
            logger: None,
            subscription: SubscriptionConfig::default(),
        }
    }
}

impl GraphQLClientConfig {
    /// Create a new configuration builder.
    pub fn builder() -> GraphQLClientConfigBuilder {
        GraphQLClientConfigBuilder::default()
    }

    /// Create configuration for a specific endpoint.
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            ..Default::default()
        }
    }

    /// WebSocket URL for subscriptions.
    ///
    /// Uses `ws_endpoint` when set, otherwise maps the HTTP endpoint's
    /// scheme `http` to `ws` and `https` to `wss`.
    pub fn websocket_endpoint(&self) -> Result<String> {
        if let Some(ws) = &self.ws_endpoint {
            return Ok(ws.clone());
        }

        let mut url = Url::parse(&self.endpoint)
            .map_err(|e| GraphQLError::Config(format!("invalid endpoint: {e}")))?;
        let scheme = match url.scheme() {
            "http" | "ws" => "ws",
            "https" | "wss" => "wss",
            other => {
                return Err(GraphQLError::Config(format!(
                    "cannot derive a websocket endpoint from scheme {other:?}"
                )));
            }
        };
        url.set_scheme(scheme)
            .map_err(|_| GraphQLError::Config(format!("cannot switch scheme to {scheme}")))?;
        Ok(url.to_string())
    }
}

/// Subscription connection settings.
#[derive(Debug, Clone)]
pub struct SubscriptionConfig {
    /// Sub-protocol identifier sent during the websocket handshake.
    pub protocol: String,
    /// Payload of the `connection_init` frame.
    pub init_payload: Option<Value>,
    /// Wait for `connection_ack` before the connection is usable.
    pub await_ack: bool,
    /// Limit for connecting and for the acknowledgment.
    pub handshake_timeout: Duration,
    /// Frames buffered per subscription before dispatch waits for the consumer.
    pub delivery_buffer: usize,
    /// Limit for each stage of an orderly close.
    pub close_timeout: Duration,
    /// Extra headers sent with the websocket handshake.
    pub headers: Vec<(String, String)>,
}

impl Default for SubscriptionConfig {
    fn default() -> Self {
        Self {
            protocol: GRAPHQL_WS_PROTOCOL.to_string(),
            init_payload: None,
            await_ack: true,
            handshake_timeout: Duration::from_secs(30),
            delivery_buffer: 64,
            close_timeout: Duration::from_secs(5),
            headers: Vec::new(),
        }
    }
}

/// Builder for GraphQL client configuration.
#[derive(Debug, Default)]
pub struct GraphQLClientConfigBuilder {
    config: GraphQLClientConfig,
}

impl GraphQLClientConfigBuilder {
    /// Set the GraphQL endpoint URL.
    pub fn endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.config.endpoint = endpoint.into();
        self
    }

    /// Set the WebSocket endpoint URL (for subscriptions).
    pub fn ws_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.config.ws_endpoint = Some(endpoint.into());
        self
    }

    /// Send unary operations as multipart forms (enables file uploads).
    pub fn use_multipart_form(mut self) -> Self {
        self.config.body_mode = BodyMode::Multipart;
        self
    }

    /// Set the wire mode for unary operations.
    pub fn body_mode(mut self, mode: BodyMode) -> Self {
        self.config.body_mode = mode;
        self
    }

    /// Set the per-attempt request timeout.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.config.transport.timeout = timeout;
        self
    }

    /// Set the connection timeout.
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.config.transport.connect_timeout = timeout;
        self
    }

    /// Add a default header sent with every request and websocket handshake.
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.config
            .transport
            .default_headers
            .push((name.into(), value.into()));
        self
    }

    /// Set bearer token authentication.
    pub fn bearer_auth(self, token: impl Into<String>) -> Self {
        self.header("Authorization", format!("Bearer {}", token.into()))
    }

    /// Set the user agent.
    pub fn user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.config.transport.user_agent = user_agent.into();
        self
    }

    /// Set the retry policy.
    pub fn retry(mut self, policy: RetryPolicy) -> Self {
        self.config.transport.retry = policy;
        self
    }

    /// Gzip-compress request bodies.
    pub fn gzip_requests(mut self, enable: bool) -> Self {
        self.config.transport.gzip_requests = enable;
        self
    }

    /// Close the HTTP connection after every request.
    pub fn close_connection(mut self, enable: bool) -> Self {
        self.config.transport.close_connection = enable;
        self
    }

    /// Replace the transport settings wholesale.
    pub fn transport(mut self, transport: TransportConfig) -> Self {
        self.config.transport = transport;
        self
    }

    /// Set the trace callback.
    pub fn logger<F>(mut self, f: F) -> Self
    where
        F: Fn(&str) + Send + Sync + 'static,
    {
        self.config.logger = Some(Logger::new(f));
        self
    }

    /// Set the subscription settings.
    pub fn subscription(mut self, subscription: SubscriptionConfig) -> Self {
        self.config.subscription = subscription;
        self
    }

    /// Set the `connection_init` payload.
    pub fn init_payload(mut self, payload: Value) -> Self {
        self.config.subscription.init_payload = Some(payload);
        self
    }

    /// Build the configuration.
    pub fn build(self) -> GraphQLClientConfig {
        self.config
    }
}
