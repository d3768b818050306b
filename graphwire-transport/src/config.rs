//! Transport configuration.

use std::time::Duration;

use crate::RetryPolicy;

/// Transport configuration.
#[derive(Debug, Clone)]
pub struct TransportConfig {
    /// Default timeout for one physical attempt.
    pub timeout: Duration,
    /// Connection timeout.
    pub connect_timeout: Duration,
    /// User agent string.
    pub user_agent: String,
    /// Headers sent with every request.
    pub default_headers: Vec<(String, String)>,
    /// Retry policy applied to every operation.
    pub retry: RetryPolicy,
    /// Gzip-compress request bodies and send `Content-Encoding: gzip`.
    pub gzip_requests: bool,
    /// Send `Connection: close` so connections are not reused.
    pub close_connection: bool,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            connect_timeout: Duration::from_secs(10),
            user_agent: format!("graphwire-transport/{}", env!("CARGO_PKG_VERSION")),
            default_headers: Vec::new(),
            retry: RetryPolicy::none(),
            gzip_requests: false,
            close_connection: false,
        }
    }
}

impl TransportConfig {
    /// Create a new configuration builder.
    pub fn builder() -> TransportConfigBuilder {
        TransportConfigBuilder::default()
    }
}

/// Builder for transport configuration.
#[derive(Debug, Default)]
pub struct TransportConfigBuilder {
    config: TransportConfig,
}

impl TransportConfigBuilder {
    /// Set the per-attempt timeout.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.config.timeout = timeout;
        self
    }

    /// Set the connection timeout.
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.config.connect_timeout = timeout;
        self
    }

    /// Set the user agent string.
    pub fn user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.config.user_agent = user_agent.into();
        self
    }

    /// Add a default header for all requests.
    pub fn default_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.config.default_headers.push((name.into(), value.into()));
        self
    }

    /// Set the retry policy.
    pub fn retry(mut self, policy: RetryPolicy) -> Self {
        self.config.retry = policy;
        self
    }

    /// Enable or disable gzip compression of request bodies.
    pub fn gzip_requests(mut self, enable: bool) -> Self {
        self.config.gzip_requests = enable;
        self
    }

    /// Enable or disable `Connection: close`.
    pub fn close_connection(mut self, enable: bool) -> Self {
        self.config.close_connection = enable;
        self
    }

    /// Build the configuration.
    pub fn build(self) -> TransportConfig {
        self.config
    }
}
