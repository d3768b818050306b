//! Retry-aware transport implementation.

use bytes::Bytes;
use flate2::Compression;
use flate2::write::GzEncoder;
use http::header::{CONNECTION, CONTENT_ENCODING};
use std::io::Write;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::{
    HttpRequest, Response, Result, RetryAttempt, RetryPolicy, RetryState, TransportConfig,
    TransportError,
};

/// HTTP transport that executes one logical operation across as many
/// physical attempts as its retry policy allows.
#[derive(Clone)]
pub struct Transport {
    inner: reqwest::Client,
    config: Arc<TransportConfig>,
}

impl Transport {
    /// Create a new transport with the given configuration.
    pub fn new(config: TransportConfig) -> Result<Self> {
        let inner = reqwest::Client::builder()
            .timeout(config.timeout)
            .connect_timeout(config.connect_timeout)
            .user_agent(&config.user_agent)
            .gzip(true)
            .build()?;

        Ok(Self::with_client(inner, config))
    }

    /// Create a transport around an existing reqwest client.
    ///
    /// Timeouts and the user agent configured on `inner` take precedence over
    /// the ones in `config`.
    pub fn with_client(inner: reqwest::Client, config: TransportConfig) -> Self {
        Self {
            inner,
            config: Arc::new(config),
        }
    }

    /// Get the underlying reqwest client.
    pub fn inner(&self) -> &reqwest::Client {
        &self.inner
    }

    /// Get the transport configuration.
    pub fn config(&self) -> &TransportConfig {
        &self.config
    }

    /// Execute `request` under the configured retry policy.
    pub async fn execute(
        &self,
        request: &mut HttpRequest,
        cancel: &CancellationToken,
    ) -> Result<Response> {
        let mut state = RetryState::new(self.config.retry.clone());
        self.execute_with_state(request, &mut state, cancel).await
    }

    /// Execute `request`, drawing attempts from an existing budget.
    ///
    /// Returns the first terminal response. Non-2xx statuses that the policy
    /// does not consider retryable are returned as responses, not errors.
    pub async fn execute_with_state(
        &self,
        request: &mut HttpRequest,
        state: &mut RetryState,
        cancel: &CancellationToken,
    ) -> Result<Response> {
        loop {
            if cancel.is_cancelled() {
                return Err(TransportError::Cancelled);
            }

            let payload = self.prepare_body(request)?;
            let attempt = state.begin_attempt();
            debug!(
                attempt,
                method = %request.method(),
                url = %request.url(),
                bytes = payload.len(),
                "Sending request"
            );

            let result = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(TransportError::Cancelled),
                result = self.execute_once(request, payload) => result,
            };

            let (response, error) = match classify(state.policy(), result) {
                Outcome::Done(response) => return Ok(response),
                Outcome::Fail(error) => return Err(error),
                Outcome::Retry { response, error } => (response, error),
            };

            let last_status = response.as_ref().map(|r| r.status().as_u16());
            if !state.can_retry() {
                let message = match (&response, &error) {
                    (Some(response), _) => response.status().to_string(),
                    (None, Some(error)) => error.to_string(),
                    (None, None) => "Unknown error".to_string(),
                };
                warn!(attempts = attempt, ?last_status, %message, "Retry budget exhausted");
                return Err(TransportError::RetryExhausted {
                    attempts: attempt,
                    last_status,
                    message,
                });
            }

            debug!(
                attempt,
                ?last_status,
                delay = ?state.next_delay(),
                "Retrying request"
            );
            state.policy().notify(&RetryAttempt {
                request,
                response: response.as_ref(),
                error: error.as_ref(),
                attempt,
            });
            state.wait(cancel).await?;
        }
    }

    /// Bytes to put on the wire for the next attempt.
    fn prepare_body(&self, request: &mut HttpRequest) -> Result<Bytes> {
        let raw = request.body_mut().replay()?;
        if !self.config.gzip_requests {
            return Ok(raw);
        }

        let mut encoder = GzEncoder::new(Vec::with_capacity(raw.len() / 2 + 32), Compression::default());
        encoder.write_all(&raw)?;
        Ok(Bytes::from(encoder.finish()?))
    }

    /// Execute one physical attempt.
    async fn execute_once(&self, request: &HttpRequest, payload: Bytes) -> Result<Response> {
        let mut builder = self
            .inner
            .request(request.method().clone(), request.url().clone());

        for (name, value) in &self.config.default_headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        builder = builder.headers(request.headers().clone());

        if self.config.gzip_requests {
            builder = builder.header(CONTENT_ENCODING, "gzip");
        }
        if self.config.close_connection {
            builder = builder.header(CONNECTION, "close");
        }
        if let Some(timeout) = request.timeout() {
            builder = builder.timeout(timeout);
        }

        let response = builder.body(payload).send().await?;
        Response::from_reqwest(response).await
    }
}

/// Classification of one attempt.
#[derive(Debug)]
enum Outcome {
    Done(Response),
    Retry {
        response: Option<Response>,
        error: Option<TransportError>,
    },
    Fail(TransportError),
}

fn classify(policy: &RetryPolicy, result: Result<Response>) -> Outcome {
    if !policy.is_enabled() {
        return match result {
            Ok(response) => Outcome::Done(response),
            Err(error) => Outcome::Fail(error),
        };
    }

    match result {
        Ok(response) if policy.should_retry_status(response.status().as_u16()) => Outcome::Retry {
            response: Some(response),
            error: None,
        },
        Ok(response) => Outcome::Done(response),
        Err(error) if error.is_timeout() => Outcome::Retry {
            response: None,
            error: Some(error),
        },
        Err(error) => Outcome::Fail(error),
    }
}
