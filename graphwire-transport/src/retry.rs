//! Retry policies, the per-operation retry budget, and cancellable backoff.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use crate::{HttpRequest, Response, Result, TransportError};

/// Pre-retry observer hook.
pub type BeforeRetry = Arc<dyn Fn(&RetryAttempt<'_>) + Send + Sync>;

/// Kind of retry policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RetryKind {
    /// Retries disabled; exactly one attempt.
    #[default]
    None,
    /// Constant interval between attempts.
    Linear,
    /// Interval doubles after every attempt, capped at the max interval.
    Exponential,
}

impl fmt::Display for RetryKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::None => write!(f, "none"),
            Self::Linear => write!(f, "linear"),
            Self::Exponential => write!(f, "exponential"),
        }
    }
}

/// Snapshot of a failed attempt handed to the pre-retry observer.
#[derive(Debug)]
pub struct RetryAttempt<'a> {
    /// The request that was sent.
    pub request: &'a HttpRequest,
    /// The response, if the exchange produced one.
    pub response: Option<&'a Response>,
    /// The transport error, if the exchange failed.
    pub error: Option<&'a TransportError>,
    /// 1-based number of the attempt that failed.
    pub attempt: u32,
}

/// Retry policy.
#[derive(Clone)]
pub struct RetryPolicy {
    /// Policy kind.
    pub kind: RetryKind,
    /// Maximum number of physical attempts, including the first one.
    pub max_tries: u32,
    /// Base interval between attempts.
    pub interval: Duration,
    /// Upper bound for any interval.
    pub max_interval: Duration,
    /// Explicit retryable status codes. `None` means any 5xx or 429.
    pub retry_status: Option<HashSet<u16>>,
    /// Observer invoked before every retry.
    pub before_retry: Option<BeforeRetry>,
}

impl fmt::Debug for RetryPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RetryPolicy")
            .field("kind", &self.kind)
            .field("max_tries", &self.max_tries)
            .field("interval", &self.interval)
            .field("max_interval", &self.max_interval)
            .field("retry_status", &self.retry_status)
            .field("before_retry", &self.before_retry.is_some())
            .finish()
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::none()
    }
}

impl RetryPolicy {
    /// A policy that never retries.
    pub fn none() -> Self {
        Self {
            kind: RetryKind::None,
            max_tries: 1,
            interval: Duration::ZERO,
            max_interval: Duration::ZERO,
            retry_status: None,
            before_retry: None,
        }
    }

    /// Retry up to `max_tries` attempts with a constant interval.
    pub fn linear(max_tries: u32, interval: Duration) -> Self {
        Self {
            kind: RetryKind::Linear,
            max_tries: max_tries.max(1),
            interval,
            max_interval: interval,
            retry_status: None,
            before_retry: None,
        }
    }

    /// Retry up to `max_tries` attempts, doubling the interval each time.
    pub fn exponential(max_tries: u32, interval: Duration, max_interval: Duration) -> Self {
        Self {
            kind: RetryKind::Exponential,
            max_tries: max_tries.max(1),
            interval,
            max_interval,
            retry_status: None,
            before_retry: None,
        }
    }

    /// Only retry responses with one of these status codes.
    pub fn with_status_codes(mut self, codes: impl IntoIterator<Item = u16>) -> Self {
        self.retry_status = Some(codes.into_iter().collect());
        self
    }

    /// Set the observer invoked before every retry.
    pub fn before_retry<F>(mut self, hook: F) -> Self
    where
        F: Fn(&RetryAttempt<'_>) + Send + Sync + 'static,
    {
        self.before_retry = Some(Arc::new(hook));
        self
    }

    /// Whether retry classification is active at all.
    pub fn is_enabled(&self) -> bool {
        self.kind != RetryKind::None
    }

    /// Interval to wait after the `retry`-th retryable failure (0-based).
    pub fn delay_for_attempt(&self, retry: u32) -> Duration {
        match self.kind {
            RetryKind::None => Duration::ZERO,
            RetryKind::Linear => self.interval.min(self.max_interval),
            RetryKind::Exponential => 1u32
                .checked_shl(retry)
                .and_then(|factor| self.interval.checked_mul(factor))
                .unwrap_or(self.max_interval)
                .min(self.max_interval),
        }
    }

    /// Check if a response status should trigger a retry.
    pub fn should_retry_status(&self, status: u16) -> bool {
        match &self.retry_status {
            Some(codes) => codes.contains(&status),
            None => (500..600).contains(&status) || status == 429,
        }
    }

    /// Invoke the pre-retry observer, if any.
    pub fn notify(&self, attempt: &RetryAttempt<'_>) {
        if let Some(hook) = &self.before_retry {
            hook(attempt);
        }
    }
}

/// Attempt budget for one logical operation.
///
/// Transport-level retries and application-level retries of the same
/// operation draw from the same `RetryState`, so `max_tries` bounds the total
/// number of physical attempts.
#[derive(Debug)]
pub struct RetryState {
    policy: RetryPolicy,
    attempts: u32,
}

impl RetryState {
    /// Start a fresh budget.
    pub fn new(policy: RetryPolicy) -> Self {
        Self {
            policy,
            attempts: 0,
        }
    }

    /// The policy this budget was created from.
    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Number of physical attempts started so far.
    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    /// Record the start of a physical attempt and return its 1-based number.
    pub fn begin_attempt(&mut self) -> u32 {
        self.attempts += 1;
        self.attempts
    }

    /// Whether another attempt is allowed.
    pub fn can_retry(&self) -> bool {
        self.policy.is_enabled() && self.attempts < self.policy.max_tries
    }

    /// Interval to wait before the next attempt.
    pub fn next_delay(&self) -> Duration {
        self.policy
            .delay_for_attempt(self.attempts.saturating_sub(1))
    }

    /// Wait out the next interval unless `cancel` fires first.
    pub async fn wait(&self, cancel: &CancellationToken) -> Result<()> {
        wait(self.next_delay(), cancel).await
    }
}

/// Sleep for `delay`, returning [`TransportError::Cancelled`] if `cancel`
/// fires first.
pub async fn wait(delay: Duration, cancel: &CancellationToken) -> Result<()> {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(TransportError::Cancelled),
        _ = tokio::time::sleep(delay) => Ok(()),
    }
}
