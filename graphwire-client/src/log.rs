//! Caller-supplied trace callback.

use std::fmt;
use std::sync::Arc;

/// Receives human-readable request/response trace lines.
///
/// Carried in the client configuration; `tracing` events are emitted
/// whether or not a logger is set.
#[derive(Clone)]
pub struct Logger(Arc<dyn Fn(&str) + Send + Sync>);

impl Logger {
    /// Wrap a callback.
    pub fn new<F>(f: F) -> Self
    where
        F: Fn(&str) + Send + Sync + 'static,
    {
        Self(Arc::new(f))
    }

    /// Emit one line.
    pub fn log(&self, line: &str) {
        (self.0)(line)
    }

    pub(crate) fn log_fmt(logger: Option<&Logger>, args: fmt::Arguments<'_>) {
        if let Some(logger) = logger {
            logger.log(&args.to_string());
        }
    }
}

impl fmt::Debug for Logger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Logger(..)")
    }
}
