//! Fluent operation builder.

use graphwire_transport::CancellationToken;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::time::Duration;

use crate::{FileUpload, GraphQLClient, Operation, Result};

/// Builder for queries and mutations.
pub struct QueryBuilder<'a> {
    client: &'a GraphQLClient,
    operation: Operation,
    timeout: Option<Duration>,
    cancel: Option<CancellationToken>,
}

impl<'a> QueryBuilder<'a> {
    /// Create a new query builder.
    pub(crate) fn new(client: &'a GraphQLClient, operation: Operation) -> Self {
        Self {
            client,
            operation,
            timeout: None,
            cancel: None,
        }
    }

    /// Set a single variable.
    pub fn variable(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.operation = self.operation.var(name, value);
        self
    }

    /// Merge variables from a serializable value.
    pub fn variables<T: Serialize>(mut self, variables: &T) -> Result<Self> {
        self.operation = self.operation.with_variables(variables)?;
        Ok(self)
    }

    /// Set the operation name.
    pub fn operation_name(mut self, name: impl Into<String>) -> Self {
        self.operation = self.operation.with_operation_name(name);
        self
    }

    /// Attach a file (requires the multipart body mode).
    pub fn file(mut self, file: FileUpload) -> Self {
        self.operation = self.operation.file(file);
        self
    }

    /// Add a header for this request.
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.operation = self.operation.header(name, value);
        self
    }

    /// Set a custom timeout for each attempt of this request.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Abort the request when `cancel` fires.
    pub fn cancel_token(mut self, cancel: CancellationToken) -> Self {
        self.cancel = Some(cancel);
        self
    }

    /// Execute and return the raw `data` value.
    pub async fn send_raw(self) -> Result<Value> {
        self.send().await
    }

    /// Execute and deserialize the `data` value.
    pub async fn send<T: DeserializeOwned>(self) -> Result<T> {
        let cancel = self.cancel.unwrap_or_else(CancellationToken::new);
        self.client
            .execute(self.operation, self.timeout, &cancel)
            .await
    }
}
