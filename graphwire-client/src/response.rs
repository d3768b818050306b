//! GraphQL response types.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// The `{data, errors}` envelope returned by the server.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Envelope<T = Value> {
    /// The data returned by the query/mutation.
    pub data: Option<T>,
    /// Errors returned by the server.
    #[serde(default)]
    pub errors: Option<Vec<GraphQLResponseError>>,
    /// Extensions (for tracing, caching info, etc.).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extensions: Option<Value>,
}

impl<T> Envelope<T> {
    /// Check if the response has errors.
    pub fn has_errors(&self) -> bool {
        self.errors.as_ref().is_some_and(|e| !e.is_empty())
    }

    /// Get the errors.
    pub fn errors(&self) -> &[GraphQLResponseError] {
        self.errors.as_deref().unwrap_or(&[])
    }

    /// Get the data, returning an error if there are GraphQL errors.
    pub fn into_result(self) -> crate::Result<Option<T>> {
        match self.errors {
            Some(errors) if !errors.is_empty() => {
                Err(crate::GraphQLError::GraphQL(AggregateError::new(errors)))
            }
            _ => Ok(self.data),
        }
    }
}

/// A GraphQL error from the server.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct GraphQLResponseError {
    /// Error message.
    pub message: String,
    /// Classification tag.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Structured error data.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    /// When the server raised the error.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time_thrown: Option<String>,
    /// Locations in the query where the error occurred.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub locations: Option<Vec<ErrorLocation>>,
    /// Path to the field that caused the error.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<Vec<PathSegment>>,
    /// Additional error extensions.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extensions: Option<Value>,
}

impl GraphQLResponseError {
    /// An untagged error with only a message.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            name: None,
            data: None,
            time_thrown: None,
            locations: None,
            path: None,
            extensions: None,
        }
    }

    /// Set the classification tag.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Classification of this error.
    pub fn kind(&self) -> ErrorKind {
        self.name
            .as_deref()
            .map(ErrorKind::from_tag)
            .unwrap_or(ErrorKind::Unclassified(String::new()))
    }

    /// Whether this error makes the whole operation worth retrying.
    pub fn is_retryable(&self) -> bool {
        self.kind().is_retryable()
    }
}

impl fmt::Display for GraphQLResponseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)?;
        if let Some(path) = &self.path
            && !path.is_empty()
        {
            write!(f, " (path: {})", format_path(path))?;
        }
        if let Some(locations) = &self.locations
            && !locations.is_empty()
        {
            write!(f, " at ")?;
            for (i, loc) in locations.iter().enumerate() {
                if i > 0 {
                    write!(f, ", ")?;
                }
                write!(f, "{}:{}", loc.line, loc.column)?;
            }
        }
        Ok(())
    }
}

/// Error classification tags.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ErrorKind {
    /// `not_found`
    NotFound,
    /// `not_allowed`
    NotAllowed,
    /// `invalid_input`
    InvalidInput,
    /// `capacity_exceeded`
    CapacityExceeded,
    /// `authentication_error`
    Authentication,
    /// `not_implemented`
    NotImplemented,
    /// `service_unavailable`
    ServiceUnavailable,
    /// `service_failure`
    ServiceFailure,
    /// `internal_error`
    Internal,
    /// Any other tag, kept verbatim. Empty when the error carried no tag.
    Unclassified(String),
}

impl ErrorKind {
    /// Parse a wire tag.
    pub fn from_tag(tag: &str) -> Self {
        match tag {
            "not_found" => Self::NotFound,
            "not_allowed" => Self::NotAllowed,
            "invalid_input" => Self::InvalidInput,
            "capacity_exceeded" => Self::CapacityExceeded,
            "authentication_error" => Self::Authentication,
            "not_implemented" => Self::NotImplemented,
            "service_unavailable" => Self::ServiceUnavailable,
            "service_failure" => Self::ServiceFailure,
            "internal_error" => Self::Internal,
            other => Self::Unclassified(other.to_string()),
        }
    }

    /// Wire tag for this kind.
    pub fn as_str(&self) -> &str {
        match self {
            Self::NotFound => "not_found",
            Self::NotAllowed => "not_allowed",
            Self::InvalidInput => "invalid_input",
            Self::CapacityExceeded => "capacity_exceeded",
            Self::Authentication => "authentication_error",
            Self::NotImplemented => "not_implemented",
            Self::ServiceUnavailable => "service_unavailable",
            Self::ServiceFailure => "service_failure",
            Self::Internal => "internal_error",
            Self::Unclassified(tag) => tag,
        }
    }

    /// Whether errors of this kind warrant re-running the operation.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::CapacityExceeded | Self::ServiceUnavailable | Self::ServiceFailure | Self::Internal
        )
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// All application errors of one response, in server order.
#[derive(Debug, Clone, PartialEq)]
pub struct AggregateError(Vec<GraphQLResponseError>);

impl AggregateError {
    /// Wrap a list of errors.
    pub fn new(errors: Vec<GraphQLResponseError>) -> Self {
        Self(errors)
    }

    /// The individual errors.
    pub fn errors(&self) -> &[GraphQLResponseError] {
        &self.0
    }

    /// Consume into the individual errors.
    pub fn into_errors(self) -> Vec<GraphQLResponseError> {
        self.0
    }

    /// Whether any error warrants re-running the operation.
    pub fn is_retryable(&self) -> bool {
        self.0.iter().any(GraphQLResponseError::is_retryable)
    }
}

impl fmt::Display for AggregateError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, err) in self.0.iter().enumerate() {
            if i > 0 {
                write!(f, " ")?;
            }
            let data = err.data.as_ref().unwrap_or(&Value::Null);
            write!(f, "error {}: message ({}), data ({}).", i, err, data)?;
        }
        Ok(())
    }
}

/// Location in the GraphQL query.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct ErrorLocation {
    /// Line number (1-indexed).
    pub line: u32,
    /// Column number (1-indexed).
    pub column: u32,
}

/// Path segment in a GraphQL error.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(untagged)]
pub enum PathSegment {
    /// Field name.
    Field(String),
    /// Array index.
    Index(usize),
}

impl fmt::Display for PathSegment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Field(name) => write!(f, "{}", name),
            Self::Index(idx) => write!(f, "[{}]", idx),
        }
    }
}

/// Format a path as a string.
pub fn format_path(path: &[PathSegment]) -> String {
    path.iter()
        .map(|s| s.to_string())
        .collect::<Vec<_>>()
        .join(".")
}
