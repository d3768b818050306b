//! GraphQL operations and file attachments.

use graphql_client::QueryBody;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;
use serde_json::{Map, Value};
use std::fmt;
use std::io::{Cursor, Read};

use crate::{GraphQLError, Result};

static OPERATION_NAME: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^\s*(?:query|mutation|subscription)\s+([_A-Za-z][_0-9A-Za-z]*)").unwrap()
});

/// A file attached to an operation.
///
/// The stream is read exactly once, when the operation is encoded.
pub struct FileUpload {
    field: String,
    name: String,
    reader: Box<dyn Read + Send>,
}

impl FileUpload {
    /// Attach a readable stream filling the variable `field`.
    pub fn new(
        field: impl Into<String>,
        name: impl Into<String>,
        reader: impl Read + Send + 'static,
    ) -> Self {
        Self {
            field: field.into(),
            name: name.into(),
            reader: Box::new(reader),
        }
    }

    /// Attach in-memory contents.
    pub fn from_bytes(
        field: impl Into<String>,
        name: impl Into<String>,
        bytes: impl Into<Vec<u8>>,
    ) -> Self {
        Self::new(field, name, Cursor::new(bytes.into()))
    }

    /// Variable path this file fills, relative to `variables`.
    pub fn field(&self) -> &str {
        &self.field
    }

    /// File name sent with the part.
    pub fn name(&self) -> &str {
        &self.name
    }

    pub(crate) fn reader_mut(&mut self) -> &mut (dyn Read + Send) {
        self.reader.as_mut()
    }
}

impl fmt::Debug for FileUpload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FileUpload")
            .field("field", &self.field)
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

/// A query, mutation or subscription with its variables, attachments and
/// header overrides.
#[derive(Debug)]
pub struct Operation {
    query: String,
    operation_name: Option<String>,
    variables: Option<Map<String, Value>>,
    files: Vec<FileUpload>,
    headers: Vec<(String, String)>,
}

impl Operation {
    /// Create an operation from query text.
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            operation_name: None,
            variables: None,
            files: Vec::new(),
            headers: Vec::new(),
        }
    }

    /// Create an operation from a `graphql_client` generated query body.
    pub fn from_query_body<V: Serialize>(body: QueryBody<V>) -> Result<Self> {
        let operation = Self::new(body.query)
            .with_operation_name(body.operation_name)
            .with_variables(&body.variables)?;
        Ok(operation)
    }

    /// Set a single variable.
    pub fn var(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.variables
            .get_or_insert_with(Map::new)
            .insert(name.into(), value.into());
        self
    }

    /// Merge variables from any serializable map-like value.
    pub fn with_variables<T: Serialize + ?Sized>(mut self, variables: &T) -> Result<Self> {
        match serde_json::to_value(variables)? {
            Value::Object(map) => {
                self.variables.get_or_insert_with(Map::new).extend(map);
                Ok(self)
            }
            Value::Null => Ok(self),
            other => Err(GraphQLError::Encode(format!(
                "variables must serialize to an object, got {}",
                json_type(&other)
            ))),
        }
    }

    /// Set the operation name explicitly.
    pub fn with_operation_name(mut self, name: impl Into<String>) -> Self {
        self.operation_name = Some(name.into());
        self
    }

    /// Attach a file.
    pub fn file(mut self, file: FileUpload) -> Self {
        self.files.push(file);
        self
    }

    /// Add a header override for this operation.
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// Query text.
    pub fn query(&self) -> &str {
        &self.query
    }

    /// Operation name, explicit or taken from the query text.
    pub fn operation_name(&self) -> Option<String> {
        self.operation_name.clone().or_else(|| {
            OPERATION_NAME
                .captures(&self.query)
                .and_then(|c| c.get(1))
                .map(|m| m.as_str().to_string())
        })
    }

    /// Variables, `None` if none were set.
    pub fn variables(&self) -> Option<&Map<String, Value>> {
        self.variables.as_ref()
    }

    /// Header overrides.
    pub fn headers(&self) -> &[(String, String)] {
        &self.headers
    }

    /// Whether the operation carries file attachments.
    pub fn has_files(&self) -> bool {
        !self.files.is_empty()
    }

    /// Number of file attachments.
    pub fn file_count(&self) -> usize {
        self.files.len()
    }

    pub(crate) fn take_files(&mut self) -> Vec<FileUpload> {
        std::mem::take(&mut self.files)
    }
}

fn json_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_operation_name_from_query() {
        let cases = [
            ("query GetUser($id: ID!) { user(id: $id) { id } }", Some("GetUser")),
            ("  mutation\n  CreatePost { createPost { id } }", Some("CreatePost")),
            ("subscription OnMessage { message }", Some("OnMessage")),
            ("{ me { id } }", None),
            ("query { me { id } }", None),
        ];

        for (query, expected) in cases {
            assert_eq!(
                Operation::new(query).operation_name().as_deref(),
                expected,
                "{query}"
            );
        }
    }

    #[test]
    fn test_explicit_operation_name_wins() {
        let op = Operation::new("query A { a }").with_operation_name("B");
        assert_eq!(op.operation_name().as_deref(), Some("B"));
    }

    #[test]
    fn test_variables() {
        let op = Operation::new("query { user }")
            .var("id", "42")
            .with_variables(&json!({"limit": 10}))
            .unwrap();

        let vars = op.variables().unwrap();
        assert_eq!(vars["id"], "42");
        assert_eq!(vars["limit"], 10);
        assert!(Operation::new("{ x }").variables().is_none());
    }

    #[test]
    fn test_non_object_variables_rejected() {
        let err = Operation::new("{ x }").with_variables(&[1, 2]).unwrap_err();
        assert!(matches!(err, GraphQLError::Encode(_)));
    }

    #[test]
    fn test_from_query_body() {
        #[derive(Serialize)]
        struct Vars {
            login: String,
        }

        let body = QueryBody {
            variables: Vars {
                login: "octocat".into(),
            },
            query: "query Viewer($login: String!) { user(login: $login) { id } }",
            operation_name: "Viewer",
        };

        let op = Operation::from_query_body(body).unwrap();
        assert_eq!(op.operation_name().as_deref(), Some("Viewer"));
        assert_eq!(op.variables().unwrap()["login"], "octocat");
    }

    #[test]
    fn test_files_and_headers() {
        let mut op = Operation::new("mutation Upload($file: Upload!) { upload(file: $file) }")
            .file(FileUpload::from_bytes("file", "a.txt", "hello"))
            .header("X-Trace", "1");

        assert!(op.has_files());
        assert_eq!(op.file_count(), 1);
        assert_eq!(op.headers(), &[("X-Trace".to_string(), "1".to_string())]);

        let files = op.take_files();
        assert_eq!(files[0].field(), "file");
        assert_eq!(files[0].name(), "a.txt");
        assert!(!op.has_files());
    }
}
