//! Operation encoding: JSON bodies, multipart upload forms and
//! subscription start payloads.

use bytes::Bytes;
use http_body_util::BodyExt;
use reqwest::multipart::{Form, Part};
use serde::Serialize;
use serde_json::{Map, Value, json};
use std::io::Read;

use crate::{GraphQLError, Operation, Result};

/// Content type of JSON request bodies.
pub const JSON_CONTENT_TYPE: &str = "application/json; charset=utf-8";

/// Content type of file parts in multipart bodies.
pub const FILE_CONTENT_TYPE: &str = "application/octet-stream";

// never sent; only frames the multipart body
const FORM_URL: &str = "http://localhost/";

/// Wire mode for unary operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BodyMode {
    /// `{query, variables}` JSON body.
    #[default]
    Json,
    /// GraphQL multipart request (file uploads).
    Multipart,
}

/// A serialized request body.
#[derive(Debug, Clone)]
pub struct EncodedBody {
    /// Body bytes.
    pub bytes: Bytes,
    /// Value for the `Content-Type` header.
    pub content_type: String,
}

#[derive(Serialize)]
struct JsonBody<'a> {
    query: &'a str,
    variables: Option<&'a Map<String, Value>>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct Operations<'a> {
    operation_name: Option<String>,
    variables: Option<&'a Map<String, Value>>,
    query: &'a str,
}

/// Encode `operation` in the given mode. File streams are consumed.
///
/// Multipart bodies are framed by `http` and buffered once, so every attempt
/// replays the same bytes.
pub async fn encode(
    operation: &mut Operation,
    mode: BodyMode,
    http: &reqwest::Client,
) -> Result<EncodedBody> {
    match mode {
        BodyMode::Json => encode_json(operation),
        BodyMode::Multipart => encode_multipart(operation, http).await,
    }
}

/// Encode as `{query, variables}`.
pub fn encode_json(operation: &Operation) -> Result<EncodedBody> {
    if operation.has_files() {
        return Err(GraphQLError::Encode(
            "cannot send files in JSON mode; use the multipart body mode".to_string(),
        ));
    }

    let body = JsonBody {
        query: operation.query(),
        variables: operation.variables(),
    };
    let bytes = serde_json::to_vec(&body).map_err(|e| GraphQLError::Encode(e.to_string()))?;

    Ok(EncodedBody {
        bytes: Bytes::from(bytes),
        content_type: JSON_CONTENT_TYPE.to_string(),
    })
}

/// Encode as a GraphQL multipart request.
///
/// Parts are written in order: `operations`, `map`, then one part per file
/// named by its 1-based index. Top-level variable slots filled by files are
/// set to `null` in `operations`.
pub async fn encode_multipart(
    operation: &mut Operation,
    http: &reqwest::Client,
) -> Result<EncodedBody> {
    let mut files = operation.take_files();

    let mut variables = operation.variables().cloned();
    let mut map = Map::new();
    for (i, file) in files.iter().enumerate() {
        map.insert((i + 1).to_string(), json!([format!("variables.{}", file.field())]));
        if !file.field().contains('.') {
            variables
                .get_or_insert_with(Map::new)
                .insert(file.field().to_string(), Value::Null);
        }
    }

    let operations = Operations {
        operation_name: operation.operation_name(),
        variables: variables.as_ref(),
        query: operation.query(),
    };
    let operations =
        serde_json::to_string(&operations).map_err(|e| GraphQLError::Encode(e.to_string()))?;
    let map = serde_json::to_string(&map).map_err(|e| GraphQLError::Encode(e.to_string()))?;

    let mut form = Form::new().text("operations", operations).text("map", map);
    for (i, file) in files.iter_mut().enumerate() {
        let mut contents = Vec::new();
        file.reader_mut()
            .read_to_end(&mut contents)
            .map_err(GraphQLError::FileCopy)?;
        let part = Part::bytes(contents)
            .file_name(file.name().to_string())
            .mime_str(FILE_CONTENT_TYPE)
            .map_err(|e| GraphQLError::Encode(e.to_string()))?;
        form = form.part((i + 1).to_string(), part);
    }

    let content_type = format!("multipart/form-data; boundary={}", form.boundary());
    let mut request = http
        .post(FORM_URL)
        .multipart(form)
        .build()
        .map_err(|e| GraphQLError::Encode(e.to_string()))?;
    let body = request
        .body_mut()
        .take()
        .ok_or_else(|| GraphQLError::Encode("multipart form produced no body".to_string()))?;
    let bytes = body
        .collect()
        .await
        .map_err(|e| GraphQLError::Encode(e.to_string()))?
        .to_bytes();

    Ok(EncodedBody {
        bytes,
        content_type,
    })
}

/// Payload of a subscription `start` frame.
pub fn start_payload(operation: &Operation) -> Result<Value> {
    if operation.has_files() {
        return Err(GraphQLError::Encode(
            "file uploads are not supported on subscriptions".to_string(),
        ));
    }

    Ok(json!({
        "query": operation.query(),
        "variables": operation.variables(),
    }))
}
