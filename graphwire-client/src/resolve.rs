//! Response resolution: envelope decoding and application-level retry
//! classification.
//!
//! A missing or `null` `data` member with no errors is decoded as JSON
//! `null`, so a target that cannot represent `null` fails with
//! [`GraphQLError::Decode`]. Ask for `Option<T>` when the server may answer
//! without data.

use graphwire_transport::Response;
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::{AggregateError, Envelope, GraphQLError, Result};

/// Result of resolving one terminal HTTP response.
#[derive(Debug)]
pub enum Resolution<T> {
    /// The envelope carried no errors; decoded data.
    Data(T),
    /// The envelope carried errors tagged as worth re-running the operation.
    Retry(AggregateError),
}

/// Decode the envelope in `response` into `T`.
///
/// A body that cannot be decoded is reported as a status failure when the
/// status is not 2xx, and as a decode failure otherwise. Errors that are not
/// retry-eligible are returned as [`GraphQLError::GraphQL`].
pub fn resolve<T: DeserializeOwned>(response: &Response) -> Result<Resolution<T>> {
    let status = response.status();
    let fail = |source: serde_json::Error| {
        if status.is_success() {
            GraphQLError::Decode {
                status: status.as_u16(),
                source,
            }
        } else {
            GraphQLError::Status {
                status: status.as_u16(),
            }
        }
    };

    let envelope: Envelope<Value> = response.json().map_err(fail)?;

    if envelope.has_errors() {
        let errors = AggregateError::new(envelope.errors.unwrap_or_default());
        if errors.is_retryable() {
            return Ok(Resolution::Retry(errors));
        }
        return Err(GraphQLError::GraphQL(errors));
    }

    let data = envelope.data.unwrap_or(Value::Null);
    serde_json::from_value(data).map(Resolution::Data).map_err(fail)
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::{HeaderMap, StatusCode};
    use serde::Deserialize;

    fn response(status: u16, body: &'static str) -> Response {
        Response::from_parts(
            StatusCode::from_u16(status).unwrap(),
            HeaderMap::new(),
            body,
            url::Url::parse("http://localhost/graphql").unwrap(),
        )
    }

    #[derive(Debug, Deserialize, PartialEq)]
    struct X {
        x: i32,
    }

    #[test]
    fn test_data() {
        let resolved = resolve::<X>(&response(200, r#"{"data":{"x":1}}"#)).unwrap();
        assert!(matches!(resolved, Resolution::Data(X { x: 1 })));
    }

    #[test]
    fn test_data_despite_error_status() {
        let resolved = resolve::<X>(&response(503, r#"{"data":{"x":2}}"#)).unwrap();
        assert!(matches!(resolved, Resolution::Data(X { x: 2 })));
    }

    #[test]
    fn test_null_data() {
        let resolved = resolve::<Option<X>>(&response(200, r#"{"data":null}"#)).unwrap();
        assert!(matches!(resolved, Resolution::Data(None)));

        let err = resolve::<X>(&response(200, r#"{"data":null}"#)).unwrap_err();
        assert!(matches!(err, GraphQLError::Decode { status: 200, .. }));
    }

    #[test]
    fn test_status_wins_over_decode_failure() {
        let err = resolve::<X>(&response(500, "Internal Server Error")).unwrap_err();
        assert!(matches!(err, GraphQLError::Status { status: 500 }));
        assert_eq!(err.to_string(), "server returned a non-200 status code: 500");
    }

    #[test]
    fn test_decode_failure_on_success() {
        let err = resolve::<X>(&response(200, "<html>")).unwrap_err();
        assert!(matches!(err, GraphQLError::Decode { status: 200, .. }));

        let err = resolve::<X>(&response(200, r#"{"data":{"y":1}}"#)).unwrap_err();
        assert!(matches!(err, GraphQLError::Decode { .. }));
    }

    #[test]
    fn test_non_retryable_errors_aggregate() {
        let body = r#"{"data":null,"errors":[
            {"message":"first","name":"not_found"},
            {"message":"second","data":{"id":7}}
        ]}"#;
        let err = resolve::<Value>(&response(400, body)).unwrap_err();

        assert_eq!(err.graphql_errors().map(|e| e.len()), Some(2));
        let text = err.to_string();
        assert!(text.contains("first"));
        assert!(text.find("first") < text.find("second"));
        assert!(text.contains(r#"{"id":7}"#));
    }

    #[test]
    fn test_retryable_errors() {
        let body = r#"{"errors":[
            {"message":"bad input","name":"invalid_input"},
            {"message":"try later","name":"service_unavailable"}
        ]}"#;
        match resolve::<Value>(&response(200, body)).unwrap() {
            Resolution::Retry(errors) => assert_eq!(errors.errors().len(), 2),
            Resolution::Data(_) => panic!("expected retry"),
        }
    }
}
