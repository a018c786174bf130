//! Built-in response and error renders.

use std::sync::Arc;

use http::StatusCode;
use janus_core::{ErrorEnvelope, JanusError, JanusResult, Reply, CODE_INTERNAL};
use serde_json::{json, Value};

/// A response render: converts a target's return value into a reply.
pub type ResponseRender = Arc<dyn Fn(Value) -> JanusResult<Reply> + Send + Sync>;

/// An error render: converts a failure into a reply. Cannot fail.
pub type ErrorRender = Arc<dyn Fn(&JanusError) -> Reply + Send + Sync>;

/// Every built-in response render, in registration order.
#[must_use]
pub fn builtin_responses() -> Vec<(&'static str, ResponseRender)> {
    let wrapped: ResponseRender = Arc::new(|value: Value| Ok(envelope(value)));
    let raw: ResponseRender = Arc::new(|value: Value| Ok(Reply::json(StatusCode::OK, &value)));
    vec![("envelope", wrapped), ("raw", raw)]
}

/// Every built-in error render, in registration order.
#[must_use]
pub fn builtin_errors() -> Vec<(&'static str, ErrorRender)> {
    let render: ErrorRender = Arc::new(error_envelope);
    vec![("envelope", render)]
}

/// Wraps a return value in the success envelope.
///
/// Objects and `null` are placed under `data` as they are; any other value
/// is first wrapped as `{"data": value}`.
///
/// ```
/// use janus_render::envelope;
/// use serde_json::json;
///
/// let reply = envelope(json!(5));
/// assert_eq!(
///     reply.json_body().unwrap(),
///     json!({"code": 0, "msg": "ok", "data": {"data": 5}})
/// );
/// ```
#[must_use]
pub fn envelope(value: Value) -> Reply {
    let data = match value {
        Value::Null | Value::Object(_) => value,
        other => json!({ "data": other }),
    };
    Reply::json(
        StatusCode::OK,
        &json!({ "code": 0, "msg": "ok", "data": data }),
    )
}

/// Translates an error into `{"code", "msg"}`.
///
/// Validation and application errors keep their code, message and status.
/// Anything else is logged with its full chain and reported as `100000`
/// with HTTP 500.
#[must_use]
pub fn error_envelope(err: &JanusError) -> Reply {
    let (status, body) = if err.kind().is_public() {
        (
            err.status_code(),
            ErrorEnvelope {
                code: err.code(),
                msg: err.to_string(),
            },
        )
    } else {
        let chain = err.chain_text();
        tracing::error!(error = %chain, kind = ?err.kind(), "request failed");
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            ErrorEnvelope {
                code: CODE_INTERNAL,
                msg: chain,
            },
        )
    };
    Reply::json(status, &json!(body))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_envelope_wraps_scalars() {
        assert_eq!(
            envelope(json!(5)).json_body().unwrap(),
            json!({"code": 0, "msg": "ok", "data": {"data": 5}})
        );
        assert_eq!(
            envelope(json!([1, 2])).json_body().unwrap()["data"],
            json!({"data": [1, 2]})
        );
    }

    #[test]
    fn test_envelope_keeps_objects_and_null() {
        assert_eq!(
            envelope(json!({"sum": 5})).json_body().unwrap()["data"],
            json!({"sum": 5})
        );
        assert_eq!(envelope(Value::Null).json_body().unwrap()["data"], Value::Null);
        assert_eq!(envelope(Value::Null).status, StatusCode::OK);
    }

    #[test]
    fn test_error_envelope_validation() {
        let reply = error_envelope(&JanusError::param_lack("b"));
        assert_eq!(reply.status, StatusCode::BAD_REQUEST);
        assert_eq!(
            reply.json_body().unwrap(),
            json!({"code": 100101, "msg": "field `b` must be assiged"})
        );
    }

    #[test]
    fn test_error_envelope_application_status() {
        let err = JanusError::application(40_401, "no such user").with_status(StatusCode::NOT_FOUND);
        let reply = error_envelope(&err);
        assert_eq!(reply.status, StatusCode::NOT_FOUND);
        assert_eq!(
            reply.json_body().unwrap(),
            json!({"code": 40401, "msg": "no such user"})
        );
    }

    #[test]
    fn test_error_envelope_internal() {
        let io = std::io::Error::new(std::io::ErrorKind::Other, "connection reset");
        let err = JanusError::internal_with_source("query failed", io);
        let reply = error_envelope(&err);
        assert_eq!(reply.status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(
            reply.json_body().unwrap(),
            json!({"code": 100000, "msg": "query failed: connection reset"})
        );
    }

    #[test]
    fn test_raw_response() {
        let (_, raw) = builtin_responses().remove(1);
        let reply = raw(json!([1])).unwrap();
        assert_eq!(reply.json_body().unwrap(), json!([1]));
    }
}
