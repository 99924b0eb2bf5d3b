//! JSON serializers and the default-filling builder extension.
//!
//! Wire format:
//!
//! - success: the output value, encoded as is
//! - error: `{"error": <detail>}` where `<detail>` is the error's own JSON
//!   value if it is a [`JsonError`], otherwise its `Display` message
//!
//! Every response carries `content-type: application/json`.

use std::sync::Arc;

use http::StatusCode;
use serde::Serialize;
use serde_json::{Value, json};
use tracing::error;

use crate::contract::{Input, Serializer};
use crate::error::{BoxError, Error};
use crate::pipeline::{Outcome, Pipeline, PipelineBuilder};
use crate::request::Request;
use crate::response::Response;

/// Written when the value itself cannot be encoded.
const ENCODE_FAILURE: &[u8] = br#"{"error":"internal serialization error"}"#;

fn encode<T: Serialize + ?Sized>(status: StatusCode, value: &T, req: &Request) -> Response {
    match serde_json::to_vec(value) {
        Ok(body) => Response::builder().status(status).json(body),
        Err(e) => {
            error!(path = %req.path(), status = %status, "json encoding failed: {e}");
            Response::builder()
                .status(StatusCode::INTERNAL_SERVER_ERROR)
                .json(ENCODE_FAILURE)
        }
    }
}

// ── Success ───────────────────────────────────────────────────────────────────

/// Encodes any `Serialize` value as the response body.
#[derive(Clone, Copy, Debug)]
pub struct JsonSerializer {
    status: StatusCode,
}

impl JsonSerializer {
    pub fn new(status: StatusCode) -> Self {
        Self { status }
    }
}

impl Default for JsonSerializer {
    fn default() -> Self {
        Self::new(StatusCode::OK)
    }
}

impl<T: Serialize> Serializer<T> for JsonSerializer {
    fn serialize(&self, value: T, req: &Request) -> Response {
        encode(self.status, &value, req)
    }
}

// ── Errors ────────────────────────────────────────────────────────────────────

/// An error that knows its own JSON representation.
///
/// Return one from any phase to send structured detail instead of a plain
/// message:
///
/// ```rust
/// use resdk::json::JsonError;
/// use serde_json::json;
///
/// let err = JsonError::new("invalid input", json!({ "name": "required" }));
/// assert_eq!(err.to_string(), "invalid input");
/// ```
#[derive(Clone, Debug, thiserror::Error)]
#[error("{message}")]
pub struct JsonError {
    message: String,
    detail: Value,
}

impl JsonError {
    pub fn new(message: impl Into<String>, detail: Value) -> Self {
        Self { message: message.into(), detail }
    }

    pub fn detail(&self) -> &Value {
        &self.detail
    }
}

/// Writes `{"error": ...}` with a fixed status.
#[derive(Clone, Debug)]
pub struct JsonErrorSerializer {
    status: StatusCode,
    error: Option<Value>,
}

impl JsonErrorSerializer {
    pub fn new(status: StatusCode) -> Self {
        Self { status, error: None }
    }

    /// 404 with the detail fixed to `"Not found"`.
    pub fn not_found() -> Self {
        Self::new(StatusCode::NOT_FOUND).with_error("Not found")
    }

    /// Replaces the detail of every response with `error`, whatever the
    /// phase reported. Keeps internal messages off the wire.
    pub fn with_error(mut self, error: impl Into<Value>) -> Self {
        self.error = Some(error.into());
        self
    }

    fn detail(&self, err: &BoxError) -> Value {
        if let Some(fixed) = &self.error {
            return fixed.clone();
        }
        match err.downcast_ref::<JsonError>() {
            Some(err) => err.detail.clone(),
            None => Value::String(err.to_string()),
        }
    }
}

impl Serializer<BoxError> for JsonErrorSerializer {
    fn serialize(&self, err: BoxError, req: &Request) -> Response {
        encode(self.status, &json!({ "error": self.detail(&err) }), req)
    }
}

// ── Defaults ──────────────────────────────────────────────────────────────────

impl<I, O, C> PipelineBuilder<I, O, C>
where
    O: Serialize,
{
    /// Fills every serializer slot still empty with the JSON family, using
    /// [`Outcome::status_hint`] for the status:
    ///
    /// | slot | status |
    /// |---|---|
    /// | success | 200 |
    /// | authentication error | 401 |
    /// | validation error | 400 |
    /// | processing error | 500 |
    /// | not found | 404 |
    /// | authorization error | 403 |
    ///
    /// Slots set before or after this call keep the serializer given to them.
    pub fn json_defaults(mut self) -> Self {
        fn fallback(outcome: Outcome) -> Arc<dyn Serializer<BoxError>> {
            Arc::new(JsonErrorSerializer::new(outcome.status_hint()))
        }

        self.success.get_or_insert_with(|| {
            Arc::new(JsonSerializer::new(Outcome::Success.status_hint())) as Arc<dyn Serializer<O>>
        });
        self.authentication_error.get_or_insert_with(|| fallback(Outcome::Authentication));
        self.validation_error.get_or_insert_with(|| fallback(Outcome::Validation));
        self.processing_error.get_or_insert_with(|| fallback(Outcome::Processing));
        self.not_found.get_or_insert_with(|| fallback(Outcome::NotFound));
        self.authorization_error.get_or_insert_with(|| fallback(Outcome::Authorization));
        self
    }

    /// `json_defaults().build()`.
    pub fn build_json(self) -> Result<Pipeline<I, O, C>, Error>
    where
        I: Input,
    {
        self.json_defaults().build()
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use bytes::Bytes;
    use serde::Serialize;

    use super::*;

    fn req() -> Request {
        http::Request::builder().uri("/").body(Bytes::new()).unwrap().into()
    }

    fn body_json(res: &Response) -> Value {
        serde_json::from_slice(res.body()).unwrap()
    }

    #[derive(Serialize)]
    struct User {
        id: u32,
    }

    #[test]
    fn success_encodes_value() {
        let res = JsonSerializer::default().serialize(User { id: 1 }, &req());
        assert_eq!(res.status_code(), StatusCode::OK);
        assert_eq!(res.header("content-type"), Some("application/json"));
        assert_eq!(res.body(), br#"{"id":1}"#);
    }

    #[test]
    fn plain_error_uses_message() {
        let err: BoxError = "db down".into();
        let res = JsonErrorSerializer::new(StatusCode::INTERNAL_SERVER_ERROR).serialize(err, &req());
        assert_eq!(res.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(res.body(), br#"{"error":"db down"}"#);
    }

    #[test]
    fn json_error_uses_detail() {
        let err: BoxError = Box::new(JsonError::new("bad", json!({ "name": "required" })));
        let res = JsonErrorSerializer::new(StatusCode::BAD_REQUEST).serialize(err, &req());
        assert_eq!(body_json(&res), json!({ "error": { "name": "required" } }));
    }

    #[test]
    fn fixed_error_overrides_detail() {
        let err: BoxError = "connection refused on 10.0.0.3".into();
        let res = JsonErrorSerializer::new(StatusCode::INTERNAL_SERVER_ERROR)
            .with_error("internal error")
            .serialize(err, &req());
        assert_eq!(res.body(), br#"{"error":"internal error"}"#);
    }

    #[test]
    fn not_found_hides_the_reason() {
        let err: BoxError = "row 42 missing from users".into();
        let res = JsonErrorSerializer::not_found().serialize(err, &req());
        assert_eq!(res.status_code(), StatusCode::NOT_FOUND);
        assert_eq!(res.body(), br#"{"error":"Not found"}"#);
    }

    #[test]
    fn json_error_displays_its_message() {
        let err = JsonError::new("invalid input", json!({ "name": "required" }));
        assert_eq!(err.to_string(), "invalid input");
        let boxed: BoxError = Box::new(err);
        assert!(boxed.downcast_ref::<JsonError>().is_some());
    }

    #[test]
    fn unencodable_value_becomes_500() {
        // Non-string map keys are rejected by serde_json.
        let mut bad = BTreeMap::new();
        bad.insert(vec![1u8], 1);
        let res = JsonSerializer::new(StatusCode::CREATED).serialize(bad, &req());
        assert_eq!(res.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(res.body(), ENCODE_FAILURE);
    }
}
