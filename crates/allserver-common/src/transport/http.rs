//! HTTP Transport Utilities
//!
//! Maps HTTP requests and responses onto the Allserver call model.
//!
//! # Conventions
//!
//! - `/<procedureName>` selects the procedure; an empty path is introspection
//! - a non-empty body must be JSON and becomes the argument; without a body the
//!   query string (`?a=1&b=two`) becomes the argument, values as strings
//! - replies are JSON envelopes; the status code is decided by the transport
//!   (200 success, 404 not found, 400 bad request or assertion, 500 procedure
//!   error, 204 when nothing was produced)

use http::header::{HeaderValue, CONTENT_TYPE};
use http::{Response, StatusCode};
use http_body_util::Full;
use bytes::Bytes;
use serde_json::{Map, Value};

use crate::protocol::{codes, CallError, Envelope};

/// Type alias for responses with a fully buffered body
pub type HyperResponse = Response<Full<Bytes>>;

/// HTTP mapping helpers
pub struct HttpCodec;

impl HttpCodec {
    /// Derives the procedure name from a request path.
    ///
    /// ```
    /// use allserver_common::transport::HttpCodec;
    ///
    /// assert_eq!(HttpCodec::procedure_name("/sayHello"), "sayHello");
    /// assert_eq!(HttpCodec::procedure_name("/"), "");
    /// ```
    pub fn procedure_name(path: &str) -> String {
        path.strip_prefix('/').unwrap_or(path).to_string()
    }

    /// Parses the call argument from a request body or query string.
    ///
    /// # Arguments
    ///
    /// * `body` - Raw HTTP body bytes
    /// * `query` - The request query string, without the leading `?`
    ///
    /// # Returns
    ///
    /// The argument object, or an `ALLSERVER_BAD_REQUEST` error when the body
    /// is not valid JSON
    ///
    /// # Example
    ///
    /// ```
    /// use allserver_common::transport::HttpCodec;
    /// use serde_json::json;
    ///
    /// let arg = HttpCodec::parse_argument(b"", Some("name=world")).unwrap();
    /// assert_eq!(arg, json!({"name": "world"}));
    /// ```
    pub fn parse_argument(body: &[u8], query: Option<&str>) -> Result<Value, CallError> {
        if !body.is_empty() {
            return serde_json::from_slice(body).map_err(|e| {
                CallError::coded(codes::ALLSERVER_BAD_REQUEST, "Can't parse JSON").with_source(e)
            });
        }

        let mut arg = Map::new();
        if let Some(query) = query {
            for (key, value) in url::form_urlencoded::parse(query.as_bytes()) {
                arg.insert(key.into_owned(), Value::String(value.into_owned()));
            }
        }
        Ok(Value::Object(arg))
    }

    /// The envelope sent back for undeserializable requests.
    pub fn bad_request() -> Envelope {
        Envelope::failure(codes::ALLSERVER_BAD_REQUEST, "Can't parse JSON")
    }

    /// Status code for a failed procedure call.
    ///
    /// Assertion failures are the caller's fault and map to 400.
    pub fn procedure_error_status(code: &str) -> StatusCode {
        if code == codes::ERR_ASSERTION {
            StatusCode::BAD_REQUEST
        } else {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }

    /// Creates a JSON response with the given status.
    pub fn json_response(status: StatusCode, body: &Value) -> HyperResponse {
        let body = serde_json::to_vec(body).unwrap_or_default();

        let mut response = Response::new(Full::new(Bytes::from(body)));
        *response.status_mut() = status;
        response
            .headers_mut()
            .insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        response
    }

    /// Creates a response without a body.
    pub fn empty_response(status: StatusCode) -> HyperResponse {
        let mut response = Response::new(Full::new(Bytes::new()));
        *response.status_mut() = status;
        response
    }

    /// Converts a non-2xx response body into a [`CallError`].
    ///
    /// JSON bodies carrying `code`/`message` (Allserver envelopes) lend them to
    /// the error; anything else becomes the message verbatim. The status is
    /// always recorded.
    pub fn error_from_response(status: u16, text: &str) -> CallError {
        let parsed = serde_json::from_str::<Value>(text).ok();
        let message = parsed
            .as_ref()
            .and_then(|v| v.get("message"))
            .and_then(Value::as_str)
            .map(str::to_string)
            .unwrap_or_else(|| {
                if text.is_empty() {
                    StatusCode::from_u16(status)
                        .ok()
                        .and_then(|s| s.canonical_reason())
                        .unwrap_or("HTTP error")
                        .to_string()
                } else {
                    text.to_string()
                }
            });

        let mut error = CallError::new(message).with_status(status);
        if let Some(code) = parsed.as_ref().and_then(|v| v.get("code")).and_then(Value::as_str) {
            error = error.with_code(code);
        }
        error
    }
}
