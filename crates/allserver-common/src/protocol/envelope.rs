//! Allserver Result Envelope
//!
//! Every reply, on every transport, is coerced into this shape before it
//! leaves the server and before it is handed to the caller on the client.

use serde::{de, Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Map, Value};
use std::sync::Arc;

use super::codes;
use super::error::CallError;

/// The standard `{ success, code, message, ...extra }` result.
///
/// # Fields
///
/// - `success`: discriminates the success and failure paths
/// - `code`: short machine-readable code (see [`codes`])
/// - `message`: human-readable description
/// - `extra`: any other top-level fields, e.g. the procedure result stored
///   under the procedure name or the `procedures` introspection string
///
/// A `code` or `message` that is not a string stays in `extra` untouched and
/// wins over the (empty) typed field when the envelope is serialized, so
/// envelopes returned by procedures pass through exactly as written.
///
/// Failure envelopes produced on the client side also keep the error that
/// caused them (see [`Envelope::error`]). That error is never serialized.
///
/// # Example
///
/// ```
/// use allserver_common::Envelope;
/// use serde_json::json;
///
/// let envelope = Envelope::success("SUCCESS", "Success").with("answer", json!(42));
/// assert_eq!(
///     serde_json::to_value(&envelope).unwrap(),
///     json!({"success": true, "code": "SUCCESS", "message": "Success", "answer": 42})
/// );
/// ```
#[derive(Debug, Clone, Default)]
pub struct Envelope {
    pub success: bool,
    pub code: String,
    pub message: String,
    pub extra: Map<String, Value>,
    error: Option<Arc<CallError>>,
}

impl Envelope {
    pub fn success(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            success: true,
            code: code.into(),
            message: message.into(),
            ..Default::default()
        }
    }

    pub fn failure(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            success: false,
            code: code.into(),
            message: message.into(),
            ..Default::default()
        }
    }

    /// `{success: true, code: "SUCCESS", message: "Success"}`
    pub fn ok() -> Self {
        Self::success(codes::SUCCESS, "Success")
    }

    /// Normalizes a procedure return value.
    ///
    /// - `None` becomes the generic success envelope
    /// - a value with a boolean `success` field passes through unchanged
    /// - anything else is wrapped under a key equal to the procedure name
    pub fn from_procedure_result(procedure_name: &str, value: Option<Value>) -> Self {
        match value {
            None => Self::ok(),
            Some(value) => match Self::from_value(value) {
                Ok(envelope) => envelope,
                Err(value) => Self::ok().with(procedure_name, value),
            },
        }
    }

    /// Interprets a JSON value as an envelope.
    ///
    /// Succeeds when `value` is an object with a boolean `success` field.
    /// Missing `code`/`message` default to empty strings; non-string ones are
    /// kept in `extra`. The original value is handed back otherwise.
    pub fn from_value(value: Value) -> std::result::Result<Self, Value> {
        match value {
            Value::Object(mut map) if map.get("success").map_or(false, Value::is_boolean) => {
                let success = matches!(map.remove("success"), Some(Value::Bool(true)));
                let code = take_string(&mut map, "code");
                let message = take_string(&mut map, "message");

                Ok(Self {
                    success,
                    code,
                    message,
                    extra: map,
                    error: None,
                })
            }
            other => Err(other),
        }
    }

    /// True for objects carrying a boolean `success` field.
    pub fn looks_like_envelope(value: &Value) -> bool {
        value.get("success").map(Value::is_boolean).unwrap_or(false)
    }

    /// Adds (or replaces) an extra top-level field.
    pub fn with(mut self, key: impl Into<String>, value: Value) -> Self {
        self.extra.insert(key.into(), value);
        self
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.extra.get(key)
    }

    pub fn insert(&mut self, key: impl Into<String>, value: Value) -> Option<Value> {
        self.extra.insert(key.into(), value)
    }

    /// Attaches the error that produced this failure envelope.
    pub fn with_error(mut self, error: Arc<CallError>) -> Self {
        self.error = Some(error);
        self
    }

    /// The error that produced this envelope, when it was created from one.
    pub fn error(&self) -> Option<&Arc<CallError>> {
        self.error.as_ref()
    }

    pub fn to_value(&self) -> Value {
        let mut map = Map::with_capacity(self.extra.len() + 3);
        map.insert("success".into(), Value::Bool(self.success));
        map.insert("code".into(), Value::String(self.code.clone()));
        map.insert("message".into(), Value::String(self.message.clone()));
        for (key, value) in &self.extra {
            map.insert(key.clone(), value.clone());
        }
        Value::Object(map)
    }
}

// Equality is about the wire shape; the attached error is ignored.
impl PartialEq for Envelope {
    fn eq(&self, other: &Self) -> bool {
        self.success == other.success
            && self.code == other.code
            && self.message == other.message
            && self.extra == other.extra
    }
}

impl Serialize for Envelope {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        self.to_value().serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Envelope {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let value = Value::deserialize(deserializer)?;
        Envelope::from_value(value)
            .map_err(|_| de::Error::custom("expected an object with a boolean `success` field"))
    }
}

impl From<Envelope> for Value {
    fn from(envelope: Envelope) -> Self {
        envelope.to_value()
    }
}

fn take_string(map: &mut Map<String, Value>, key: &str) -> String {
    if !map.get(key).map_or(false, Value::is_string) {
        return String::new();
    }
    match map.remove(key) {
        Some(Value::String(s)) => s,
        _ => String::new(),
    }
}
