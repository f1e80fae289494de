//! Introspection snapshot format.
//!
//! An introspection reply is a regular envelope whose `procedures` field is a
//! JSON *string* encoding a map of procedure name to either `"function"` or a
//! nested map (a namespace):
//!
//! ```text
//! {
//!   "success": true,
//!   "code": "ALLSERVER_INTROSPECTION",
//!   "message": "Introspection as JSON string",
//!   "procedures": "{\"sayHello\":\"function\",\"admin\":{\"reset\":\"function\"}}"
//! }
//! ```

use serde_json::{Map, Value};

use super::codes;
use super::envelope::Envelope;

/// Marker value for invocable entries in the procedure map.
pub const FUNCTION: &str = "function";

/// Envelope field holding the JSON-encoded procedure map.
pub const PROCEDURES_FIELD: &str = "procedures";

/// Envelope field holding the `.proto` source in gRPC introspection replies.
pub const PROTO_FIELD: &str = "proto";

/// Separator for nested procedure names (`namespace.procedure`).
pub const NAMESPACE_SEPARATOR: char = '.';

/// Builds the introspection envelope for a procedure map.
pub fn snapshot(procedures: &Map<String, Value>) -> Envelope {
    let encoded = Value::Object(procedures.clone()).to_string();
    Envelope::success(codes::ALLSERVER_INTROSPECTION, "Introspection as JSON string")
        .with(PROCEDURES_FIELD, Value::String(encoded))
}

/// Extracts the procedure map from an introspection envelope.
///
/// Accepts the JSON string form and, leniently, an already decoded object.
/// Returns `None` for a missing field, invalid JSON, or JSON that is not an
/// object.
pub fn parse_procedures(envelope: &Envelope) -> Option<Map<String, Value>> {
    match envelope.get(PROCEDURES_FIELD)? {
        Value::String(encoded) => match serde_json::from_str::<Value>(encoded) {
            Ok(Value::Object(map)) => Some(map),
            _ => None,
        },
        Value::Object(map) => Some(map.clone()),
        _ => None,
    }
}

/// Lists every invocable procedure, nested namespaces flattened to dotted names.
///
/// Entries that are neither `"function"` nor a namespace are skipped.
pub fn procedure_names(procedures: &Map<String, Value>) -> Vec<String> {
    let mut names = Vec::new();
    collect_names(procedures, None, &mut names);
    names
}

fn collect_names(procedures: &Map<String, Value>, prefix: Option<&str>, names: &mut Vec<String>) {
    for (name, kind) in procedures {
        let full_name = match prefix {
            Some(prefix) => format!("{}{}{}", prefix, NAMESPACE_SEPARATOR, name),
            None => name.clone(),
        };
        match kind {
            Value::String(kind) if kind == FUNCTION => names.push(full_name),
            Value::Object(nested) => collect_names(nested, Some(&full_name), names),
            _ => {}
        }
    }
}
