//! Call argument conventions.
//!
//! Arguments are JSON objects. The reserved `_` member carries call metadata;
//! `_.procedureName` names the procedure being called, which lets transports
//! without a routing field (direct serverless invocations) dispatch on the
//! payload alone.

use serde_json::{Map, Value};

/// Reserved metadata member of an argument object.
pub const META_FIELD: &str = "_";

/// Metadata key holding the procedure name.
pub const PROCEDURE_NAME_FIELD: &str = "procedureName";

/// Normalizes an inbound argument and records the procedure name if absent.
///
/// `null` becomes `{}`. Non-object arguments are left alone.
pub fn default_procedure_name(arg: &mut Value, procedure_name: &str) {
    if let Some(meta) = meta_mut(arg) {
        let missing = meta
            .get(PROCEDURE_NAME_FIELD)
            .and_then(Value::as_str)
            .map_or(true, str::is_empty);
        if missing {
            meta.insert(PROCEDURE_NAME_FIELD.into(), Value::String(procedure_name.into()));
        }
    }
}

/// Records the procedure name on an outbound argument, replacing any previous one.
pub fn stamp_procedure_name(arg: &mut Value, procedure_name: &str) {
    if let Some(meta) = meta_mut(arg) {
        meta.insert(PROCEDURE_NAME_FIELD.into(), Value::String(procedure_name.into()));
    }
}

/// Reads `_.procedureName` from an argument.
pub fn procedure_name(arg: &Value) -> Option<&str> {
    arg.get(META_FIELD)?.get(PROCEDURE_NAME_FIELD)?.as_str()
}

fn meta_mut(arg: &mut Value) -> Option<&mut Map<String, Value>> {
    if arg.is_null() {
        *arg = Value::Object(Map::new());
    }
    let object = arg.as_object_mut()?;
    let meta = object
        .entry(META_FIELD)
        .or_insert_with(|| Value::Object(Map::new()));
    if !meta.is_object() {
        *meta = Value::Object(Map::new());
    }
    meta.as_object_mut()
}
