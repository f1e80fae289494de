//! Procedure registry.
//!
//! Procedures are async functions taking the call argument and the call
//! context. They are grouped in a tree: a [`Procedures`] table maps names to
//! either a procedure or a nested table (a namespace). Nested procedures are
//! called with dotted names (`admin.reset`) and introspected as nested
//! objects.
//!
//! ```
//! use allserver_server::Procedures;
//! use serde_json::json;
//!
//! let procedures = Procedures::new()
//!     .procedure("sayHello", |arg, _ctx| {
//!         Box::pin(async move {
//!             let name = arg["name"].as_str().unwrap_or("world").to_string();
//!             Ok(Some(json!(format!("Hello {}", name))))
//!         })
//!     })
//!     .namespace(
//!         "admin",
//!         Procedures::new().procedure("reset", |_arg, _ctx| Box::pin(async { Ok(None) })),
//!     );
//!
//! assert!(procedures.get("admin.reset").is_some());
//! assert!(procedures.get("admin").is_none());
//! ```

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use allserver_common::protocol::introspection::{FUNCTION, NAMESPACE_SEPARATOR};
use allserver_common::{AllserverError, BoxFuture, CallError, Result};
use serde_json::{Map, Value};

use crate::context::CallContext;

/// What a procedure returns. `Ok(None)` means it returned nothing.
pub type ProcedureResult = std::result::Result<Option<Value>, CallError>;

/// A registered procedure.
pub type Procedure = Arc<
    dyn for<'a> Fn(Value, &'a mut CallContext) -> BoxFuture<'a, ProcedureResult> + Send + Sync,
>;

#[derive(Clone)]
pub enum Entry {
    Procedure(Procedure),
    Namespace(Procedures),
}

/// A tree of named procedures.
#[derive(Clone, Default)]
pub struct Procedures {
    entries: BTreeMap<String, Entry>,
}

impl Procedures {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a procedure, replacing any entry with the same name.
    pub fn procedure<F>(mut self, name: impl Into<String>, procedure: F) -> Self
    where
        F: for<'a> Fn(Value, &'a mut CallContext) -> BoxFuture<'a, ProcedureResult>
            + Send
            + Sync
            + 'static,
    {
        self.entries
            .insert(name.into(), Entry::Procedure(Arc::new(procedure)));
        self
    }

    /// Registers a nested table under `name`.
    pub fn namespace(mut self, name: impl Into<String>, procedures: Procedures) -> Self {
        self.entries.insert(name.into(), Entry::Namespace(procedures));
        self
    }

    /// Resolves a possibly dotted name to a procedure.
    ///
    /// Namespaces themselves are not callable.
    pub fn get(&self, name: &str) -> Option<Procedure> {
        let mut table = self;
        let mut segments = name.split(NAMESPACE_SEPARATOR).peekable();

        while let Some(segment) = segments.next() {
            match (table.entries.get(segment)?, segments.peek()) {
                (Entry::Procedure(procedure), None) => return Some(procedure.clone()),
                (Entry::Namespace(nested), Some(_)) => table = nested,
                _ => return None,
            }
        }
        None
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Checks every name in the tree.
    ///
    /// Names must be non-empty and must not contain the namespace separator.
    pub fn validate(&self) -> Result<()> {
        for (name, entry) in &self.entries {
            if name.is_empty() {
                return Err(AllserverError::InvalidProcedures(
                    "Procedure names must not be empty".into(),
                ));
            }
            if name.contains(NAMESPACE_SEPARATOR) {
                return Err(AllserverError::InvalidProcedures(format!(
                    "Procedure name '{}' must not contain '{}'",
                    name, NAMESPACE_SEPARATOR
                )));
            }
            if let Entry::Namespace(nested) = entry {
                nested.validate()?;
            }
        }
        Ok(())
    }

    /// The introspection map: name -> `"function"` or a nested map.
    pub fn introspect(&self) -> Map<String, Value> {
        self.entries
            .iter()
            .map(|(name, entry)| {
                let value = match entry {
                    Entry::Procedure(_) => Value::String(FUNCTION.into()),
                    Entry::Namespace(nested) => Value::Object(nested.introspect()),
                };
                (name.clone(), value)
            })
            .collect()
    }
}

impl fmt::Debug for Procedures {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map()
            .entries(self.entries.iter().map(|(name, entry)| {
                let kind = match entry {
                    Entry::Procedure(_) => "procedure".to_string(),
                    Entry::Namespace(nested) => format!("namespace({})", nested.len()),
                };
                (name, kind)
            }))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn noop() -> Procedures {
        Procedures::new().procedure("noop", |_arg, _ctx| Box::pin(async { Ok(None) }))
    }

    #[test]
    fn test_nested_lookup() {
        let procedures = noop().namespace("admin", noop().namespace("deep", noop()));

        assert!(procedures.get("noop").is_some());
        assert!(procedures.get("admin.noop").is_some());
        assert!(procedures.get("admin.deep.noop").is_some());
        assert!(procedures.get("admin.deep").is_none());
        assert!(procedures.get("admin.missing").is_none());
        assert!(procedures.get("noop.extra").is_none());
        assert!(procedures.get("").is_none());
    }

    #[test]
    fn test_introspect_shape() {
        let procedures = noop().namespace("admin", noop());
        assert_eq!(
            Value::Object(procedures.introspect()),
            json!({"noop": "function", "admin": {"noop": "function"}})
        );
    }

    #[test]
    fn test_validate_rejects_bad_names() {
        assert!(noop().validate().is_ok());

        let dotted = Procedures::new().namespace("ns", Procedures::new().procedure(
            "a.b",
            |_arg, _ctx| Box::pin(async { Ok(None) }),
        ));
        match dotted.validate() {
            Err(AllserverError::InvalidProcedures(message)) => assert!(message.contains("a.b")),
            other => panic!("Expected InvalidProcedures, got {:?}", other),
        }

        let empty = Procedures::new().procedure("", |_arg, _ctx| Box::pin(async { Ok(None) }));
        assert!(empty.validate().is_err());
    }
}
