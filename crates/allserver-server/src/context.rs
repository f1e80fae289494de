use std::fmt;
use std::sync::Arc;

use allserver_common::{CallError, Envelope};
use serde_json::{Map, Value};

use crate::procedures::Procedure;
use crate::server::Allserver;

/// Per-call record threaded through the server pipeline.
///
/// Transports create one per inbound request with the decoded argument and
/// their own sub-context in [`extensions`](Self::extensions); the engine fills
/// in the rest as the call progresses. Middleware may read and change every
/// public field.
pub struct CallContext {
    /// Position of this call in the server's entry order, starting at 0
    pub call_number: u64,
    pub procedure_name: String,
    /// The resolved procedure, if any
    pub procedure: Option<Procedure>,
    pub is_introspection: bool,
    pub arg: Value,
    /// The procedure map, once introspection ran
    pub introspection: Option<Map<String, Value>>,
    pub result: Option<Envelope>,
    pub error: Option<Arc<CallError>>,
    pub trace_id: Option<String>,
    /// Transport sub-context
    pub extensions: http::Extensions,
    server: Arc<Allserver>,
}

impl CallContext {
    pub fn new(server: Arc<Allserver>, arg: Value) -> Self {
        Self {
            call_number: 0,
            procedure_name: String::new(),
            procedure: None,
            is_introspection: false,
            arg,
            introspection: None,
            result: None,
            error: None,
            trace_id: None,
            extensions: http::Extensions::new(),
            server,
        }
    }

    /// Attaches a transport sub-context value.
    pub fn with_extension<T>(mut self, value: T) -> Self
    where
        T: Clone + Send + Sync + 'static,
    {
        self.extensions.insert(value);
        self
    }

    /// The server handling this call.
    pub fn server(&self) -> &Arc<Allserver> {
        &self.server
    }
}

impl fmt::Debug for CallContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CallContext")
            .field("call_number", &self.call_number)
            .field("procedure_name", &self.procedure_name)
            .field("is_introspection", &self.is_introspection)
            .field("arg", &self.arg)
            .field("result", &self.result)
            .field("trace_id", &self.trace_id)
            .finish()
    }
}
