use std::sync::Arc;

use allserver_common::{CallError, Envelope};
use serde_json::Value;

use crate::client::AllserverClient;

/// Per-call record threaded through the client pipeline.
///
/// Created fresh for each outbound call and handed to the transport's
/// `create_call_context`, which attaches its own sub-context in
/// [`extensions`](Self::extensions) (HTTP headers, response status, raw
/// serverless payloads). Middleware may read and change any field; a
/// `before` middleware can, for example, set `trace_id` and add a header.
#[derive(Clone)]
pub struct ClientCallContext {
    pub procedure_name: String,
    pub is_introspection: bool,
    pub arg: Value,
    pub result: Option<Envelope>,
    pub error: Option<Arc<CallError>>,
    pub trace_id: Option<String>,
    pub extensions: http::Extensions,
    client: AllserverClient,
}

impl ClientCallContext {
    pub(crate) fn new(
        client: AllserverClient,
        procedure_name: impl Into<String>,
        is_introspection: bool,
        arg: Value,
    ) -> Self {
        Self {
            procedure_name: procedure_name.into(),
            is_introspection,
            arg,
            result: None,
            error: None,
            trace_id: None,
            extensions: http::Extensions::new(),
            client,
        }
    }

    /// The client making this call.
    pub fn client(&self) -> &AllserverClient {
        &self.client
    }
}
