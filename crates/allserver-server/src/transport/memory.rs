//! In-process transport.
//!
//! No network is involved: starting the server returns an
//! `AllserverClient` whose calls go straight into
//! [`Allserver::handle_call`]. Useful for tests and for calling procedures
//! from the same process through the full middleware pipeline.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use allserver_client::{ClientCallContext, ClientFactory, ClientTransport};
use allserver_common::{CallError, Envelope, Result};
use async_trait::async_trait;
use serde_json::Value;

use super::{Started, Transport};
use crate::context::CallContext;
use crate::server::Allserver;

pub const MEMORY_SCHEME: &str = "memory";

static NEXT_INSTANCE: AtomicU64 = AtomicU64::new(0);

/// The procedure a client asked for.
#[derive(Debug, Clone)]
struct MemoryCall {
    procedure_name: String,
}

#[derive(Debug, Clone)]
struct MemoryReply(Option<Envelope>);

/// In-process server transport.
///
/// The returned client is built from the transport's [`ClientFactory`], so
/// client options and middleware can be configured up front.
#[derive(Clone, Default)]
pub struct MemoryTransport {
    factory: ClientFactory,
}

impl MemoryTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_factory(factory: ClientFactory) -> Self {
        Self { factory }
    }
}

#[async_trait]
impl Transport for MemoryTransport {
    async fn start_server(&self, server: Arc<Allserver>) -> Result<Started> {
        let transport = MemoryClientTransport::new(server);
        Ok(Started::Client(self.factory.with_transport(Arc::new(transport))))
    }

    fn procedure_name(&self, ctx: &CallContext) -> String {
        ctx.extensions
            .get::<MemoryCall>()
            .map(|call| call.procedure_name.clone())
            .unwrap_or_default()
    }

    fn reply(&self, ctx: &mut CallContext) {
        let reply = MemoryReply(ctx.result.clone());
        ctx.extensions.insert(reply);
    }
}

/// Client side of the in-process transport.
///
/// Each instance gets its own `memory://<n>` URI, so clients of different
/// servers never share an introspection cache entry.
pub struct MemoryClientTransport {
    server: Arc<Allserver>,
    uri: String,
}

impl MemoryClientTransport {
    pub fn new(server: Arc<Allserver>) -> Self {
        let instance = NEXT_INSTANCE.fetch_add(1, Ordering::Relaxed);
        Self {
            server,
            uri: format!("{}://{}", MEMORY_SCHEME, instance),
        }
    }

    async fn dispatch(&self, procedure_name: &str, arg: Value) -> Option<Envelope> {
        let mut ctx = CallContext::new(self.server.clone(), arg).with_extension(MemoryCall {
            procedure_name: procedure_name.to_string(),
        });
        self.server.handle_call(&mut ctx).await;
        ctx.extensions.remove::<MemoryReply>().and_then(|reply| reply.0)
    }
}

#[async_trait]
impl ClientTransport for MemoryClientTransport {
    fn uri(&self) -> &str {
        &self.uri
    }

    async fn call(&self, ctx: &mut ClientCallContext) -> std::result::Result<Envelope, CallError> {
        self.dispatch(&ctx.procedure_name, ctx.arg.clone())
            .await
            .ok_or_else(|| {
                CallError::new(format!("Procedure '{}' produced no reply", ctx.procedure_name))
            })
    }

    async fn introspect(
        &self,
        ctx: &mut ClientCallContext,
    ) -> std::result::Result<Envelope, CallError> {
        // A server with introspection disabled produces no reply
        self.dispatch("", ctx.arg.clone())
            .await
            .ok_or_else(|| CallError::new("Introspection is not available"))
    }
}

