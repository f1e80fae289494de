//! Server transports.
//!
//! A [`Transport`] owns the wire protocol: it accepts requests, builds a
//! [`CallContext`] carrying its own sub-context in `extensions`, runs
//! [`Allserver::handle_call`], and turns the resulting envelope into a wire
//! reply. The engine only talks to the transport through the hooks below.
//!
//! | transport | introspection call | started as |
//! |-----------|--------------------|------------|
//! | [`HttpTransport`] | `POST /` | bound address |
//! | [`AxumTransport`] | `POST /` under the mount point | `axum::Router` |
//! | [`GrpcTransport`] | `Allserver/introspect` | bound address |
//! | [`LambdaTransport`] | empty procedure name | [`LambdaHandler`] |
//! | [`QueueTransport`] | `introspect` job | running worker |
//! | [`MemoryTransport`] | empty procedure name | in-process client |

pub mod grpc;
pub mod http;
pub mod lambda;
pub mod memory;
pub mod queue;
pub mod router;

use std::fmt;
use std::net::SocketAddr;
use std::sync::Arc;

use allserver_client::AllserverClient;
use allserver_common::Result;
use async_trait::async_trait;

use crate::context::CallContext;
use crate::server::Allserver;

pub use self::grpc::GrpcTransport;
pub use self::http::HttpTransport;
pub use self::lambda::{LambdaContext, LambdaHandler, LambdaTransport, LocalLambdaInvoker};
pub use self::memory::{MemoryClientTransport, MemoryTransport};
pub use self::queue::QueueTransport;
pub use self::router::AxumTransport;

/// The server side of a wire protocol.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Starts serving `server`.
    ///
    /// Schema and bind errors are returned here; nothing is served on failure.
    async fn start_server(&self, server: Arc<Allserver>) -> Result<Started>;

    async fn stop_server(&self) -> Result<()> {
        Ok(())
    }

    /// The procedure name addressed by the request.
    fn procedure_name(&self, ctx: &CallContext) -> String;

    /// Whether the request is the introspection call.
    ///
    /// Called after `ctx.procedure_name` is set.
    fn is_introspection(&self, ctx: &CallContext) -> bool {
        ctx.procedure_name.is_empty()
    }

    fn prepare_not_found_reply(&self, _ctx: &mut CallContext) {}

    fn prepare_procedure_error_reply(&self, _ctx: &mut CallContext) {}

    fn prepare_introspection_reply(&self, _ctx: &mut CallContext) {}

    /// Converts `ctx.result` into the wire reply, stored in `ctx.extensions`.
    fn reply(&self, ctx: &mut CallContext);
}

/// What a started transport hands back.
pub enum Started {
    /// A listening socket
    Address(SocketAddr),
    /// A client wired to the server in-process
    Client(AllserverClient),
    /// A serverless entry point
    Handler(LambdaHandler),
    /// A router to mount into an application
    Router(axum::Router),
    /// A background worker
    Worker,
}

impl Started {
    pub fn address(&self) -> Option<SocketAddr> {
        match self {
            Self::Address(addr) => Some(*addr),
            _ => None,
        }
    }

    pub fn into_client(self) -> Option<AllserverClient> {
        match self {
            Self::Client(client) => Some(client),
            _ => None,
        }
    }

    pub fn into_handler(self) -> Option<LambdaHandler> {
        match self {
            Self::Handler(handler) => Some(handler),
            _ => None,
        }
    }

    pub fn into_router(self) -> Option<axum::Router> {
        match self {
            Self::Router(router) => Some(router),
            _ => None,
        }
    }
}

impl fmt::Debug for Started {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Address(addr) => f.debug_tuple("Address").field(addr).finish(),
            Self::Client(client) => f.debug_tuple("Client").field(client).finish(),
            Self::Handler(_) => f.write_str("Handler"),
            Self::Router(_) => f.write_str("Router"),
            Self::Worker => f.write_str("Worker"),
        }
    }
}
