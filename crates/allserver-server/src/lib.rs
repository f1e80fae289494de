//! Allserver Server
//!
//! Exposes one set of procedures over any supported transport. The
//! [`Allserver`] engine is transport-agnostic: it runs middleware, calls
//! procedures, normalizes their results into envelopes and answers
//! introspection, while a [`Transport`] does the wire work.

pub mod context;
pub mod logger;
pub mod procedures;
pub mod server;
pub mod transport;

#[cfg(test)]
mod tests;

pub use context::CallContext;
pub use logger::{Logger, TracingLogger};
pub use procedures::{Procedure, ProcedureResult, Procedures};
pub use server::{Allserver, AllserverBuilder, Introspection, ServerMiddleware};
pub use transport::{
    AxumTransport, GrpcTransport, HttpTransport, LambdaContext, LambdaHandler, LambdaTransport,
    LocalLambdaInvoker, MemoryClientTransport, MemoryTransport, QueueTransport, Started,
    Transport,
};

pub use allserver_common::{codes, AllserverError, CallError, Envelope, Result};
