//! Client transports.
//!
//! A [`ClientTransport`] performs the actual network operation for one wire
//! protocol and maps its failures onto [`CallError`]: connectivity failures
//! are flagged with [`CallError::no_net_to_server`], remote failures keep the
//! server's code when the protocol carries one.
//!
//! Transports are selected by URI scheme through a [`TransportRegistry`].

pub mod grpc;
pub mod http;
pub mod lambda;
pub mod queue;

use std::collections::HashMap;
use std::sync::Arc;

use allserver_common::{AllserverError, CallError, Envelope, Result};
use async_trait::async_trait;

use crate::context::ClientCallContext;

pub use grpc::GrpcClientTransport;
pub use http::HttpClientTransport;
pub use lambda::{InvokeError, LambdaClientTransport, LambdaInvoker};
pub use queue::QueueClientTransport;

/// The client side of a wire protocol.
#[async_trait]
pub trait ClientTransport: Send + Sync {
    /// The server address this transport talks to.
    fn uri(&self) -> &str;

    /// Whether clients may introspect through this transport automatically.
    fn auto_introspect(&self) -> bool {
        true
    }

    /// Performs a procedure call and returns the server's envelope.
    async fn call(&self, ctx: &mut ClientCallContext) -> std::result::Result<Envelope, CallError>;

    /// Performs the reserved introspection call.
    async fn introspect(
        &self,
        ctx: &mut ClientCallContext,
    ) -> std::result::Result<Envelope, CallError>;

    /// Attaches the transport's sub-context to a fresh call context.
    fn create_call_context(&self, ctx: ClientCallContext) -> ClientCallContext {
        ctx
    }
}

/// Builds a transport for a URI.
pub type TransportConstructor =
    Arc<dyn Fn(&str) -> Result<Arc<dyn ClientTransport>> + Send + Sync>;

/// URI scheme table.
///
/// `http`, `https` and `grpc` are registered by default. Transports that need
/// a handle beyond the URI (a serverless invoker, a job queue) are registered
/// by the application with [`register`](Self::register).
#[derive(Clone)]
pub struct TransportRegistry {
    constructors: HashMap<String, TransportConstructor>,
}

impl TransportRegistry {
    /// An empty table.
    pub fn empty() -> Self {
        Self {
            constructors: HashMap::new(),
        }
    }

    pub fn register<F>(&mut self, scheme: &str, constructor: F)
    where
        F: Fn(&str) -> Result<Arc<dyn ClientTransport>> + Send + Sync + 'static,
    {
        self.constructors
            .insert(scheme.to_ascii_lowercase(), Arc::new(constructor));
    }

    pub fn supports(&self, scheme: &str) -> bool {
        self.constructors.contains_key(&scheme.to_ascii_lowercase())
    }

    /// Creates the transport registered for `uri`'s scheme.
    pub fn create(&self, uri: &str) -> Result<Arc<dyn ClientTransport>> {
        let scheme = scheme_of(uri)?;
        let constructor = self
            .constructors
            .get(&scheme)
            .ok_or_else(|| AllserverError::UnsupportedScheme(uri.to_string()))?;
        constructor(uri)
    }
}

impl Default for TransportRegistry {
    fn default() -> Self {
        let mut registry = Self::empty();
        for scheme in ["http", "https"] {
            registry.register(scheme, |uri| {
                Ok(Arc::new(HttpClientTransport::new(uri)?) as Arc<dyn ClientTransport>)
            });
        }
        registry.register("grpc", |uri| {
            Ok(Arc::new(GrpcClientTransport::new(uri)?) as Arc<dyn ClientTransport>)
        });
        registry
    }
}

/// Extracts the lowercase scheme of a `SCHEMA://URI` string.
pub fn scheme_of(uri: &str) -> Result<String> {
    match uri.split_once("://") {
        Some((scheme, _))
            if !scheme.is_empty()
                && scheme
                    .chars()
                    .all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.')) =>
        {
            Ok(scheme.to_ascii_lowercase())
        }
        _ => Err(AllserverError::InvalidUri(uri.to_string())),
    }
}
