//! Client configuration and construction.
//!
//! A [`ClientFactory`] holds everything clients share: default options, the
//! URI scheme table, the introspection cache, and explicitly defined methods.
//! The factory is a `Clone` builder, so a configured factory doubles as a
//! "defaults" template: clones keep the configuration, and middleware added
//! to a clone is appended after the inherited chain rather than replacing it.
//!
//! ```
//! use allserver_client::ClientFactory;
//! use std::time::Duration;
//!
//! let traced = ClientFactory::default()
//!     .timeout(Duration::from_secs(5))
//!     .before(|ctx| {
//!         Box::pin(async move {
//!             ctx.trace_id.get_or_insert_with(|| "trace-1".to_string());
//!             Ok(None)
//!         })
//!     });
//!
//! // Inherits the timeout and the tracing middleware
//! let audited = traced.clone().after(|_ctx| Box::pin(async { Ok(None) }));
//! assert_eq!(audited.options().before.len(), 1);
//! assert_eq!(audited.options().after.len(), 1);
//! ```

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use allserver_common::{BoxFuture, Envelope, Middleware, MiddlewareResult, Result};
use serde_json::Value;

use crate::cache::IntrospectionCache;
use crate::client::AllserverClient;
use crate::context::ClientCallContext;
use crate::transport::{ClientTransport, TransportRegistry};

/// Client middleware.
pub type ClientMiddleware = Middleware<ClientCallContext>;

/// Renames (`Some(new_name)`) or hides (`None`) introspected procedures.
pub type NameMapper = Arc<dyn Fn(&str) -> Option<String> + Send + Sync>;

/// An explicitly defined client method. It takes precedence over any
/// introspected procedure with the same name.
pub type Method =
    Arc<dyn Fn(AllserverClient, Value) -> BoxFuture<'static, Result<Envelope>> + Send + Sync>;

/// Client behaviour switches.
///
/// # Default Configuration
///
/// - `timeout`: disabled (zero)
/// - `never_throw`: `true`
/// - `dynamic_methods`: `true`
/// - `auto_introspect`: `true`
/// - `call_introspected_procedures_only`: `true`
#[derive(Clone)]
pub struct ClientOptions {
    /// Per-call deadline; `Duration::ZERO` disables it
    pub timeout: Duration,
    /// Convert every failure into an envelope instead of an error
    pub never_throw: bool,
    /// Allow calling names that are not explicit methods
    pub dynamic_methods: bool,
    /// Introspect the server before the first dynamic call
    pub auto_introspect: bool,
    /// Refuse dynamic calls to names missing from the introspection
    pub call_introspected_procedures_only: bool,
    pub name_mapper: Option<NameMapper>,
    pub before: Vec<ClientMiddleware>,
    pub after: Vec<ClientMiddleware>,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            timeout: Duration::ZERO,
            never_throw: true,
            dynamic_methods: true,
            auto_introspect: true,
            call_introspected_procedures_only: true,
            name_mapper: None,
            before: Vec::new(),
            after: Vec::new(),
        }
    }
}

/// Builds [`AllserverClient`]s sharing options, transports and an introspection cache.
#[derive(Clone, Default)]
pub struct ClientFactory {
    options: ClientOptions,
    registry: TransportRegistry,
    cache: IntrospectionCache,
    methods: HashMap<String, Method>,
}

impl ClientFactory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces the introspection cache, e.g. to share one between factories.
    pub fn with_cache(mut self, cache: IntrospectionCache) -> Self {
        self.cache = cache;
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.options.timeout = timeout;
        self
    }

    pub fn never_throw(mut self, never_throw: bool) -> Self {
        self.options.never_throw = never_throw;
        self
    }

    pub fn dynamic_methods(mut self, dynamic_methods: bool) -> Self {
        self.options.dynamic_methods = dynamic_methods;
        self
    }

    pub fn auto_introspect(mut self, auto_introspect: bool) -> Self {
        self.options.auto_introspect = auto_introspect;
        self
    }

    pub fn call_introspected_procedures_only(mut self, only: bool) -> Self {
        self.options.call_introspected_procedures_only = only;
        self
    }

    pub fn name_mapper<F>(mut self, mapper: F) -> Self
    where
        F: Fn(&str) -> Option<String> + Send + Sync + 'static,
    {
        self.options.name_mapper = Some(Arc::new(mapper));
        self
    }

    /// Appends a `before` middleware.
    pub fn before<F>(mut self, middleware: F) -> Self
    where
        F: for<'a> Fn(&'a mut ClientCallContext) -> BoxFuture<'a, MiddlewareResult>
            + Send
            + Sync
            + 'static,
    {
        self.options.before.push(Arc::new(middleware));
        self
    }

    /// Appends an `after` middleware.
    pub fn after<F>(mut self, middleware: F) -> Self
    where
        F: for<'a> Fn(&'a mut ClientCallContext) -> BoxFuture<'a, MiddlewareResult>
            + Send
            + Sync
            + 'static,
    {
        self.options.after.push(Arc::new(middleware));
        self
    }

    /// Defines an explicit method.
    pub fn method<F>(mut self, name: impl Into<String>, method: F) -> Self
    where
        F: Fn(AllserverClient, Value) -> BoxFuture<'static, Result<Envelope>> + Send + Sync + 'static,
    {
        self.methods.insert(name.into(), Arc::new(method));
        self
    }

    /// Registers a transport constructor for a URI scheme (case-insensitive).
    pub fn add_transport<F>(mut self, scheme: &str, constructor: F) -> Self
    where
        F: Fn(&str) -> Result<Arc<dyn ClientTransport>> + Send + Sync + 'static,
    {
        self.registry.register(scheme, constructor);
        self
    }

    pub fn options(&self) -> &ClientOptions {
        &self.options
    }

    pub fn cache(&self) -> &IntrospectionCache {
        &self.cache
    }

    pub fn registry(&self) -> &TransportRegistry {
        &self.registry
    }

    /// Creates a client for `uri`, selecting the transport by scheme.
    ///
    /// Only `http`, `https` and `grpc` are registered by default. Lambda and
    /// queue transports need an invoker or a queue handle that a URI cannot
    /// carry, so register them with [`add_transport`](Self::add_transport) or
    /// pass one to [`with_transport`](Self::with_transport).
    ///
    /// # Errors
    ///
    /// - [`AllserverError::InvalidUri`](allserver_common::AllserverError::InvalidUri)
    ///   when the URI has no `SCHEMA://` prefix
    /// - [`AllserverError::UnsupportedScheme`](allserver_common::AllserverError::UnsupportedScheme)
    ///   when no transport is registered for the scheme, including `lambda://`
    ///   and `queue://` until they are added
    pub fn connect(&self, uri: &str) -> Result<AllserverClient> {
        let transport = self.registry.create(uri)?;
        Ok(self.with_transport(transport))
    }

    /// Creates a client over an explicit transport.
    pub fn with_transport(&self, transport: Arc<dyn ClientTransport>) -> AllserverClient {
        AllserverClient::new(
            transport,
            self.options.clone(),
            self.cache.clone(),
            self.methods.clone(),
        )
    }
}
