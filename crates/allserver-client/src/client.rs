//! The client dispatch engine.
//!
//! [`AllserverClient::call`] runs one call through the pipeline:
//!
//! 1. the transport builds the call context
//! 2. `before` middleware (a produced result skips the transport)
//! 3. the transport call, optionally raced against the timeout
//! 4. `after` middleware (a produced result overwrites the current one)
//!
//! [`AllserverClient::resolve_and_call`] adds method resolution on top: explicit
//! methods first, then names learned from introspection, then (if allowed) a
//! blind forward to the server.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use allserver_common::protocol::{argument, introspection};
use allserver_common::{
    codes, run_chain, AllserverError, CallError, Envelope, Phase, Result,
};
use parking_lot::RwLock;
use serde_json::{Map, Value};

use crate::cache::IntrospectionCache;
use crate::context::ClientCallContext;
use crate::factory::{ClientOptions, Method};
use crate::transport::ClientTransport;

/// A handle to one Allserver server.
///
/// Cheap to clone; clones share the transport and the learned method table.
#[derive(Clone)]
pub struct AllserverClient {
    inner: Arc<ClientInner>,
}

struct ClientInner {
    transport: Arc<dyn ClientTransport>,
    options: ClientOptions,
    cache: IntrospectionCache,
    methods: HashMap<String, Method>,
    /// Introspected procedures: local name -> server procedure name
    forwarded: RwLock<HashMap<String, String>>,
}

impl AllserverClient {
    pub(crate) fn new(
        transport: Arc<dyn ClientTransport>,
        options: ClientOptions,
        cache: IntrospectionCache,
        methods: HashMap<String, Method>,
    ) -> Self {
        Self {
            inner: Arc::new(ClientInner {
                transport,
                options,
                cache,
                methods,
                forwarded: RwLock::new(HashMap::new()),
            }),
        }
    }

    /// Creates a client with default options and a private introspection cache.
    ///
    /// Use a [`ClientFactory`](crate::ClientFactory) to share the cache between clients.
    /// Only `http`, `https` and `grpc` URIs are understood here; see
    /// [`ClientFactory::connect`](crate::ClientFactory::connect).
    pub fn connect(uri: &str) -> Result<Self> {
        crate::ClientFactory::default().connect(uri)
    }

    pub fn uri(&self) -> &str {
        self.inner.transport.uri()
    }

    pub fn transport(&self) -> &Arc<dyn ClientTransport> {
        &self.inner.transport
    }

    pub fn options(&self) -> &ClientOptions {
        &self.inner.options
    }

    /// Whether `name` resolves without contacting the server.
    pub fn has_method(&self, name: &str) -> bool {
        self.inner.methods.contains_key(name) || self.inner.forwarded.read().contains_key(name)
    }

    /// Names learned from introspection, sorted.
    pub fn introspected_methods(&self) -> Vec<String> {
        let mut names: Vec<String> = self.inner.forwarded.read().keys().cloned().collect();
        names.sort();
        names
    }

    /// Calls a remote procedure by its server-side name.
    ///
    /// With `never_throw` (the default) every failure is returned as a failure
    /// envelope; otherwise transport and middleware failures are returned as
    /// [`AllserverError::Call`].
    pub async fn call(&self, procedure_name: &str, arg: Value) -> Result<Envelope> {
        let mut arg = arg;
        argument::stamp_procedure_name(&mut arg, procedure_name);
        let ctx = ClientCallContext::new(self.clone(), procedure_name, false, arg);
        self.run(ctx).await
    }

    /// Asks the server for its procedure list.
    ///
    /// Transport failures become `ALLSERVER_CLIENT_INTROSPECTION_FAILED`.
    pub async fn introspect(&self) -> Result<Envelope> {
        let mut arg = Value::Object(Map::new());
        argument::stamp_procedure_name(&mut arg, "");
        let ctx = ClientCallContext::new(self.clone(), "", true, arg);
        self.run(ctx).await
    }

    /// Resolves `name` to a method and calls it.
    ///
    /// Resolution order:
    ///
    /// 1. explicitly defined methods
    /// 2. procedures learned from introspection (after `name_mapper`)
    /// 3. with `dynamic_methods` off: [`AllserverError::UnknownMethod`]
    /// 4. with auto-introspection off: forward `name` as-is
    /// 5. introspect (or reuse the cached snapshot), learn its procedures, retry;
    ///    a failed introspection is not cached and `name` is forwarded as-is
    /// 6. still unknown: `ALLSERVER_CLIENT_PROCEDURE_NOT_FOUND`, or a blind
    ///    forward when `call_introspected_procedures_only` is off
    pub async fn resolve_and_call(&self, name: &str, arg: Value) -> Result<Envelope> {
        if let Some(method) = self.inner.methods.get(name).cloned() {
            return method(self.clone(), arg).await;
        }
        if let Some(server_name) = self.forwarded_name(name) {
            return self.call(&server_name, arg).await;
        }
        if !self.inner.options.dynamic_methods {
            return Err(AllserverError::UnknownMethod(name.to_string()));
        }

        let uri = self.uri().to_string();
        let only_introspected = self.inner.options.call_introspected_procedures_only;
        if !self.inner.options.auto_introspect
            || !self.inner.transport.auto_introspect()
            || uri.is_empty()
        {
            return self.call(name, arg).await;
        }

        match self.inner.cache.get(&uri) {
            Some(snapshot) => {
                if let Some(procedures) = introspection::parse_procedures(&snapshot) {
                    self.learn(&procedures);
                }
            }
            None => {
                let snapshot = self.introspect().await?;
                if !snapshot.success {
                    // Nothing to check the name against, so the server gets to answer
                    tracing::debug!(uri = %uri, code = %snapshot.code, "Introspection failed");
                    return self.call(name, arg).await;
                }

                let Some(procedures) = introspection::parse_procedures(&snapshot) else {
                    return self.malformed_introspection(&uri);
                };
                self.inner.cache.insert(uri.clone(), snapshot);
                self.learn(&procedures);
            }
        }

        if let Some(server_name) = self.forwarded_name(name) {
            return self.call(&server_name, arg).await;
        }
        if only_introspected {
            return Ok(Envelope::failure(
                codes::ALLSERVER_CLIENT_PROCEDURE_NOT_FOUND,
                format!("Procedure '{}' not found via introspection", name),
            ));
        }
        self.call(name, arg).await
    }

    fn forwarded_name(&self, name: &str) -> Option<String> {
        self.inner.forwarded.read().get(name).cloned()
    }

    /// Registers forwarding entries for every introspected procedure.
    ///
    /// Explicit methods and already learned names are never overwritten.
    fn learn(&self, procedures: &Map<String, Value>) {
        let mapper = self.inner.options.name_mapper.clone();
        let mut forwarded = self.inner.forwarded.write();

        for server_name in introspection::procedure_names(procedures) {
            let local_name = match &mapper {
                Some(mapper) => match mapper(&server_name) {
                    Some(local_name) => local_name,
                    None => continue,
                },
                None => server_name.clone(),
            };
            if self.inner.methods.contains_key(&local_name) || forwarded.contains_key(&local_name) {
                continue;
            }
            forwarded.insert(local_name, server_name);
        }
    }

    fn malformed_introspection(&self, uri: &str) -> Result<Envelope> {
        let error = CallError::coded(
            codes::ALLSERVER_CLIENT_MALFORMED_INTROSPECTION,
            format!("Malformed introspection from {}", uri),
        );
        if !self.inner.options.never_throw {
            return Err(error.into());
        }
        Ok(failure_from(
            codes::ALLSERVER_CLIENT_MALFORMED_INTROSPECTION,
            error.message().to_string(),
            error,
        ))
    }

    async fn run(&self, ctx: ClientCallContext) -> Result<Envelope> {
        let transport = self.inner.transport.clone();
        let mut ctx = transport.create_call_context(ctx);

        self.run_middlewares(&mut ctx, Phase::Before).await?;

        if ctx.result.is_none() {
            self.invoke_transport(&mut ctx).await?;
        }

        self.run_middlewares(&mut ctx, Phase::After).await?;

        Ok(ctx.result.take().unwrap_or_default())
    }

    async fn run_middlewares(&self, ctx: &mut ClientCallContext, phase: Phase) -> Result<()> {
        let chain = match phase {
            Phase::Before => &self.inner.options.before,
            Phase::After => &self.inner.options.after,
        };

        match run_chain(chain, ctx).await {
            Ok(Some(result)) => ctx.result = Some(result),
            Ok(None) => {}
            Err(error) => {
                if !self.inner.options.never_throw {
                    return Err(error.into());
                }
                let (code, message) = match error.code() {
                    Some(code) => (code.to_string(), error.message().to_string()),
                    None => (
                        codes::ALLSERVER_CLIENT_MIDDLEWARE_ERROR.to_string(),
                        format!(
                            "The '{}' middleware error while calling '{}' procedure: {}",
                            phase, ctx.procedure_name, error
                        ),
                    ),
                };
                tracing::warn!(code = %code, phase = %phase, "Client middleware failed: {}", error);
                let error = Arc::new(error);
                ctx.error = Some(error.clone());
                ctx.result = Some(Envelope::failure(code, message).with_error(error));
            }
        }
        Ok(())
    }

    async fn invoke_transport(&self, ctx: &mut ClientCallContext) -> Result<()> {
        let timeout = self.inner.options.timeout;

        let outcome = if timeout.is_zero() {
            Some(Self::transport_call(&self.inner.transport, ctx).await)
        } else {
            // The call runs on its own task so that giving up on it does not cancel it.
            let transport = self.inner.transport.clone();
            let mut shadow = ctx.clone();
            let task = tokio::spawn(async move {
                let result = Self::transport_call(&transport, &mut shadow).await;
                (result, shadow)
            });

            match tokio::time::timeout(timeout, task).await {
                Ok(Ok((result, shadow))) => {
                    *ctx = shadow;
                    Some(result)
                }
                Ok(Err(join_error)) => Some(Err(CallError::new(format!(
                    "Transport task failed: {}",
                    join_error
                )))),
                Err(_) => None,
            }
        };

        match outcome {
            Some(Ok(envelope)) => ctx.result = Some(envelope),
            Some(Err(error)) => {
                if !self.inner.options.never_throw {
                    return Err(error.into());
                }
                let (code, message) = self.describe_failure(ctx, &error);
                tracing::debug!(code = %code, procedure = %ctx.procedure_name, "Call failed: {}", error);
                let error = Arc::new(error);
                ctx.error = Some(error.clone());
                ctx.result = Some(Envelope::failure(code, message).with_error(error));
            }
            None => {
                let millis = timeout.as_millis();
                let message = if ctx.is_introspection {
                    format!("The introspection of {} timed out in {} ms", self.uri(), millis)
                } else {
                    format!(
                        "The remote procedure {} timed out in {} ms",
                        ctx.procedure_name, millis
                    )
                };
                if !self.inner.options.never_throw {
                    return Err(CallError::coded(codes::ALLSERVER_CLIENT_TIMEOUT, message).into());
                }
                ctx.result = Some(Envelope::failure(codes::ALLSERVER_CLIENT_TIMEOUT, message));
            }
        }
        Ok(())
    }

    async fn transport_call(
        transport: &Arc<dyn ClientTransport>,
        ctx: &mut ClientCallContext,
    ) -> std::result::Result<Envelope, CallError> {
        if ctx.is_introspection {
            transport.introspect(ctx).await
        } else {
            transport.call(ctx).await
        }
    }

    fn describe_failure(&self, ctx: &ClientCallContext, error: &CallError) -> (String, String) {
        if ctx.is_introspection {
            return (
                codes::ALLSERVER_CLIENT_INTROSPECTION_FAILED.to_string(),
                format!("Couldn't introspect {} due to: {}", self.uri(), error),
            );
        }
        match error.code() {
            Some(code) if !error.is_no_net_to_server() => {
                (code.to_string(), error.message().to_string())
            }
            _ => (
                codes::ALLSERVER_CLIENT_PROCEDURE_UNREACHABLE.to_string(),
                format!(
                    "Couldn't reach remote procedure {} due to: {}",
                    ctx.procedure_name, error
                ),
            ),
        }
    }
}

fn failure_from(code: &str, message: String, error: CallError) -> Envelope {
    Envelope::failure(code, message).with_error(Arc::new(error))
}

impl fmt::Debug for AllserverClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AllserverClient")
            .field("uri", &self.uri())
            .field("methods", &self.inner.methods.keys().collect::<Vec<_>>())
            .field("introspected", &self.introspected_methods())
            .finish()
    }
}
