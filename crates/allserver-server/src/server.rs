//! The server dispatch engine.
//!
//! An [`Allserver`] owns the procedure registry, the middleware chains, the
//! introspection gate and one [`Transport`]. Transports decode inbound
//! requests into [`CallContext`]s and hand them to
//! [`Allserver::handle_call`], which runs the pipeline:
//!
//! 1. number the call and ask the transport for the procedure name
//! 2. resolve the procedure and normalize the argument
//! 3. `before` middleware (a produced result skips everything up to the reply)
//! 4. introspection or the procedure, unless a result already exists
//! 5. `after` middleware (a produced result overwrites the current one)
//! 6. the transport's reply
//!
//! Per-call failures never escape `handle_call`; they become failure
//! envelopes and are reported to the [`Logger`].
//!
//! # Example
//!
//! ```no_run
//! use allserver_server::{Allserver, HttpTransport, Procedures};
//! use serde_json::json;
//!
//! #[tokio::main]
//! async fn main() -> allserver_common::Result<()> {
//!     let server = Allserver::builder()
//!         .procedures(Procedures::new().procedure("sayHello", |arg, _ctx| {
//!             Box::pin(async move {
//!                 let name = arg["name"].as_str().unwrap_or("world").to_string();
//!                 Ok(Some(json!(format!("Hello {}", name))))
//!             })
//!         }))
//!         .transport(HttpTransport::new("127.0.0.1:4000".parse()?))
//!         .build()?;
//!
//!     let started = server.start().await?;
//!     println!("Listening on {:?}", started.address());
//!     tokio::signal::ctrl_c().await?;
//!     server.stop().await
//! }
//! ```

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use allserver_common::protocol::{argument, introspection};
use allserver_common::{
    codes, run_chain, BoxFuture, Envelope, Middleware, MiddlewareResult, Phase, Result,
};
use parking_lot::RwLock;

use crate::context::CallContext;
use crate::logger::{Logger, TracingLogger};
use crate::procedures::Procedures;
use crate::transport::{HttpTransport, Started, Transport};

/// Server middleware.
pub type ServerMiddleware = Middleware<CallContext>;

/// The introspection gate.
#[derive(Clone)]
pub enum Introspection {
    Enabled(bool),
    /// Decided per call
    Predicate(Arc<dyn Fn(&CallContext) -> bool + Send + Sync>),
}

impl Introspection {
    pub fn predicate<F>(f: F) -> Self
    where
        F: Fn(&CallContext) -> bool + Send + Sync + 'static,
    {
        Self::Predicate(Arc::new(f))
    }

    pub fn allows(&self, ctx: &CallContext) -> bool {
        match self {
            Self::Enabled(enabled) => *enabled,
            Self::Predicate(predicate) => predicate(ctx),
        }
    }
}

impl Default for Introspection {
    fn default() -> Self {
        Self::Enabled(true)
    }
}

impl From<bool> for Introspection {
    fn from(enabled: bool) -> Self {
        Self::Enabled(enabled)
    }
}

impl fmt::Debug for Introspection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Enabled(enabled) => f.debug_tuple("Enabled").field(enabled).finish(),
            Self::Predicate(_) => f.write_str("Predicate(..)"),
        }
    }
}

/// Builder for [`Allserver`].
///
/// Cloning a configured builder gives a "defaults" template: the clone keeps
/// procedures, transport and middleware, and middleware added afterwards is
/// appended to the inherited chains.
///
/// # Default Configuration
///
/// - `transport`: HTTP on `$PORT`, or an ephemeral port
/// - `logger`: [`TracingLogger`]
/// - `introspection`: enabled
#[derive(Clone, Default)]
pub struct AllserverBuilder {
    procedures: Procedures,
    transport: Option<Arc<dyn Transport>>,
    logger: Option<Arc<dyn Logger>>,
    introspection: Introspection,
    before: Vec<ServerMiddleware>,
    after: Vec<ServerMiddleware>,
}

impl AllserverBuilder {
    pub fn procedures(mut self, procedures: Procedures) -> Self {
        self.procedures = procedures;
        self
    }

    pub fn transport<T>(mut self, transport: T) -> Self
    where
        T: Transport + 'static,
    {
        self.transport = Some(Arc::new(transport));
        self
    }

    pub fn logger<L>(mut self, logger: L) -> Self
    where
        L: Logger + 'static,
    {
        self.logger = Some(Arc::new(logger));
        self
    }

    /// Sets the introspection gate: a `bool` or an [`Introspection::predicate`].
    pub fn introspection(mut self, introspection: impl Into<Introspection>) -> Self {
        self.introspection = introspection.into();
        self
    }

    /// Appends a `before` middleware.
    pub fn before<F>(mut self, middleware: F) -> Self
    where
        F: for<'a> Fn(&'a mut CallContext) -> BoxFuture<'a, MiddlewareResult>
            + Send
            + Sync
            + 'static,
    {
        self.before.push(Arc::new(middleware));
        self
    }

    /// Appends an `after` middleware.
    pub fn after<F>(mut self, middleware: F) -> Self
    where
        F: for<'a> Fn(&'a mut CallContext) -> BoxFuture<'a, MiddlewareResult>
            + Send
            + Sync
            + 'static,
    {
        self.after.push(Arc::new(middleware));
        self
    }

    /// Validates the procedure names and builds the server.
    pub fn build(self) -> Result<Arc<Allserver>> {
        self.procedures.validate()?;

        let transport = match self.transport {
            Some(transport) => transport,
            None => Arc::new(HttpTransport::from_env()),
        };

        Ok(Arc::new(Allserver {
            procedures: self.procedures,
            transport,
            logger: self.logger.unwrap_or_else(|| Arc::new(TracingLogger)),
            introspection: RwLock::new(self.introspection),
            before: self.before,
            after: self.after,
            calls_count: AtomicU64::new(0),
        }))
    }
}

pub struct Allserver {
    procedures: Procedures,
    transport: Arc<dyn Transport>,
    logger: Arc<dyn Logger>,
    introspection: RwLock<Introspection>,
    before: Vec<ServerMiddleware>,
    after: Vec<ServerMiddleware>,
    calls_count: AtomicU64,
}

impl Allserver {
    pub fn builder() -> AllserverBuilder {
        AllserverBuilder::default()
    }

    pub fn procedures(&self) -> &Procedures {
        &self.procedures
    }

    pub fn transport(&self) -> &Arc<dyn Transport> {
        &self.transport
    }

    /// Number of calls handled so far.
    pub fn calls_count(&self) -> u64 {
        self.calls_count.load(Ordering::SeqCst)
    }

    /// Changes the introspection gate of a running server.
    pub fn set_introspection(&self, introspection: impl Into<Introspection>) {
        *self.introspection.write() = introspection.into();
    }

    /// Starts the transport.
    ///
    /// What comes back depends on the transport: a bound address, an
    /// in-process client, a serverless handler, a router or a worker.
    pub async fn start(self: &Arc<Self>) -> Result<Started> {
        self.transport.start_server(self.clone()).await
    }

    pub async fn stop(&self) -> Result<()> {
        self.transport.stop_server().await
    }

    /// Runs one call through the pipeline and hands it to the transport's reply.
    pub async fn handle_call(&self, ctx: &mut CallContext) {
        ctx.call_number = self.calls_count.fetch_add(1, Ordering::SeqCst);
        ctx.procedure_name = self.transport.procedure_name(ctx);
        ctx.is_introspection = self.transport.is_introspection(ctx);

        if !ctx.is_introspection && !ctx.procedure_name.is_empty() {
            ctx.procedure = self.procedures.get(&ctx.procedure_name);
        }
        argument::default_procedure_name(&mut ctx.arg, &ctx.procedure_name);

        tracing::debug!(
            call = ctx.call_number,
            procedure = %ctx.procedure_name,
            introspection = ctx.is_introspection,
            "Handling call"
        );

        if !self.run_middlewares(ctx, Phase::Before).await {
            if ctx.result.is_none() {
                if ctx.is_introspection {
                    self.introspect(ctx);
                } else {
                    self.call_procedure(ctx).await;
                }
            }
            self.run_middlewares(ctx, Phase::After).await;
        }

        self.transport.reply(ctx);
    }

    /// Returns `true` when a middleware produced a result.
    async fn run_middlewares(&self, ctx: &mut CallContext, phase: Phase) -> bool {
        let chain = match phase {
            Phase::Before => &self.before,
            Phase::After => &self.after,
        };

        match run_chain(chain, ctx).await {
            Ok(Some(result)) => {
                ctx.result = Some(result);
                true
            }
            Ok(None) => false,
            Err(error) => {
                let code = error
                    .code()
                    .unwrap_or(codes::ALLSERVER_MIDDLEWARE_ERROR)
                    .to_string();
                self.logger.error(&code, &error);
                let message = format!("'{}' error in '{}' middleware", error, phase);
                ctx.error = Some(Arc::new(error));
                ctx.result = Some(Envelope::failure(code, message));
                false
            }
        }
    }

    fn introspect(&self, ctx: &mut CallContext) {
        let gate = self.introspection.read().clone();
        if !gate.allows(ctx) {
            return;
        }

        let procedures = self.procedures.introspect();
        ctx.result = Some(introspection::snapshot(&procedures));
        ctx.introspection = Some(procedures);
        self.transport.prepare_introspection_reply(ctx);
    }

    async fn call_procedure(&self, ctx: &mut CallContext) {
        let Some(procedure) = ctx.procedure.clone() else {
            ctx.result = Some(Envelope::failure(
                codes::ALLSERVER_PROCEDURE_NOT_FOUND,
                format!("Procedure '{}' not found", ctx.procedure_name),
            ));
            self.transport.prepare_not_found_reply(ctx);
            return;
        };

        let arg = ctx.arg.clone();
        match procedure(arg, &mut *ctx).await {
            Ok(value) => {
                ctx.result = Some(Envelope::from_procedure_result(&ctx.procedure_name, value));
            }
            Err(error) => {
                let code = error
                    .code()
                    .unwrap_or(codes::ALLSERVER_PROCEDURE_ERROR)
                    .to_string();
                self.logger.error(&code, &error);
                let message = format!("'{}' error in '{}' procedure", error, ctx.procedure_name);
                ctx.error = Some(Arc::new(error));
                ctx.result = Some(Envelope::failure(code, message));
                self.transport.prepare_procedure_error_reply(ctx);
            }
        }
    }
}

impl fmt::Debug for Allserver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Allserver")
            .field("procedures", &self.procedures)
            .field("introspection", &*self.introspection.read())
            .field("before", &self.before.len())
            .field("after", &self.after.len())
            .field("calls_count", &self.calls_count())
            .finish()
    }
}
