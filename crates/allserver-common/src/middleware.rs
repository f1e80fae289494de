//! Before/after middleware chains.
//!
//! The server and the client share one middleware shape: an async function
//! over a mutable call context that either produces a result (stopping the
//! rest of its phase), produces nothing (the chain continues), or fails.
//!
//! Ambient state such as a trace id travels on the call context itself; there
//! is no continuation argument.

use std::fmt;
use std::sync::Arc;

use crate::protocol::{CallError, Envelope};

pub use futures::future::BoxFuture;

/// What a middleware resolves to: `Ok(Some(_))` short-circuits the phase.
pub type MiddlewareResult = Result<Option<Envelope>, CallError>;

/// A middleware over call context `C`.
pub type Middleware<C> =
    Arc<dyn for<'a> Fn(&'a mut C) -> BoxFuture<'a, MiddlewareResult> + Send + Sync>;

/// Wraps an async closure into a [`Middleware`].
///
/// ```
/// use allserver_common::middleware::{middleware, Middleware};
///
/// struct Ctx { trace_id: Option<String> }
///
/// let tracer: Middleware<Ctx> = middleware(|ctx: &mut Ctx| {
///     Box::pin(async move {
///         ctx.trace_id = Some("abc".into());
///         Ok(None)
///     })
/// });
/// ```
pub fn middleware<C, F>(f: F) -> Middleware<C>
where
    F: for<'a> Fn(&'a mut C) -> BoxFuture<'a, MiddlewareResult> + Send + Sync + 'static,
{
    Arc::new(f)
}

/// The two middleware phases.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Before,
    After,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Phase::Before => f.write_str("before"),
            Phase::After => f.write_str("after"),
        }
    }
}

/// Runs `chain` in order until a middleware produces a result or fails.
pub async fn run_chain<C>(chain: &[Middleware<C>], ctx: &mut C) -> MiddlewareResult
where
    C: Send,
{
    for middleware in chain {
        if let Some(result) = middleware(&mut *ctx).await? {
            return Ok(Some(result));
        }
    }
    Ok(None)
}
