//! HTTP Transport
//!
//! Serves procedures over HTTP/1.1 with hyper.
//!
//! # Request Mapping
//!
//! - the path (minus the leading `/`) is the procedure name; `/` is introspection
//! - a JSON body is the argument; without a body the query string is
//! - any method is accepted
//!
//! # Status Codes
//!
//! | outcome | status |
//! |---------|--------|
//! | success, or a failure envelope returned by the procedure | 200 |
//! | unparseable body | 400 |
//! | procedure failed with `ERR_ASSERTION` | 400 |
//! | procedure not found | 404 |
//! | procedure failed otherwise | 500 |
//! | introspection disabled | 204 |

use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;

use allserver_common::transport::{HttpCodec, HyperResponse};
use allserver_common::{AllserverError, Result};
use async_trait::async_trait;
use http::{HeaderMap, Method, Request, StatusCode};
use http_body_util::BodyExt;
use hyper::body::Incoming;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper_util::rt::TokioIo;
use parking_lot::Mutex;
use serde_json::Value;
use tokio::net::TcpListener;
use tokio::sync::oneshot;

use super::{Started, Transport};
use crate::context::CallContext;
use crate::server::Allserver;

/// The inbound request, attached to every HTTP call context.
#[derive(Debug, Clone)]
pub struct HttpRequestInfo {
    pub method: Method,
    pub path: String,
    pub headers: HeaderMap,
}

/// Status picked by the reply hooks.
#[derive(Debug, Clone, Copy)]
struct ReplyStatus(StatusCode);

/// The wire reply of an HTTP call.
#[derive(Debug, Clone)]
pub struct HttpReply {
    pub status: StatusCode,
    pub body: Option<Value>,
}

impl HttpReply {
    pub fn into_response(self) -> HyperResponse {
        match self.body {
            Some(body) => HttpCodec::json_response(self.status, &body),
            None => HttpCodec::empty_response(self.status),
        }
    }
}

/// HTTP/1.1 server transport.
pub struct HttpTransport {
    addr: SocketAddr,
    shutdown: Mutex<Option<oneshot::Sender<()>>>,
}

impl HttpTransport {
    pub fn new(addr: SocketAddr) -> Self {
        Self {
            addr,
            shutdown: Mutex::new(None),
        }
    }

    /// Listens on all interfaces, on `$PORT` or an ephemeral port.
    pub fn from_env() -> Self {
        let port = std::env::var("PORT")
            .ok()
            .and_then(|port| port.parse::<u16>().ok())
            .unwrap_or(0);
        Self::new(SocketAddr::from(([0, 0, 0, 0], port)))
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    async fn handle_request(server: Arc<Allserver>, req: Request<Incoming>) -> HyperResponse {
        let (parts, body) = req.into_parts();

        let body = match body.collect().await {
            Ok(collected) => collected.to_bytes(),
            Err(e) => {
                tracing::warn!("Failed to read request body: {}", e);
                return bad_request_response();
            }
        };

        let request = HttpRequestInfo {
            method: parts.method,
            path: parts.uri.path().to_string(),
            headers: parts.headers,
        };
        dispatch(server, request, parts.uri.query(), &body).await
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn start_server(&self, server: Arc<Allserver>) -> Result<Started> {
        let listener = TcpListener::bind(self.addr)
            .await
            .map_err(|e| AllserverError::Transport(format!("Failed to bind to {}: {}", self.addr, e)))?;
        let local_addr = listener
            .local_addr()
            .map_err(|e| AllserverError::Transport(format!("Failed to get local address: {}", e)))?;

        tracing::info!("HTTP server listening on {}", local_addr);

        let (shutdown_tx, mut shutdown_rx) = oneshot::channel();
        *self.shutdown.lock() = Some(shutdown_tx);

        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = &mut shutdown_rx => {
                        tracing::info!("HTTP server on {} stopped", local_addr);
                        break;
                    }
                    accepted = listener.accept() => {
                        let (stream, _) = match accepted {
                            Ok(connection) => connection,
                            Err(e) => {
                                tracing::error!("Failed to accept connection: {}", e);
                                continue;
                            }
                        };

                        let io = TokioIo::new(stream);
                        let server = server.clone();

                        tokio::task::spawn(async move {
                            let service = service_fn(move |req| {
                                let server = server.clone();
                                async move { Ok::<_, Infallible>(Self::handle_request(server, req).await) }
                            });

                            if let Err(err) = http1::Builder::new().serve_connection(io, service).await {
                                tracing::error!("Error serving connection: {}", err);
                            }
                        });
                    }
                }
            }
        });

        Ok(Started::Address(local_addr))
    }

    async fn stop_server(&self) -> Result<()> {
        if let Some(shutdown) = self.shutdown.lock().take() {
            let _ = shutdown.send(());
        }
        Ok(())
    }

    fn procedure_name(&self, ctx: &CallContext) -> String {
        procedure_name(ctx)
    }

    fn prepare_not_found_reply(&self, ctx: &mut CallContext) {
        prepare_not_found_reply(ctx);
    }

    fn prepare_procedure_error_reply(&self, ctx: &mut CallContext) {
        prepare_procedure_error_reply(ctx);
    }

    fn reply(&self, ctx: &mut CallContext) {
        reply(ctx);
    }
}

// ============================================================================
// Helpers shared by the HTTP-shaped transports
// ============================================================================

pub(crate) fn bad_request_response() -> HyperResponse {
    HttpCodec::json_response(StatusCode::BAD_REQUEST, &HttpCodec::bad_request().to_value())
}

/// Decodes the argument, runs the call and renders its reply.
pub(crate) async fn dispatch(
    server: Arc<Allserver>,
    request: HttpRequestInfo,
    query: Option<&str>,
    body: &[u8],
) -> HyperResponse {
    let arg = match HttpCodec::parse_argument(body, query) {
        Ok(arg) => arg,
        Err(e) => {
            tracing::debug!("Rejecting {} {}: {}", request.method, request.path, e);
            return bad_request_response();
        }
    };

    let mut ctx = CallContext::new(server.clone(), arg).with_extension(request);
    server.handle_call(&mut ctx).await;

    match ctx.extensions.remove::<HttpReply>() {
        Some(reply) => reply.into_response(),
        None => HttpCodec::empty_response(StatusCode::NO_CONTENT),
    }
}

pub(crate) fn procedure_name(ctx: &CallContext) -> String {
    ctx.extensions
        .get::<HttpRequestInfo>()
        .map(|request| HttpCodec::procedure_name(&request.path))
        .unwrap_or_default()
}

pub(crate) fn prepare_not_found_reply(ctx: &mut CallContext) {
    ctx.extensions.insert(ReplyStatus(StatusCode::NOT_FOUND));
}

pub(crate) fn prepare_procedure_error_reply(ctx: &mut CallContext) {
    let code = ctx
        .result
        .as_ref()
        .map(|result| result.code.as_str())
        .unwrap_or_default();
    let status = HttpCodec::procedure_error_status(code);
    ctx.extensions.insert(ReplyStatus(status));
}

pub(crate) fn reply(ctx: &mut CallContext) {
    let reply = match &ctx.result {
        Some(result) => HttpReply {
            status: ctx
                .extensions
                .get::<ReplyStatus>()
                .map_or(StatusCode::OK, |status| status.0),
            body: Some(result.to_value()),
        },
        None => HttpReply {
            status: StatusCode::NO_CONTENT,
            body: None,
        },
    };
    ctx.extensions.insert(reply);
}
