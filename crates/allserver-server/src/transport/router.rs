//! Embeddable router transport.
//!
//! Same request mapping and status codes as [`HttpTransport`](super::HttpTransport),
//! delivered as an [`axum::Router`] the application mounts wherever it likes.
//! Paths are relative to the mount point.
//!
//! ```no_run
//! use allserver_server::{Allserver, AxumTransport, Procedures};
//!
//! # async fn run(procedures: Procedures) -> allserver_common::Result<()> {
//! let server = Allserver::builder()
//!     .procedures(procedures)
//!     .transport(AxumTransport::new())
//!     .build()?;
//! let rpc = server.start().await?.into_router().unwrap_or_default();
//!
//! let app = axum::Router::new().nest("/rpc", rpc);
//! let listener = tokio::net::TcpListener::bind("127.0.0.1:3000").await?;
//! axum::serve(listener, app).await?;
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;

use allserver_common::transport::HyperResponse;
use allserver_common::Result;
use async_trait::async_trait;
use axum::extract::State;
use axum::http::{HeaderMap, Method, Uri};
use axum::Router;
use bytes::Bytes;

use super::http::{self as http_shared, HttpRequestInfo};
use super::{Started, Transport};
use crate::context::CallContext;
use crate::server::Allserver;

#[derive(Debug, Clone, Copy, Default)]
pub struct AxumTransport;

impl AxumTransport {
    pub fn new() -> Self {
        Self
    }
}

async fn handle(
    State(server): State<Arc<Allserver>>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
) -> HyperResponse {
    let request = HttpRequestInfo {
        method,
        path: uri.path().to_string(),
        headers,
    };
    http_shared::dispatch(server, request, uri.query(), &body).await
}

#[async_trait]
impl Transport for AxumTransport {
    async fn start_server(&self, server: Arc<Allserver>) -> Result<Started> {
        tracing::debug!("Router transport ready to be mounted");
        let router = Router::new().fallback(handle).with_state(server);
        Ok(Started::Router(router))
    }

    fn procedure_name(&self, ctx: &CallContext) -> String {
        http_shared::procedure_name(ctx)
    }

    fn prepare_not_found_reply(&self, ctx: &mut CallContext) {
        http_shared::prepare_not_found_reply(ctx);
    }

    fn prepare_procedure_error_reply(&self, ctx: &mut CallContext) {
        http_shared::prepare_procedure_error_reply(ctx);
    }

    fn reply(&self, ctx: &mut CallContext) {
        http_shared::reply(ctx);
    }
}
