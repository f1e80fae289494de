//! gRPC server transport.
//!
//! The `.proto` schema is compiled and validated when the server starts,
//! before the socket is bound. Requests are routed by their HTTP/2 path to
//! the schema's methods; method names are procedure names. Messages are
//! transcoded to and from JSON, so procedures see the same argument objects
//! as on every other transport.
//!
//! The `Allserver/introspect` method is the introspection call. Its reply
//! carries the schema source in `proto`, which clients compile to call the
//! remaining methods.

use std::convert::Infallible;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use allserver_common::protocol::introspection;
use allserver_common::transport::grpc::{ALLSERVER_SERVICE, INTROSPECT_METHOD};
use allserver_common::transport::{JsonCodec, ProtoSchema};
use allserver_common::{AllserverError, BoxFuture, Result};
use async_trait::async_trait;
use http::{HeaderValue, Request, Response};
use hyper::body::Incoming;
use hyper::server::conn::http2;
use hyper::service::service_fn;
use hyper_util::rt::{TokioExecutor, TokioIo};
use parking_lot::{Mutex, RwLock};
use prost_reflect::MethodDescriptor;
use serde_json::{Map, Value};
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tonic::body::BoxBody;
use tonic::server::{Grpc, UnaryService};
use tonic::Status;

use super::{Started, Transport};
use crate::context::CallContext;
use crate::server::Allserver;

/// The gRPC method a call arrived on.
#[derive(Debug, Clone)]
pub struct GrpcCall {
    pub service: String,
    pub method: String,
}

/// The message sent back for a call.
#[derive(Debug, Clone)]
pub struct GrpcReply(pub Value);

enum SchemaSource {
    File(PathBuf),
    Compiled(ProtoSchema),
}

/// HTTP/2 gRPC server transport.
pub struct GrpcTransport {
    addr: SocketAddr,
    source: SchemaSource,
    schema: RwLock<Option<ProtoSchema>>,
    shutdown: Mutex<Option<oneshot::Sender<()>>>,
}

impl GrpcTransport {
    /// Serves the schema in `proto_file` on `addr`.
    pub fn new(addr: SocketAddr, proto_file: impl Into<PathBuf>) -> Self {
        Self::with_source(addr, SchemaSource::File(proto_file.into()))
    }

    /// Serves an already compiled schema.
    pub fn with_schema(addr: SocketAddr, schema: ProtoSchema) -> Self {
        Self::with_source(addr, SchemaSource::Compiled(schema))
    }

    fn with_source(addr: SocketAddr, source: SchemaSource) -> Self {
        Self {
            addr,
            source,
            schema: RwLock::new(None),
            shutdown: Mutex::new(None),
        }
    }

    fn load_schema(&self) -> Result<ProtoSchema> {
        let schema = match &self.source {
            SchemaSource::File(path) => ProtoSchema::load(path)?,
            SchemaSource::Compiled(schema) => schema.clone(),
        };
        schema.validate()?;
        Ok(schema)
    }

    async fn handle_request(
        server: Arc<Allserver>,
        schema: ProtoSchema,
        req: Request<Incoming>,
    ) -> Response<BoxBody> {
        let Some(method) = schema.method_by_path(req.uri().path()) else {
            tracing::debug!("Unknown gRPC method {}", req.uri().path());
            return unimplemented_response();
        };

        let mut grpc = Grpc::new(JsonCodec::for_server(&method));
        grpc.unary(UnaryCall { server, method }, req).await
    }
}

/// Adapts one schema method to tonic's unary service.
struct UnaryCall {
    server: Arc<Allserver>,
    method: MethodDescriptor,
}

impl UnaryService<Value> for UnaryCall {
    type Response = Value;
    type Future = BoxFuture<'static, std::result::Result<tonic::Response<Value>, Status>>;

    fn call(&mut self, request: tonic::Request<Value>) -> Self::Future {
        let server = self.server.clone();
        let call = GrpcCall {
            service: self.method.parent_service().name().to_string(),
            method: self.method.name().to_string(),
        };

        Box::pin(async move {
            let mut ctx = CallContext::new(server.clone(), request.into_inner()).with_extension(call);
            server.handle_call(&mut ctx).await;

            let reply = ctx
                .extensions
                .remove::<GrpcReply>()
                .map_or_else(|| Value::Object(Map::new()), |reply| reply.0);
            Ok(tonic::Response::new(reply))
        })
    }
}

fn unimplemented_response() -> Response<BoxBody> {
    let mut response = Response::new(tonic::body::empty_body());
    let headers = response.headers_mut();
    headers.insert(
        http::header::CONTENT_TYPE,
        HeaderValue::from_static("application/grpc"),
    );
    // 12 = UNIMPLEMENTED
    headers.insert("grpc-status", HeaderValue::from_static("12"));
    response
}

#[async_trait]
impl Transport for GrpcTransport {
    async fn start_server(&self, server: Arc<Allserver>) -> Result<Started> {
        let schema = self.load_schema()?;
        *self.schema.write() = Some(schema.clone());

        let listener = TcpListener::bind(self.addr)
            .await
            .map_err(|e| AllserverError::Transport(format!("Failed to bind to {}: {}", self.addr, e)))?;
        let local_addr = listener
            .local_addr()
            .map_err(|e| AllserverError::Transport(format!("Failed to get local address: {}", e)))?;

        tracing::info!("gRPC server listening on {}", local_addr);

        let (shutdown_tx, mut shutdown_rx) = oneshot::channel();
        *self.shutdown.lock() = Some(shutdown_tx);

        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = &mut shutdown_rx => {
                        tracing::info!("gRPC server on {} stopped", local_addr);
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
                        let schema = schema.clone();

                        tokio::task::spawn(async move {
                            let service = service_fn(move |req| {
                                let server = server.clone();
                                let schema = schema.clone();
                                async move {
                                    Ok::<_, Infallible>(Self::handle_request(server, schema, req).await)
                                }
                            });

                            if let Err(err) = http2::Builder::new(TokioExecutor::new())
                                .serve_connection(io, service)
                                .await
                            {
                                tracing::error!("Error serving gRPC connection: {}", err);
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
        ctx.extensions
            .get::<GrpcCall>()
            .map(|call| call.method.clone())
            .unwrap_or_default()
    }

    fn is_introspection(&self, ctx: &CallContext) -> bool {
        ctx.extensions
            .get::<GrpcCall>()
            .is_some_and(|call| call.service == ALLSERVER_SERVICE && call.method == INTROSPECT_METHOD)
    }

    fn prepare_introspection_reply(&self, ctx: &mut CallContext) {
        let proto = self
            .schema
            .read()
            .as_ref()
            .map(|schema| schema.source().to_string())
            .unwrap_or_default();
        if let Some(result) = ctx.result.as_mut() {
            result.insert(introspection::PROTO_FIELD, Value::String(proto));
        }
    }

    fn reply(&self, ctx: &mut CallContext) {
        let reply = ctx
            .result
            .as_ref()
            .map_or_else(|| Value::Object(Map::new()), |result| result.to_value());
        ctx.extensions.insert(GrpcReply(reply));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_file_fails_to_load() {
        let transport = GrpcTransport::new("127.0.0.1:0".parse().unwrap(), "/nonexistent/x.proto");
        assert!(matches!(
            transport.load_schema(),
            Err(AllserverError::ProtoSchema(_))
        ));
    }

    #[test]
    fn test_unimplemented_response() {
        let response = unimplemented_response();
        assert_eq!(response.headers().get("grpc-status").unwrap(), "12");
    }
}
