//! gRPC client transport.
//!
//! The transport starts out knowing only the mandatory introspection schema.
//! Introspecting the server returns its full `.proto` source, which is
//! compiled on the fly and used for every later procedure call. A schema can
//! also be supplied up front with [`GrpcClientTransport::with_schema`].

use allserver_common::protocol::introspection;
use allserver_common::transport::grpc::method_path;
use allserver_common::transport::{JsonCodec, ProtoSchema};
use allserver_common::{codes, AllserverError, CallError, Envelope, Result};
use async_trait::async_trait;
use http::uri::PathAndQuery;
use parking_lot::{Mutex, RwLock};
use prost_reflect::MethodDescriptor;
use serde_json::{Map, Value};
use tonic::transport::{Channel, Endpoint};
use tonic::{Code, Status};

use super::ClientTransport;
use crate::context::ClientCallContext;

pub struct GrpcClientTransport {
    uri: String,
    endpoint: Endpoint,
    channel: Mutex<Option<Channel>>,
    mandatory: ProtoSchema,
    schema: RwLock<Option<ProtoSchema>>,
}

impl GrpcClientTransport {
    /// Creates a transport for `grpc://host:port`.
    ///
    /// No connection is made until the first call.
    pub fn new(uri: &str) -> Result<Self> {
        let authority = uri
            .split_once("://")
            .map(|(_, rest)| rest.trim_end_matches('/'))
            .filter(|rest| !rest.is_empty())
            .ok_or_else(|| AllserverError::InvalidUri(uri.to_string()))?;

        let endpoint = Endpoint::from_shared(format!("http://{}", authority))
            .map_err(|e| AllserverError::Transport(format!("Invalid gRPC address {}: {}", uri, e)))?;

        Ok(Self {
            uri: uri.to_string(),
            endpoint,
            channel: Mutex::new(None),
            mandatory: ProtoSchema::mandatory()?,
            schema: RwLock::new(None),
        })
    }

    /// Uses a known server schema instead of waiting for introspection.
    pub fn with_schema(self, schema: ProtoSchema) -> Self {
        *self.schema.write() = Some(schema);
        self
    }

    /// The server schema, once known.
    pub fn schema(&self) -> Option<ProtoSchema> {
        self.schema.read().clone()
    }

    fn channel(&self) -> Channel {
        self.channel
            .lock()
            .get_or_insert_with(|| self.endpoint.clone().connect_lazy())
            .clone()
    }

    async fn unary(&self, method: &MethodDescriptor, arg: Value) -> std::result::Result<Value, CallError> {
        let path = PathAndQuery::try_from(method_path(method))
            .map_err(|e| CallError::new(format!("Invalid gRPC method path: {}", e)))?;

        let mut grpc = tonic::client::Grpc::new(self.channel());
        grpc.ready().await.map_err(|e| {
            CallError::new(format!("gRPC server {} is not ready: {}", self.uri, e)).no_net_to_server()
        })?;

        let response = grpc
            .unary(tonic::Request::new(arg), path, JsonCodec::for_client(method))
            .await
            .map_err(status_to_error)?;
        Ok(response.into_inner())
    }

    /// Calls `Allserver.introspect` and learns the server schema from the reply.
    async fn fetch_schema(&self) -> std::result::Result<Envelope, CallError> {
        let method = self.mandatory.introspect_method().ok_or_else(|| {
            CallError::coded(codes::GRPC_PROTO_INVALID, "Mandatory schema has no introspect method")
        })?;

        let reply = self.unary(&method, Value::Object(Map::new())).await?;
        let envelope = Envelope::from_value(reply).map_err(|_| {
            CallError::coded(codes::ALLSERVER_RPC_RESPONSE_IS_NOT_OBJECT, "Bad response payload")
        })?;

        let proto = envelope
            .get(introspection::PROTO_FIELD)
            .and_then(Value::as_str)
            .filter(|proto| !proto.is_empty());
        if let Some(proto) = proto {
            let schema = ProtoSchema::from_source(proto).map_err(|e| {
                CallError::coded(
                    codes::GRPC_PROTO_INVALID,
                    format!("Server proto from {} does not compile: {}", self.uri, e),
                )
            })?;
            tracing::debug!("Loaded gRPC schema of {}", self.uri);
            *self.schema.write() = Some(schema);
        }

        Ok(envelope)
    }
}

#[async_trait]
impl ClientTransport for GrpcClientTransport {
    fn uri(&self) -> &str {
        &self.uri
    }

    async fn call(&self, ctx: &mut ClientCallContext) -> std::result::Result<Envelope, CallError> {
        if self.schema.read().is_none() {
            self.fetch_schema().await?;
        }

        let method = {
            let schema = self.schema.read();
            let schema = schema.as_ref().ok_or_else(|| {
                CallError::coded(codes::GRPC_PROTO_MISSING, "gRPC client was not yet initialised")
            })?;
            schema.procedure_method(&ctx.procedure_name).ok_or_else(|| {
                CallError::coded(
                    codes::GRPC_PROTO_INVALID,
                    format!(
                        "gRPC client proto file does not have method: {}",
                        ctx.procedure_name
                    ),
                )
            })?
        };

        let reply = self.unary(&method, ctx.arg.clone()).await?;
        Envelope::from_value(reply).map_err(|_| {
            CallError::coded(codes::ALLSERVER_RPC_RESPONSE_IS_NOT_OBJECT, "Bad response payload")
        })
    }

    async fn introspect(
        &self,
        _ctx: &mut ClientCallContext,
    ) -> std::result::Result<Envelope, CallError> {
        self.fetch_schema().await
    }
}

fn status_to_error(status: Status) -> CallError {
    let error = CallError::new(status.message().to_string());
    match status.code() {
        Code::Unavailable => error.no_net_to_server(),
        _ => error,
    }
}
