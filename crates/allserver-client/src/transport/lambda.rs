//! Serverless function client transport.
//!
//! The URI is `lambda://<function-name>`. Invocation itself is delegated to a
//! [`LambdaInvoker`], so the transport works with any provider SDK or with an
//! in-process handler in tests. The argument (carrying `_.procedureName`) is
//! the invocation payload; the payload returned must be a non-empty JSON
//! object.

use std::sync::Arc;

use allserver_common::protocol::introspection;
use allserver_common::{codes, AllserverError, CallError, Envelope, Result};
use async_trait::async_trait;
use serde_json::Value;

use super::ClientTransport;
use crate::context::ClientCallContext;

/// Errors reported by a [`LambdaInvoker`].
#[derive(Debug, thiserror::Error)]
pub enum InvokeError {
    /// Credentials or endpoint could not be resolved
    #[error("Provider error: {0}")]
    Provider(String),

    #[error("Function not found: {0}")]
    NotFound(String),

    #[error("{0}")]
    Other(String),
}

impl InvokeError {
    /// Whether the function could not be reached at all.
    pub fn is_no_net_to_server(&self) -> bool {
        matches!(self, Self::Provider(_) | Self::NotFound(_))
    }
}

impl From<InvokeError> for CallError {
    fn from(e: InvokeError) -> Self {
        let no_net = e.is_no_net_to_server();
        let error = CallError::new(e.to_string());
        if no_net {
            error.no_net_to_server()
        } else {
            error
        }
    }
}

/// Invokes a serverless function synchronously.
#[async_trait]
pub trait LambdaInvoker: Send + Sync {
    /// Sends `payload` to `function_name` and returns the response payload.
    async fn invoke(
        &self,
        function_name: &str,
        payload: Vec<u8>,
    ) -> std::result::Result<Vec<u8>, InvokeError>;
}

/// The raw payload returned by the last invocation of a call.
#[derive(Debug, Clone)]
pub struct LambdaResponse(pub Vec<u8>);

pub struct LambdaClientTransport {
    uri: String,
    function_name: String,
    invoker: Arc<dyn LambdaInvoker>,
}

impl LambdaClientTransport {
    pub fn new(uri: &str, invoker: Arc<dyn LambdaInvoker>) -> Result<Self> {
        let function_name = match uri.split_once("://") {
            Some((scheme, name)) if scheme.eq_ignore_ascii_case("lambda") && !name.is_empty() => {
                name.to_string()
            }
            _ => return Err(AllserverError::InvalidUri(uri.to_string())),
        };

        Ok(Self {
            uri: uri.to_string(),
            function_name,
            invoker,
        })
    }

    pub fn function_name(&self) -> &str {
        &self.function_name
    }
}

#[async_trait]
impl ClientTransport for LambdaClientTransport {
    fn uri(&self) -> &str {
        &self.uri
    }

    async fn call(&self, ctx: &mut ClientCallContext) -> std::result::Result<Envelope, CallError> {
        let payload = serde_json::to_vec(&ctx.arg)?;
        let response = self.invoker.invoke(&self.function_name, payload).await?;
        ctx.extensions.insert(LambdaResponse(response.clone()));

        let value: Value = serde_json::from_slice(&response).map_err(|e| {
            CallError::coded(codes::ALLSERVER_RPC_RESPONSE_IS_NOT_JSON, e.to_string())
        })?;

        match &value {
            Value::Object(map) if map.is_empty() => {
                return Err(CallError::coded(
                    codes::ALLSERVER_RPC_RESPONSE_IS_EMPTY_OBJECT,
                    "Bad response payload",
                ))
            }
            Value::Object(_) => {}
            _ => {
                return Err(CallError::coded(
                    codes::ALLSERVER_RPC_RESPONSE_IS_NOT_OBJECT,
                    "Bad response payload",
                ))
            }
        }

        Envelope::from_value(value).map_err(|_| {
            CallError::coded(codes::ALLSERVER_RPC_RESPONSE_IS_NOT_OBJECT, "Bad response payload")
        })
    }

    async fn introspect(
        &self,
        ctx: &mut ClientCallContext,
    ) -> std::result::Result<Envelope, CallError> {
        ctx.procedure_name.clear();
        let result = self.call(ctx).await?;
        // A server with introspection disabled still answers, just without procedures
        if result.get(introspection::PROCEDURES_FIELD).is_none() {
            return Err(CallError::new("The lambda introspection call returned nothing"));
        }
        Ok(result)
    }
}
