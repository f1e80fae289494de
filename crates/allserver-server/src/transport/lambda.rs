//! Serverless function transport.
//!
//! Starting the server yields a [`LambdaHandler`]: a single entry point taking
//! the invocation event and context, to be wired into whatever runtime hosts
//! the function. Two event shapes are understood:
//!
//! - HTTP gateway events (`path`, or `requestContext.http.path`): dispatched on
//!   the path like [`HttpTransport`](super::HttpTransport), answered with
//!   `{statusCode, headers, body}`
//! - direct invocations: the event is the argument, the procedure name comes
//!   from the client context's `procedureName` or the argument's
//!   `_.procedureName`, and the raw envelope is returned

use std::sync::Arc;

use allserver_client::transport::{InvokeError, LambdaInvoker};
use allserver_common::protocol::argument;
use allserver_common::transport::HttpCodec;
use allserver_common::Result;
use async_trait::async_trait;
use http::StatusCode;
use serde_json::{json, Map, Value};

use super::{Started, Transport};
use crate::context::CallContext;
use crate::server::Allserver;

/// The invocation context handed to the function by its runtime.
#[derive(Debug, Clone, Default)]
pub struct LambdaContext {
    /// Custom data sent by the caller
    pub client_context: Option<Value>,
    pub request_id: Option<String>,
}

/// The event a call was decoded from.
#[derive(Debug, Clone)]
pub struct LambdaEvent {
    pub is_http: bool,
    pub procedure_name: String,
    pub event: Value,
}

#[derive(Debug, Clone, Copy)]
struct ReplyStatus(StatusCode);

/// The value returned to the function runtime.
#[derive(Debug, Clone)]
pub struct LambdaReply(pub Value);

/// Entry point of a serverless deployment.
#[derive(Clone)]
pub struct LambdaHandler {
    server: Arc<Allserver>,
}

impl LambdaHandler {
    pub async fn handle(&self, event: Value, context: LambdaContext) -> Value {
        let (arg, lambda_event) = match http_path(&event) {
            Some(path) => {
                let body = event.get("body").and_then(Value::as_str).unwrap_or_default();
                let arg = if body.is_empty() {
                    let query = event
                        .get("queryStringParameters")
                        .and_then(Value::as_object)
                        .cloned()
                        .unwrap_or_default();
                    Value::Object(query)
                } else {
                    match serde_json::from_str(body) {
                        Ok(arg) => arg,
                        Err(e) => {
                            tracing::debug!("Rejecting lambda HTTP event for {}: {}", path, e);
                            return http_response(
                                StatusCode::BAD_REQUEST,
                                Some(&HttpCodec::bad_request().to_value()),
                            );
                        }
                    }
                };
                let lambda_event = LambdaEvent {
                    is_http: true,
                    procedure_name: HttpCodec::procedure_name(&path),
                    event,
                };
                (arg, lambda_event)
            }
            None => {
                let arg = match &event {
                    Value::Null => Value::Object(Map::new()),
                    other => other.clone(),
                };
                let procedure_name = context
                    .client_context
                    .as_ref()
                    .and_then(|client| client.get(argument::PROCEDURE_NAME_FIELD))
                    .and_then(Value::as_str)
                    .or_else(|| argument::procedure_name(&arg))
                    .unwrap_or_default()
                    .to_string();
                let lambda_event = LambdaEvent {
                    is_http: false,
                    procedure_name,
                    event,
                };
                (arg, lambda_event)
            }
        };

        let mut ctx = CallContext::new(self.server.clone(), arg)
            .with_extension(lambda_event)
            .with_extension(context);
        self.server.handle_call(&mut ctx).await;

        ctx.extensions
            .remove::<LambdaReply>()
            .map_or(Value::Null, |reply| reply.0)
    }
}

fn http_path(event: &Value) -> Option<String> {
    event
        .get("path")
        .and_then(Value::as_str)
        .or_else(|| event.pointer("/requestContext/http/path").and_then(Value::as_str))
        .filter(|path| !path.is_empty())
        .map(str::to_string)
}

fn http_response(status: StatusCode, body: Option<&Value>) -> Value {
    json!({
        "statusCode": status.as_u16(),
        "headers": {"content-type": "application/json"},
        "body": body.map(Value::to_string).unwrap_or_default(),
    })
}

#[derive(Debug, Clone, Copy, Default)]
pub struct LambdaTransport;

impl LambdaTransport {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Transport for LambdaTransport {
    async fn start_server(&self, server: Arc<Allserver>) -> Result<Started> {
        Ok(Started::Handler(LambdaHandler { server }))
    }

    fn procedure_name(&self, ctx: &CallContext) -> String {
        ctx.extensions
            .get::<LambdaEvent>()
            .map(|event| event.procedure_name.clone())
            .unwrap_or_default()
    }

    fn prepare_not_found_reply(&self, ctx: &mut CallContext) {
        ctx.extensions.insert(ReplyStatus(StatusCode::NOT_FOUND));
    }

    fn prepare_procedure_error_reply(&self, ctx: &mut CallContext) {
        let code = ctx
            .result
            .as_ref()
            .map(|result| result.code.as_str())
            .unwrap_or_default();
        let status = HttpCodec::procedure_error_status(code);
        ctx.extensions.insert(ReplyStatus(status));
    }

    fn reply(&self, ctx: &mut CallContext) {
        let is_http = ctx
            .extensions
            .get::<LambdaEvent>()
            .is_some_and(|event| event.is_http);
        let result = ctx.result.as_ref().map(|result| result.to_value());

        let reply = if is_http {
            let status = match &result {
                Some(_) => ctx
                    .extensions
                    .get::<ReplyStatus>()
                    .map_or(StatusCode::OK, |status| status.0),
                None => StatusCode::NO_CONTENT,
            };
            http_response(status, result.as_ref())
        } else {
            result.unwrap_or(Value::Null)
        };
        ctx.extensions.insert(LambdaReply(reply));
    }
}

/// Invokes a [`LambdaHandler`] in-process.
///
/// Pairs with `LambdaClientTransport` to run serverless deployments locally.
#[derive(Clone)]
pub struct LocalLambdaInvoker {
    handler: LambdaHandler,
}

impl LocalLambdaInvoker {
    pub fn new(handler: LambdaHandler) -> Self {
        Self { handler }
    }
}

#[async_trait]
impl LambdaInvoker for LocalLambdaInvoker {
    async fn invoke(
        &self,
        function_name: &str,
        payload: Vec<u8>,
    ) -> std::result::Result<Vec<u8>, InvokeError> {
        let event: Value = serde_json::from_slice(&payload)
            .map_err(|e| InvokeError::Other(format!("Invalid payload for {}: {}", function_name, e)))?;
        let reply = self.handler.handle(event, LambdaContext::default()).await;
        serde_json::to_vec(&reply).map_err(|e| InvokeError::Other(e.to_string()))
    }
}
