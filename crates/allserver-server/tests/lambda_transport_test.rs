//! Lambda Transport Integration Tests
//!
//! Runs the serverless handler in-process, both through the Lambda client
//! transport (direct invocations) and with hand-built HTTP gateway events.

use std::sync::Arc;

use allserver_client::transport::{ClientTransport, LambdaClientTransport};
use allserver_client::{AllserverClient, ClientFactory};
use allserver_server::{
    codes, Allserver, CallError, LambdaContext, LambdaHandler, LambdaTransport, LocalLambdaInvoker,
    Procedures,
};
use serde_json::{json, Value};

// ============================================================================
// Test Helpers
// ============================================================================

async fn start_handler(introspection: bool) -> LambdaHandler {
    let procedures = Procedures::new()
        .procedure("sayHello", |arg, _ctx| {
            Box::pin(async move {
                let name = arg["name"].as_str().unwrap_or("world").to_string();
                Ok(Some(json!(format!("Hello {}", name))))
            })
        })
        .procedure("validate", |_arg, _ctx| {
            Box::pin(async { Err(CallError::assertion("name is required")) })
        })
        .procedure("nothing", |_arg, _ctx| Box::pin(async { Ok(None) }))
        .procedure("requestId", |_arg, ctx| {
            Box::pin(async move {
                let request_id = ctx
                    .extensions
                    .get::<LambdaContext>()
                    .and_then(|context| context.request_id.clone());
                Ok(Some(json!(request_id)))
            })
        });

    let server = Allserver::builder()
        .procedures(procedures)
        .introspection(introspection)
        .transport(LambdaTransport::new())
        .build()
        .unwrap();
    server.start().await.unwrap().into_handler().unwrap()
}

fn lambda_client(handler: LambdaHandler) -> AllserverClient {
    let invoker = Arc::new(LocalLambdaInvoker::new(handler));
    ClientFactory::new()
        .add_transport("lambda", move |uri| {
            Ok(Arc::new(LambdaClientTransport::new(uri, invoker.clone())?) as Arc<dyn ClientTransport>)
        })
        .connect("lambda://greeter")
        .unwrap()
}

fn body_of(response: &Value) -> Value {
    serde_json::from_str(response["body"].as_str().unwrap()).unwrap()
}

// ============================================================================
// Direct Invocation Tests
// ============================================================================

#[tokio::test]
async fn test_client_over_direct_invocations() {
    let client = lambda_client(start_handler(true).await);

    let reply = client
        .resolve_and_call("sayHello", json!({"name": "Ann"}))
        .await
        .unwrap();
    assert!(reply.success);
    assert_eq!(reply.get("sayHello"), Some(&json!("Hello Ann")));

    let reply = client.resolve_and_call("validate", Value::Null).await.unwrap();
    assert!(!reply.success);
    assert_eq!(reply.code, codes::ERR_ASSERTION);
}

#[tokio::test]
async fn test_procedure_name_from_client_context() {
    let handler = start_handler(true).await;

    let context = LambdaContext {
        client_context: Some(json!({"procedureName": "sayHello"})),
        request_id: None,
    };
    let reply = handler.handle(json!({"name": "Bob"}), context).await;
    assert_eq!(reply["sayHello"], "Hello Bob");
}

#[tokio::test]
async fn test_invocation_context_reaches_procedures() {
    let handler = start_handler(true).await;

    let context = LambdaContext {
        client_context: None,
        request_id: Some("req-42".into()),
    };
    let reply = handler
        .handle(json!({"_": {"procedureName": "requestId"}}), context)
        .await;
    assert_eq!(reply["requestId"], "req-42");
}

#[tokio::test]
async fn test_direct_introspection_disabled() {
    let handler = start_handler(false).await;

    let reply = handler.handle(Value::Null, LambdaContext::default()).await;
    assert_eq!(reply, Value::Null);

    let client = lambda_client(handler);
    let reply = client.introspect().await.unwrap();
    assert!(!reply.success);
    assert_eq!(reply.code, codes::ALLSERVER_CLIENT_INTROSPECTION_FAILED);
}

// ============================================================================
// HTTP Event Tests
// ============================================================================

#[tokio::test]
async fn test_http_event_with_body() {
    let handler = start_handler(true).await;

    let event = json!({"path": "/sayHello", "body": r#"{"name": "Cid"}"#});
    let response = handler.handle(event, LambdaContext::default()).await;

    assert_eq!(response["statusCode"], 200);
    assert_eq!(response["headers"]["content-type"], "application/json");
    assert_eq!(body_of(&response)["sayHello"], "Hello Cid");
}

#[tokio::test]
async fn test_http_event_with_query() {
    let handler = start_handler(true).await;

    let event = json!({
        "requestContext": {"http": {"path": "/sayHello"}},
        "queryStringParameters": {"name": "Dee"}
    });
    let response = handler.handle(event, LambdaContext::default()).await;

    assert_eq!(response["statusCode"], 200);
    assert_eq!(body_of(&response)["sayHello"], "Hello Dee");
}

#[tokio::test]
async fn test_http_event_status_codes() {
    let handler = start_handler(true).await;

    let response = handler
        .handle(json!({"path": "/nope"}), LambdaContext::default())
        .await;
    assert_eq!(response["statusCode"], 404);
    assert_eq!(body_of(&response)["code"], codes::ALLSERVER_PROCEDURE_NOT_FOUND);

    let response = handler
        .handle(json!({"path": "/validate"}), LambdaContext::default())
        .await;
    assert_eq!(response["statusCode"], 400);

    let response = handler
        .handle(json!({"path": "/sayHello", "body": "{oops"}), LambdaContext::default())
        .await;
    assert_eq!(response["statusCode"], 400);
    assert_eq!(body_of(&response)["code"], codes::ALLSERVER_BAD_REQUEST);
}

#[tokio::test]
async fn test_http_event_introspection() {
    let handler = start_handler(true).await;
    let response = handler.handle(json!({"path": "/"}), LambdaContext::default()).await;
    assert_eq!(response["statusCode"], 200);
    assert_eq!(body_of(&response)["code"], codes::ALLSERVER_INTROSPECTION);

    let handler = start_handler(false).await;
    let response = handler.handle(json!({"path": "/"}), LambdaContext::default()).await;
    assert_eq!(response["statusCode"], 204);
    assert_eq!(response["body"], "");
}
