//! CLI Integration Tests
//!
//! Runs the `allserver` binary against a live HTTP server.
//!
//! Test Scenarios:
//! 1. `call` prints the envelope and exits 0 on success
//! 2. `call` exits 1 on a failure envelope
//! 3. `introspect` prints the procedure list
//! 4. Invalid arguments are rejected before any network traffic

use std::process::Output;

use allserver_server::{Allserver, CallError, HttpTransport, Procedures};
use serde_json::{json, Value};
use tokio::process::Command;

// ============================================================================
// Test Helpers
// ============================================================================

async fn start_server() -> String {
    let procedures = Procedures::new()
        .procedure("sayHello", |arg, _ctx| {
            Box::pin(async move {
                let name = arg["name"].as_str().unwrap_or("world").to_string();
                Ok(Some(json!(format!("Hello {}", name))))
            })
        })
        .procedure("explode", |_arg, _ctx| Box::pin(async { Err(CallError::new("kaboom")) }));

    let server = Allserver::builder()
        .procedures(procedures)
        .transport(HttpTransport::new("127.0.0.1:0".parse().unwrap()))
        .build()
        .unwrap();
    let addr = server.start().await.unwrap().address().unwrap();
    format!("http://{}", addr)
}

async fn allserver(args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_allserver"))
        .args(args)
        .env("RUST_LOG", "error")
        .output()
        .await
        .expect("Failed to run allserver binary")
}

fn stdout_json(output: &Output) -> Value {
    let stdout = String::from_utf8_lossy(&output.stdout);
    serde_json::from_str(stdout.trim()).expect("stdout is not JSON")
}

// ============================================================================
// Command Tests
// ============================================================================

#[tokio::test]
async fn test_call_success() {
    let url = start_server().await;

    let output = allserver(&["call", &url, "sayHello", "-a", r#"{"name": "Ann"}"#]).await;
    assert!(output.status.success());

    let envelope = stdout_json(&output);
    assert_eq!(envelope["success"], true);
    assert_eq!(envelope["sayHello"], "Hello Ann");
}

#[tokio::test]
async fn test_call_failure_exit_code() {
    let url = start_server().await;

    let output = allserver(&["call", &url, "explode"]).await;
    assert_eq!(output.status.code(), Some(1));

    let envelope = stdout_json(&output);
    assert_eq!(envelope["success"], false);
    assert_eq!(envelope["code"], "ALLSERVER_PROCEDURE_ERROR");
}

#[tokio::test]
async fn test_call_with_headers() {
    let url = start_server().await;

    let output = allserver(&["call", &url, "sayHello", "-H", "x-tenant: acme"]).await;
    assert!(output.status.success());
    assert_eq!(stdout_json(&output)["sayHello"], "Hello world");
}

#[tokio::test]
async fn test_introspect() {
    let url = start_server().await;

    let output = allserver(&["introspect", &url]).await;
    assert!(output.status.success());

    let envelope = stdout_json(&output);
    assert_eq!(envelope["code"], "ALLSERVER_INTROSPECTION");
    let procedures: Value = serde_json::from_str(envelope["procedures"].as_str().unwrap()).unwrap();
    assert_eq!(procedures, json!({"sayHello": "function", "explode": "function"}));
}

// ============================================================================
// Argument Validation Tests
// ============================================================================

#[tokio::test]
async fn test_invalid_json_args() {
    let output = allserver(&["call", "http://127.0.0.1:1", "sayHello", "-a", "{nope"]).await;
    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("Invalid JSON in args"));
}

#[tokio::test]
async fn test_uri_without_scheme() {
    let output = allserver(&["call", "127.0.0.1:4000", "sayHello"]).await;
    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("SCHEMA://URI"));
}
