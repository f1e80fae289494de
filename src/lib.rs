//! # Allserver
//!
//! Transport-agnostic RPC. Procedures are written once and served over HTTP,
//! an embeddable axum router, gRPC, serverless function invocations, job
//! queues or in-process calls; the client calls them the same way whatever
//! the transport, and learns what a server offers through introspection.
//!
//! ## Crates
//!
//! - [`common`]: the envelope protocol, error codes, middleware chains and
//!   wire codecs shared by both sides
//! - [`server`]: the [`Allserver`] dispatch engine and server transports
//! - [`client`]: [`AllserverClient`], [`ClientFactory`] and client transports
//!
//! ## Example
//!
//! ```no_run
//! use allserver::{Allserver, AllserverClient, HttpTransport, Procedures};
//! use serde_json::json;
//!
//! # async fn run() -> allserver::Result<()> {
//! let procedures = Procedures::new().procedure("sayHello", |arg, _ctx| {
//!     Box::pin(async move {
//!         let name = arg["name"].as_str().unwrap_or("world").to_string();
//!         Ok(Some(json!(format!("Hello {}", name))))
//!     })
//! });
//!
//! let server = Allserver::builder()
//!     .procedures(procedures)
//!     .transport(HttpTransport::new("127.0.0.1:4000".parse()?))
//!     .build()?;
//! server.start().await?;
//!
//! let client = AllserverClient::connect("http://127.0.0.1:4000")?;
//! let reply = client.resolve_and_call("sayHello", json!({"name": "Ann"})).await?;
//! assert_eq!(reply.get("sayHello"), Some(&json!("Hello Ann")));
//! # Ok(())
//! # }
//! ```

pub use allserver_client as client;
pub use allserver_common as common;
pub use allserver_server as server;

pub use allserver_client::{AllserverClient, ClientCallContext, ClientFactory, IntrospectionCache};
pub use allserver_common::{codes, AllserverError, CallError, Envelope, Result};
pub use allserver_server::{
    Allserver, AllserverBuilder, AxumTransport, CallContext, GrpcTransport, HttpTransport,
    Introspection, LambdaTransport, Logger, MemoryTransport, Procedures, QueueTransport,
    Transport,
};
