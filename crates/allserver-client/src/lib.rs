//! Allserver Client
//!
//! Calls Allserver procedures uniformly over any transport. A client is
//! created from a scheme-prefixed URI (`http://`, `https://`, `grpc://`, or a
//! scheme registered on the factory such as `lambda://` or `queue://`), and
//! by default it never returns an error for network, timeout or remote
//! procedure failures: every outcome is an [`Envelope`].
//!
//! ```no_run
//! use allserver_client::ClientFactory;
//! use serde_json::json;
//!
//! # async fn run() -> allserver_common::Result<()> {
//! let client = ClientFactory::default().connect("http://localhost:4000")?;
//!
//! // Resolved through introspection on first use
//! let reply = client.resolve_and_call("sayHello", json!({"name": "world"})).await?;
//! if reply.success {
//!     println!("{}", reply.get("sayHello").unwrap_or(&json!(null)));
//! }
//! # Ok(())
//! # }
//! ```

pub mod cache;
pub mod client;
pub mod context;
pub mod factory;
pub mod transport;


pub use cache::IntrospectionCache;
pub use client::AllserverClient;
pub use context::ClientCallContext;
pub use factory::{ClientFactory, ClientMiddleware, ClientOptions, Method, NameMapper};
pub use transport::{ClientTransport, TransportRegistry};

pub use allserver_common::{codes, AllserverError, CallError, Envelope, Result};
