//! Allserver Common Types and Transport Helpers
//!
//! This crate provides the protocol definitions shared by the Allserver
//! server and client crates.
//!
//! # Overview
//!
//! Allserver exposes one set of procedures over several wire protocols. Every
//! transport, on both sides, carries the same result envelope:
//!
//! ```text
//! { "success": bool, "code": string, "message": string, ...extra }
//! ```
//!
//! This crate contains the pieces both sides agree on:
//!
//! - **Protocol Layer**: the [`Envelope`], well-known [`codes`], the
//!   introspection snapshot format, and the error types
//! - **Middleware**: the before/after chain shape shared by server and client
//! - **Transport Helpers**: HTTP request/response mapping, the gRPC schema
//!   loader with its JSON codec, and the in-process job queue
//!
//! # Example
//!
//! ```
//! use allserver_common::{codes, Envelope};
//! use serde_json::json;
//!
//! let envelope = Envelope::from_procedure_result("sayHello", Some(json!("Hello world")));
//! assert!(envelope.success);
//! assert_eq!(envelope.code, codes::SUCCESS);
//! assert_eq!(envelope.get("sayHello"), Some(&json!("Hello world")));
//! ```

pub mod middleware;
pub mod protocol;
pub mod transport;

pub use middleware::{middleware, run_chain, BoxFuture, Middleware, MiddlewareResult, Phase};
pub use protocol::*;
