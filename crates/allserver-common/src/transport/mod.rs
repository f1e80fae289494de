//! Allserver Transport Helpers
//!
//! Protocol plumbing shared by server transports and client transports.
//!
//! # Components
//!
//! - **[`HttpCodec`]**: HTTP request/response mapping (path to procedure name,
//!   body or query string to argument, envelope to JSON response)
//! - **[`ProtoSchema`]** / **[`JsonCodec`]**: `.proto` loading and validation,
//!   and a tonic codec that transcodes JSON values to protobuf messages
//! - **[`JobQueue`]**: in-process job queue used by the queue transports

pub mod grpc;
pub mod http;
pub mod queue;

pub use grpc::{JsonCodec, ProtoSchema, MANDATORY_PROTO};
pub use http::{HttpCodec, HyperResponse};
pub use queue::{Job, JobHandle, JobQueue, DEFAULT_QUEUE_NAME, DEFAULT_SIZE_LIMIT, INTROSPECT_JOB};
