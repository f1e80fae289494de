//! Well-known envelope codes.
//!
//! Procedures are free to return their own codes (e.g. `GATE_NOT_FOUND`);
//! the constants below are the ones produced by the framework itself.

/// Generic success.
pub const SUCCESS: &str = "SUCCESS";

/// Successful introspection reply.
pub const ALLSERVER_INTROSPECTION: &str = "ALLSERVER_INTROSPECTION";

pub const ALLSERVER_PROCEDURE_NOT_FOUND: &str = "ALLSERVER_PROCEDURE_NOT_FOUND";
pub const ALLSERVER_PROCEDURE_ERROR: &str = "ALLSERVER_PROCEDURE_ERROR";
pub const ALLSERVER_MIDDLEWARE_ERROR: &str = "ALLSERVER_MIDDLEWARE_ERROR";

/// The inbound payload could not be deserialized.
pub const ALLSERVER_BAD_REQUEST: &str = "ALLSERVER_BAD_REQUEST";

pub const ALLSERVER_CLIENT_PROCEDURE_NOT_FOUND: &str = "ALLSERVER_CLIENT_PROCEDURE_NOT_FOUND";
pub const ALLSERVER_CLIENT_PROCEDURE_UNREACHABLE: &str = "ALLSERVER_CLIENT_PROCEDURE_UNREACHABLE";
pub const ALLSERVER_CLIENT_MIDDLEWARE_ERROR: &str = "ALLSERVER_CLIENT_MIDDLEWARE_ERROR";
pub const ALLSERVER_CLIENT_INTROSPECTION_FAILED: &str = "ALLSERVER_CLIENT_INTROSPECTION_FAILED";
pub const ALLSERVER_CLIENT_MALFORMED_INTROSPECTION: &str =
    "ALLSERVER_CLIENT_MALFORMED_INTROSPECTION";
pub const ALLSERVER_CLIENT_TIMEOUT: &str = "ALLSERVER_CLIENT_TIMEOUT";

/// Assertion failures. HTTP maps this code to 400 instead of 500.
pub const ERR_ASSERTION: &str = "ERR_ASSERTION";

// Response validation codes raised by client transports.
pub const ALLSERVER_RPC_RESPONSE_IS_NOT_JSON: &str = "ALLSERVER_RPC_RESPONSE_IS_NOT_JSON";
pub const ALLSERVER_RPC_RESPONSE_IS_NOT_TEXT: &str = "ALLSERVER_RPC_RESPONSE_IS_NOT_TEXT";
pub const ALLSERVER_RPC_RESPONSE_IS_NOT_OBJECT: &str = "ALLSERVER_RPC_RESPONSE_IS_NOT_OBJECT";
pub const ALLSERVER_RPC_RESPONSE_IS_EMPTY_OBJECT: &str = "ALLSERVER_RPC_RESPONSE_IS_EMPTY_OBJECT";

pub const GRPC_PROTO_MISSING: &str = "GRPC_PROTO_MISSING";
pub const GRPC_PROTO_INVALID: &str = "GRPC_PROTO_INVALID";

pub const ALLSERVER_QUEUE_JOB_TOO_LARGE: &str = "ALLSERVER_QUEUE_JOB_TOO_LARGE";
