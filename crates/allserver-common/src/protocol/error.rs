use std::sync::Arc;
use thiserror::Error;

use super::codes;

/// Framework-level errors.
///
/// These are returned for configuration and startup problems (an invalid
/// procedure registry, an unparseable URI, a `.proto` schema that violates the
/// envelope contract) and, on clients built with `never_throw(false)`, for
/// call failures wrapped in [`AllserverError::Call`].
///
/// Per-call failures on the server side never surface as this type; they are
/// converted into failure envelopes.
#[derive(Error, Debug)]
pub enum AllserverError {
    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Invalid procedures: {0}")]
    InvalidProcedures(String),

    #[error("`uri` must follow pattern: SCHEMA://URI (got '{0}')")]
    InvalidUri(String),

    #[error("Schema not supported: {0}")]
    UnsupportedScheme(String),

    #[error("Method '{0}' is not defined on this client")]
    UnknownMethod(String),

    #[error("Invalid proto schema: {0}")]
    ProtoSchema(String),

    #[error("Transport is not started")]
    NotStarted,

    #[error("{0}")]
    Call(#[from] CallError),

    #[error("JSON serialization error: {0}")]
    JsonSerialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<std::net::AddrParseError> for AllserverError {
    fn from(err: std::net::AddrParseError) -> Self {
        AllserverError::Transport(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, AllserverError>;

/// A single failed call.
///
/// This is the error type procedures, middleware and client transports return.
/// It carries an optional machine-readable `code` that ends up in the failure
/// envelope, the HTTP status when one was observed, and a marker telling the
/// client engine the failure happened before the server was reached.
#[derive(Error, Debug, Clone, Default)]
#[error("{message}")]
pub struct CallError {
    code: Option<String>,
    message: String,
    status: Option<u16>,
    no_net_to_server: bool,
    #[source]
    source: Option<Arc<dyn std::error::Error + Send + Sync>>,
}

impl CallError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            ..Default::default()
        }
    }

    /// Creates an error with a code that will be propagated into the envelope.
    pub fn coded(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(message).with_code(code)
    }

    /// Creates an assertion failure (`ERR_ASSERTION`).
    ///
    /// HTTP transports answer these with `400 Bad Request`.
    pub fn assertion(message: impl Into<String>) -> Self {
        Self::coded(codes::ERR_ASSERTION, message)
    }

    pub fn with_code(mut self, code: impl Into<String>) -> Self {
        self.code = Some(code.into());
        self
    }

    pub fn with_status(mut self, status: u16) -> Self {
        self.status = Some(status);
        self
    }

    pub fn with_source<E>(mut self, source: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        self.source = Some(Arc::new(source));
        self
    }

    /// Marks the failure as a connectivity failure (the request never reached the server).
    pub fn no_net_to_server(mut self) -> Self {
        self.no_net_to_server = true;
        self
    }

    pub fn code(&self) -> Option<&str> {
        self.code.as_deref()
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn status(&self) -> Option<u16> {
        self.status
    }

    pub fn is_no_net_to_server(&self) -> bool {
        self.no_net_to_server
    }
}

impl From<serde_json::Error> for CallError {
    fn from(err: serde_json::Error) -> Self {
        CallError::new(err.to_string()).with_source(err)
    }
}

impl From<std::io::Error> for CallError {
    fn from(err: std::io::Error) -> Self {
        CallError::new(err.to_string()).with_source(err)
    }
}

impl From<String> for CallError {
    fn from(message: String) -> Self {
        CallError::new(message)
    }
}

impl From<&str> for CallError {
    fn from(message: &str) -> Self {
        CallError::new(message)
    }
}
