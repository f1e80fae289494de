//! Error sink for failed calls.

use allserver_common::CallError;

/// Receives every procedure and middleware failure the server envelopes.
pub trait Logger: Send + Sync {
    fn error(&self, code: &str, error: &CallError);
}

/// Forwards failures to `tracing` at error level.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingLogger;

impl Logger for TracingLogger {
    fn error(&self, code: &str, error: &CallError) {
        tracing::error!(code = %code, error = %error, "Allserver call failed");
    }
}
