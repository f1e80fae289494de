pub mod argument;
pub mod codes;
pub mod envelope;
pub mod error;
pub mod introspection;

#[cfg(test)]
mod tests;

pub use envelope::Envelope;
pub use error::{AllserverError, CallError, Result};
