//! Cross-cutting error types.
//!
//! Domain-specific errors (`DatabaseError`, `BrokerError`, `DispatchError`)
//! live in their respective crates. `CoreError` covers the conditions that
//! can be raised by the pure helpers in this crate.

use thiserror::Error;

/// Errors raised by the hashing, obfuscation, and parsing helpers.
#[derive(Debug, Error)]
pub enum CoreError {
    /// A required argument was missing or empty.
    #[error("Invalid argument '{name}': {reason}")]
    InvalidArgument { name: String, reason: String },

    /// A string did not match any known variant of an enum.
    #[error("Unknown {kind}: {value}")]
    UnknownVariant { kind: &'static str, value: String },
}
