//! Error types for the modem CLI protocol.

use thiserror::Error;

/// Errors that can occur when working with the modem CLI protocol.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    /// Failed to parse command output.
    #[error("failed to parse output: {0}")]
    ParseError(String),

    /// A field required to build a record was absent.
    #[error("missing required field: {0}")]
    MissingField(&'static str),

    /// The timestamp field did not decode to a valid instant.
    #[error("invalid timestamp: {0:?}")]
    InvalidTimestamp(String),

    /// User input was rejected before reaching the remote shell.
    #[error("invalid input: {0}")]
    Validation(String),
}

/// Result type alias for protocol operations.
pub type ProtocolResult<T> = Result<T, ProtocolError>;
