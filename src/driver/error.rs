//! Driver Error Types
//!
//! Errors surfaced by the public client API.

use std::io;
use thiserror::Error;

use crate::bolt::BoltError;

// ============================================================================
// DriverError
// ============================================================================

/// Errors returned by drivers, sessions, transactions and results.
#[derive(Error, Debug)]
pub enum DriverError {
    /// Misuse of the session or transaction state machine, an unsupported URL
    /// scheme, or a peer that broke the protocol. Never retried.
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// The server rejected a statement.
    #[error("Cypher error: {code} - {message}")]
    Cypher { code: String, message: String },

    /// Cursor contract violation.
    #[error("Result error: {0}")]
    Result(#[from] ResultError),

    /// Transport failure; the connection is now defunct.
    #[error("Connection error: {0}")]
    Connection(String),

    /// Invalid driver configuration.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// A value could not be converted to the requested type.
    #[error("Type conversion error: {0}")]
    TypeConversion(String),

    /// Framing or encoding error from the wire layer.
    #[error(transparent)]
    Bolt(#[from] BoltError),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

/// Violations of the result cursor contract.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ResultError {
    /// `single()` on a result without records.
    #[error("Cannot retrieve a single record, because this result is empty.")]
    EmptyResult,

    /// `single()` on a result with more than one record.
    #[error("Expected a result with a single record, but this result contains at least one more.")]
    MultipleRecords,

    /// `peek()` past the last record.
    #[error("End of stream")]
    EndOfStream,

    /// The server skipped the statement because an earlier request on the
    /// connection failed.
    #[error("Statement ignored by the server because an earlier request failed")]
    Ignored,
}

impl DriverError {
    /// Creates a protocol error.
    pub fn protocol(msg: impl Into<String>) -> Self {
        Self::Protocol(msg.into())
    }

    /// Creates a statement failure from server metadata.
    pub fn cypher(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Cypher {
            code: code.into(),
            message: message.into(),
        }
    }

    /// Creates a connection error.
    pub fn connection(msg: impl Into<String>) -> Self {
        Self::Connection(msg.into())
    }

    /// Creates a configuration error.
    pub fn configuration(msg: impl Into<String>) -> Self {
        Self::Configuration(msg.into())
    }

    /// Creates a type conversion error.
    pub fn type_conversion(msg: impl Into<String>) -> Self {
        Self::TypeConversion(msg.into())
    }

    /// True for errors caused by the transport rather than by the caller or
    /// the statement. Re-acquiring a session is the usual remedy.
    pub fn is_connection_error(&self) -> bool {
        matches!(self, Self::Connection(_) | Self::Io(_) | Self::Bolt(_))
    }

    /// Server error code, for statement failures.
    pub fn code(&self) -> Option<&str> {
        match self {
            Self::Cypher { code, .. } => Some(code),
            _ => None,
        }
    }
}

// ============================================================================
// Result Type
// ============================================================================

/// Driver result type.
pub type DriverResult<T> = Result<T, DriverError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cypher_error_display() {
        let err = DriverError::cypher("Neo.ClientError.Statement.SyntaxError", "bad input");
        assert_eq!(
            err.to_string(),
            "Cypher error: Neo.ClientError.Statement.SyntaxError - bad input"
        );
        assert_eq!(err.code(), Some("Neo.ClientError.Statement.SyntaxError"));
        assert!(!err.is_connection_error());
    }

    #[test]
    fn test_result_errors_are_distinct() {
        let empty: DriverError = ResultError::EmptyResult.into();
        let multiple: DriverError = ResultError::MultipleRecords.into();
        assert!(matches!(empty, DriverError::Result(ResultError::EmptyResult)));
        assert!(matches!(multiple, DriverError::Result(ResultError::MultipleRecords)));
        assert_ne!(empty.to_string(), multiple.to_string());
    }

    #[test]
    fn test_wire_errors_count_as_connection_errors() {
        let err: DriverError = BoltError::MessageTooLarge { size: 20, max: 10 }.into();
        assert!(err.is_connection_error());
        assert_eq!(err.to_string(), "Message too large: 20 bytes (max: 10)");
    }
}
