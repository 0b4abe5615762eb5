//! Bolt protocol error types.

use std::fmt;
use std::io;

use super::packstream::PackStreamError;

/// Result type for Bolt operations.
pub type BoltResult<T> = Result<T, BoltError>;

/// Errors raised below the session layer: transport, framing and message shape.
#[derive(Debug)]
pub enum BoltError {
    /// I/O error
    Io(io::Error),

    /// Handshake did not complete
    Handshake(String),

    /// PackStream serialization error
    PackStream(PackStreamError),

    /// Message has an unexpected tag or field layout
    Protocol(String),

    /// Server agreed on a version this client does not speak
    UnsupportedVersion(u32),

    /// Message too large
    MessageTooLarge { size: usize, max: usize },
}

impl fmt::Display for BoltError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BoltError::Io(e) => write!(f, "I/O error: {}", e),
            BoltError::Handshake(msg) => write!(f, "Handshake error: {}", msg),
            BoltError::PackStream(e) => write!(f, "PackStream error: {}", e),
            BoltError::Protocol(msg) => write!(f, "Protocol error: {}", msg),
            BoltError::UnsupportedVersion(v) => write!(f, "Unsupported version: 0x{:08X}", v),
            BoltError::MessageTooLarge { size, max } => {
                write!(f, "Message too large: {} bytes (max: {})", size, max)
            }
        }
    }
}

impl std::error::Error for BoltError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            BoltError::Io(e) => Some(e),
            BoltError::PackStream(e) => Some(e),
            _ => None,
        }
    }
}

impl From<io::Error> for BoltError {
    fn from(e: io::Error) -> Self {
        BoltError::Io(e)
    }
}

impl From<PackStreamError> for BoltError {
    fn from(e: PackStreamError) -> Self {
        BoltError::PackStream(e)
    }
}
