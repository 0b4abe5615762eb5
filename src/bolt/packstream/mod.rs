//! PackStream serialization format.
//!
//! PackStream is the binary format every Bolt message body is written in.
//!
//! # Supported Types
//!
//! - **Null**, **Boolean**
//! - **Integer**: 64-bit, encoded in 1, 2, 3, 5 or 9 bytes
//! - **Float**: 64-bit IEEE 754
//! - **Bytes**, **String** (UTF-8)
//! - **List**, **Map** (string keys)
//! - **Structure**: a signature byte plus fields; used for protocol messages
//!   and for graph entities (node, relationship, path)

pub mod decoder;
pub mod encoder;
pub mod marker;
pub mod types;

pub use decoder::{decode, PackStreamDecoder};
pub use encoder::{encode, PackStreamEncoder};
pub use types::{PackStreamStructure, PackStreamValue};

use std::fmt;

/// PackStream errors.
#[derive(Debug, Clone, PartialEq)]
pub enum PackStreamError {
    /// Input ended in the middle of a value
    UnexpectedEof,
    /// Marker byte that is not part of the format
    UnknownMarker(u8),
    /// String bytes are not valid UTF-8
    InvalidUtf8(String),
    /// Map key is not a string
    InvalidMapKey,
    /// Value too large to encode
    ValueTooLarge(&'static str, usize),
    /// Structure does not have the expected shape
    InvalidStructure(String),
}

impl fmt::Display for PackStreamError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PackStreamError::UnexpectedEof => write!(f, "Unexpected end of PackStream data"),
            PackStreamError::UnknownMarker(m) => write!(f, "Unknown PackStream marker: 0x{:02X}", m),
            PackStreamError::InvalidUtf8(e) => write!(f, "Invalid UTF-8 in string: {}", e),
            PackStreamError::InvalidMapKey => write!(f, "Map keys must be strings"),
            PackStreamError::ValueTooLarge(what, len) => write!(f, "{} too large: {}", what, len),
            PackStreamError::InvalidStructure(msg) => write!(f, "Invalid structure: {}", msg),
        }
    }
}

impl std::error::Error for PackStreamError {}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_nested_parameters_survive_transport() {
        let mut inner = HashMap::new();
        inner.insert("born".to_string(), PackStreamValue::Integer(1964));
        inner.insert("ratio".to_string(), PackStreamValue::Float(0.5));
        let mut params = HashMap::new();
        params.insert("person".to_string(), PackStreamValue::Map(inner));
        params.insert(
            "tags".to_string(),
            PackStreamValue::List(vec!["actor".into(), PackStreamValue::Null, true.into()]),
        );
        params.insert("blob".to_string(), PackStreamValue::Bytes(vec![0, 255]));
        let value = PackStreamValue::Map(params);

        let bytes = encode(&value).unwrap();
        assert_eq!(decode(&bytes).unwrap(), value);
    }

    #[test]
    fn test_large_containers_use_sized_headers() {
        let items: Vec<PackStreamValue> = (0..300).map(PackStreamValue::Integer).collect();
        let value = PackStreamValue::List(items);
        let bytes = encode(&value).unwrap();
        assert_eq!(&bytes[..3], &[marker::LIST_16, 0x01, 0x2C]);
        assert_eq!(decode(&bytes).unwrap(), value);
    }
}
