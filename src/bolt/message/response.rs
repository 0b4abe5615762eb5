//! Bolt v1 response messages.
//!
//! SUCCESS, IGNORED and FAILURE are summaries: each one closes out exactly one
//! request. Any number of RECORD messages may precede the summary.

use std::collections::HashMap;

use super::tag;
use crate::bolt::packstream::{PackStreamError, PackStreamStructure, PackStreamValue};

/// Metadata map carried by summary messages.
pub type Metadata = HashMap<String, PackStreamValue>;

/// All Bolt v1 response messages.
#[derive(Debug, Clone, PartialEq)]
pub enum BoltResponse {
    /// SUCCESS - Request completed
    Success(SuccessMessage),
    /// RECORD - One row of a result stream
    Record(RecordMessage),
    /// IGNORED - Request skipped because the server is in a failed state
    Ignored,
    /// FAILURE - Request failed
    Failure(FailureMessage),
}

impl BoltResponse {
    /// Get the message tag.
    pub fn tag(&self) -> u8 {
        match self {
            BoltResponse::Success(_) => tag::SUCCESS,
            BoltResponse::Record(_) => tag::RECORD,
            BoltResponse::Ignored => tag::IGNORED,
            BoltResponse::Failure(_) => tag::FAILURE,
        }
    }

    /// Get message name for logging.
    pub fn name(&self) -> &'static str {
        match self {
            BoltResponse::Success(_) => "SUCCESS",
            BoltResponse::Record(_) => "RECORD",
            BoltResponse::Ignored => "IGNORED",
            BoltResponse::Failure(_) => "FAILURE",
        }
    }

    /// True for the messages that retire a pending request.
    pub fn is_summary(&self) -> bool {
        !matches!(self, BoltResponse::Record(_))
    }

    /// Convert to PackStream structure.
    pub fn to_structure(&self) -> PackStreamStructure {
        match self {
            BoltResponse::Success(msg) => PackStreamStructure::new(
                tag::SUCCESS,
                vec![PackStreamValue::Map(msg.metadata.clone())],
            ),
            BoltResponse::Record(msg) => PackStreamStructure::new(
                tag::RECORD,
                vec![PackStreamValue::List(msg.fields.clone())],
            ),
            BoltResponse::Ignored => PackStreamStructure::new(tag::IGNORED, vec![]),
            BoltResponse::Failure(msg) => {
                let mut metadata = Metadata::new();
                metadata.insert("code".to_string(), msg.code.as_str().into());
                metadata.insert("message".to_string(), msg.message.as_str().into());
                PackStreamStructure::new(tag::FAILURE, vec![PackStreamValue::Map(metadata)])
            }
        }
    }

    /// Parse from PackStream structure.
    pub fn from_structure(s: PackStreamStructure) -> Result<Self, PackStreamError> {
        let tag = s.tag;
        let first = s.fields.into_iter().next();
        match tag {
            tag::SUCCESS => {
                let metadata = match first {
                    None | Some(PackStreamValue::Null) => Metadata::new(),
                    Some(PackStreamValue::Map(m)) => m,
                    Some(_) => return Err(invalid("SUCCESS metadata must be a map")),
                };
                Ok(BoltResponse::Success(SuccessMessage { metadata }))
            }
            tag::RECORD => match first {
                Some(PackStreamValue::List(fields)) => {
                    Ok(BoltResponse::Record(RecordMessage { fields }))
                }
                _ => Err(invalid("RECORD fields must be a list")),
            },
            tag::IGNORED => Ok(BoltResponse::Ignored),
            tag::FAILURE => {
                let metadata = first.and_then(PackStreamValue::into_map).unwrap_or_default();
                Ok(BoltResponse::Failure(FailureMessage::from_metadata(&metadata)))
            }
            other => Err(invalid(&format!(
                "Unknown response message tag: 0x{:02X}",
                other
            ))),
        }
    }
}

fn invalid(msg: &str) -> PackStreamError {
    PackStreamError::InvalidStructure(msg.to_string())
}

/// SUCCESS message.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SuccessMessage {
    /// Response metadata
    pub metadata: Metadata,
}

impl SuccessMessage {
    /// Create a SUCCESS message with metadata.
    pub fn with_metadata(metadata: Metadata) -> Self {
        Self { metadata }
    }

    /// SUCCESS for a RUN, announcing the result columns.
    pub fn with_fields<S: AsRef<str>>(fields: &[S]) -> Self {
        let names = fields
            .iter()
            .map(|f| PackStreamValue::from(f.as_ref()))
            .collect::<Vec<_>>();
        let mut metadata = Metadata::new();
        metadata.insert("fields".to_string(), PackStreamValue::List(names));
        Self { metadata }
    }

    /// Get metadata entry.
    pub fn get(&self, key: &str) -> Option<&PackStreamValue> {
        self.metadata.get(key)
    }

    /// Column names announced in reply to RUN.
    pub fn fields(&self) -> Option<Vec<String>> {
        self.metadata.get("fields").and_then(|v| {
            v.as_list().map(|items| {
                items
                    .iter()
                    .filter_map(|item| item.as_str().map(str::to_string))
                    .collect()
            })
        })
    }
}

/// RECORD message.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RecordMessage {
    /// Values in column order
    pub fields: Vec<PackStreamValue>,
}

impl RecordMessage {
    /// Create a RECORD message.
    pub fn new(fields: Vec<PackStreamValue>) -> Self {
        Self { fields }
    }
}

/// FAILURE message.
#[derive(Debug, Clone, PartialEq)]
pub struct FailureMessage {
    /// Server error code, e.g. `Neo.ClientError.Statement.SyntaxError`
    pub code: String,
    /// Human readable description
    pub message: String,
}

impl FailureMessage {
    /// Create a FAILURE message.
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
        }
    }

    fn from_metadata(metadata: &Metadata) -> Self {
        let text = |key: &str| {
            metadata
                .get(key)
                .and_then(|v| v.as_str())
                .unwrap_or_default()
                .to_string()
        };
        Self {
            code: text("code"),
            message: text("message"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_success_fields() {
        let success = SuccessMessage::with_fields(&["name", "born"]);
        assert_eq!(
            success.fields(),
            Some(vec!["name".to_string(), "born".to_string()])
        );
        assert_eq!(SuccessMessage::default().fields(), None);
    }

    #[test]
    fn test_parse_failure() {
        let failure = BoltResponse::Failure(FailureMessage::new(
            "Neo.ClientError.Statement.SyntaxError",
            "Invalid input",
        ));
        let parsed = BoltResponse::from_structure(failure.to_structure()).unwrap();
        assert_eq!(parsed, failure);
        assert!(parsed.is_summary());
    }

    #[test]
    fn test_ignored_tolerates_metadata() {
        let s = PackStreamStructure::new(0x7E, vec![PackStreamValue::Map(Metadata::new())]);
        assert_eq!(BoltResponse::from_structure(s).unwrap(), BoltResponse::Ignored);
    }

    #[test]
    fn test_record_requires_list() {
        let s = PackStreamStructure::new(0x71, vec![PackStreamValue::Integer(1)]);
        assert!(BoltResponse::from_structure(s).is_err());
        let ok = PackStreamStructure::new(0x71, vec![PackStreamValue::List(vec![1i64.into()])]);
        assert!(!BoltResponse::from_structure(ok).unwrap().is_summary());
    }
}
