//! Bolt v1 request messages.

use std::collections::HashMap;

use super::tag;
use crate::bolt::packstream::{PackStreamError, PackStreamStructure, PackStreamValue};

/// Credentials sent with INIT.
#[derive(Clone, PartialEq, Eq)]
pub struct AuthToken {
    /// Authentication scheme ("basic", "none", ...)
    pub scheme: String,
    /// User name
    pub principal: String,
    /// Password or secret
    pub credentials: String,
}

impl AuthToken {
    /// Builds a token for an arbitrary scheme.
    pub fn new(
        scheme: impl Into<String>,
        principal: impl Into<String>,
        credentials: impl Into<String>,
    ) -> Self {
        Self {
            scheme: scheme.into(),
            principal: principal.into(),
            credentials: credentials.into(),
        }
    }

    /// User name and password authentication.
    pub fn basic(user: impl Into<String>, password: impl Into<String>) -> Self {
        Self::new("basic", user, password)
    }

    /// No authentication.
    pub fn none() -> Self {
        Self::new("none", "", "")
    }

    /// The map carried as the second INIT field. An unauthenticated token only
    /// carries its scheme.
    pub fn to_map(&self) -> HashMap<String, PackStreamValue> {
        let mut map = HashMap::new();
        map.insert("scheme".to_string(), PackStreamValue::from(self.scheme.as_str()));
        if self.scheme != "none" {
            map.insert("principal".to_string(), PackStreamValue::from(self.principal.as_str()));
            map.insert(
                "credentials".to_string(),
                PackStreamValue::from(self.credentials.as_str()),
            );
        }
        map
    }

    fn from_map(map: &HashMap<String, PackStreamValue>) -> Self {
        let text = |key: &str| {
            map.get(key)
                .and_then(|v| v.as_str())
                .unwrap_or_default()
                .to_string()
        };
        Self {
            scheme: text("scheme"),
            principal: text("principal"),
            credentials: text("credentials"),
        }
    }
}

impl Default for AuthToken {
    fn default() -> Self {
        Self::none()
    }
}

// Keeps credentials out of logs.
impl std::fmt::Debug for AuthToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthToken")
            .field("scheme", &self.scheme)
            .field("principal", &self.principal)
            .field("credentials", &"****")
            .finish()
    }
}

/// All Bolt v1 request messages.
#[derive(Debug, Clone, PartialEq)]
pub enum BoltRequest {
    /// INIT - Identify the client and authenticate
    Init {
        /// Client name and version
        user_agent: String,
        /// Credentials
        auth: AuthToken,
    },
    /// RUN - Execute a statement
    Run {
        /// Statement text
        statement: String,
        /// Statement parameters
        parameters: HashMap<String, PackStreamValue>,
    },
    /// DISCARD_ALL - Drop the pending result stream
    DiscardAll,
    /// PULL_ALL - Stream every record of the pending result
    PullAll,
    /// ACK_FAILURE - Acknowledge a FAILURE and leave the failed state
    AckFailure,
    /// RESET - Return the server session to a clean state
    Reset,
}

impl BoltRequest {
    /// Get the message tag.
    pub fn tag(&self) -> u8 {
        match self {
            BoltRequest::Init { .. } => tag::INIT,
            BoltRequest::Run { .. } => tag::RUN,
            BoltRequest::DiscardAll => tag::DISCARD_ALL,
            BoltRequest::PullAll => tag::PULL_ALL,
            BoltRequest::AckFailure => tag::ACK_FAILURE,
            BoltRequest::Reset => tag::RESET,
        }
    }

    /// Get message name for logging.
    pub fn name(&self) -> &'static str {
        match self {
            BoltRequest::Init { .. } => "INIT",
            BoltRequest::Run { .. } => "RUN",
            BoltRequest::DiscardAll => "DISCARD_ALL",
            BoltRequest::PullAll => "PULL_ALL",
            BoltRequest::AckFailure => "ACK_FAILURE",
            BoltRequest::Reset => "RESET",
        }
    }

    /// Convert to PackStream structure.
    pub fn to_structure(&self) -> PackStreamStructure {
        let fields = match self {
            BoltRequest::Init { user_agent, auth } => vec![
                PackStreamValue::from(user_agent.as_str()),
                PackStreamValue::Map(auth.to_map()),
            ],
            BoltRequest::Run {
                statement,
                parameters,
            } => vec![
                PackStreamValue::from(statement.as_str()),
                PackStreamValue::Map(parameters.clone()),
            ],
            _ => Vec::new(),
        };
        PackStreamStructure::new(self.tag(), fields)
    }

    /// Parse from PackStream structure.
    pub fn from_structure(s: PackStreamStructure) -> Result<Self, PackStreamError> {
        let tag = s.tag;
        let mut fields = s.fields.into_iter();
        let request = match tag {
            tag::INIT => {
                let user_agent = next_string(&mut fields, "INIT user agent")?;
                let auth = next_map(&mut fields, "INIT auth token")?;
                BoltRequest::Init {
                    user_agent,
                    auth: AuthToken::from_map(&auth),
                }
            }
            tag::RUN => BoltRequest::Run {
                statement: next_string(&mut fields, "RUN statement")?,
                parameters: next_map(&mut fields, "RUN parameters")?,
            },
            tag::DISCARD_ALL => BoltRequest::DiscardAll,
            tag::PULL_ALL => BoltRequest::PullAll,
            tag::ACK_FAILURE => BoltRequest::AckFailure,
            tag::RESET => BoltRequest::Reset,
            other => {
                return Err(PackStreamError::InvalidStructure(format!(
                    "Unknown request message tag: 0x{:02X}",
                    other
                )))
            }
        };
        Ok(request)
    }
}

fn next_string(
    fields: &mut impl Iterator<Item = PackStreamValue>,
    what: &str,
) -> Result<String, PackStreamError> {
    fields
        .next()
        .and_then(PackStreamValue::into_string)
        .ok_or_else(|| PackStreamError::InvalidStructure(format!("{} must be a string", what)))
}

fn next_map(
    fields: &mut impl Iterator<Item = PackStreamValue>,
    what: &str,
) -> Result<HashMap<String, PackStreamValue>, PackStreamError> {
    fields
        .next()
        .and_then(PackStreamValue::into_map)
        .ok_or_else(|| PackStreamError::InvalidStructure(format!("{} must be a map", what)))
}
