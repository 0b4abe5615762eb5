//! # Bolt Protocol Implementation
//!
//! Wire-level pieces of the Bolt v1 protocol. Nothing in here knows about
//! sessions, results or pooling.
//!
//! ## Submodules
//!
//! - [`packstream`] - Binary serialization/deserialization
//! - [`message`] - Request and response messages (INIT, RUN, PULL_ALL, ...)
//! - [`handshake`] - Version negotiation
//! - [`codec`] - Chunked framing as a Tokio codec
//! - [`error`] - Protocol error types
//!
//! ## Note
//!
//! Most users should use the high-level [`crate::driver`] module instead of
//! interacting with the Bolt protocol directly.

pub mod codec;
pub mod error;
pub mod handshake;
pub mod message;
pub mod packstream;

pub use codec::{BoltCodec, BoltRequestCodec, BoltResponseCodec};
pub use error::{BoltError, BoltResult};
pub use handshake::{BOLT_MAGIC, BOLT_V1};
pub use message::{
    AuthToken, BoltRequest, BoltResponse, FailureMessage, Metadata, RecordMessage,
    SuccessMessage,
};
pub use packstream::{PackStreamError, PackStreamStructure, PackStreamValue};
