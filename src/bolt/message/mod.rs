//! Bolt v1 message types.
//!
//! Requests travel client to server, responses server to client. Both are
//! PackStream structures whose tag identifies the message.

pub mod request;
pub mod response;

pub use request::*;
pub use response::*;

/// Bolt v1 message tags.
pub mod tag {
    /// INIT request tag (0x01)
    pub const INIT: u8 = 0x01;
    /// ACK_FAILURE request tag (0x0E)
    pub const ACK_FAILURE: u8 = 0x0E;
    /// RESET request tag (0x0F)
    pub const RESET: u8 = 0x0F;
    /// RUN request tag (0x10)
    pub const RUN: u8 = 0x10;
    /// DISCARD_ALL request tag (0x2F)
    pub const DISCARD_ALL: u8 = 0x2F;
    /// PULL_ALL request tag (0x3F)
    pub const PULL_ALL: u8 = 0x3F;

    /// SUCCESS response tag (0x70)
    pub const SUCCESS: u8 = 0x70;
    /// RECORD response tag (0x71)
    pub const RECORD: u8 = 0x71;
    /// IGNORED response tag (0x7E)
    pub const IGNORED: u8 = 0x7E;
    /// FAILURE response tag (0x7F)
    pub const FAILURE: u8 = 0x7F;
}
