//! Bolt protocol handshake.
//!
//! The handshake consists of:
//! 1. Client sends the 4-byte magic preamble (0x6060B017)
//! 2. Client sends 4 x 4-byte version proposals (preferred first, 0 = unused)
//! 3. Server responds with the 4-byte agreed version (or 0 if none)

use bytes::BufMut;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use super::error::{BoltError, BoltResult};

/// Bolt protocol magic number: 0x6060B017
pub const BOLT_MAGIC: [u8; 4] = [0x60, 0x60, 0xB0, 0x17];

/// Size of the complete handshake message from client (magic + 4 versions)
pub const HANDSHAKE_SIZE: usize = 20;

/// Size of server response (negotiated version)
pub const HANDSHAKE_RESPONSE_SIZE: usize = 4;

/// The only protocol version this client speaks.
pub const BOLT_V1: u32 = 1;

/// Version proposals in preference order.
pub const PROPOSED_VERSIONS: [u32; 4] = [BOLT_V1, 0, 0, 0];

/// Builds the 20-byte client handshake.
pub fn client_handshake() -> [u8; HANDSHAKE_SIZE] {
    let mut data = [0u8; HANDSHAKE_SIZE];
    let mut out = &mut data[..];
    out.put_slice(&BOLT_MAGIC);
    for version in PROPOSED_VERSIONS {
        out.put_u32(version);
    }
    data
}

/// Interprets the server's 4-byte answer.
pub fn parse_agreed_version(response: [u8; HANDSHAKE_RESPONSE_SIZE]) -> BoltResult<u32> {
    match u32::from_be_bytes(response) {
        0 => Err(BoltError::Handshake(
            "Server does not support any proposed protocol version".to_string(),
        )),
        BOLT_V1 => Ok(BOLT_V1),
        other => Err(BoltError::UnsupportedVersion(other)),
    }
}

/// Runs the handshake over a freshly opened stream.
pub async fn negotiate<S>(stream: &mut S) -> BoltResult<u32>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    stream.write_all(&client_handshake()).await?;
    stream.flush().await?;

    let mut response = [0u8; HANDSHAKE_RESPONSE_SIZE];
    stream.read_exact(&mut response).await.map_err(|e| {
        if e.kind() == std::io::ErrorKind::UnexpectedEof {
            BoltError::Handshake("Connection closed during handshake".to_string())
        } else {
            BoltError::Io(e)
        }
    })?;

    parse_agreed_version(response)
}
