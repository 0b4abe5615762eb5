//! Bolt message framing for tokio_util.
//!
//! A message is split into chunks, each prefixed with its 2-byte big-endian
//! length, and terminated by an empty chunk (`00 00`).

use bytes::{Buf, BufMut, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

use super::message::{BoltRequest, BoltResponse};
use super::packstream::{decode, PackStreamEncoder, PackStreamStructure, PackStreamValue};
use super::BoltError;

/// Largest chunk the encoder writes.
pub const MAX_CHUNK_SIZE: usize = 16384;

/// End of message marker (0x00 0x00)
pub const END_MARKER: [u8; 2] = [0x00, 0x00];

/// Default cap on a reassembled message.
pub const DEFAULT_MAX_MESSAGE_SIZE: usize = 16 * 1024 * 1024;

/// Chunked framing of single PackStream values.
#[derive(Debug)]
pub struct BoltCodec {
    max_message_size: usize,
    /// Chunks of the message currently being reassembled
    message_buffer: BytesMut,
    /// Scratch space for the unchunked encoding
    encode_buffer: BytesMut,
}

impl BoltCodec {
    /// Create a new codec with default settings.
    pub fn new() -> Self {
        Self::with_max_size(DEFAULT_MAX_MESSAGE_SIZE)
    }

    /// Create a codec with custom max message size.
    pub fn with_max_size(max_message_size: usize) -> Self {
        Self {
            max_message_size,
            message_buffer: BytesMut::with_capacity(4096),
            encode_buffer: BytesMut::with_capacity(4096),
        }
    }

    fn write_chunks(data: &[u8], dst: &mut BytesMut) {
        dst.reserve(data.len() + 2 * (data.len() / MAX_CHUNK_SIZE + 2));
        for chunk in data.chunks(MAX_CHUNK_SIZE) {
            dst.put_u16(chunk.len() as u16);
            dst.put_slice(chunk);
        }
        dst.put_slice(&END_MARKER);
    }
}

impl Default for BoltCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl Decoder for BoltCodec {
    type Item = PackStreamValue;
    type Error = BoltError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        loop {
            if src.len() < 2 {
                return Ok(None);
            }

            let chunk_size = u16::from_be_bytes([src[0], src[1]]) as usize;

            if chunk_size == 0 {
                src.advance(2);
                if self.message_buffer.is_empty() {
                    // No-op message used as a keep-alive.
                    continue;
                }
                let message = self.message_buffer.split();
                return Ok(Some(decode(&message)?));
            }

            if src.len() < 2 + chunk_size {
                src.reserve(2 + chunk_size - src.len());
                return Ok(None);
            }

            let size = self.message_buffer.len() + chunk_size;
            if size > self.max_message_size {
                return Err(BoltError::MessageTooLarge {
                    size,
                    max: self.max_message_size,
                });
            }

            src.advance(2);
            self.message_buffer.extend_from_slice(&src[..chunk_size]);
            src.advance(chunk_size);
        }
    }
}

impl Encoder<PackStreamValue> for BoltCodec {
    type Error = BoltError;

    fn encode(&mut self, item: PackStreamValue, dst: &mut BytesMut) -> Result<(), Self::Error> {
        self.encode_buffer.clear();
        PackStreamEncoder::new(&mut self.encode_buffer).encode(&item)?;
        Self::write_chunks(&self.encode_buffer, dst);
        Ok(())
    }
}

fn into_structure(value: PackStreamValue) -> Result<PackStreamStructure, BoltError> {
    match value {
        PackStreamValue::Structure(s) => Ok(s),
        other => Err(BoltError::Protocol(format!(
            "Expected a message structure, got {}",
            other.type_name()
        ))),
    }
}

/// Client side: decodes server replies, encodes requests.
#[derive(Debug, Default)]
pub struct BoltResponseCodec {
    inner: BoltCodec,
}

impl BoltResponseCodec {
    /// Create a new response codec.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a response codec with custom max message size.
    pub fn with_max_size(max_message_size: usize) -> Self {
        Self {
            inner: BoltCodec::with_max_size(max_message_size),
        }
    }
}

impl Decoder for BoltResponseCodec {
    type Item = BoltResponse;
    type Error = BoltError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        match self.inner.decode(src)? {
            Some(value) => Ok(Some(BoltResponse::from_structure(into_structure(value)?)?)),
            None => Ok(None),
        }
    }
}

impl Encoder<BoltRequest> for BoltResponseCodec {
    type Error = BoltError;

    fn encode(&mut self, item: BoltRequest, dst: &mut BytesMut) -> Result<(), Self::Error> {
        self.inner
            .encode(PackStreamValue::Structure(item.to_structure()), dst)
    }
}

/// Server side: decodes requests, encodes replies. Used to script peers in tests
/// and tooling.
#[derive(Debug, Default)]
pub struct BoltRequestCodec {
    inner: BoltCodec,
}

impl BoltRequestCodec {
    /// Create a new request codec.
    pub fn new() -> Self {
        Self::default()
    }
}

impl Decoder for BoltRequestCodec {
    type Item = BoltRequest;
    type Error = BoltError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        match self.inner.decode(src)? {
            Some(value) => Ok(Some(BoltRequest::from_structure(into_structure(value)?)?)),
            None => Ok(None),
        }
    }
}

impl Encoder<BoltResponse> for BoltRequestCodec {
    type Error = BoltError;

    fn encode(&mut self, item: BoltResponse, dst: &mut BytesMut) -> Result<(), Self::Error> {
        self.inner
            .encode(PackStreamValue::Structure(item.to_structure()), dst)
    }
}
