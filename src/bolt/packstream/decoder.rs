//! PackStream decoder.

use bytes::Buf;
use std::collections::HashMap;

use super::marker::*;
use super::types::{PackStreamStructure, PackStreamValue};
use super::PackStreamError;

/// Nested containers deeper than this are rejected instead of recursing further.
const MAX_DEPTH: usize = 64;

/// Reads PackStream values from any [`Buf`].
pub struct PackStreamDecoder<B> {
    buf: B,
    depth: usize,
}

impl<B: Buf> PackStreamDecoder<B> {
    /// Wraps a source buffer.
    pub fn new(buf: B) -> Self {
        Self { buf, depth: 0 }
    }

    /// Bytes not yet consumed.
    pub fn remaining(&self) -> usize {
        self.buf.remaining()
    }

    /// Decodes the next value.
    pub fn decode(&mut self) -> Result<PackStreamValue, PackStreamError> {
        let marker = self.read_u8()?;

        if is_tiny_int(marker) {
            return Ok(PackStreamValue::Integer(marker as i8 as i64));
        }

        match high_nibble(marker) {
            TINY_STRING => return self.read_string(low_nibble(marker)),
            TINY_LIST => return self.read_list(low_nibble(marker)),
            TINY_MAP => return self.read_map(low_nibble(marker)),
            TINY_STRUCT => return self.read_structure(low_nibble(marker)),
            _ => {}
        }

        match marker {
            NULL => Ok(PackStreamValue::Null),
            TRUE => Ok(PackStreamValue::Boolean(true)),
            FALSE => Ok(PackStreamValue::Boolean(false)),
            FLOAT_64 => {
                self.need(8)?;
                Ok(PackStreamValue::Float(self.buf.get_f64()))
            }
            INT_8 => {
                self.need(1)?;
                Ok(PackStreamValue::Integer(self.buf.get_i8() as i64))
            }
            INT_16 => {
                self.need(2)?;
                Ok(PackStreamValue::Integer(self.buf.get_i16() as i64))
            }
            INT_32 => {
                self.need(4)?;
                Ok(PackStreamValue::Integer(self.buf.get_i32() as i64))
            }
            INT_64 => {
                self.need(8)?;
                Ok(PackStreamValue::Integer(self.buf.get_i64()))
            }
            BYTES_8 | BYTES_16 | BYTES_32 => {
                let len = self.read_size(marker - BYTES_8)?;
                Ok(PackStreamValue::Bytes(self.read_raw(len)?))
            }
            STRING_8 | STRING_16 | STRING_32 => {
                let len = self.read_size(marker - STRING_8)?;
                self.read_string(len)
            }
            LIST_8 | LIST_16 | LIST_32 => {
                let len = self.read_size(marker - LIST_8)?;
                self.read_list(len)
            }
            MAP_8 | MAP_16 | MAP_32 => {
                let len = self.read_size(marker - MAP_8)?;
                self.read_map(len)
            }
            STRUCT_8 | STRUCT_16 => {
                let len = self.read_size(marker - STRUCT_8)?;
                self.read_structure(len)
            }
            other => Err(PackStreamError::UnknownMarker(other)),
        }
    }

    /// Reads a size prefix: width 0 = u8, 1 = u16, 2 = u32.
    fn read_size(&mut self, width: u8) -> Result<usize, PackStreamError> {
        match width {
            0 => Ok(self.read_u8()? as usize),
            1 => {
                self.need(2)?;
                Ok(self.buf.get_u16() as usize)
            }
            _ => {
                self.need(4)?;
                Ok(self.buf.get_u32() as usize)
            }
        }
    }

    fn read_string(&mut self, len: usize) -> Result<PackStreamValue, PackStreamError> {
        let raw = self.read_raw(len)?;
        String::from_utf8(raw)
            .map(PackStreamValue::String)
            .map_err(|e| PackStreamError::InvalidUtf8(e.to_string()))
    }

    fn read_list(&mut self, len: usize) -> Result<PackStreamValue, PackStreamError> {
        self.descend()?;
        let mut items = Vec::with_capacity(len.min(1024));
        for _ in 0..len {
            items.push(self.decode()?);
        }
        self.depth -= 1;
        Ok(PackStreamValue::List(items))
    }

    fn read_map(&mut self, len: usize) -> Result<PackStreamValue, PackStreamError> {
        self.descend()?;
        let mut entries = HashMap::with_capacity(len.min(1024));
        for _ in 0..len {
            let key = match self.decode()? {
                PackStreamValue::String(key) => key,
                _ => return Err(PackStreamError::InvalidMapKey),
            };
            let value = self.decode()?;
            entries.insert(key, value);
        }
        self.depth -= 1;
        Ok(PackStreamValue::Map(entries))
    }

    fn read_structure(&mut self, len: usize) -> Result<PackStreamValue, PackStreamError> {
        self.descend()?;
        let tag = self.read_u8()?;
        let mut fields = Vec::with_capacity(len.min(64));
        for _ in 0..len {
            fields.push(self.decode()?);
        }
        self.depth -= 1;
        Ok(PackStreamValue::Structure(PackStreamStructure::new(tag, fields)))
    }

    fn descend(&mut self) -> Result<(), PackStreamError> {
        self.depth += 1;
        if self.depth > MAX_DEPTH {
            return Err(PackStreamError::InvalidStructure(format!(
                "nesting deeper than {}",
                MAX_DEPTH
            )));
        }
        Ok(())
    }

    fn read_u8(&mut self) -> Result<u8, PackStreamError> {
        self.need(1)?;
        Ok(self.buf.get_u8())
    }

    fn read_raw(&mut self, len: usize) -> Result<Vec<u8>, PackStreamError> {
        self.need(len)?;
        let mut raw = vec![0u8; len];
        self.buf.copy_to_slice(&mut raw);
        Ok(raw)
    }

    fn need(&self, len: usize) -> Result<(), PackStreamError> {
        if self.buf.remaining() < len {
            Err(PackStreamError::UnexpectedEof)
        } else {
            Ok(())
        }
    }
}

/// Decodes exactly one value; trailing bytes are an error.
pub fn decode(data: &[u8]) -> Result<PackStreamValue, PackStreamError> {
    let mut decoder = PackStreamDecoder::new(data);
    let value = decoder.decode()?;
    if decoder.remaining() > 0 {
        return Err(PackStreamError::InvalidStructure(format!(
            "{} trailing bytes after value",
            decoder.remaining()
        )));
    }
    Ok(value)
}
