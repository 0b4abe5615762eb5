//! PackStream encoder.

use bytes::{BufMut, BytesMut};
use std::collections::HashMap;

use super::marker::*;
use super::types::{PackStreamStructure, PackStreamValue};
use super::PackStreamError;

/// Writes PackStream values into any [`BufMut`].
///
/// Integers and container headers always use the smallest encoding that fits.
pub struct PackStreamEncoder<B> {
    buf: B,
}

impl<B: BufMut> PackStreamEncoder<B> {
    /// Wraps a destination buffer.
    pub fn new(buf: B) -> Self {
        Self { buf }
    }

    /// Returns the destination buffer.
    pub fn into_inner(self) -> B {
        self.buf
    }

    /// Encodes one value.
    pub fn encode(&mut self, value: &PackStreamValue) -> Result<(), PackStreamError> {
        match value {
            PackStreamValue::Null => {
                self.buf.put_u8(NULL);
                Ok(())
            }
            PackStreamValue::Boolean(b) => {
                self.buf.put_u8(if *b { TRUE } else { FALSE });
                Ok(())
            }
            PackStreamValue::Integer(i) => {
                self.encode_int(*i);
                Ok(())
            }
            PackStreamValue::Float(f) => {
                self.buf.put_u8(FLOAT_64);
                self.buf.put_f64(*f);
                Ok(())
            }
            PackStreamValue::Bytes(b) => self.encode_bytes(b),
            PackStreamValue::String(s) => self.encode_string(s),
            PackStreamValue::List(items) => self.encode_list(items),
            PackStreamValue::Map(entries) => self.encode_map(entries),
            PackStreamValue::Structure(s) => self.encode_structure(s),
        }
    }

    pub fn encode_int(&mut self, value: i64) {
        if (TINY_INT_MIN..=TINY_INT_MAX).contains(&value) {
            self.buf.put_i8(value as i8);
        } else if i8::try_from(value).is_ok() {
            self.buf.put_u8(INT_8);
            self.buf.put_i8(value as i8);
        } else if i16::try_from(value).is_ok() {
            self.buf.put_u8(INT_16);
            self.buf.put_i16(value as i16);
        } else if i32::try_from(value).is_ok() {
            self.buf.put_u8(INT_32);
            self.buf.put_i32(value as i32);
        } else {
            self.buf.put_u8(INT_64);
            self.buf.put_i64(value);
        }
    }

    pub fn encode_bytes(&mut self, value: &[u8]) -> Result<(), PackStreamError> {
        // Byte arrays have no tiny form.
        self.write_header(None, [BYTES_8, BYTES_16, BYTES_32], value.len(), "bytes")?;
        self.buf.put_slice(value);
        Ok(())
    }

    pub fn encode_string(&mut self, value: &str) -> Result<(), PackStreamError> {
        let bytes = value.as_bytes();
        self.write_header(
            Some(TINY_STRING),
            [STRING_8, STRING_16, STRING_32],
            bytes.len(),
            "string",
        )?;
        self.buf.put_slice(bytes);
        Ok(())
    }

    pub fn encode_list(&mut self, items: &[PackStreamValue]) -> Result<(), PackStreamError> {
        self.write_header(Some(TINY_LIST), [LIST_8, LIST_16, LIST_32], items.len(), "list")?;
        for item in items {
            self.encode(item)?;
        }
        Ok(())
    }

    pub fn encode_map(
        &mut self,
        entries: &HashMap<String, PackStreamValue>,
    ) -> Result<(), PackStreamError> {
        self.write_header(Some(TINY_MAP), [MAP_8, MAP_16, MAP_32], entries.len(), "map")?;
        for (key, value) in entries {
            self.encode_string(key)?;
            self.encode(value)?;
        }
        Ok(())
    }

    pub fn encode_structure(&mut self, s: &PackStreamStructure) -> Result<(), PackStreamError> {
        let len = s.fields.len();
        if len <= TINY_MAX {
            self.buf.put_u8(TINY_STRUCT | len as u8);
        } else if len <= u8::MAX as usize {
            self.buf.put_u8(STRUCT_8);
            self.buf.put_u8(len as u8);
        } else if len <= u16::MAX as usize {
            self.buf.put_u8(STRUCT_16);
            self.buf.put_u16(len as u16);
        } else {
            return Err(PackStreamError::ValueTooLarge("structure", len));
        }
        self.buf.put_u8(s.tag);
        for field in &s.fields {
            self.encode(field)?;
        }
        Ok(())
    }

    fn write_header(
        &mut self,
        tiny: Option<u8>,
        sized: [u8; 3],
        len: usize,
        what: &'static str,
    ) -> Result<(), PackStreamError> {
        match tiny {
            Some(base) if len <= TINY_MAX => self.buf.put_u8(base | len as u8),
            _ if len <= u8::MAX as usize => {
                self.buf.put_u8(sized[0]);
                self.buf.put_u8(len as u8);
            }
            _ if len <= u16::MAX as usize => {
                self.buf.put_u8(sized[1]);
                self.buf.put_u16(len as u16);
            }
            _ if len <= u32::MAX as usize => {
                self.buf.put_u8(sized[2]);
                self.buf.put_u32(len as u32);
            }
            _ => return Err(PackStreamError::ValueTooLarge(what, len)),
        }
        Ok(())
    }
}

/// Encodes a single value into a fresh buffer.
pub fn encode(value: &PackStreamValue) -> Result<BytesMut, PackStreamError> {
    let mut encoder = PackStreamEncoder::new(BytesMut::with_capacity(128));
    encoder.encode(value)?;
    Ok(encoder.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bytes_of(value: PackStreamValue) -> Vec<u8> {
        encode(&value).unwrap().to_vec()
    }

    #[test]
    fn test_encode_scalars() {
        assert_eq!(bytes_of(PackStreamValue::Null), vec![0xC0]);
        assert_eq!(bytes_of(true.into()), vec![0xC3]);
        assert_eq!(bytes_of(false.into()), vec![0xC2]);
        assert_eq!(
            bytes_of(1.1f64.into()),
            vec![0xC1, 0x3F, 0xF1, 0x99, 0x99, 0x99, 0x99, 0x99, 0x9A]
        );
    }

    #[test]
    fn test_encode_int_picks_smallest_form() {
        assert_eq!(bytes_of(1i64.into()), vec![0x01]);
        assert_eq!(bytes_of((-16i64).into()), vec![0xF0]);
        assert_eq!(bytes_of((-17i64).into()), vec![0xC8, 0xEF]);
        assert_eq!(bytes_of(128i64.into()), vec![0xC9, 0x00, 0x80]);
        assert_eq!(bytes_of(32768i64.into()), vec![0xCA, 0x00, 0x00, 0x80, 0x00]);
        assert_eq!(bytes_of(2147483648i64.into())[0], 0xCB);
    }

    #[test]
    fn test_encode_string_headers() {
        assert_eq!(bytes_of("".into()), vec![0x80]);
        assert_eq!(bytes_of("a".into()), vec![0x81, b'a']);
        let sixteen = "x".repeat(16);
        let encoded = bytes_of(sixteen.as_str().into());
        assert_eq!(&encoded[..2], &[0xD0, 16]);
        assert_eq!(encoded.len(), 18);
    }

    #[test]
    fn test_encode_bytes_has_no_tiny_form() {
        assert_eq!(bytes_of(PackStreamValue::Bytes(vec![1, 2])), vec![0xCC, 2, 1, 2]);
    }

    #[test]
    fn test_encode_structure() {
        let run = PackStreamStructure::new(
            0x10,
            vec!["RETURN 1".into(), PackStreamValue::Map(HashMap::new())],
        );
        let encoded = bytes_of(run.into());
        assert_eq!(&encoded[..3], &[0xB2, 0x10, 0x88]);
        assert_eq!(*encoded.last().unwrap(), 0xA0);
    }
}
