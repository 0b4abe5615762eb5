//! PackStream marker bytes.
//!
//! Every encoded value starts with one marker byte. The "tiny" forms pack a
//! small size (or a small integer) into the marker itself.

pub const NULL: u8 = 0xC0;
pub const FLOAT_64: u8 = 0xC1;
pub const FALSE: u8 = 0xC2;
pub const TRUE: u8 = 0xC3;

pub const INT_8: u8 = 0xC8;
pub const INT_16: u8 = 0xC9;
pub const INT_32: u8 = 0xCA;
pub const INT_64: u8 = 0xCB;

pub const BYTES_8: u8 = 0xCC;
pub const BYTES_16: u8 = 0xCD;
pub const BYTES_32: u8 = 0xCE;

pub const STRING_8: u8 = 0xD0;
pub const STRING_16: u8 = 0xD1;
pub const STRING_32: u8 = 0xD2;

pub const LIST_8: u8 = 0xD4;
pub const LIST_16: u8 = 0xD5;
pub const LIST_32: u8 = 0xD6;

pub const MAP_8: u8 = 0xD8;
pub const MAP_16: u8 = 0xD9;
pub const MAP_32: u8 = 0xDA;

pub const STRUCT_8: u8 = 0xDC;
pub const STRUCT_16: u8 = 0xDD;

/// High nibble of the tiny container markers.
pub const TINY_STRING: u8 = 0x80;
pub const TINY_LIST: u8 = 0x90;
pub const TINY_MAP: u8 = 0xA0;
pub const TINY_STRUCT: u8 = 0xB0;

/// Largest size that fits in a tiny marker.
pub const TINY_MAX: usize = 0x0F;

/// Smallest value encoded as a single-byte tiny int.
pub const TINY_INT_MIN: i64 = -16;
/// Largest value encoded as a single-byte tiny int.
pub const TINY_INT_MAX: i64 = 127;

// Graph structure tags.
pub const NODE: u8 = 0x4E;
pub const RELATIONSHIP: u8 = 0x52;
pub const UNBOUND_RELATIONSHIP: u8 = 0x72;
pub const PATH: u8 = 0x50;

/// Returns the marker family (high nibble) of a tiny container marker.
#[inline]
pub fn high_nibble(marker: u8) -> u8 {
    marker & 0xF0
}

/// Returns the size packed into the low nibble of a tiny marker.
#[inline]
pub fn low_nibble(marker: u8) -> usize {
    (marker & 0x0F) as usize
}

/// Single-byte integers: `0x00..=0x7F` and `0xF0..=0xFF`.
#[inline]
pub fn is_tiny_int(marker: u8) -> bool {
    marker <= 0x7F || marker >= 0xF0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tiny_int_range_excludes_containers() {
        assert!(is_tiny_int(0x00));
        assert!(is_tiny_int(0x7F));
        assert!(is_tiny_int(0xF0));
        assert!(is_tiny_int(0xFF));
        assert!(!is_tiny_int(TINY_STRING));
        assert!(!is_tiny_int(NULL));
        assert!(!is_tiny_int(STRUCT_16));
    }

    #[test]
    fn test_nibbles() {
        assert_eq!(high_nibble(0xB3), TINY_STRUCT);
        assert_eq!(low_nibble(0xB3), 3);
        assert_eq!(high_nibble(0x8F), TINY_STRING);
        assert_eq!(low_nibble(0x8F), TINY_MAX);
    }
}
