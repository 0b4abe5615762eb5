//! PackStream value model.

use std::collections::HashMap;

/// A value as it travels over the wire.
#[derive(Debug, Clone, PartialEq)]
pub enum PackStreamValue {
    /// Null value
    Null,
    /// Boolean value
    Boolean(bool),
    /// 64-bit signed integer
    Integer(i64),
    /// 64-bit floating point
    Float(f64),
    /// Byte array
    Bytes(Vec<u8>),
    /// UTF-8 string
    String(String),
    /// List of values
    List(Vec<PackStreamValue>),
    /// Map with string keys
    Map(HashMap<String, PackStreamValue>),
    /// Tagged structure
    Structure(PackStreamStructure),
}

/// A tagged structure: one signature byte plus positional fields.
///
/// Protocol messages and graph entities are both structures.
#[derive(Debug, Clone, PartialEq)]
pub struct PackStreamStructure {
    /// Signature byte
    pub tag: u8,
    /// Positional fields
    pub fields: Vec<PackStreamValue>,
}

impl PackStreamStructure {
    /// Creates a structure.
    pub fn new(tag: u8, fields: Vec<PackStreamValue>) -> Self {
        Self { tag, fields }
    }

    /// Number of fields.
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    /// True when the structure carries no fields.
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

impl PackStreamValue {
    /// Name of the variant, used in error messages.
    pub fn type_name(&self) -> &'static str {
        match self {
            PackStreamValue::Null => "Null",
            PackStreamValue::Boolean(_) => "Boolean",
            PackStreamValue::Integer(_) => "Integer",
            PackStreamValue::Float(_) => "Float",
            PackStreamValue::Bytes(_) => "Bytes",
            PackStreamValue::String(_) => "String",
            PackStreamValue::List(_) => "List",
            PackStreamValue::Map(_) => "Map",
            PackStreamValue::Structure(_) => "Structure",
        }
    }

    /// True for `Null`.
    pub fn is_null(&self) -> bool {
        matches!(self, PackStreamValue::Null)
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            PackStreamValue::Boolean(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            PackStreamValue::Integer(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_float(&self) -> Option<f64> {
        match self {
            PackStreamValue::Float(f) => Some(*f),
            PackStreamValue::Integer(i) => Some(*i as f64),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            PackStreamValue::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[PackStreamValue]> {
        match self {
            PackStreamValue::List(l) => Some(l),
            _ => None,
        }
    }

    pub fn as_map(&self) -> Option<&HashMap<String, PackStreamValue>> {
        match self {
            PackStreamValue::Map(m) => Some(m),
            _ => None,
        }
    }

    pub fn as_structure(&self) -> Option<&PackStreamStructure> {
        match self {
            PackStreamValue::Structure(s) => Some(s),
            _ => None,
        }
    }

    /// Takes the string out of a `String` value.
    pub fn into_string(self) -> Option<String> {
        match self {
            PackStreamValue::String(s) => Some(s),
            _ => None,
        }
    }

    /// Takes the items out of a `List` value.
    pub fn into_list(self) -> Option<Vec<PackStreamValue>> {
        match self {
            PackStreamValue::List(l) => Some(l),
            _ => None,
        }
    }

    /// Takes the entries out of a `Map` value.
    pub fn into_map(self) -> Option<HashMap<String, PackStreamValue>> {
        match self {
            PackStreamValue::Map(m) => Some(m),
            _ => None,
        }
    }
}

macro_rules! impl_from_for_packstream {
    ($($source:ty => |$v:ident| $body:expr),+ $(,)?) => {
        $(
            impl From<$source> for PackStreamValue {
                fn from($v: $source) -> Self {
                    $body
                }
            }
        )+
    };
}

impl_from_for_packstream! {
    bool => |v| PackStreamValue::Boolean(v),
    i64 => |v| PackStreamValue::Integer(v),
    i32 => |v| PackStreamValue::Integer(i64::from(v)),
    f64 => |v| PackStreamValue::Float(v),
    &str => |v| PackStreamValue::String(v.to_owned()),
    String => |v| PackStreamValue::String(v),
    Vec<PackStreamValue> => |v| PackStreamValue::List(v),
    HashMap<String, PackStreamValue> => |v| PackStreamValue::Map(v),
    PackStreamStructure => |v| PackStreamValue::Structure(v),
}
