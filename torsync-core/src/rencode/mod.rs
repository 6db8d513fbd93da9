//! Rencode serialization for the Deluge RPC protocol.
//!
//! Rencode is a bencode descendant that relocates the typecodes onto the
//! whole byte range so small integers, short strings, lists and maps carry
//! their value or length inside the leading byte. Fixed-width numbers are
//! always big-endian on the wire.

mod decode;
mod encode;

pub use decode::decode;
pub use encode::{FloatWidth, encode, encode_with};

/// Positive integers with the value embedded in the typecode.
pub(crate) const INT_POS_FIXED_START: u8 = 0;
pub(crate) const INT_POS_FIXED_COUNT: usize = 44;

/// Negative integers with the value embedded in the typecode.
pub(crate) const INT_NEG_FIXED_START: u8 = 70;
pub(crate) const INT_NEG_FIXED_COUNT: usize = 32;

/// Strings with the byte length embedded in the typecode.
pub(crate) const STR_FIXED_START: u8 = 128;
pub(crate) const STR_FIXED_COUNT: usize = 64;

/// Lists with the element count embedded in the typecode.
pub(crate) const LIST_FIXED_START: u8 = STR_FIXED_START + STR_FIXED_COUNT as u8;
pub(crate) const LIST_FIXED_COUNT: usize = 64;

/// Maps with the entry count embedded in the typecode.
pub(crate) const DICT_FIXED_START: u8 = 102;
pub(crate) const DICT_FIXED_COUNT: usize = 25;

/// Maximum digits of an integer or string length written in base 10.
pub(crate) const MAX_INT_LENGTH: usize = 64;

pub(crate) const CHR_FLOAT64: u8 = 44;
pub(crate) const CHR_LIST: u8 = 59;
pub(crate) const CHR_DICT: u8 = 60;
pub(crate) const CHR_INT: u8 = 61;
pub(crate) const CHR_INT1: u8 = 62;
pub(crate) const CHR_INT2: u8 = 63;
pub(crate) const CHR_INT4: u8 = 64;
pub(crate) const CHR_INT8: u8 = 65;
pub(crate) const CHR_FLOAT32: u8 = 66;
pub(crate) const CHR_TRUE: u8 = 67;
pub(crate) const CHR_FALSE: u8 = 68;
pub(crate) const CHR_NONE: u8 = 69;
pub(crate) const CHR_TERM: u8 = 127;

/// A rencode value.
///
/// Maps keep insertion order and may hold duplicate keys exactly as they
/// appeared on the wire. Strings that are not valid UTF-8 decode to
/// [`Value::Bytes`]; both variants encode identically.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Int(i128),
    Float(f64),
    Str(String),
    Bytes(Vec<u8>),
    List(Vec<Value>),
    Map(Vec<(Value, Value)>),
    Bool(bool),
    Null,
}

impl Value {
    /// Returns the integer payload, if any.
    pub fn as_int(&self) -> Option<i128> {
        match self {
            Value::Int(value) => Some(*value),
            _ => None,
        }
    }

    /// Returns the value as a float, widening integers.
    pub fn as_float(&self) -> Option<f64> {
        match self {
            Value::Float(value) => Some(*value),
            Value::Int(value) => Some(*value as f64),
            _ => None,
        }
    }

    /// Returns the string payload, if it is valid UTF-8.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(value) => Some(value),
            Value::Bytes(bytes) => std::str::from_utf8(bytes).ok(),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[Value]> {
        match self {
            Value::List(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_map(&self) -> Option<&[(Value, Value)]> {
        match self {
            Value::Map(entries) => Some(entries),
            _ => None,
        }
    }

    /// Looks up the first map entry whose key is the string `key`.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.as_map()?
            .iter()
            .find(|(candidate, _)| candidate.as_str() == Some(key))
            .map(|(_, value)| value)
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Value::Int(value.into())
    }
}

impl From<u64> for Value {
    fn from(value: u64) -> Self {
        Value::Int(value.into())
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Value::Float(value)
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Value::Bool(value)
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::Str(value.to_string())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Value::Str(value)
    }
}

impl From<Vec<Value>> for Value {
    fn from(items: Vec<Value>) -> Self {
        Value::List(items)
    }
}

/// Errors raised while decoding rencode data.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DecodeError {
    #[error("Input truncated at offset {offset}")]
    Truncated { offset: usize },

    #[error("Unknown typecode {typecode} at offset {offset}")]
    UnknownTypecode { typecode: u8, offset: usize },

    #[error("Unexpected terminator at offset {offset}")]
    UnexpectedTerminator { offset: usize },

    #[error("Decimal literal at offset {offset} has 64 or more digits")]
    Overflow { offset: usize },

    #[error("Redundant leading zero at offset {offset}")]
    RedundantLeadingZero { offset: usize },

    #[error("Negative integer with leading zero at offset {offset}")]
    NegativeLeadingZero { offset: usize },

    #[error("Invalid decimal digits at offset {offset}")]
    InvalidDigits { offset: usize },

    #[error("Integer at offset {offset} does not fit in 128 bits")]
    IntegerOutOfRange { offset: usize },

    #[error("Nesting deeper than {limit} levels at offset {offset}")]
    NestingTooDeep { limit: usize, offset: usize },

    #[error("{remaining} trailing bytes after value ending at offset {consumed}")]
    TrailingBytes { consumed: usize, remaining: usize },
}

/// Errors raised while encoding a value.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EncodeError {
    #[error("Integer needs {digits} decimal digits, limit is 63")]
    IntegerOverflow { digits: usize },

    #[error("Nesting deeper than {limit} levels")]
    NestingTooDeep { limit: usize },
}

/// Maximum container nesting accepted in either direction.
pub(crate) const MAX_DEPTH: usize = 256;

/// Leading-byte classification of a rencode value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Typecode {
    PosFixed(u8),
    NegFixed(i8),
    Float64,
    StrDecimal,
    List,
    Dict,
    Int,
    Int1,
    Int2,
    Int4,
    Int8,
    Float32,
    True,
    False,
    None,
    DictFixed(usize),
    Term,
    StrFixed(usize),
    ListFixed(usize),
    Unknown(u8),
}

impl Typecode {
    pub(crate) fn classify(byte: u8) -> Self {
        match byte {
            0..=43 => Typecode::PosFixed(byte - INT_POS_FIXED_START),
            CHR_FLOAT64 => Typecode::Float64,
            b'0'..=b'9' => Typecode::StrDecimal,
            CHR_LIST => Typecode::List,
            CHR_DICT => Typecode::Dict,
            CHR_INT => Typecode::Int,
            CHR_INT1 => Typecode::Int1,
            CHR_INT2 => Typecode::Int2,
            CHR_INT4 => Typecode::Int4,
            CHR_INT8 => Typecode::Int8,
            CHR_FLOAT32 => Typecode::Float32,
            CHR_TRUE => Typecode::True,
            CHR_FALSE => Typecode::False,
            CHR_NONE => Typecode::None,
            70..=101 => Typecode::NegFixed(-1 - (byte - INT_NEG_FIXED_START) as i8),
            102..=126 => Typecode::DictFixed((byte - DICT_FIXED_START) as usize),
            CHR_TERM => Typecode::Term,
            128..=191 => Typecode::StrFixed((byte - STR_FIXED_START) as usize),
            192..=255 => Typecode::ListFixed((byte - LIST_FIXED_START) as usize),
            _ => Typecode::Unknown(byte),
        }
    }
}
