//! Dynamically typed wire values
//!
//! Used where the signature is only known at runtime, such as the `call`
//! command line, which takes arguments like `u32:21` or `str:hello`.

use std::fmt;
use std::str::FromStr;
use thiserror::Error;

use crate::protocol::{BlockDecoder, BlockEncoder, ExtractError, WireEncode, TERMINATOR};

#[derive(Error, Debug, PartialEq, Eq)]
pub enum ValueError {
    #[error("Unknown value type: {0} (expected u32, i32, f32 or str)")]
    UnknownType(String),

    #[error("Expected TYPE:VALUE, got {0:?}")]
    MissingType(String),

    #[error("Invalid {ty} value: {value:?}")]
    Invalid { ty: ValueType, value: String },

    #[error("Strings cannot contain a NUL byte")]
    EmbeddedTerminator,
}

/// Wire types a [`Value`] can take
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueType {
    U32,
    I32,
    F32,
    Str,
}

impl ValueType {
    pub fn name(self) -> &'static str {
        match self {
            ValueType::U32 => "u32",
            ValueType::I32 => "i32",
            ValueType::F32 => "f32",
            ValueType::Str => "str",
        }
    }

    /// Parse a comma separated list such as `u32,str`. An empty string is an
    /// empty list.
    pub fn parse_list(s: &str) -> Result<Vec<ValueType>, ValueError> {
        s.split(',')
            .map(str::trim)
            .filter(|part| !part.is_empty())
            .map(str::parse)
            .collect()
    }
}

impl fmt::Display for ValueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for ValueType {
    type Err = ValueError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "u32" => Ok(ValueType::U32),
            "i32" => Ok(ValueType::I32),
            "f32" => Ok(ValueType::F32),
            "str" | "string" => Ok(ValueType::Str),
            _ => Err(ValueError::UnknownType(s.to_string())),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    U32(u32),
    I32(i32),
    F32(f32),
    Str(String),
}

impl Value {
    pub fn value_type(&self) -> ValueType {
        match self {
            Value::U32(_) => ValueType::U32,
            Value::I32(_) => ValueType::I32,
            Value::F32(_) => ValueType::F32,
            Value::Str(_) => ValueType::Str,
        }
    }

    /// Parse the text of a value of a known type
    pub fn parse_as(ty: ValueType, text: &str) -> Result<Value, ValueError> {
        let invalid = || ValueError::Invalid {
            ty,
            value: text.to_string(),
        };
        match ty {
            ValueType::U32 => text.parse().map(Value::U32).map_err(|_| invalid()),
            ValueType::I32 => text.parse().map(Value::I32).map_err(|_| invalid()),
            ValueType::F32 => text.parse().map(Value::F32).map_err(|_| invalid()),
            ValueType::Str => {
                if text.as_bytes().contains(&TERMINATOR) {
                    return Err(ValueError::EmbeddedTerminator);
                }
                Ok(Value::Str(text.to_string()))
            }
        }
    }

    fn extract(ty: ValueType, dec: &mut BlockDecoder<'_>) -> Result<Value, ExtractError> {
        Ok(match ty {
            ValueType::U32 => Value::U32(dec.extract_u32()?),
            ValueType::I32 => Value::I32(dec.extract_i32()?),
            ValueType::F32 => Value::F32(dec.extract_f32()?),
            ValueType::Str => Value::Str(dec.extract_string()?),
        })
    }
}

impl FromStr for Value {
    type Err = ValueError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (ty, text) = s
            .split_once(':')
            .ok_or_else(|| ValueError::MissingType(s.to_string()))?;
        Value::parse_as(ty.parse()?, text)
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::U32(v) => write!(f, "{}", v),
            Value::I32(v) => write!(f, "{}", v),
            Value::F32(v) => write!(f, "{}", v),
            Value::Str(s) => write!(f, "{:?}", s),
        }
    }
}

impl WireEncode for Value {
    fn encode(&self, enc: &mut BlockEncoder) {
        match self {
            Value::U32(v) => enc.put_u32(*v),
            Value::I32(v) => enc.put_i32(*v),
            Value::F32(v) => enc.put_f32(*v),
            Value::Str(s) => enc.put_string(s),
        }
    }
}

/// Encode values one slot each, in order
pub fn encode_values(values: &[Value]) -> (bytes::Bytes, Vec<u32>) {
    let mut enc = BlockEncoder::new();
    let mut slots = Vec::with_capacity(values.len());
    for value in values {
        value.encode_slots(&mut enc, &mut slots);
    }
    (enc.finish(), slots)
}

/// Decode a block holding exactly one value of each type in `types`
pub fn decode_values(types: &[ValueType], block: &[u8]) -> Result<Vec<Value>, ExtractError> {
    let mut dec = BlockDecoder::new(block);
    let values = types
        .iter()
        .map(|ty| Value::extract(*ty, &mut dec))
        .collect::<Result<Vec<_>, _>>()?;
    dec.finish()?;
    Ok(values)
}
