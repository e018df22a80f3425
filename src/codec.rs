// SPDX-License-Identifier: GPL-3.0-only

//! Fixed-layout little-endian pack/unpack.
//!
//! A format is a slice of [`Field`]s consumed strictly left to right. Decoding
//! yields [`Value`]s whose byte blocks borrow the input buffer.

use core::str::FromStr;

use crate::error::{Error, Result};

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Field {
    U8,
    U16,
    U32,
    U64,
    Bytes(usize),
}

impl Field {
    pub const fn size(&self) -> usize {
        match *self {
            Field::U8 => 1,
            Field::U16 => 2,
            Field::U32 => 4,
            Field::U64 => 8,
            Field::Bytes(n) => n,
        }
    }
}

/// Accepts the struct-module style specifiers `B`, `H`, `I`, `L`, `Q` and `<N>s`.
impl FromStr for Field {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "B" => Ok(Field::U8),
            "H" => Ok(Field::U16),
            "I" | "L" => Ok(Field::U32),
            "Q" => Ok(Field::U64),
            _ => s
                .strip_suffix('s')
                .and_then(|n| n.parse::<usize>().ok())
                .map(Field::Bytes)
                .ok_or_else(|| Error::Format(s.into())),
        }
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Value<'a> {
    U8(u8),
    U16(u16),
    U32(u32),
    U64(u64),
    Bytes(&'a [u8]),
}

macro_rules! value_into_int {
    ($ty:ty, $variant:ident) => {
        impl<'a> TryFrom<Value<'a>> for $ty {
            type Error = Error;

            fn try_from(value: Value<'a>) -> Result<Self> {
                match value {
                    Value::$variant(x) => Ok(x),
                    _ => Err(Error::TypeMismatch {
                        index: 0,
                        expected: Field::$variant,
                    }),
                }
            }
        }
    };
}

value_into_int!(u8, U8);
value_into_int!(u16, U16);
value_into_int!(u32, U32);
value_into_int!(u64, U64);

impl<'a> TryFrom<Value<'a>> for &'a [u8] {
    type Error = Error;

    fn try_from(value: Value<'a>) -> Result<Self> {
        match value {
            Value::Bytes(b) => Ok(b),
            _ => Err(Error::TypeMismatch {
                index: 0,
                expected: Field::Bytes(0),
            }),
        }
    }
}

impl<'a, const N: usize> TryFrom<Value<'a>> for [u8; N] {
    type Error = Error;

    fn try_from(value: Value<'a>) -> Result<Self> {
        match value {
            Value::Bytes(b) => b.try_into().map_err(|_| Error::TypeMismatch {
                index: 0,
                expected: Field::Bytes(N),
            }),
            _ => Err(Error::TypeMismatch {
                index: 0,
                expected: Field::Bytes(N),
            }),
        }
    }
}

/// Parse a list of textual specifiers into a format.
pub fn parse_format(specs: &[&str]) -> Result<Vec<Field>> {
    specs.iter().map(|s| s.parse()).collect()
}

/// Total byte width of a format.
pub const fn format_size(format: &[Field]) -> usize {
    let mut size = 0;
    let mut i = 0;
    while i < format.len() {
        size += format[i].size();
        i += 1;
    }
    size
}

/// Decode `data` according to `format`. Trailing bytes are ignored.
pub fn decode<'a>(format: &[Field], data: &'a [u8]) -> Result<Vec<Value<'a>>> {
    let needed = format_size(format);
    if needed > data.len() {
        return Err(Error::Length {
            needed,
            available: data.len(),
        });
    }

    let mut values = Vec::with_capacity(format.len());
    let mut rest = data;
    for field in format {
        let (bytes, tail) = rest.split_at(field.size());
        rest = tail;
        values.push(match *field {
            Field::U8 => Value::U8(bytes[0]),
            Field::U16 => Value::U16(u16::from_le_bytes([bytes[0], bytes[1]])),
            Field::U32 => Value::U32(u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]])),
            Field::U64 => {
                let mut b = [0; 8];
                b.copy_from_slice(bytes);
                Value::U64(u64::from_le_bytes(b))
            }
            Field::Bytes(_) => Value::Bytes(bytes),
        });
    }

    Ok(values)
}

/// Encode `values` according to `format`.
pub fn encode(format: &[Field], values: &[Value]) -> Result<Vec<u8>> {
    if format.len() != values.len() {
        return Err(Error::Arity {
            fields: format.len(),
            values: values.len(),
        });
    }

    let mut raw = Vec::with_capacity(format_size(format));
    for (index, (field, value)) in format.iter().zip(values).enumerate() {
        match (*field, *value) {
            (Field::U8, Value::U8(x)) => raw.push(x),
            (Field::U16, Value::U16(x)) => raw.extend_from_slice(&x.to_le_bytes()),
            (Field::U32, Value::U32(x)) => raw.extend_from_slice(&x.to_le_bytes()),
            (Field::U64, Value::U64(x)) => raw.extend_from_slice(&x.to_le_bytes()),
            (Field::Bytes(n), Value::Bytes(b)) if b.len() == n => raw.extend_from_slice(b),
            (expected, _) => return Err(Error::TypeMismatch { index, expected }),
        }
    }

    Ok(raw)
}

/// Pull the next decoded value out of `values` as a concrete type.
pub(crate) fn take<'a, T>(values: &mut impl Iterator<Item = Value<'a>>) -> Result<T>
where
    T: TryFrom<Value<'a>, Error = Error>,
{
    let value = values.next().ok_or(Error::Arity { fields: 1, values: 0 })?;
    T::try_from(value)
}
