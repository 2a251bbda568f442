//! Schema-driven decoding and encoding.
//!
//! [`decode`] walks a [`Schema`] against a buffer and produces a [`Record`]:
//! an ordered list of named [`Value`]s. [`encode`] is the exact mirror and
//! writes a `Record` back into a zero-filled buffer of `schema.size` bytes.
//! Typed views (`BetRecord`, `NodeInfo`) are built on top of this.
use crate::codec::{self, CodecError, PackedDate};
use crate::schema::{ArraySpec, Field, FieldType, Layout, Schema};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    #[error("field {field}: buffer too short (need {width} bytes at {offset}, have {len})")]
    ShortBuffer { field: &'static str, offset: usize, width: usize, len: usize },
    #[error("field {field}: value out of range: {reason}")]
    InvalidFieldRange { field: &'static str, reason: String },
    #[error("field {field}: count {count} exceeds capacity {capacity}")]
    UnresolvableArraySize { field: &'static str, count: u64, capacity: usize },
    #[error("field {0} missing from record")]
    MissingField(&'static str),
    #[error("field {field}: expected {expected}")]
    TypeMismatch { field: &'static str, expected: &'static str },
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EncodeError {
    #[error("field {field}: value out of range: {reason}")]
    InvalidFieldRange { field: &'static str, reason: String },
    #[error("field {field}: {count} elements exceed capacity {capacity}")]
    UnresolvableArraySize { field: &'static str, count: usize, capacity: usize },
    #[error("oracle fees sum to {sum}, above the 10000 limit")]
    FeeSumExceeded { sum: u64 },
    #[error("field {0} missing from record")]
    MissingField(&'static str),
    #[error("field {field}: expected {expected}")]
    TypeMismatch { field: &'static str, expected: &'static str },
    #[error("field {field}: does not fit the {schema} layout")]
    Layout { field: &'static str, schema: &'static str },
}

fn at_field(field: &'static str) -> impl Fn(CodecError) -> DecodeError {
    move |e| match e {
        CodecError::ShortBuffer { offset, width, len } => DecodeError::ShortBuffer { field, offset, width, len },
        other => DecodeError::InvalidFieldRange { field, reason: other.to_string() },
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Value {
    U8(u8),
    I8(i8),
    U16(u16),
    U32(u32),
    U64(u64),
    Bytes(Vec<u8>),
    Str(String),
    Date(PackedDate),
    Array(Vec<Value>),
}

impl Value {
    fn kind(&self) -> &'static str {
        match self {
            Value::U8(_) => "u8",
            Value::I8(_) => "i8",
            Value::U16(_) => "u16",
            Value::U32(_) => "u32",
            Value::U64(_) => "u64",
            Value::Bytes(_) => "bytes",
            Value::Str(_) => "string",
            Value::Date(_) => "date",
            Value::Array(_) => "array",
        }
    }

    /// Integer view used for array counts.
    fn as_count(&self) -> Option<u64> {
        match self {
            Value::U8(v) => Some(u64::from(*v)),
            Value::U16(v) => Some(u64::from(*v)),
            Value::U32(v) => Some(u64::from(*v)),
            Value::U64(v) => Some(*v),
            _ => None,
        }
    }
}

/// Decoded fields in schema order.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Record {
    fields: Vec<(String, Value)>,
}

macro_rules! getter {
    ($name:ident, $variant:ident, $ty:ty, $label:literal) => {
        pub fn $name(&self, field: &'static str) -> Result<$ty, DecodeError> {
            match self.get(field) {
                Some(Value::$variant(v)) => Ok(v.clone()),
                Some(_) => Err(DecodeError::TypeMismatch { field, expected: $label }),
                None => Err(DecodeError::MissingField(field)),
            }
        }
    };
}

impl Record {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder form of [`Record::set`].
    pub fn with(mut self, name: &str, value: Value) -> Self {
        self.set(name, value);
        self
    }

    /// Insert or replace a field, keeping first-insertion order.
    pub fn set(&mut self, name: &str, value: Value) {
        match self.fields.iter_mut().find(|(n, _)| n == name) {
            Some(slot) => slot.1 = value,
            None => self.fields.push((name.to_string(), value)),
        }
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.fields.iter().find(|(n, _)| n == name).map(|(_, v)| v)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(|(n, _)| n.as_str())
    }

    getter!(u32, U32, u32, "u32");
    getter!(u64, U64, u64, "u64");
    getter!(bytes, Bytes, Vec<u8>, "bytes");
    getter!(string, Str, String, "string");
    getter!(date, Date, PackedDate, "date");
    getter!(array, Array, Vec<Value>, "array");
}

fn read_value(buf: &[u8], offset: usize, t: FieldType, field: &'static str) -> Result<Value, DecodeError> {
    let err = at_field(field);
    Ok(match t {
        FieldType::U8 => Value::U8(codec::read_u8(buf, offset).map_err(&err)?),
        FieldType::I8 => Value::I8(codec::read_i8(buf, offset).map_err(&err)?),
        FieldType::U16 => Value::U16(codec::read_u16(buf, offset).map_err(&err)?),
        FieldType::U32 => Value::U32(codec::read_u32(buf, offset).map_err(&err)?),
        FieldType::U64 => Value::U64(codec::read_u64(buf, offset).map_err(&err)?),
        FieldType::Bytes(n) => Value::Bytes(codec::read_bytes(buf, offset, n).map_err(&err)?.to_vec()),
        FieldType::Str(n) => Value::Str(codec::read_fixed_string(buf, offset, n).map_err(&err)?),
        FieldType::Date => {
            let d = PackedDate::unpack(codec::read_u32(buf, offset).map_err(&err)?);
            d.validate().map_err(&err)?;
            Value::Date(d)
        }
    })
}

fn element_count(rec: &Record, field: &'static str, a: &ArraySpec) -> Result<usize, DecodeError> {
    let Some(count_field) = a.len_from else {
        return Ok(a.capacity);
    };
    let count = rec
        .get(count_field)
        .and_then(Value::as_count)
        .ok_or(DecodeError::MissingField(count_field))?;
    if count > a.capacity as u64 {
        return Err(DecodeError::UnresolvableArraySize { field, count, capacity: a.capacity });
    }
    Ok(count as usize)
}

/// Decode `buf` according to `schema`. Fields are read at their declared
/// offsets; a count-driven array only touches its live elements, so a
/// response may stop after the last byte actually read.
pub fn decode(schema: &Schema, buf: &[u8]) -> Result<Record, DecodeError> {
    let mut rec = Record::new();
    for f in schema.fields {
        let value = match &f.layout {
            Layout::Scalar(t) => read_value(buf, f.offset, *t, f.name)?,
            Layout::Array(a) => {
                let n = element_count(&rec, f.name, a)?;
                let items = (0..n)
                    .map(|i| read_value(buf, f.offset + i * a.stride, a.element, f.name))
                    .collect::<Result<Vec<_>, _>>()?;
                Value::Array(items)
            }
        };
        rec.set(f.name, value);
    }
    Ok(rec)
}

fn write_value(buf: &mut [u8], schema: &Schema, f: &Field, offset: usize, t: FieldType, v: &Value) -> Result<(), EncodeError> {
    let layout = |_| EncodeError::Layout { field: f.name, schema: schema.name };
    let mismatch = || EncodeError::TypeMismatch { field: f.name, expected: value_label(t) };
    match (t, v) {
        (FieldType::U8, Value::U8(x)) => codec::write_u8(buf, offset, *x).map_err(layout),
        (FieldType::I8, Value::I8(x)) => codec::write_i8(buf, offset, *x).map_err(layout),
        (FieldType::U16, Value::U16(x)) => codec::write_u16(buf, offset, *x).map_err(layout),
        (FieldType::U32, Value::U32(x)) => codec::write_u32(buf, offset, *x).map_err(layout),
        (FieldType::U64, Value::U64(x)) => codec::write_u64(buf, offset, *x).map_err(layout),
        (FieldType::Bytes(n), Value::Bytes(b)) => {
            if b.len() != n {
                return Err(EncodeError::InvalidFieldRange {
                    field: f.name,
                    reason: format!("{} bytes, expected {}", b.len(), n),
                });
            }
            codec::write_bytes(buf, offset, b).map_err(layout)
        }
        (FieldType::Str(n), Value::Str(s)) => codec::write_fixed_string(buf, offset, s, n).map(|_| ()).map_err(layout),
        (FieldType::Date, Value::Date(d)) => {
            let raw = d.pack().map_err(|e| EncodeError::InvalidFieldRange { field: f.name, reason: e.to_string() })?;
            codec::write_u32(buf, offset, raw).map_err(layout)
        }
        _ => Err(mismatch()),
    }
}

fn value_label(t: FieldType) -> &'static str {
    match t {
        FieldType::U8 => "u8",
        FieldType::I8 => "i8",
        FieldType::U16 => "u16",
        FieldType::U32 => "u32",
        FieldType::U64 => "u64",
        FieldType::Bytes(_) => "bytes",
        FieldType::Str(_) => "string",
        FieldType::Date => "date",
    }
}

/// Encode `rec` into a fresh `schema.size` buffer. Arrays shorter than their
/// capacity leave the remaining slots at the array's fill byte.
pub fn encode(schema: &Schema, rec: &Record) -> Result<Vec<u8>, EncodeError> {
    let mut buf = vec![0u8; schema.size];
    for f in schema.fields {
        let v = rec.get(f.name).ok_or(EncodeError::MissingField(f.name))?;
        match (&f.layout, v) {
            (Layout::Scalar(t), v) => write_value(&mut buf, schema, f, f.offset, *t, v)?,
            (Layout::Array(a), Value::Array(items)) => {
                if items.len() > a.capacity {
                    return Err(EncodeError::UnresolvableArraySize {
                        field: f.name,
                        count: items.len(),
                        capacity: a.capacity,
                    });
                }
                for (i, item) in items.iter().enumerate() {
                    write_value(&mut buf, schema, f, f.offset + i * a.stride, a.element, item)?;
                }
                if a.fill != 0 {
                    let pad = vec![a.fill; a.element.width()];
                    for i in items.len()..a.capacity {
                        codec::write_bytes(&mut buf, f.offset + i * a.stride, &pad)
                            .map_err(|_| EncodeError::Layout { field: f.name, schema: schema.name })?;
                    }
                }
            }
            (Layout::Array(_), other) => {
                tracing::debug!(field = f.name, got = other.kind(), "array field holds a scalar");
                return Err(EncodeError::TypeMismatch { field: f.name, expected: "array" });
            }
        }
    }
    Ok(buf)
}
