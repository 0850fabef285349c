//! Generic (untyped) value codec.
//!
//! Reads and writes arbitrary value trees as [`serde_json::Value`]. This is
//! the escape hatch for dynamic payloads and diagnostic dumps; typed code
//! goes through the [`Transformer`](crate::transform::Transformer) instead.

use serde_json::{Map, Value};

use super::{WireReader, WireToken, WireWriter};
use crate::protocol::error::{Result, WirecallError};

/// Builds [`Value`] trees from a [`WireReader`].
pub struct ValueReader;

impl ValueReader {
    /// Reads the next value, recursing into arrays and objects.
    ///
    /// Arrays keep their element order. Objects are keyed by name and the
    /// last occurrence of a duplicated name wins.
    pub fn read(reader: &mut WireReader<'_>) -> Result<Value> {
        match reader.peek()? {
            WireToken::Number => Ok(Value::from(reader.read_number()?)),
            WireToken::String => Ok(Value::String(reader.read_string()?)),
            WireToken::Boolean => Ok(Value::Bool(reader.read_bool()?)),
            WireToken::BeginArray => {
                reader.begin_array()?;
                let mut items = Vec::new();
                while reader.has_next()? {
                    items.push(Self::read(reader)?);
                }
                reader.end_array()?;
                Ok(Value::Array(items))
            }
            WireToken::BeginObject => {
                reader.begin_object()?;
                let mut fields = Map::new();
                while reader.has_next()? {
                    let name = reader.next_name()?;
                    let value = Self::read(reader)?;
                    fields.insert(name, value);
                }
                reader.end_object()?;
                Ok(Value::Object(fields))
            }
            other => Err(WirecallError::unexpected("a value", other)),
        }
    }

    /// Decodes every top-level value of an encoded stream.
    ///
    /// Used for diagnostics, e.g. logging a request whose shape is unknown.
    pub fn dump(bytes: &[u8]) -> Result<Vec<Value>> {
        let mut reader = WireReader::new(bytes);
        let mut values = Vec::new();
        while reader.has_next()? {
            values.push(Self::read(&mut reader)?);
        }
        reader.finish()?;
        Ok(values)
    }
}

/// Writes [`Value`] trees to a [`WireWriter`].
pub struct ValueWriter;

impl ValueWriter {
    /// Writes a complete value tree.
    ///
    /// Null object fields are skipped: an absent field and a null field are
    /// the same thing on the wire. A null array element has no representation
    /// and is rejected.
    pub fn write(writer: &mut WireWriter, value: &Value) -> Result<()> {
        match value {
            Value::Null => Err(WirecallError::Serialization(
                "null has no wire representation outside of an object field".to_string(),
            )),
            Value::Bool(b) => writer.write_bool(*b),
            Value::Number(_) => writer.write_number(Self::integer(value)?),
            Value::String(s) => writer.write_string(s),
            Value::Array(items) => {
                writer.begin_array()?;
                for item in items {
                    Self::write(writer, item)?;
                }
                writer.end_array()
            }
            Value::Object(fields) => {
                writer.begin_object()?;
                for (name, field) in fields {
                    if field.is_null() {
                        continue;
                    }
                    writer.write_name(name, Self::token_of(field)?)?;
                    Self::write(writer, field)?;
                }
                writer.end_object()
            }
        }
    }

    /// Writes a flat map of scalars as fields of the object currently open on
    /// `writer`.
    ///
    /// Strings, integers and booleans are written; nulls are skipped; any other
    /// type fails with a serialization error naming it.
    pub fn write_all(writer: &mut WireWriter, fields: &Map<String, Value>) -> Result<()> {
        for (name, value) in fields {
            match value {
                Value::Null => continue,
                Value::String(s) => {
                    writer.write_name(name, WireToken::String)?;
                    writer.write_string(s)?;
                }
                Value::Bool(b) => {
                    writer.write_name(name, WireToken::Boolean)?;
                    writer.write_bool(*b)?;
                }
                Value::Number(_) => {
                    let n = Self::integer(value).map_err(|_| {
                        WirecallError::Serialization(format!(
                            "field '{}' has unsupported type {}",
                            name,
                            type_name(value)
                        ))
                    })?;
                    writer.write_name(name, WireToken::Number)?;
                    writer.write_number(n)?;
                }
                other => {
                    return Err(WirecallError::Serialization(format!(
                        "field '{}' has unsupported type {}",
                        name,
                        type_name(other)
                    )))
                }
            }
        }
        Ok(())
    }

    /// The token `value` starts with on the wire.
    pub fn token_of(value: &Value) -> Result<WireToken> {
        match value {
            Value::Bool(_) => Ok(WireToken::Boolean),
            Value::Number(_) => Ok(WireToken::Number),
            Value::String(_) => Ok(WireToken::String),
            Value::Array(_) => Ok(WireToken::BeginArray),
            Value::Object(_) => Ok(WireToken::BeginObject),
            Value::Null => Err(WirecallError::Serialization(
                "null has no wire token".to_string(),
            )),
        }
    }

    fn integer(value: &Value) -> Result<i64> {
        value.as_i64().ok_or_else(|| {
            WirecallError::Serialization(format!(
                "{} cannot be encoded as a wire number",
                type_name(value)
            ))
        })
    }
}

/// Runtime type name used in serialization errors.
pub fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(n) if n.is_i64() => "integer",
        Value::Number(n) if n.is_u64() => "unsigned integer out of i64 range",
        Value::Number(_) => "float",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
