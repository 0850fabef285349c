//! Built-in adapters for scalars, collections, timestamps and generic values.

use std::any::type_name;
use std::collections::{BTreeMap, HashMap};
use std::marker::PhantomData;
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use serde_json::Value;

use super::adapter::{TypeAdapter, Wire};
use super::Transformer;
use crate::protocol::error::{Result, WirecallError};
use crate::wire::{ValueReader, ValueWriter, WireReader, WireToken, WireWriter};

/// Integers travel as wire numbers (`i64`); narrower and unsigned types are
/// range-checked in both directions.
pub struct IntegerAdapter<T>(PhantomData<fn() -> T>);

impl<T> IntegerAdapter<T> {
    pub fn new() -> Self {
        Self(PhantomData)
    }
}

impl<T> Default for IntegerAdapter<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> TypeAdapter<T> for IntegerAdapter<T>
where
    T: Copy + Send + Sync + 'static + TryFrom<i64>,
    i64: TryFrom<T>,
{
    fn token(&self, _value: &T) -> Result<WireToken> {
        Ok(WireToken::Number)
    }

    fn write(&self, writer: &mut WireWriter, value: &T) -> Result<()> {
        let n = i64::try_from(*value).map_err(|_| {
            WirecallError::Serialization(format!(
                "{} value does not fit in a wire number",
                type_name::<T>()
            ))
        })?;
        writer.write_number(n)
    }

    fn read(&self, reader: &mut WireReader<'_>) -> Result<T> {
        let n = reader.read_number()?;
        T::try_from(n).map_err(|_| {
            WirecallError::Serialization(format!("{} is out of range for {}", n, type_name::<T>()))
        })
    }
}

macro_rules! integer_wire {
    ($($ty:ty),+) => {
        $(
            impl Wire for $ty {
                fn adapter(_transformer: &Transformer) -> Result<Arc<dyn TypeAdapter<Self>>> {
                    Ok(Arc::new(IntegerAdapter::<$ty>::new()))
                }
            }
        )+
    };
}

integer_wire!(i8, i16, i32, i64, u8, u16, u32, u64);

pub struct BoolAdapter;

impl TypeAdapter<bool> for BoolAdapter {
    fn token(&self, _value: &bool) -> Result<WireToken> {
        Ok(WireToken::Boolean)
    }

    fn write(&self, writer: &mut WireWriter, value: &bool) -> Result<()> {
        writer.write_bool(*value)
    }

    fn read(&self, reader: &mut WireReader<'_>) -> Result<bool> {
        reader.read_bool()
    }
}

impl Wire for bool {
    fn adapter(_transformer: &Transformer) -> Result<Arc<dyn TypeAdapter<Self>>> {
        Ok(Arc::new(BoolAdapter))
    }
}

pub struct StringAdapter;

impl TypeAdapter<String> for StringAdapter {
    fn token(&self, _value: &String) -> Result<WireToken> {
        Ok(WireToken::String)
    }

    fn write(&self, writer: &mut WireWriter, value: &String) -> Result<()> {
        writer.write_string(value)
    }

    fn read(&self, reader: &mut WireReader<'_>) -> Result<String> {
        reader.read_string()
    }
}

impl Wire for String {
    fn adapter(_transformer: &Transformer) -> Result<Arc<dyn TypeAdapter<Self>>> {
        Ok(Arc::new(StringAdapter))
    }
}

/// `()` is the response type of methods that return nothing. Any data the
/// server sends anyway is skipped.
pub struct UnitAdapter;

impl TypeAdapter<()> for UnitAdapter {
    fn token(&self, _value: &()) -> Result<WireToken> {
        Err(WirecallError::Serialization(
            "() has no wire representation".to_string(),
        ))
    }

    fn write(&self, _writer: &mut WireWriter, _value: &()) -> Result<()> {
        Err(WirecallError::Serialization(
            "() has no wire representation".to_string(),
        ))
    }

    fn read(&self, reader: &mut WireReader<'_>) -> Result<()> {
        reader.skip_value()
    }

    fn is_absent(&self, _value: &()) -> bool {
        true
    }

    fn absent(&self) -> Result<()> {
        Ok(())
    }
}

impl Wire for () {
    fn adapter(_transformer: &Transformer) -> Result<Arc<dyn TypeAdapter<Self>>> {
        Ok(Arc::new(UnitAdapter))
    }
}

/// `None` is the absent value: it is omitted from objects and used when a
/// field or response body is missing.
pub struct OptionAdapter<T> {
    inner: Arc<dyn TypeAdapter<T>>,
}

impl<T: Send + Sync + 'static> TypeAdapter<Option<T>> for OptionAdapter<T> {
    fn token(&self, value: &Option<T>) -> Result<WireToken> {
        match value {
            Some(inner) => self.inner.token(inner),
            None => Err(WirecallError::Serialization(
                "None has no wire token".to_string(),
            )),
        }
    }

    fn write(&self, writer: &mut WireWriter, value: &Option<T>) -> Result<()> {
        match value {
            Some(inner) => self.inner.write(writer, inner),
            None => Err(WirecallError::Serialization(
                "None can only be written as an omitted object field".to_string(),
            )),
        }
    }

    fn read(&self, reader: &mut WireReader<'_>) -> Result<Option<T>> {
        self.inner.read(reader).map(Some)
    }

    fn is_absent(&self, value: &Option<T>) -> bool {
        value.as_ref().map_or(true, |inner| self.inner.is_absent(inner))
    }

    fn absent(&self) -> Result<Option<T>> {
        Ok(None)
    }
}

impl<T: Wire> Wire for Option<T> {
    fn adapter(transformer: &Transformer) -> Result<Arc<dyn TypeAdapter<Self>>> {
        Ok(Arc::new(OptionAdapter {
            inner: transformer.adapter::<T>()?,
        }))
    }
}

pub struct VecAdapter<T> {
    inner: Arc<dyn TypeAdapter<T>>,
}

impl<T: Send + Sync + 'static> TypeAdapter<Vec<T>> for VecAdapter<T> {
    fn token(&self, _value: &Vec<T>) -> Result<WireToken> {
        Ok(WireToken::BeginArray)
    }

    fn write(&self, writer: &mut WireWriter, value: &Vec<T>) -> Result<()> {
        writer.begin_array()?;
        for item in value {
            if self.inner.is_absent(item) {
                return Err(WirecallError::Serialization(format!(
                    "absent element in array of {}",
                    type_name::<T>()
                )));
            }
            self.inner.write(writer, item)?;
        }
        writer.end_array()
    }

    fn read(&self, reader: &mut WireReader<'_>) -> Result<Vec<T>> {
        reader.begin_array()?;
        let mut items = Vec::new();
        while reader.has_next()? {
            items.push(self.inner.read(reader)?);
        }
        reader.end_array()?;
        Ok(items)
    }
}

impl<T: Wire> Wire for Vec<T> {
    fn adapter(transformer: &Transformer) -> Result<Arc<dyn TypeAdapter<Self>>> {
        Ok(Arc::new(VecAdapter {
            inner: transformer.adapter::<T>()?,
        }))
    }
}

/// String-keyed maps are wire objects; absent values are skipped like
/// absent model fields.
pub struct MapAdapter<M, T> {
    inner: Arc<dyn TypeAdapter<T>>,
    _map: PhantomData<fn() -> M>,
}

impl<M, T> TypeAdapter<M> for MapAdapter<M, T>
where
    M: Default + Extend<(String, T)> + Send + Sync + 'static,
    for<'a> &'a M: IntoIterator<Item = (&'a String, &'a T)>,
    T: Send + Sync + 'static,
{
    fn token(&self, _value: &M) -> Result<WireToken> {
        Ok(WireToken::BeginObject)
    }

    fn write(&self, writer: &mut WireWriter, value: &M) -> Result<()> {
        writer.begin_object()?;
        self.write_fields(writer, value)?;
        writer.end_object()
    }

    fn read(&self, reader: &mut WireReader<'_>) -> Result<M> {
        let mut map = M::default();
        reader.begin_object()?;
        while reader.has_next()? {
            let name = reader.next_name()?;
            let value = self.inner.read(reader)?;
            map.extend(std::iter::once((name, value)));
        }
        reader.end_object()?;
        Ok(map)
    }

    fn is_object(&self) -> bool {
        true
    }

    fn write_fields(&self, writer: &mut WireWriter, value: &M) -> Result<()> {
        for (name, item) in value {
            if self.inner.is_absent(item) {
                continue;
            }
            writer.write_name(name, self.inner.token(item)?)?;
            self.inner.write(writer, item)?;
        }
        Ok(())
    }
}

impl<T: Wire> Wire for HashMap<String, T> {
    fn adapter(transformer: &Transformer) -> Result<Arc<dyn TypeAdapter<Self>>> {
        Ok(Arc::new(MapAdapter::<Self, T> {
            inner: transformer.adapter::<T>()?,
            _map: PhantomData,
        }))
    }
}

impl<T: Wire> Wire for BTreeMap<String, T> {
    fn adapter(transformer: &Transformer) -> Result<Arc<dyn TypeAdapter<Self>>> {
        Ok(Arc::new(MapAdapter::<Self, T> {
            inner: transformer.adapter::<T>()?,
            _map: PhantomData,
        }))
    }
}

/// Protocol timestamps are wire numbers in whole seconds since the Unix
/// epoch, exposed as millisecond-resolution instants (`seconds * 1000`).
///
/// Encoding truncates toward zero: sub-second precision never survives a
/// round trip.
pub struct TimestampAdapter;

impl TimestampAdapter {
    pub fn to_seconds(value: &SystemTime) -> Result<i64> {
        let overflow = || WirecallError::Serialization("timestamp out of range".to_string());
        match value.duration_since(UNIX_EPOCH) {
            Ok(after) => i64::try_from(after.as_secs()).map_err(|_| overflow()),
            Err(before) => i64::try_from(before.duration().as_secs())
                .map(|secs| -secs)
                .map_err(|_| overflow()),
        }
    }

    pub fn from_seconds(seconds: i64) -> Result<SystemTime> {
        let overflow = || {
            WirecallError::Serialization(format!("timestamp {} out of range", seconds))
        };
        let millis = seconds.checked_mul(1000).ok_or_else(overflow)?;
        let offset = Duration::from_millis(millis.unsigned_abs());
        let instant = if millis >= 0 {
            UNIX_EPOCH.checked_add(offset)
        } else {
            UNIX_EPOCH.checked_sub(offset)
        };
        instant.ok_or_else(overflow)
    }
}

impl TypeAdapter<SystemTime> for TimestampAdapter {
    fn token(&self, _value: &SystemTime) -> Result<WireToken> {
        Ok(WireToken::Number)
    }

    fn write(&self, writer: &mut WireWriter, value: &SystemTime) -> Result<()> {
        writer.write_number(Self::to_seconds(value)?)
    }

    fn read(&self, reader: &mut WireReader<'_>) -> Result<SystemTime> {
        Self::from_seconds(reader.read_number()?)
    }
}

impl Wire for SystemTime {
    fn adapter(_transformer: &Transformer) -> Result<Arc<dyn TypeAdapter<Self>>> {
        Ok(Arc::new(TimestampAdapter))
    }
}

/// Untyped values go through the generic codec.
pub struct ValueAdapter;

impl TypeAdapter<Value> for ValueAdapter {
    fn token(&self, value: &Value) -> Result<WireToken> {
        ValueWriter::token_of(value)
    }

    fn write(&self, writer: &mut WireWriter, value: &Value) -> Result<()> {
        ValueWriter::write(writer, value)
    }

    fn read(&self, reader: &mut WireReader<'_>) -> Result<Value> {
        ValueReader::read(reader)
    }

    fn is_absent(&self, value: &Value) -> bool {
        value.is_null()
    }

    fn absent(&self) -> Result<Value> {
        Ok(Value::Null)
    }

    // only object values can be spread; the rest fail in write_fields
    fn is_object(&self) -> bool {
        true
    }

    fn write_fields(&self, writer: &mut WireWriter, value: &Value) -> Result<()> {
        match value {
            Value::Object(fields) => {
                for (name, field) in fields {
                    if field.is_null() {
                        continue;
                    }
                    writer.write_name(name, ValueWriter::token_of(field)?)?;
                    ValueWriter::write(writer, field)?;
                }
                Ok(())
            }
            other => Err(WirecallError::Serialization(format!(
                "{} cannot be inlined as object fields",
                crate::wire::value::type_name(other)
            ))),
        }
    }
}

impl Wire for Value {
    fn adapter(_transformer: &Transformer) -> Result<Arc<dyn TypeAdapter<Self>>> {
        Ok(Arc::new(ValueAdapter))
    }
}
