//! Declared object types and the reflective adapter built from them.

use std::any::type_name;
use std::collections::HashMap;
use std::sync::Arc;

use super::adapter::{TypeAdapter, Wire};
use super::Transformer;
use crate::protocol::binding::derive_wire_name;
use crate::protocol::error::{Result, WirecallError};
use crate::wire::{WireReader, WireToken, WireWriter};

/// A struct that travels as a wire object.
///
/// `describe` lists the members in the order they are written. Members not
/// present in a decoded object keep their `Default` value.
///
/// ```
/// use wirecall_common::transform::{Model, Schema};
/// use wirecall_common::wire_model;
///
/// #[derive(Debug, Default, PartialEq)]
/// struct Account {
///     account_id: i64,
///     display_name: Option<String>,
/// }
///
/// impl Model for Account {
///     fn describe(schema: &mut Schema<'_, Self>) {
///         schema
///             .field("account_id", |m| &m.account_id, |m| &mut m.account_id)
///             .field_as("display_name", "name", |m| &m.display_name, |m| &mut m.display_name);
///     }
/// }
///
/// wire_model!(Account);
/// ```
pub trait Model: Default + Send + Sync + 'static {
    fn describe(schema: &mut Schema<'_, Self>);
}

/// Collects the members of a [`Model`], resolving each member's adapter as it
/// is declared.
pub struct Schema<'t, M> {
    transformer: &'t Transformer,
    fields: Vec<Box<dyn BoundField<M>>>,
    error: Option<WirecallError>,
}

impl<'t, M: Model> Schema<'t, M> {
    fn new(transformer: &'t Transformer) -> Self {
        Self {
            transformer,
            fields: Vec::new(),
            error: None,
        }
    }

    /// Declares a member whose wire name is derived from the member name.
    pub fn field<F: Wire>(
        &mut self,
        member: &str,
        get: fn(&M) -> &F,
        get_mut: fn(&mut M) -> &mut F,
    ) -> &mut Self {
        let wire = derive_wire_name(member);
        self.field_as(member, &wire, get, get_mut)
    }

    /// Declares a member with an explicit wire name.
    pub fn field_as<F: Wire>(
        &mut self,
        member: &str,
        wire: &str,
        get: fn(&M) -> &F,
        get_mut: fn(&mut M) -> &mut F,
    ) -> &mut Self {
        if self.error.is_some() {
            return self;
        }
        match self.transformer.adapter::<F>() {
            Ok(adapter) => self.fields.push(Box::new(TypedField {
                member: member.to_string(),
                wire: wire.to_string(),
                get,
                get_mut,
                adapter,
            })),
            Err(e) => self.error = Some(e),
        }
        self
    }

    fn finish(self) -> Result<Vec<Box<dyn BoundField<M>>>> {
        match self.error {
            Some(e) => Err(e),
            None => Ok(self.fields),
        }
    }
}

/// One declared member bound to its resolved adapter.
pub trait BoundField<M>: Send + Sync {
    fn member(&self) -> &str;

    fn wire_name(&self) -> &str;

    /// Writes the named entry, or nothing if the member is absent.
    fn write(&self, writer: &mut WireWriter, model: &M) -> Result<()>;

    /// Reads the entry's value into the member. The name has already been
    /// consumed.
    fn read(&self, reader: &mut WireReader<'_>, model: &mut M) -> Result<()>;
}

struct TypedField<M, F> {
    member: String,
    wire: String,
    get: fn(&M) -> &F,
    get_mut: fn(&mut M) -> &mut F,
    adapter: Arc<dyn TypeAdapter<F>>,
}

impl<M: Send + Sync, F: Send + Sync + 'static> BoundField<M> for TypedField<M, F> {
    fn member(&self) -> &str {
        &self.member
    }

    fn wire_name(&self) -> &str {
        &self.wire
    }

    fn write(&self, writer: &mut WireWriter, model: &M) -> Result<()> {
        let value = (self.get)(model);
        if self.adapter.is_absent(value) {
            return Ok(());
        }
        writer.write_name(&self.wire, self.adapter.token(value)?)?;
        self.adapter.write(writer, value)
    }

    fn read(&self, reader: &mut WireReader<'_>, model: &mut M) -> Result<()> {
        *(self.get_mut)(model) = self.adapter.read(reader)?;
        Ok(())
    }
}

/// Adapter for [`Model`] types, driven by the members their schema declares.
pub struct ReflectiveAdapter<M> {
    fields: Vec<Box<dyn BoundField<M>>>,
    by_wire_name: HashMap<String, usize>,
}

impl<M: Model> ReflectiveAdapter<M> {
    /// Describes `M` and resolves every member adapter through `transformer`.
    pub fn build(transformer: &Transformer) -> Result<Self> {
        let mut schema = Schema::new(transformer);
        M::describe(&mut schema);
        let fields = schema.finish()?;

        let mut by_wire_name = HashMap::with_capacity(fields.len());
        for (index, field) in fields.iter().enumerate() {
            if let Some(previous) = by_wire_name.insert(field.wire_name().to_string(), index) {
                return Err(WirecallError::Serialization(format!(
                    "{}: members '{}' and '{}' share the wire name '{}'",
                    type_name::<M>(),
                    fields[previous].member(),
                    field.member(),
                    field.wire_name()
                )));
            }
        }

        Ok(Self {
            fields,
            by_wire_name,
        })
    }

    pub fn wire_names(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(|f| f.wire_name())
    }
}

impl<M: Model> TypeAdapter<M> for ReflectiveAdapter<M> {
    fn token(&self, _value: &M) -> Result<WireToken> {
        Ok(WireToken::BeginObject)
    }

    fn write(&self, writer: &mut WireWriter, value: &M) -> Result<()> {
        writer.begin_object()?;
        self.write_fields(writer, value)?;
        writer.end_object()
    }

    fn read(&self, reader: &mut WireReader<'_>) -> Result<M> {
        let mut model = M::default();
        reader.begin_object()?;
        while reader.has_next()? {
            let name = reader.next_name()?;
            match self.by_wire_name.get(&name) {
                Some(&index) => self.fields[index].read(reader, &mut model)?,
                None => reader.skip_value()?,
            }
        }
        reader.end_object()?;
        Ok(model)
    }

    fn is_object(&self) -> bool {
        true
    }

    fn write_fields(&self, writer: &mut WireWriter, value: &M) -> Result<()> {
        for field in &self.fields {
            field.write(writer, value)?;
        }
        Ok(())
    }
}

/// Implements [`Wire`](crate::transform::Wire) for [`Model`] types through
/// the reflective adapter.
#[macro_export]
macro_rules! wire_model {
    ($($ty:ty),+ $(,)?) => {
        $(
            impl $crate::transform::Wire for $ty {
                fn adapter(
                    transformer: &$crate::transform::Transformer,
                ) -> $crate::Result<::std::sync::Arc<dyn $crate::transform::TypeAdapter<Self>>> {
                    Ok(::std::sync::Arc::new(
                        $crate::transform::ReflectiveAdapter::<$ty>::build(transformer)?,
                    ))
                }
            }
        )+
    };
}
