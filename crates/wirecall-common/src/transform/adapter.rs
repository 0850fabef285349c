use std::any::{type_name, Any, TypeId};
use std::fmt;
use std::sync::Arc;

use super::Transformer;
use crate::protocol::error::{Result, WirecallError};
use crate::wire::{WireReader, WireToken, WireWriter};

/// Serializer/deserializer pair for one declared type.
///
/// Adapters are resolved per type, not per value, and are shared by every
/// client using the same [`Transformer`], so implementations must be
/// stateless or internally synchronized.
pub trait TypeAdapter<T>: Send + Sync + 'static {
    /// The token `value` starts with, announced before an object field.
    fn token(&self, value: &T) -> Result<WireToken>;

    fn write(&self, writer: &mut WireWriter, value: &T) -> Result<()>;

    fn read(&self, reader: &mut WireReader<'_>) -> Result<T>;

    /// Whether `value` is the null-like value that is left off the wire when
    /// it appears as an object field.
    fn is_absent(&self, _value: &T) -> bool {
        false
    }

    /// The value to use when a response carries no data at all.
    fn absent(&self) -> Result<T> {
        Err(WirecallError::Serialization(format!(
            "missing value for {}",
            type_name::<T>()
        )))
    }

    /// Whether values are written as objects with named members, so
    /// [`write_fields`](Self::write_fields) can spread them.
    fn is_object(&self) -> bool {
        false
    }

    /// Writes the members of an object value into the currently open object,
    /// without the surrounding begin/end markers.
    fn write_fields(&self, _writer: &mut WireWriter, _value: &T) -> Result<()> {
        Err(WirecallError::UnsupportedType(format!(
            "{} is not an object type",
            type_name::<T>()
        )))
    }
}

/// A type the [`Transformer`] knows how to encode.
///
/// `adapter` supplies the type's own adapter; it is only consulted when no
/// registered [`TypeAdapterFactory`] claims the type first.
pub trait Wire: Sized + Send + Sync + 'static {
    fn adapter(transformer: &Transformer) -> Result<Arc<dyn TypeAdapter<Self>>>;
}

/// The error a [`Wire`] implementation returns for types that can only be
/// encoded through a registered factory.
pub fn unsupported<T>() -> WirecallError {
    WirecallError::UnsupportedType(format!(
        "no adapter registered for {}",
        type_name::<T>()
    ))
}

/// Identity of a declared type in the adapter registry.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct TypeKey {
    id: TypeId,
    name: &'static str,
}

impl TypeKey {
    pub fn of<T: 'static>() -> Self {
        Self {
            id: TypeId::of::<T>(),
            name: type_name::<T>(),
        }
    }

    pub fn id(&self) -> TypeId {
        self.id
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn is<T: 'static>(&self) -> bool {
        self.id == TypeId::of::<T>()
    }
}

impl fmt::Debug for TypeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name)
    }
}

/// A type-erased `Arc<dyn TypeAdapter<T>>`.
#[derive(Clone)]
pub struct ErasedAdapter(Arc<dyn Any + Send + Sync>);

impl ErasedAdapter {
    pub fn new<T: 'static>(adapter: Arc<dyn TypeAdapter<T>>) -> Self {
        Self(Arc::new(adapter))
    }

    pub fn downcast<T: 'static>(&self) -> Option<Arc<dyn TypeAdapter<T>>> {
        self.0.downcast_ref::<Arc<dyn TypeAdapter<T>>>().cloned()
    }
}

/// Produces adapters for types it recognizes.
///
/// Factories are queried in registration order on a cache miss; the first
/// `Some` wins and is memoized by the [`Transformer`].
pub trait TypeAdapterFactory: Send + Sync + 'static {
    fn create(&self, transformer: &Transformer, target: TypeKey) -> Option<ErasedAdapter>;
}

/// Factory serving one fixed adapter for one exact type.
pub struct ExactFactory {
    key: TypeKey,
    adapter: ErasedAdapter,
}

impl ExactFactory {
    pub fn new<T: 'static>(adapter: Arc<dyn TypeAdapter<T>>) -> Self {
        Self {
            key: TypeKey::of::<T>(),
            adapter: ErasedAdapter::new(adapter),
        }
    }
}

impl TypeAdapterFactory for ExactFactory {
    fn create(&self, _transformer: &Transformer, target: TypeKey) -> Option<ErasedAdapter> {
        (target == self.key).then(|| self.adapter.clone())
    }
}
