//! Typed Serialization Engine
//!
//! Maps declared Rust types to and from the wire format through a registry of
//! [`TypeAdapter`]s. Adapters come from three places, consulted in order:
//!
//! - the [`Transformer`]'s memoized cache
//! - user [`TypeAdapterFactory`]s, first match wins
//! - the type's own [`Wire`] implementation: built-ins for scalars,
//!   collections and timestamps, [`ReflectiveAdapter`] for [`Model`] types
//!
//! A single `Transformer` is meant to be shared (`Arc`) by every client and
//! call in a process.

pub mod adapter;
pub mod builtin;
pub mod model;
pub mod registry;

pub use adapter::{
    unsupported, ErasedAdapter, ExactFactory, TypeAdapter, TypeAdapterFactory, TypeKey, Wire,
};
pub use builtin::TimestampAdapter;
pub use model::{BoundField, Model, ReflectiveAdapter, Schema};
pub use registry::{Transformer, TransformerBuilder};
