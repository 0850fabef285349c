use std::cell::RefCell;
use std::collections::HashMap;
use std::sync::{Arc, OnceLock};

use dashmap::DashMap;

use super::adapter::{ErasedAdapter, ExactFactory, TypeAdapter, TypeAdapterFactory, TypeKey, Wire};
use crate::protocol::error::{Result, WirecallError};
use crate::wire::{WireReader, WireToken, WireWriter};

thread_local! {
    /// Adapter builds running on this thread, keyed by transformer address.
    static BUILDS: RefCell<HashMap<usize, Build>> = RefCell::new(HashMap::new());
}

/// State of one outermost adapter build and everything it pulls in.
#[derive(Default)]
struct Build {
    /// Placeholders for types under construction, so recursive types can
    /// refer to themselves
    pending: HashMap<TypeKey, ErasedAdapter>,
    /// Adapters finished during the build. They reach the shared cache only
    /// if the outermost type builds too, since they may hold placeholders.
    staged: Vec<(TypeKey, ErasedAdapter)>,
}

impl Build {
    fn find(&self, key: TypeKey) -> Option<ErasedAdapter> {
        self.pending.get(&key).cloned().or_else(|| {
            self.staged
                .iter()
                .find(|(staged, _)| *staged == key)
                .map(|(_, adapter)| adapter.clone())
        })
    }
}

/// Adapter registry mapping declared types to their [`TypeAdapter`]s.
///
/// Resolution order for a type `T`:
///
/// 1. the memoized cache
/// 2. registered [`TypeAdapterFactory`]s, in registration order
/// 3. `T`'s own [`Wire::adapter`] (built-ins, or the reflective adapter for
///    models)
///
/// The result is cached. Concurrent resolutions of the same type converge on
/// whichever instance is inserted first; the cache is a sharded concurrent
/// map so lookups do not contend on a global lock.
///
/// # Example
///
/// ```
/// use wirecall_common::transform::Transformer;
///
/// let transformer = Transformer::new();
/// let bytes = transformer.encode(&vec![1i64, 2, 3]).unwrap();
/// let decoded: Vec<i64> = transformer.decode(&bytes).unwrap();
/// assert_eq!(decoded, vec![1, 2, 3]);
/// ```
pub struct Transformer {
    cache: DashMap<TypeKey, ErasedAdapter>,
    factories: Vec<Arc<dyn TypeAdapterFactory>>,
}

impl Transformer {
    /// Creates a transformer with only the built-in adapters.
    pub fn new() -> Self {
        Self::builder().build()
    }

    pub fn builder() -> TransformerBuilder {
        TransformerBuilder::default()
    }

    /// Resolves the adapter for `T`.
    pub fn adapter<T: Wire>(&self) -> Result<Arc<dyn TypeAdapter<T>>> {
        let key = TypeKey::of::<T>();

        let cached = self.cache.get(&key).map(|entry| entry.value().clone());
        if let Some(erased) = cached {
            return Self::downcast(&erased, key);
        }

        let id = self as *const Self as usize;
        let known = BUILDS.with(|b| b.borrow().get(&id).and_then(|build| build.find(key)));
        if let Some(erased) = known {
            return Self::downcast(&erased, key);
        }

        let deferred = Arc::new(DeferredAdapter::<T>::new());
        let placeholder: Arc<dyn TypeAdapter<T>> = deferred.clone();
        let (outermost, mark) = BUILDS.with(|b| {
            let mut builds = b.borrow_mut();
            let outermost = !builds.contains_key(&id);
            let build = builds.entry(id).or_default();
            build.pending.insert(key, ErasedAdapter::new(placeholder));
            (outermost, build.staged.len())
        });

        let built = self.build::<T>(key);

        let staged = BUILDS.with(|b| {
            let mut builds = b.borrow_mut();
            if outermost {
                return builds.remove(&id).map(|build| build.staged).unwrap_or_default();
            }
            if let Some(build) = builds.get_mut(&id) {
                build.pending.remove(&key);
                match &built {
                    Ok(adapter) => build.staged.push((key, ErasedAdapter::new(adapter.clone()))),
                    // anything finished since this type started may hold its placeholder
                    Err(_) => build.staged.truncate(mark),
                }
            }
            Vec::new()
        });

        let built = built?;
        deferred.complete(built.clone());
        if !outermost {
            return Ok(built);
        }

        for (staged_key, adapter) in staged {
            self.cache.entry(staged_key).or_insert(adapter);
        }
        let winner = self
            .cache
            .entry(key)
            .or_insert_with(|| ErasedAdapter::new(built))
            .value()
            .clone();
        tracing::debug!(target_type = key.name(), "Resolved type adapter");
        Self::downcast(&winner, key)
    }

    /// Number of types with a memoized adapter.
    pub fn cached_types(&self) -> usize {
        self.cache.len()
    }

    pub fn write<T: Wire>(&self, writer: &mut WireWriter, value: &T) -> Result<()> {
        self.adapter::<T>()?.write(writer, value)
    }

    pub fn read<T: Wire>(&self, reader: &mut WireReader<'_>) -> Result<T> {
        self.adapter::<T>()?.read(reader)
    }

    /// Encodes `value` as a complete single-value stream.
    pub fn encode<T: Wire>(&self, value: &T) -> Result<Vec<u8>> {
        let mut writer = WireWriter::new();
        self.write(&mut writer, value)?;
        writer.finish()
    }

    /// Decodes a complete single-value stream.
    pub fn decode<T: Wire>(&self, bytes: &[u8]) -> Result<T> {
        let mut reader = WireReader::new(bytes);
        let value = self.read(&mut reader)?;
        reader.finish()?;
        Ok(value)
    }

    fn build<T: Wire>(&self, key: TypeKey) -> Result<Arc<dyn TypeAdapter<T>>> {
        for factory in &self.factories {
            if let Some(erased) = factory.create(self, key) {
                return Self::downcast(&erased, key);
            }
        }
        T::adapter(self)
    }

    fn downcast<T: 'static>(erased: &ErasedAdapter, key: TypeKey) -> Result<Arc<dyn TypeAdapter<T>>> {
        erased.downcast::<T>().ok_or_else(|| {
            WirecallError::Serialization(format!(
                "adapter registered for {} has a different type",
                key.name()
            ))
        })
    }
}

impl Default for Transformer {
    fn default() -> Self {
        Self::new()
    }
}

/// Builder registering [`TypeAdapterFactory`]s ahead of the built-ins.
#[derive(Default)]
pub struct TransformerBuilder {
    factories: Vec<Arc<dyn TypeAdapterFactory>>,
}

impl TransformerBuilder {
    pub fn factory(mut self, factory: impl TypeAdapterFactory) -> Self {
        self.factories.push(Arc::new(factory));
        self
    }

    /// Registers a fixed adapter for exactly `T`.
    pub fn register<T: 'static>(self, adapter: impl TypeAdapter<T>) -> Self {
        self.factory(ExactFactory::new::<T>(Arc::new(adapter)))
    }

    pub fn build(self) -> Transformer {
        Transformer {
            cache: DashMap::new(),
            factories: self.factories,
        }
    }
}

/// Stand-in handed out while a recursive type's adapter is under
/// construction; delegates once the real adapter is known.
struct DeferredAdapter<T> {
    inner: OnceLock<Arc<dyn TypeAdapter<T>>>,
}

impl<T: 'static> DeferredAdapter<T> {
    fn new() -> Self {
        Self {
            inner: OnceLock::new(),
        }
    }

    fn complete(&self, adapter: Arc<dyn TypeAdapter<T>>) {
        let _ = self.inner.set(adapter);
    }

    fn get(&self) -> Result<&Arc<dyn TypeAdapter<T>>> {
        self.inner.get().ok_or_else(|| {
            WirecallError::Serialization(format!(
                "adapter for {} used before its construction completed",
                std::any::type_name::<T>()
            ))
        })
    }
}

impl<T: Send + Sync + 'static> TypeAdapter<T> for DeferredAdapter<T> {
    fn token(&self, value: &T) -> Result<WireToken> {
        self.get()?.token(value)
    }

    fn write(&self, writer: &mut WireWriter, value: &T) -> Result<()> {
        self.get()?.write(writer, value)
    }

    fn read(&self, reader: &mut WireReader<'_>) -> Result<T> {
        self.get()?.read(reader)
    }

    fn is_absent(&self, value: &T) -> bool {
        self.inner.get().is_some_and(|inner| inner.is_absent(value))
    }

    fn absent(&self) -> Result<T> {
        self.get()?.absent()
    }

    fn is_object(&self) -> bool {
        self.inner.get().is_some_and(|inner| inner.is_object())
    }

    fn write_fields(&self, writer: &mut WireWriter, value: &T) -> Result<()> {
        self.get()?.write_fields(writer, value)
    }
}
