//! API composition.
//!
//! An interface is described once, at composition time, as a set of
//! [`MethodSpec`]s. Composing a spec validates it against the argument and
//! return types and resolves every adapter up front, producing an immutable
//! request template ([`Method`]). Each invocation then only encodes argument
//! values into that template.
//!
//! ```rust,no_run
//! use wirecall_client::{Api, Call, Client, Composer, Method, MethodSpec};
//! use wirecall_common::Result;
//!
//! struct Accounts {
//!     balance: Method<(i64,), i64>,
//!     rename: Method<(i64, String), ()>,
//! }
//!
//! impl Api for Accounts {
//!     fn compose(composer: &Composer) -> Result<Self> {
//!         Ok(Accounts {
//!             balance: composer.compose(MethodSpec::new("get_balance").param("account_id"))?,
//!             rename: composer.compose(
//!                 MethodSpec::new("rename")
//!                     .wire_name("accountRename")
//!                     .param("account_id")
//!                     .param_as("new_name", "name"),
//!             )?,
//!         })
//!     }
//! }
//!
//! impl Accounts {
//!     fn balance(&self, account_id: i64) -> Result<Call<i64>> {
//!         self.balance.call((account_id,))
//!     }
//! }
//!
//! let client = Client::connect("127.0.0.1:9090").unwrap();
//! let accounts: Accounts = client.create().unwrap();
//! let balance = accounts.balance(7).unwrap().execute().unwrap();
//! ```

use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;

use wirecall_common::protocol::error::{Result, WirecallError};
use wirecall_common::protocol::{derive_wire_name, ParameterBinding, Request};
use wirecall_common::transform::{Transformer, TypeAdapter, Wire};
use wirecall_common::wire::WireWriter;

use crate::adapter::AdaptedReturn;
use crate::call::Call;
use crate::client::Dispatcher;

/// Declaration of one interface method.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MethodSpec {
    ident: String,
    wire_name: Option<String>,
    params: Vec<ParameterBinding>,
    request_object: bool,
}

impl MethodSpec {
    /// A method named after the Rust identifier `ident`. The wire name is
    /// derived from it unless [`wire_name`](Self::wire_name) overrides it.
    pub fn new(ident: impl Into<String>) -> Self {
        Self {
            ident: ident.into(),
            wire_name: None,
            params: Vec::new(),
            request_object: false,
        }
    }

    pub fn wire_name(mut self, name: impl Into<String>) -> Self {
        self.wire_name = Some(name.into());
        self
    }

    /// Appends a positional parameter sent under its derived name.
    pub fn param(mut self, member: impl Into<String>) -> Self {
        self.params.push(ParameterBinding::derived(member));
        self
    }

    /// Appends a positional parameter sent under an explicit name.
    pub fn param_as(mut self, member: impl Into<String>, wire: impl Into<String>) -> Self {
        self.params.push(ParameterBinding::explicit(member, wire));
        self
    }

    /// Takes a single [`RequestObject`] argument whose fields become the
    /// request parameters.
    pub fn request_object(mut self) -> Self {
        self.request_object = true;
        self
    }

    /// The method name sent on the wire.
    pub fn method_name(&self) -> String {
        self.wire_name
            .clone()
            .unwrap_or_else(|| derive_wire_name(&self.ident))
    }

    pub fn params(&self) -> &[ParameterBinding] {
        &self.params
    }

    fn validate(&self, shape: ArgumentShape) -> Result<()> {
        let method = self.method_name();
        if method.is_empty() {
            return Err(WirecallError::Composition(format!(
                "method '{}' has an empty wire name",
                self.ident
            )));
        }
        if self.request_object && !self.params.is_empty() {
            return Err(WirecallError::Composition(format!(
                "{}: a request object cannot be combined with positional parameters",
                method
            )));
        }
        ParameterBinding::ensure_unique(&method, &self.params)?;

        match (shape, self.request_object) {
            (ArgumentShape::Positional(n), false) if n == self.params.len() => Ok(()),
            (ArgumentShape::Positional(n), false) => Err(WirecallError::Composition(format!(
                "{}: {} parameters declared but the argument type has {}",
                method,
                self.params.len(),
                n
            ))),
            (ArgumentShape::RequestObject, true) => Ok(()),
            (ArgumentShape::RequestObject, false) => Err(WirecallError::Composition(format!(
                "{}: a RequestObject argument needs request_object()",
                method
            ))),
            (ArgumentShape::Positional(_), true) => Err(WirecallError::Composition(format!(
                "{}: request_object() needs a RequestObject argument",
                method
            ))),
        }
    }
}

/// How an argument type maps onto the parameter object.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArgumentShape {
    /// A tuple of this many named parameters
    Positional(usize),
    /// One value whose fields are inlined
    RequestObject,
}

/// Argument types a [`Method`] can be invoked with.
///
/// Implemented for tuples of up to six [`Wire`] types, `()` and
/// [`RequestObject`].
pub trait Arguments: Send + Sync + 'static {
    /// Adapters resolved once at composition time.
    type Adapters: Send + Sync + 'static;

    fn shape() -> ArgumentShape;

    fn resolve(transformer: &Transformer) -> Result<Self::Adapters>;

    /// Writes the parameters into the open parameter object. Absent values
    /// are left out.
    fn write_params(
        &self,
        adapters: &Self::Adapters,
        bindings: &[ParameterBinding],
        writer: &mut WireWriter,
    ) -> Result<()>;
}

fn write_param<T: 'static>(
    adapter: &dyn TypeAdapter<T>,
    binding: &ParameterBinding,
    value: &T,
    writer: &mut WireWriter,
) -> Result<()> {
    if adapter.is_absent(value) {
        return Ok(());
    }
    writer.write_name(&binding.wire_name, adapter.token(value)?)?;
    adapter.write(writer, value)
}

impl Arguments for () {
    type Adapters = ();

    fn shape() -> ArgumentShape {
        ArgumentShape::Positional(0)
    }

    fn resolve(_transformer: &Transformer) -> Result<Self::Adapters> {
        Ok(())
    }

    fn write_params(
        &self,
        _adapters: &Self::Adapters,
        _bindings: &[ParameterBinding],
        _writer: &mut WireWriter,
    ) -> Result<()> {
        Ok(())
    }
}

macro_rules! tuple_arguments {
    ($len:expr; $($T:ident $idx:tt),+) => {
        impl<$($T: Wire),+> Arguments for ($($T,)+) {
            type Adapters = ($(Arc<dyn TypeAdapter<$T>>,)+);

            fn shape() -> ArgumentShape {
                ArgumentShape::Positional($len)
            }

            fn resolve(transformer: &Transformer) -> Result<Self::Adapters> {
                Ok(($(transformer.adapter::<$T>()?,)+))
            }

            fn write_params(
                &self,
                adapters: &Self::Adapters,
                bindings: &[ParameterBinding],
                writer: &mut WireWriter,
            ) -> Result<()> {
                if bindings.len() != $len {
                    return Err(WirecallError::Composition(format!(
                        "{} bindings for {} arguments",
                        bindings.len(),
                        $len
                    )));
                }
                $(write_param(adapters.$idx.as_ref(), &bindings[$idx], &self.$idx, writer)?;)+
                Ok(())
            }
        }
    };
}

tuple_arguments!(1; A 0);
tuple_arguments!(2; A 0, B 1);
tuple_arguments!(3; A 0, B 1, C 2);
tuple_arguments!(4; A 0, B 1, C 2, D 3);
tuple_arguments!(5; A 0, B 1, C 2, D 3, E 4);
tuple_arguments!(6; A 0, B 1, C 2, D 3, E 4, F 5);

/// An argument whose fields are sent as the request parameters.
///
/// `M` is usually a [`Model`](wirecall_common::transform::Model); maps and
/// `serde_json::Value` objects work too.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RequestObject<M>(pub M);

impl<M: Wire> Arguments for RequestObject<M> {
    type Adapters = Arc<dyn TypeAdapter<M>>;

    fn shape() -> ArgumentShape {
        ArgumentShape::RequestObject
    }

    fn resolve(transformer: &Transformer) -> Result<Self::Adapters> {
        let adapter = transformer.adapter::<M>()?;
        if !adapter.is_object() {
            return Err(WirecallError::UnsupportedType(format!(
                "{} has no fields to send as parameters",
                std::any::type_name::<M>()
            )));
        }
        Ok(adapter)
    }

    fn write_params(
        &self,
        adapter: &Self::Adapters,
        _bindings: &[ParameterBinding],
        writer: &mut WireWriter,
    ) -> Result<()> {
        adapter.write_fields(writer, &self.0)
    }
}

struct RequestTemplate<A: Arguments> {
    method: String,
    bindings: Vec<ParameterBinding>,
    adapters: A::Adapters,
}

/// A composed interface method returning a raw [`Call`].
pub struct Method<A: Arguments, T> {
    template: Arc<RequestTemplate<A>>,
    decoder: Arc<dyn TypeAdapter<T>>,
    dispatcher: Arc<Dispatcher>,
}

impl<A: Arguments, T: Send + 'static> Method<A, T> {
    /// Encodes `args` into a new call. Nothing is sent until the call runs.
    pub fn call(&self, args: A) -> Result<Call<T>> {
        self.build(args, None)
    }

    /// Like [`call`](Self::call), with a binary payload sent after the
    /// encoded request.
    pub fn call_with_payload(&self, args: A, payload: Vec<u8>) -> Result<Call<T>> {
        self.build(args, Some(payload))
    }

    pub fn name(&self) -> &str {
        &self.template.method
    }

    pub fn bindings(&self) -> &[ParameterBinding] {
        &self.template.bindings
    }

    fn build(&self, args: A, payload: Option<Vec<u8>>) -> Result<Call<T>> {
        let template = &self.template;
        let mut request = Request::new(template.method.clone(), |writer| {
            args.write_params(&template.adapters, &template.bindings, writer)
        })?;
        if let Some(payload) = payload {
            request = request.with_payload(payload);
        }
        Ok(Call::new(
            Arc::new(request),
            Arc::clone(&self.decoder),
            Arc::clone(&self.dispatcher),
        ))
    }
}

impl<A: Arguments, T> Clone for Method<A, T> {
    fn clone(&self) -> Self {
        Self {
            template: Arc::clone(&self.template),
            decoder: Arc::clone(&self.decoder),
            dispatcher: Arc::clone(&self.dispatcher),
        }
    }
}

impl<A: Arguments, T> fmt::Debug for Method<A, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Method")
            .field("method", &self.template.method)
            .field("bindings", &self.template.bindings)
            .finish()
    }
}

/// A composed method whose calls are converted by a
/// [`CallAdapter`](crate::adapter::CallAdapter) into `R`.
pub struct AdaptedMethod<A: Arguments, R: AdaptedReturn> {
    method: Method<A, R::Element>,
    adapter: Arc<R::Adapter>,
    _return: PhantomData<fn() -> R>,
}

impl<A: Arguments, R: AdaptedReturn> AdaptedMethod<A, R> {
    pub fn call(&self, args: A) -> Result<R> {
        R::adapt(self.method.call(args)?, &self.adapter)
    }

    pub fn call_with_payload(&self, args: A, payload: Vec<u8>) -> Result<R> {
        R::adapt(self.method.call_with_payload(args, payload)?, &self.adapter)
    }

    /// The underlying raw method.
    pub fn method(&self) -> &Method<A, R::Element> {
        &self.method
    }
}

impl<A: Arguments, R: AdaptedReturn> Clone for AdaptedMethod<A, R> {
    fn clone(&self) -> Self {
        Self {
            method: self.method.clone(),
            adapter: Arc::clone(&self.adapter),
            _return: PhantomData,
        }
    }
}

/// An interface implemented from composed methods.
pub trait Api: Sized {
    fn compose(composer: &Composer) -> Result<Self>;
}

/// Builds [`Method`]s against one client.
#[derive(Clone)]
pub struct Composer {
    dispatcher: Arc<Dispatcher>,
}

impl Composer {
    pub(crate) fn new(dispatcher: Arc<Dispatcher>) -> Self {
        Self { dispatcher }
    }

    /// Composes a method returning a raw [`Call<T>`].
    ///
    /// # Errors
    ///
    /// `Composition` if the spec mixes positional parameters with a request
    /// object, repeats a wire name, declares a different number of parameters
    /// than `A` has, or if `A` or `T` has no resolvable adapter.
    pub fn compose<A, T>(&self, spec: MethodSpec) -> Result<Method<A, T>>
    where
        A: Arguments,
        T: Wire,
    {
        spec.validate(A::shape())?;
        let method = spec.method_name();
        let transformer = self.dispatcher.transformer();

        let adapters = A::resolve(transformer).map_err(|e| composition(&method, "argument", e))?;
        let decoder = transformer
            .adapter::<T>()
            .map_err(|e| composition(&method, "response", e))?;

        tracing::debug!(method = %method, params = spec.params.len(), "Composed method");
        Ok(Method {
            template: Arc::new(RequestTemplate {
                method,
                bindings: spec.params,
                adapters,
            }),
            decoder,
            dispatcher: Arc::clone(&self.dispatcher),
        })
    }

    /// Composes a method whose calls are adapted to `R` by the first
    /// registered call adapter factory that accepts `R`.
    pub fn compose_adapted<A, R>(&self, spec: MethodSpec) -> Result<AdaptedMethod<A, R>>
    where
        A: Arguments,
        R: AdaptedReturn,
    {
        let name = spec.method_name();
        let shape = R::shape();
        let adapter = self.dispatcher.call_adapter(&shape).ok_or_else(|| {
            WirecallError::Composition(format!(
                "{}: no call adapter for return type {:?}",
                name, shape
            ))
        })?;
        let adapter = adapter.into_any().downcast::<R::Adapter>().map_err(|_| {
            WirecallError::Composition(format!(
                "{}: call adapter chosen for {:?} cannot produce it",
                name, shape
            ))
        })?;

        Ok(AdaptedMethod {
            method: self.compose::<A, R::Element>(spec)?,
            adapter,
            _return: PhantomData,
        })
    }

    /// Builds a whole interface.
    pub fn create<X: Api>(&self) -> Result<X> {
        X::compose(self)
    }

    pub fn transformer(&self) -> &Arc<Transformer> {
        self.dispatcher.transformer()
    }
}

fn composition(method: &str, what: &str, err: WirecallError) -> WirecallError {
    match err {
        WirecallError::Composition(_) => err,
        other => WirecallError::Composition(format!("{}: {} type: {}", method, what, other)),
    }
}
