//! wirecall Client
//!
//! Typed client for the wirecall binary RPC protocol.
//!
//! # Components
//!
//! - [`Client`] - entry point; owns the connection pool and adapter registry
//! - [`Composer`] - turns [`MethodSpec`] templates into callable [`Method`]s
//! - [`Call`] - one executable, cancellable exchange
//! - [`MultiCall`] - keyed batch pipelined over a few pooled connections
//! - [`adapter`] - call adapters, including the built-in futures
//! - [`ConnectionPool`] - bounded blocking pool of connections
//!
//! Calls block the calling thread. Use [`CallFuture`] (or `.await` a
//! [`Call`] directly) from async code running on tokio.

pub mod adapter;
pub mod call;
pub mod client;
pub mod composer;
pub mod config;
pub mod multicall;
pub mod pool;

pub use adapter::{
    AdaptedReturn, BatchFailure, BatchFuture, BatchOutcome, CallAdapter, CallAdapterFactory,
    CallFuture, FutureCallAdapter, FutureCallAdapterFactory, Futures, ReturnShape,
};
pub use call::{Call, CancelHandle};
pub use client::{Client, ClientBuilder, Dispatcher};
pub use composer::{
    AdaptedMethod, Api, ArgumentShape, Arguments, Composer, Method, MethodSpec, RequestObject,
};
pub use config::ClientConfig;
pub use multicall::{BatchCallback, BatchCancelHandle, BatchHandle, BatchResults, MultiCall};
pub use pool::{ConnectionPool, Lease, PoolStats};
pub use wirecall_common::{Result, WirecallError};
