//! wirecall Common Types and Codecs
//!
//! This crate provides the wire format, the typed serialization engine and
//! the transport seam shared by the wirecall client.
//!
//! # Overview
//!
//! wirecall speaks a proprietary binary RPC protocol. Every message is a
//! self-describing stream of tagged values (numbers, strings, booleans,
//! arrays, objects) terminated by an end-of-stream tag, optionally followed by
//! a raw binary attachment. This crate contains:
//!
//! - **Wire Layer**: token-level reader/writer and an untyped value codec
//! - **Transform Layer**: the adapter registry mapping Rust types to the wire
//! - **Protocol Layer**: request/response envelopes, name derivation, errors
//! - **Transport Layer**: connection traits, length-prefixed framing and TCP
//!
//! # Components
//!
//! - [`wire`] - `WireToken`, `WireReader`, `WireWriter`, generic value codec
//! - [`transform`] - `Transformer`, `TypeAdapter`, `Model`, built-in adapters
//! - [`protocol`] - `Request`, `ResponseEnvelope`, `WirecallError`
//! - [`transport`] - `Connector`, `Connection`, `FrameCodec`, `TcpConnector`
//!
//! # Example
//!
//! ```
//! use wirecall_common::protocol::{Request, ResponseEnvelope};
//! use wirecall_common::transform::Transformer;
//! use wirecall_common::wire::WireToken;
//! use serde_json::json;
//!
//! let request = Request::new("getUser", |w| {
//!     w.write_name("userId", WireToken::Number)?;
//!     w.write_number(42)
//! })
//! .unwrap();
//! assert_eq!(request.method(), "getUser");
//!
//! let transformer = Transformer::new();
//! let reply = ResponseEnvelope::success(json!(["a", "b"])).encode().unwrap();
//! let adapter = transformer.adapter::<Vec<String>>().unwrap();
//! let names = ResponseEnvelope::decode_with(&reply, adapter.as_ref()).unwrap();
//! assert_eq!(names, vec!["a", "b"]);
//! ```

pub mod protocol;
pub mod transform;
pub mod transport;
pub mod wire;

pub use protocol::{Result, WirecallError};
