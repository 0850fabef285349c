//! Wire Value Model
//!
//! The protocol encodes every message as a self-describing stream of tagged
//! values. Each value starts with a [`WireToken`] tag byte; arrays and objects
//! are delimited by explicit begin/end tags rather than length prefixes, and
//! object entries carry their name between the tag and the payload.
//!
//! # Components
//!
//! - [`WireToken`]: the tag alphabet
//! - [`WireReader`]: pull reader with `peek`/`has_next` over encoded bytes
//! - [`WireWriter`]: nesting-checked writer producing encoded bytes
//! - [`ValueReader`] / [`ValueWriter`]: untyped codec over `serde_json::Value`
//!
//! # Stream Layout
//!
//! ```text
//! value*  END_OF_STREAM  [attachment bytes]
//! ```

use std::fmt;

pub mod reader;
pub mod token;
pub mod value;
pub mod writer;

pub use reader::WireReader;
pub use token::WireToken;
pub use value::{ValueReader, ValueWriter};
pub use writer::WireWriter;


/// Maximum nesting of arrays and objects accepted by readers and writers.
pub const MAX_DEPTH: usize = 512;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Scope {
    Array,
    Object,
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Scope::Array => f.write_str("array"),
            Scope::Object => f.write_str("object"),
        }
    }
}
