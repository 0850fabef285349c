//! Transport Layer
//!
//! The client core needs only a duplex, message-oriented byte connection:
//! send one request frame, receive one response frame. This module defines
//! that seam and a plain TCP implementation of it.
//!
//! # Components
//!
//! - **[`Connector`]** / **[`Connection`]**: the collaborator traits a pool
//!   draws connections from
//! - **[`AbortHandle`]**: interrupts a connection's in-flight I/O from another
//!   thread
//! - **[`FrameCodec`]**: `[u32 big-endian length] + [body]` framing
//! - **[`TcpConnector`]**: std TCP with connect/read/write timeouts
//!
//! TLS and hostname verification belong to other `Connector`
//! implementations.

use std::fmt;
use std::sync::Arc;

use crate::protocol::error::Result;

pub mod codec;
pub mod tcp;

pub use codec::{FrameCodec, DEFAULT_IO_TIMEOUT, DEFAULT_MAX_MESSAGE_SIZE};
pub use tcp::{TcpConnection, TcpConnector, DEFAULT_CONNECT_TIMEOUT};


/// A message-oriented duplex connection.
///
/// Frames sent back to back are answered in the same order, which is what
/// lets a batch pipeline several requests before reading any response.
pub trait Connection: Send {
    fn send(&mut self, frame: &[u8]) -> Result<()>;

    fn receive(&mut self) -> Result<Vec<u8>>;

    /// A handle that makes blocked `send`/`receive` calls fail promptly.
    /// After an abort the connection must not be reused.
    fn abort_handle(&self) -> AbortHandle;
}

/// Opens new connections to a fixed endpoint.
pub trait Connector: Send + Sync + 'static {
    fn connect(&self) -> Result<Box<dyn Connection>>;
}

/// Interrupts a connection's in-flight I/O. Cheap to clone; aborting more
/// than once is harmless.
#[derive(Clone)]
pub struct AbortHandle {
    abort: Arc<dyn Fn() + Send + Sync>,
}

impl AbortHandle {
    pub fn new(abort: impl Fn() + Send + Sync + 'static) -> Self {
        Self {
            abort: Arc::new(abort),
        }
    }

    /// A handle for connections whose I/O cannot be interrupted.
    pub fn noop() -> Self {
        Self::new(|| {})
    }

    pub fn abort(&self) {
        (self.abort)()
    }
}

impl fmt::Debug for AbortHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("AbortHandle")
    }
}
