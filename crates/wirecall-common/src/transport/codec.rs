use std::io::{ErrorKind, Read, Write};
use std::time::Duration;

use crate::protocol::error::{Result, WirecallError};

/// Default upper bound for a single frame body (100 MB).
pub const DEFAULT_MAX_MESSAGE_SIZE: usize = 100 * 1024 * 1024;

/// Default timeout for socket reads and writes (5 seconds).
pub const DEFAULT_IO_TIMEOUT: Duration = Duration::from_secs(5);

/// Length-prefixed framing for message bodies.
///
/// Wire format: `[4-byte length as u32 big-endian] + [body]`
///
/// Bodies larger than `max_message_size` are refused on both ends so a
/// corrupt or hostile length prefix cannot force a huge allocation.
///
/// # Example
///
/// ```
/// use std::io::Cursor;
/// use wirecall_common::transport::FrameCodec;
///
/// let codec = FrameCodec::new();
/// let mut buf = Vec::new();
/// codec.write_frame(&mut buf, b"hello").unwrap();
/// assert_eq!(&buf[..4], &[0, 0, 0, 5]);
///
/// let body = codec.read_frame(&mut Cursor::new(buf)).unwrap();
/// assert_eq!(body, b"hello");
/// ```
#[derive(Debug, Clone, Copy)]
pub struct FrameCodec {
    max_message_size: usize,
    io_timeout: Duration,
}

impl FrameCodec {
    pub fn new() -> Self {
        Self {
            max_message_size: DEFAULT_MAX_MESSAGE_SIZE,
            io_timeout: DEFAULT_IO_TIMEOUT,
        }
    }

    pub fn with_max_message_size(mut self, max_message_size: usize) -> Self {
        self.max_message_size = max_message_size;
        self
    }

    /// Timeout reported when a read or write times out.
    pub fn with_io_timeout(mut self, io_timeout: Duration) -> Self {
        self.io_timeout = io_timeout;
        self
    }

    pub fn max_message_size(&self) -> usize {
        self.max_message_size
    }

    /// Writes one frame and flushes.
    pub fn write_frame<W: Write>(&self, stream: &mut W, body: &[u8]) -> Result<()> {
        self.check_size(body.len())?;
        let len = body.len() as u32;

        stream
            .write_all(&len.to_be_bytes())
            .map_err(|e| self.map_io_error(e, "writing length prefix"))?;
        stream
            .write_all(body)
            .map_err(|e| self.map_io_error(e, "writing data"))?;
        stream
            .flush()
            .map_err(|e| self.map_io_error(e, "flushing stream"))?;

        Ok(())
    }

    /// Reads one frame body.
    pub fn read_frame<R: Read>(&self, stream: &mut R) -> Result<Vec<u8>> {
        let mut len_buf = [0u8; 4];
        stream
            .read_exact(&mut len_buf)
            .map_err(|e| self.map_io_error(e, "reading length prefix"))?;

        let len = u32::from_be_bytes(len_buf) as usize;
        self.check_size(len)?;

        let mut buf = vec![0u8; len];
        stream
            .read_exact(&mut buf)
            .map_err(|e| self.map_io_error(e, "reading data"))?;

        Ok(buf)
    }

    fn check_size(&self, len: usize) -> Result<()> {
        if len > self.max_message_size || len > u32::MAX as usize {
            return Err(WirecallError::Transport(format!(
                "Message too large: {} bytes (max {} bytes)",
                len, self.max_message_size
            )));
        }
        Ok(())
    }

    /// Maps IO errors to transport error variants:
    /// - Timeouts/would block -> `Timeout`
    /// - Lost connections -> `Connection`
    /// - Other IO errors -> `Io`
    pub fn map_io_error(&self, err: std::io::Error, context: &str) -> WirecallError {
        match err.kind() {
            ErrorKind::TimedOut | ErrorKind::WouldBlock => {
                WirecallError::Timeout(self.io_timeout.as_millis() as u64)
            }
            ErrorKind::ConnectionReset
            | ErrorKind::ConnectionAborted
            | ErrorKind::NotConnected
            | ErrorKind::BrokenPipe
            | ErrorKind::UnexpectedEof => {
                WirecallError::Connection(format!("{}: Connection lost", context))
            }
            _ => WirecallError::Io(err),
        }
    }
}

impl Default for FrameCodec {
    fn default() -> Self {
        Self::new()
    }
}
