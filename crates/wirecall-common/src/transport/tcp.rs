use std::net::{Shutdown, TcpStream, ToSocketAddrs};
use std::time::Duration;

use super::codec::{FrameCodec, DEFAULT_IO_TIMEOUT};
use super::{AbortHandle, Connection, Connector};
use crate::protocol::error::{Result, WirecallError};

/// Default timeout for establishing a connection (5 seconds).
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Opens plain TCP connections to one endpoint.
///
/// Each connection gets read and write timeouts and frames messages with
/// [`FrameCodec`].
///
/// # Example
///
/// ```no_run
/// use wirecall_common::transport::{Connector, TcpConnector};
///
/// let connector = TcpConnector::new("127.0.0.1:9090");
/// let mut conn = connector.connect().unwrap();
/// conn.send(b"...").unwrap();
/// let reply = conn.receive().unwrap();
/// ```
#[derive(Debug, Clone)]
pub struct TcpConnector {
    addr: String,
    connect_timeout: Duration,
    io_timeout: Duration,
    codec: FrameCodec,
}

impl TcpConnector {
    pub fn new(addr: impl Into<String>) -> Self {
        Self {
            addr: addr.into(),
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            io_timeout: DEFAULT_IO_TIMEOUT,
            codec: FrameCodec::new(),
        }
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    pub fn with_io_timeout(mut self, timeout: Duration) -> Self {
        self.io_timeout = timeout;
        self.codec = self.codec.with_io_timeout(timeout);
        self
    }

    pub fn with_max_message_size(mut self, max_message_size: usize) -> Self {
        self.codec = self.codec.with_max_message_size(max_message_size);
        self
    }

    pub fn addr(&self) -> &str {
        &self.addr
    }

    /// Resolves the address and tries each candidate until one accepts.
    fn open(&self) -> Result<TcpStream> {
        let socket_addrs = self.addr.to_socket_addrs().map_err(|e| {
            WirecallError::Connection(format!("Invalid address '{}': {}", self.addr, e))
        })?;

        let mut last_err = None;
        for socket_addr in socket_addrs {
            match TcpStream::connect_timeout(&socket_addr, self.connect_timeout) {
                Ok(stream) => {
                    stream.set_read_timeout(Some(self.io_timeout)).map_err(|e| {
                        WirecallError::Connection(format!("Failed to set read timeout: {}", e))
                    })?;
                    stream.set_write_timeout(Some(self.io_timeout)).map_err(|e| {
                        WirecallError::Connection(format!("Failed to set write timeout: {}", e))
                    })?;
                    stream.set_nodelay(true).map_err(|e| {
                        WirecallError::Connection(format!("Failed to set TCP_NODELAY: {}", e))
                    })?;
                    return Ok(stream);
                }
                Err(e) => last_err = Some(e),
            }
        }

        Err(WirecallError::Connection(format!(
            "Failed to connect to {}: {}",
            self.addr,
            last_err
                .map(|e| e.to_string())
                .unwrap_or_else(|| "Unknown error".to_string())
        )))
    }
}

impl Connector for TcpConnector {
    fn connect(&self) -> Result<Box<dyn Connection>> {
        let stream = self.open()?;
        tracing::debug!(addr = %self.addr, "Opened TCP connection");
        Ok(Box::new(TcpConnection {
            stream,
            codec: self.codec,
        }))
    }
}

/// One framed TCP connection.
pub struct TcpConnection {
    stream: TcpStream,
    codec: FrameCodec,
}

impl Connection for TcpConnection {
    fn send(&mut self, frame: &[u8]) -> Result<()> {
        self.codec.write_frame(&mut self.stream, frame)
    }

    fn receive(&mut self) -> Result<Vec<u8>> {
        self.codec.read_frame(&mut self.stream)
    }

    /// Shuts the socket down from another thread, which fails any blocked
    /// read or write on this connection.
    fn abort_handle(&self) -> AbortHandle {
        match self.stream.try_clone() {
            Ok(clone) => AbortHandle::new(move || {
                let _ = clone.shutdown(Shutdown::Both);
            }),
            Err(e) => {
                tracing::warn!(error = %e, "Could not clone socket for abort; in-flight I/O will run to its timeout");
                AbortHandle::noop()
            }
        }
    }
}
