use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};
use wirecall_common::protocol::error::{Result, WirecallError};
use wirecall_common::transport::{AbortHandle, Connection, Connector};

/// How long a waiting acquirer sleeps before re-checking for a free slot,
/// its deadline and cancellation.
const RETRY_INTERVAL: Duration = Duration::from_millis(10);

/// Snapshot of pool occupancy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PoolStats {
    /// Open connections waiting to be reused
    pub idle: usize,
    /// Connections currently handed out, including ones still connecting
    pub leased: usize,
}

/// Bounded pool of connections to one endpoint.
///
/// # Architecture
///
/// - At most `max_connections` connections exist at once, leased and idle
///   together
/// - Idle connections are reused LIFO; new ones are opened through the
///   [`Connector`] only while under the limit
/// - When the pool is full, acquirers wait up to `acquire_timeout` and then
///   fail with `PoolTimeout`
/// - A [`Lease`] returns its connection on drop, or discards it if it was
///   marked broken, so no exit path leaks a slot
///
/// # Example
///
/// ```rust,no_run
/// use std::sync::Arc;
/// use std::time::Duration;
/// use wirecall_client::ConnectionPool;
/// use wirecall_common::transport::TcpConnector;
///
/// let pool = Arc::new(ConnectionPool::new(
///     Arc::new(TcpConnector::new("127.0.0.1:9090")),
///     10,
///     Duration::from_secs(30),
/// ));
///
/// let mut lease = pool.acquire().unwrap();
/// lease.send(b"...").unwrap();
/// let reply = lease.receive().unwrap();
/// // dropping the lease returns the connection
/// ```
pub struct ConnectionPool {
    connector: Arc<dyn Connector>,
    inner: Mutex<PoolInner>,
    released: Condvar,
    max_connections: usize,
    acquire_timeout: Duration,
}

struct PoolInner {
    idle: Vec<Box<dyn Connection>>,
    leased: usize,
}

impl ConnectionPool {
    pub fn new(
        connector: Arc<dyn Connector>,
        max_connections: usize,
        acquire_timeout: Duration,
    ) -> Self {
        Self {
            connector,
            inner: Mutex::new(PoolInner {
                idle: Vec::new(),
                leased: 0,
            }),
            released: Condvar::new(),
            max_connections: max_connections.max(1),
            acquire_timeout,
        }
    }

    /// Leases a connection, reusing an idle one or opening a new one.
    ///
    /// # Errors
    ///
    /// - `PoolTimeout` if the pool stays full for `acquire_timeout`
    /// - the connector's error if a new connection cannot be opened
    pub fn acquire(self: &Arc<Self>) -> Result<Lease> {
        self.acquire_unless(|| false)
    }

    /// Like [`acquire`](Self::acquire), but gives up with `Cancelled` as soon
    /// as `cancelled` returns `true`. Checked every retry interval while
    /// waiting.
    pub fn acquire_unless(self: &Arc<Self>, cancelled: impl Fn() -> bool) -> Result<Lease> {
        let start = Instant::now();
        let mut inner = self.inner.lock();

        loop {
            if cancelled() {
                return Err(WirecallError::Cancelled);
            }

            if let Some(conn) = inner.idle.pop() {
                inner.leased += 1;
                tracing::debug!(idle = inner.idle.len(), leased = inner.leased, "Reusing pooled connection");
                return Ok(Lease::new(Arc::clone(self), conn));
            }

            if inner.idle.len() + inner.leased < self.max_connections {
                // reserve the slot, then connect without holding the lock
                inner.leased += 1;
                drop(inner);
                return self.open();
            }

            let elapsed = start.elapsed();
            if elapsed >= self.acquire_timeout {
                return Err(WirecallError::PoolTimeout(
                    self.acquire_timeout.as_millis() as u64,
                ));
            }
            let wait = RETRY_INTERVAL.min(self.acquire_timeout - elapsed);
            self.released.wait_for(&mut inner, wait);
        }
    }

    pub fn stats(&self) -> PoolStats {
        let inner = self.inner.lock();
        PoolStats {
            idle: inner.idle.len(),
            leased: inner.leased,
        }
    }

    pub fn max_connections(&self) -> usize {
        self.max_connections
    }

    /// Closes every idle connection.
    pub fn clear_idle(&self) {
        let drained: Vec<_> = self.inner.lock().idle.drain(..).collect();
        if !drained.is_empty() {
            tracing::debug!(closed = drained.len(), "Closed idle connections");
        }
        self.released.notify_all();
    }

    fn open(self: &Arc<Self>) -> Result<Lease> {
        match self.connector.connect() {
            Ok(conn) => Ok(Lease::new(Arc::clone(self), conn)),
            Err(e) => {
                self.inner.lock().leased -= 1;
                self.released.notify_one();
                tracing::warn!(error = %e, "Failed to open connection");
                Err(e)
            }
        }
    }

    fn release(&self, conn: Box<dyn Connection>, broken: bool) {
        let mut inner = self.inner.lock();
        inner.leased -= 1;
        if broken {
            tracing::warn!(leased = inner.leased, "Discarding broken connection");
            drop(conn);
        } else {
            inner.idle.push(conn);
        }
        drop(inner);
        self.released.notify_one();
    }
}

impl fmt::Debug for ConnectionPool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionPool")
            .field("max_connections", &self.max_connections)
            .field("stats", &self.stats())
            .finish()
    }
}

/// Exclusive use of one pooled connection.
///
/// Dropping the lease returns the connection to the pool. Call
/// [`mark_broken`](Self::mark_broken) after a failed or interrupted exchange
/// so the connection is closed instead, since its stream position is no
/// longer known.
pub struct Lease {
    pool: Arc<ConnectionPool>,
    conn: Option<Box<dyn Connection>>,
    broken: bool,
}

impl Lease {
    fn new(pool: Arc<ConnectionPool>, conn: Box<dyn Connection>) -> Self {
        Self {
            pool,
            conn: Some(conn),
            broken: false,
        }
    }

    pub fn send(&mut self, frame: &[u8]) -> Result<()> {
        self.connection()?.send(frame)
    }

    pub fn receive(&mut self) -> Result<Vec<u8>> {
        self.connection()?.receive()
    }

    pub fn abort_handle(&mut self) -> Result<AbortHandle> {
        Ok(self.connection()?.abort_handle())
    }

    pub fn mark_broken(&mut self) {
        self.broken = true;
    }

    pub fn is_broken(&self) -> bool {
        self.broken
    }

    fn connection(&mut self) -> Result<&mut Box<dyn Connection>> {
        self.conn
            .as_mut()
            .ok_or_else(|| WirecallError::Connection("lease already released".to_string()))
    }
}

impl Drop for Lease {
    fn drop(&mut self) {
        if let Some(conn) = self.conn.take() {
            self.pool.release(conn, self.broken);
        }
    }
}
