//! In-memory endpoint shared by the client integration tests.
#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::{Condvar, Mutex};
use serde_json::{json, Value};
use tracing_subscriber::EnvFilter;
use wirecall_client::{Client, ClientConfig};
use wirecall_common::protocol::{ReceivedRequest, ResponseEnvelope};
use wirecall_common::transport::{AbortHandle, Connection, Connector};
use wirecall_common::{Result, WirecallError};

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

type Handler = dyn Fn(&ReceivedRequest) -> ResponseEnvelope + Send + Sync;

/// Scripted server behaviour, shared by every connection it hands out.
pub struct MockServer {
    handler: Box<Handler>,
    connects: AtomicUsize,
    sends: AtomicUsize,
    /// 1-based send number that fails with a connection error
    fail_at: Mutex<Option<usize>>,
    /// Receives block until aborted while set
    hold: Mutex<bool>,
    received: Mutex<Vec<ReceivedRequest>>,
}

impl MockServer {
    pub fn new(handler: impl Fn(&ReceivedRequest) -> ResponseEnvelope + Send + Sync + 'static) -> Arc<Self> {
        Arc::new(Self {
            handler: Box::new(handler),
            connects: AtomicUsize::new(0),
            sends: AtomicUsize::new(0),
            fail_at: Mutex::new(None),
            hold: Mutex::new(false),
            received: Mutex::new(Vec::new()),
        })
    }

    /// Answers `echo` with its `value` parameter, `fail` with code 7 and
    /// everything else with the method name.
    pub fn echo() -> Arc<Self> {
        Self::new(|request| match request.method.as_str() {
            "echo" => ResponseEnvelope::success(request.param("value").cloned().unwrap_or(Value::Null)),
            "fail" => ResponseEnvelope::failure(7, "rejected"),
            "payloadSize" => ResponseEnvelope::success(json!(request.payload.len())),
            other => ResponseEnvelope::success(json!(other)),
        })
    }

    pub fn client(self: &Arc<Self>, config: ClientConfig) -> Client {
        Client::builder()
            .connector(MockConnector(Arc::clone(self)))
            .config(config)
            .build()
            .unwrap()
    }

    pub fn fail_at(&self, send: usize) {
        *self.fail_at.lock() = Some(send);
    }

    pub fn hold(&self, hold: bool) {
        *self.hold.lock() = hold;
    }

    pub fn connects(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }

    pub fn sends(&self) -> usize {
        self.sends.load(Ordering::SeqCst)
    }

    pub fn received(&self) -> Vec<ReceivedRequest> {
        self.received.lock().clone()
    }
}

pub struct MockConnector(pub Arc<MockServer>);

impl Connector for MockConnector {
    fn connect(&self) -> Result<Box<dyn Connection>> {
        self.0.connects.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(MockConnection {
            server: Arc::clone(&self.0),
            pending: VecDeque::new(),
            aborted: Arc::new((Mutex::new(false), Condvar::new())),
        }))
    }
}

struct MockConnection {
    server: Arc<MockServer>,
    pending: VecDeque<Vec<u8>>,
    aborted: Arc<(Mutex<bool>, Condvar)>,
}

impl MockConnection {
    fn check_aborted(&self) -> Result<()> {
        if *self.aborted.0.lock() {
            return Err(WirecallError::Connection("connection aborted".to_string()));
        }
        Ok(())
    }
}

impl Connection for MockConnection {
    fn send(&mut self, frame: &[u8]) -> Result<()> {
        self.check_aborted()?;
        let n = self.server.sends.fetch_add(1, Ordering::SeqCst) + 1;
        if *self.server.fail_at.lock() == Some(n) {
            return Err(WirecallError::Connection("connection reset by peer".to_string()));
        }

        let request = ReceivedRequest::decode(frame)?;
        let response = (self.server.handler)(&request);
        self.server.received.lock().push(request);
        self.pending.push_back(response.encode()?);
        Ok(())
    }

    fn receive(&mut self) -> Result<Vec<u8>> {
        if *self.server.hold.lock() {
            let (aborted, signal) = &*self.aborted;
            let mut aborted = aborted.lock();
            if !*aborted {
                signal.wait_for(&mut aborted, Duration::from_secs(10));
            }
        }
        self.check_aborted()?;
        self.pending
            .pop_front()
            .ok_or_else(|| WirecallError::Connection("no response pending".to_string()))
    }

    fn abort_handle(&self) -> AbortHandle {
        let aborted = Arc::clone(&self.aborted);
        AbortHandle::new(move || {
            let (flag, signal) = &*aborted;
            *flag.lock() = true;
            signal.notify_all();
        })
    }
}
