use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use wirecall_common::protocol::error::{Result, WirecallError};
use wirecall_common::protocol::{Request, ResponseEnvelope};
use wirecall_common::transform::TypeAdapter;
use wirecall_common::transport::AbortHandle;

use crate::client::Dispatcher;

/// A single, not yet executed RPC.
///
/// A `Call` runs at most once: [`execute`](Self::execute) blocks until the
/// response is decoded or the exchange fails, and a second `execute` on the
/// same instance is a usage error. [`Clone`] gives an independent copy of
/// the same request that can run again.
///
/// # Example
///
/// ```rust,no_run
/// # use wirecall_client::Call;
/// # fn run(call: Call<String>) -> wirecall_common::Result<()> {
/// let retry = call.clone();
/// let name = match call.execute() {
///     Ok(name) => name,
///     Err(e) if e.is_transport() => retry.execute()?,
///     Err(e) => return Err(e),
/// };
/// # Ok(())
/// # }
/// ```
pub struct Call<T> {
    request: Arc<Request>,
    decoder: Arc<dyn TypeAdapter<T>>,
    dispatcher: Arc<Dispatcher>,
    state: Arc<CallState>,
}

const OPEN: u8 = 0;
const CANCELLED: u8 = 1;
const COMPLETED: u8 = 2;

/// Cancellation and completion both leave `OPEN` through a compare-exchange,
/// so exactly one of them wins.
#[derive(Default)]
struct CallState {
    executed: AtomicBool,
    phase: AtomicU8,
    abort: Mutex<Option<AbortHandle>>,
}

impl CallState {
    fn is_cancelled(&self) -> bool {
        self.phase.load(Ordering::SeqCst) == CANCELLED
    }

    fn cancel(&self) {
        if self
            .phase
            .compare_exchange(OPEN, CANCELLED, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return;
        }
        if let Some(abort) = self.abort.lock().take() {
            abort.abort();
        }
    }

    /// Returns false if a cancel got there first.
    fn complete(&self) -> bool {
        match self
            .phase
            .compare_exchange(OPEN, COMPLETED, Ordering::SeqCst, Ordering::SeqCst)
        {
            Ok(_) => true,
            Err(phase) => phase == COMPLETED,
        }
    }
}

impl<T: Send + 'static> Call<T> {
    pub(crate) fn new(
        request: Arc<Request>,
        decoder: Arc<dyn TypeAdapter<T>>,
        dispatcher: Arc<Dispatcher>,
    ) -> Self {
        Self {
            request,
            decoder,
            dispatcher,
            state: Arc::new(CallState::default()),
        }
    }

    /// Sends the request and decodes the response, blocking the calling
    /// thread.
    ///
    /// # Errors
    ///
    /// - `Usage` if this instance already ran
    /// - `Cancelled` if [`cancel`](Self::cancel) won the race with completion
    /// - `Application` for a non-zero result code
    /// - transport errors (`Connection`, `Timeout`, `PoolTimeout`, ...) from
    ///   the pool or the connection
    /// - decode errors if the response does not match `T`
    pub fn execute(&self) -> Result<T> {
        if self.state.executed.swap(true, Ordering::SeqCst) {
            return Err(WirecallError::Usage(format!(
                "call to '{}' was already executed; clone it to run again",
                self.request.method()
            )));
        }

        let outcome = self.exchange();
        if !self.state.complete() {
            return Err(WirecallError::Cancelled);
        }
        let frame = outcome?;

        ResponseEnvelope::decode_with(&frame, self.decoder.as_ref())
    }

    fn exchange(&self) -> Result<Vec<u8>> {
        let state = &self.state;
        if state.is_cancelled() {
            return Err(WirecallError::Cancelled);
        }

        let mut lease = self
            .dispatcher
            .pool()
            .acquire_unless(|| state.is_cancelled())?;
        *state.abort.lock() = Some(lease.abort_handle()?);
        if state.is_cancelled() {
            // the abort may already have hit this connection
            lease.mark_broken();
            return Err(WirecallError::Cancelled);
        }

        tracing::debug!(method = self.request.method(), "Dispatching call");
        let result = lease
            .send(&self.request.to_frame())
            .and_then(|_| lease.receive());

        state.abort.lock().take();
        if !state.complete() {
            lease.mark_broken();
            return Err(WirecallError::Cancelled);
        }
        if let Err(e) = &result {
            tracing::debug!(method = self.request.method(), error = %e, "Call failed");
            lease.mark_broken();
        }
        result
    }
}

impl<T> Call<T> {
    /// Cancels the call from any thread.
    ///
    /// Before completion, `execute` fails with `Cancelled` and any in-flight
    /// I/O is interrupted. After completion this does nothing.
    pub fn cancel(&self) {
        self.state.cancel();
    }

    pub fn cancel_handle(&self) -> CancelHandle {
        CancelHandle {
            state: Arc::clone(&self.state),
        }
    }

    pub fn is_executed(&self) -> bool {
        self.state.executed.load(Ordering::SeqCst)
    }

    pub fn is_cancelled(&self) -> bool {
        self.state.is_cancelled()
    }

    pub fn request(&self) -> &Request {
        &self.request
    }

    pub(crate) fn shared_request(&self) -> &Arc<Request> {
        &self.request
    }

    pub(crate) fn decoder(&self) -> &Arc<dyn TypeAdapter<T>> {
        &self.decoder
    }
}

impl<T> Clone for Call<T> {
    fn clone(&self) -> Self {
        Self {
            request: Arc::clone(&self.request),
            decoder: Arc::clone(&self.decoder),
            dispatcher: Arc::clone(&self.dispatcher),
            state: Arc::new(CallState::default()),
        }
    }
}

impl<T> fmt::Debug for Call<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Call")
            .field("method", &self.request.method())
            .field("executed", &self.is_executed())
            .field("cancelled", &self.is_cancelled())
            .finish()
    }
}

/// Cancels one [`Call`] from another thread.
#[derive(Clone)]
pub struct CancelHandle {
    state: Arc<CallState>,
}

impl CancelHandle {
    pub fn cancel(&self) {
        self.state.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.state.is_cancelled()
    }
}

impl fmt::Debug for CancelHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CancelHandle")
            .field("cancelled", &self.is_cancelled())
            .finish()
    }
}
