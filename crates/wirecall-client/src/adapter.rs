//! Call adapters.
//!
//! A [`CallAdapter`] turns a composed method's raw [`Call`] into another
//! return type. Factories are asked in registration order when a method is
//! composed with [`Composer::compose_adapted`](crate::Composer::compose_adapted);
//! the first one that recognizes the [`ReturnShape`] wins.
//!
//! The built-in [`FutureCallAdapter`] produces cold futures: nothing touches
//! the network until the future is first polled, each run executes a fresh
//! clone of the call, and dropping or cancelling the future cancels the
//! underlying call.

use std::any::Any;
use std::fmt;
use std::future::{Future, IntoFuture};
use std::hash::Hash;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::task::{Context, Poll};

use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use wirecall_common::protocol::error::{Result, WirecallError};
use wirecall_common::transform::{TypeKey, Wire};

use crate::call::{Call, CancelHandle};
use crate::multicall::{BatchCallback, BatchCancelHandle, BatchResults, MultiCall};

/// Identifies an adapted return type: the adapter family it belongs to and
/// the type its calls decode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ReturnShape {
    pub family: TypeKey,
    pub element: TypeKey,
}

impl ReturnShape {
    pub fn of<Family: 'static, Element: 'static>() -> Self {
        Self {
            family: TypeKey::of::<Family>(),
            element: TypeKey::of::<Element>(),
        }
    }

    pub fn is_family<Family: 'static>(&self) -> bool {
        self.family.is::<Family>()
    }
}

/// Converts calls into some other return type.
pub trait CallAdapter: Send + Sync + 'static {
    fn into_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync>;
}

/// Supplies [`CallAdapter`]s for the return shapes it recognizes.
pub trait CallAdapterFactory: Send + Sync + 'static {
    fn get(&self, shape: &ReturnShape) -> Option<Arc<dyn CallAdapter>>;
}

/// A return type produced from a [`Call`] by a [`CallAdapter`].
pub trait AdaptedReturn: Sized + 'static {
    /// The decoded response type.
    type Element: Wire;

    /// The adapter that builds `Self`.
    type Adapter: CallAdapter;

    fn shape() -> ReturnShape;

    fn adapt(call: Call<Self::Element>, adapter: &Self::Adapter) -> Result<Self>;
}

/// Marker for the built-in future family.
pub enum Futures {}

/// Adapts calls into [`CallFuture`]s and batches into [`BatchFuture`]s.
#[derive(Debug, Default, Clone, Copy)]
pub struct FutureCallAdapter;

impl FutureCallAdapter {
    pub fn adapt<T: Send + 'static>(&self, call: Call<T>) -> CallFuture<T> {
        CallFuture::new(call)
    }

    pub fn adapt_batch<K, T>(&self, batch: MultiCall<K, T>) -> BatchFuture<K, T>
    where
        K: Clone + Eq + Hash + Send + Sync + 'static,
        T: Send + 'static,
    {
        BatchFuture::new(batch)
    }
}

impl CallAdapter for FutureCallAdapter {
    fn into_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync> {
        self
    }
}

/// Registered on every client after user factories.
#[derive(Debug, Default, Clone, Copy)]
pub struct FutureCallAdapterFactory;

impl CallAdapterFactory for FutureCallAdapterFactory {
    fn get(&self, shape: &ReturnShape) -> Option<Arc<dyn CallAdapter>> {
        shape
            .is_family::<Futures>()
            .then(|| Arc::new(FutureCallAdapter) as Arc<dyn CallAdapter>)
    }
}

/// A lazily started call.
///
/// The first poll runs a clone of the call on tokio's blocking pool, so it
/// must be polled inside a tokio runtime. Dropping the future before it
/// resolves cancels the call and returns its connection to the pool.
#[must_use = "futures do nothing unless polled"]
pub struct CallFuture<T> {
    call: Call<T>,
    running: Option<Running<T>>,
    cancelled: AtomicBool,
    finished: bool,
}

struct Running<T> {
    task: JoinHandle<Result<T>>,
    cancel: CancelHandle,
}

impl<T: Send + 'static> CallFuture<T> {
    fn new(call: Call<T>) -> Self {
        Self {
            call,
            running: None,
            cancelled: AtomicBool::new(false),
            finished: false,
        }
    }

    /// Cancels the call, before or during its run.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
        if let Some(running) = &self.running {
            running.cancel.cancel();
        }
    }

    pub fn is_started(&self) -> bool {
        self.running.is_some()
    }
}

impl<T: Send + 'static> Future for CallFuture<T> {
    type Output = Result<T>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();
        if this.finished {
            return Poll::Ready(Err(WirecallError::Usage(
                "call future polled after completion".to_string(),
            )));
        }

        if this.running.is_none() {
            if this.cancelled.load(Ordering::SeqCst) || this.call.is_cancelled() {
                this.finished = true;
                return Poll::Ready(Err(WirecallError::Cancelled));
            }
            let call = this.call.clone();
            let cancel = call.cancel_handle();
            tracing::debug!(method = call.request().method(), "Starting adapted call");
            let task = tokio::task::spawn_blocking(move || call.execute());
            this.running = Some(Running { task, cancel });
        }

        let Some(running) = this.running.as_mut() else {
            return Poll::Pending;
        };
        match Pin::new(&mut running.task).poll(cx) {
            Poll::Ready(outcome) => {
                this.finished = true;
                Poll::Ready(outcome.unwrap_or_else(|e| {
                    Err(WirecallError::Transport(format!("call task failed: {}", e)))
                }))
            }
            Poll::Pending => Poll::Pending,
        }
    }
}

impl<T> Drop for CallFuture<T> {
    fn drop(&mut self) {
        if self.finished {
            return;
        }
        if let Some(running) = &self.running {
            running.cancel.cancel();
        }
    }
}

impl<T> fmt::Debug for CallFuture<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CallFuture")
            .field("call", &self.call)
            .field("started", &self.running.is_some())
            .field("finished", &self.finished)
            .finish()
    }
}

impl<T: Wire> AdaptedReturn for CallFuture<T> {
    type Element = T;
    type Adapter = FutureCallAdapter;

    fn shape() -> ReturnShape {
        ReturnShape::of::<Futures, T>()
    }

    fn adapt(call: Call<T>, adapter: &FutureCallAdapter) -> Result<Self> {
        Ok(adapter.adapt(call))
    }
}

/// A batch that stopped before every item was answered.
#[derive(Debug)]
pub struct BatchFailure<K, T> {
    pub error: WirecallError,
    pub completed: Vec<(K, T)>,
}

impl<K, T> fmt::Display for BatchFailure<K, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "batch failed after {} responses: {}",
            self.completed.len(),
            self.error
        )
    }
}

/// What a [`BatchFuture`] resolves to.
pub type BatchOutcome<K, T> = std::result::Result<BatchResults<K, T>, BatchFailure<K, T>>;

struct ChannelCallback<K, T> {
    tx: oneshot::Sender<BatchOutcome<K, T>>,
}

impl<K, T> BatchCallback<K, T> for ChannelCallback<K, T> {
    fn on_response(&mut self, _key: &K, _value: &T) {}

    fn on_failure(self, error: WirecallError, completed: Vec<(K, T)>) {
        let _ = self.tx.send(Err(BatchFailure { error, completed }));
    }

    fn on_complete(self, results: BatchResults<K, T>) {
        let _ = self.tx.send(Ok(results));
    }
}

/// A lazily started batch resolving to its results.
///
/// The first poll enqueues a clone of the batch on a background thread.
/// Dropping the future before it resolves cancels the batch.
#[must_use = "futures do nothing unless polled"]
pub struct BatchFuture<K, T> {
    batch: MultiCall<K, T>,
    running: Option<(oneshot::Receiver<BatchOutcome<K, T>>, BatchCancelHandle)>,
    finished: bool,
}

impl<K, T> BatchFuture<K, T>
where
    K: Clone + Eq + Hash + Send + Sync + 'static,
    T: Send + 'static,
{
    fn new(batch: MultiCall<K, T>) -> Self {
        Self {
            batch,
            running: None,
            finished: false,
        }
    }

    pub fn cancel(&self) {
        match &self.running {
            Some((_, cancel)) => cancel.cancel(),
            None => self.batch.cancel(),
        }
    }
}

impl<K, T> Future for BatchFuture<K, T>
where
    K: Clone + Eq + Hash + Send + Sync + 'static,
    T: Send + 'static,
{
    type Output = BatchOutcome<K, T>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();
        if this.finished {
            return Poll::Ready(Err(BatchFailure {
                error: WirecallError::Usage("batch future polled after completion".to_string()),
                completed: Vec::new(),
            }));
        }

        if this.running.is_none() {
            // a cancel before the first poll is recorded on the template
            let cancelled_early = this.batch.cancel_handle().is_cancelled();
            let run = this.batch.clone();
            let (tx, rx) = oneshot::channel();
            let cancel = run.cancel_handle();
            if cancelled_early {
                cancel.cancel();
            }
            if let Err(error) = run.enqueue(ChannelCallback { tx }) {
                this.finished = true;
                return Poll::Ready(Err(BatchFailure {
                    error,
                    completed: Vec::new(),
                }));
            }
            this.running = Some((rx, cancel));
        }

        let Some((rx, _)) = this.running.as_mut() else {
            return Poll::Pending;
        };
        match Pin::new(rx).poll(cx) {
            Poll::Ready(outcome) => {
                this.finished = true;
                Poll::Ready(outcome.unwrap_or_else(|_| {
                    Err(BatchFailure {
                        error: WirecallError::Transport(
                            "batch ended without a result".to_string(),
                        ),
                        completed: Vec::new(),
                    })
                }))
            }
            Poll::Pending => Poll::Pending,
        }
    }
}

impl<K, T> Drop for BatchFuture<K, T> {
    fn drop(&mut self) {
        if self.finished {
            return;
        }
        if let Some((_, cancel)) = &self.running {
            cancel.cancel();
        }
    }
}

impl<K, T> Unpin for BatchFuture<K, T> {}

impl<T: Send + 'static> IntoFuture for Call<T> {
    type Output = Result<T>;
    type IntoFuture = CallFuture<T>;

    fn into_future(self) -> CallFuture<T> {
        FutureCallAdapter.adapt(self)
    }
}

impl<K, T> IntoFuture for MultiCall<K, T>
where
    K: Clone + Eq + Hash + Send + Sync + 'static,
    T: Send + 'static,
{
    type Output = BatchOutcome<K, T>;
    type IntoFuture = BatchFuture<K, T>;

    fn into_future(self) -> BatchFuture<K, T> {
        FutureCallAdapter.adapt_batch(self)
    }
}
