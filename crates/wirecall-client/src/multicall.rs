//! Batched calls.
//!
//! A [`MultiCall`] runs many keyed requests over a few pooled connections.
//! Each worker leases one connection, pipelines up to `pipeline_depth`
//! requests on it and then reads their responses in order. Decoded responses
//! are handed to the caller's [`BatchCallback`] as they arrive, so delivery
//! order follows completion, not insertion.
//!
//! The batch ends with exactly one terminal callback:
//!
//! - `on_complete` once every item has a response or an item-level error
//! - `on_failure` on the first transport failure or on cancellation, with the
//!   responses delivered so far; nothing is delivered after it

use std::collections::{HashSet, VecDeque};
use std::fmt;
use std::hash::Hash;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crossbeam_channel::Sender;
use parking_lot::Mutex;
use wirecall_common::protocol::error::{Result, WirecallError};
use wirecall_common::protocol::{Request, ResponseEnvelope};
use wirecall_common::transform::TypeAdapter;
use wirecall_common::transport::AbortHandle;

use crate::call::Call;
use crate::client::Dispatcher;
use crate::composer::{Arguments, Method};
use crate::pool::Lease;

/// Receives the outcome of a batch.
///
/// The terminal methods take `self`, so at most one of them runs.
pub trait BatchCallback<K, T> {
    /// One item succeeded.
    fn on_response(&mut self, key: &K, value: &T);

    /// One item's exchange succeeded but its response carried a non-zero
    /// code or could not be decoded. The batch carries on.
    fn on_item_error(&mut self, _key: &K, _error: &WirecallError) {}

    /// The batch stopped early on a transport failure or cancellation.
    fn on_failure(self, error: WirecallError, completed: Vec<(K, T)>);

    /// Every item was answered.
    fn on_complete(self, results: BatchResults<K, T>);
}

/// Final tally of a completed batch, in delivery order.
#[derive(Debug)]
pub struct BatchResults<K, T> {
    pub responses: Vec<(K, T)>,
    pub errors: Vec<(K, WirecallError)>,
}

impl<K, T> Default for BatchResults<K, T> {
    fn default() -> Self {
        Self {
            responses: Vec::new(),
            errors: Vec::new(),
        }
    }
}

struct BatchItem<K, T> {
    key: K,
    request: Arc<Request>,
    decoder: Arc<dyn TypeAdapter<T>>,
}

impl<K: Clone, T> Clone for BatchItem<K, T> {
    fn clone(&self) -> Self {
        Self {
            key: self.key.clone(),
            request: Arc::clone(&self.request),
            decoder: Arc::clone(&self.decoder),
        }
    }
}

#[derive(Default)]
struct BatchState {
    started: AtomicBool,
    cancelled: AtomicBool,
    /// Set when the batch is over early, for workers still running
    halted: AtomicBool,
    /// One slot per worker connection; emptied when fired or released
    aborts: Mutex<Vec<Option<AbortHandle>>>,
    /// Last error from a worker that never got a connection
    acquire_error: Mutex<Option<WirecallError>>,
}

impl BatchState {
    fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    fn should_stop(&self) -> bool {
        self.is_cancelled() || self.halted.load(Ordering::SeqCst)
    }

    fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
        self.abort_all();
    }

    fn halt(&self) {
        self.halted.store(true, Ordering::SeqCst);
        self.abort_all();
    }

    fn abort_all(&self) {
        let fired: Vec<_> = self
            .aborts
            .lock()
            .iter_mut()
            .filter_map(Option::take)
            .collect();
        for abort in fired {
            abort.abort();
        }
    }

    /// Registers a worker's connection for interruption. Returns `None`,
    /// after aborting, if the batch is already stopping.
    fn register(&self, abort: AbortHandle) -> Option<usize> {
        let mut aborts = self.aborts.lock();
        if self.should_stop() {
            drop(aborts);
            abort.abort();
            return None;
        }
        aborts.push(Some(abort));
        Some(aborts.len() - 1)
    }

    /// Withdraws a registration. Returns `false` if the abort already fired.
    fn unregister(&self, slot: usize) -> bool {
        self.aborts
            .lock()
            .get_mut(slot)
            .and_then(Option::take)
            .is_some()
    }
}

enum Event<K, T> {
    Response(K, T),
    ItemError(K, WirecallError),
    Failed(WirecallError),
}

/// An ordered set of uniquely keyed calls executed together.
///
/// A batch runs once; [`Clone`] gives an independent, not yet started copy
/// of the same items.
///
/// # Example
///
/// ```rust,no_run
/// use wirecall_client::{BatchCallback, BatchResults, Client, MethodSpec};
/// use wirecall_common::WirecallError;
///
/// struct Print;
///
/// impl BatchCallback<i64, String> for Print {
///     fn on_response(&mut self, key: &i64, value: &String) {
///         println!("{} -> {}", key, value);
///     }
///     fn on_failure(self, error: WirecallError, completed: Vec<(i64, String)>) {
///         eprintln!("stopped after {} responses: {}", completed.len(), error);
///     }
///     fn on_complete(self, results: BatchResults<i64, String>) {
///         println!("{} done", results.responses.len());
///     }
/// }
///
/// let client = Client::connect("127.0.0.1:9090").unwrap();
/// let get_name = client
///     .composer()
///     .compose::<(i64,), String>(MethodSpec::new("get_name").param("user_id"))
///     .unwrap();
///
/// let mut batch = client.multi_call();
/// for id in 1..=100 {
///     batch.add(id, &get_name, (id,)).unwrap();
/// }
/// batch.execute(Print).unwrap();
/// ```
pub struct MultiCall<K, T> {
    dispatcher: Arc<Dispatcher>,
    items: Vec<BatchItem<K, T>>,
    keys: HashSet<K>,
    state: Arc<BatchState>,
}

impl<K, T> MultiCall<K, T>
where
    K: Clone + Eq + Hash + Send + Sync + 'static,
    T: Send + 'static,
{
    pub(crate) fn new(dispatcher: Arc<Dispatcher>) -> Self {
        Self {
            dispatcher,
            items: Vec::new(),
            keys: HashSet::new(),
            state: Arc::new(BatchState::default()),
        }
    }

    /// Adds a call to `method` under `key`.
    ///
    /// # Errors
    ///
    /// `Usage` if `key` is already present or the batch has started;
    /// serialization errors from encoding `args`.
    pub fn add<A: Arguments>(&mut self, key: K, method: &Method<A, T>, args: A) -> Result<&mut Self> {
        self.check_key(&key)?;
        let call = method.call(args)?;
        self.push(key, &call);
        Ok(self)
    }

    /// Adds the request of an existing call under `key`. The call itself is
    /// left untouched.
    pub fn add_call(&mut self, key: K, call: &Call<T>) -> Result<&mut Self> {
        self.check_key(&key)?;
        self.push(key, call);
        Ok(self)
    }

    fn check_key(&self, key: &K) -> Result<()> {
        if self.state.started.load(Ordering::SeqCst) {
            return Err(WirecallError::Usage(
                "cannot add to a batch that has started".to_string(),
            ));
        }
        if self.keys.contains(key) {
            return Err(WirecallError::Usage("duplicate batch key".to_string()));
        }
        Ok(())
    }

    fn push(&mut self, key: K, call: &Call<T>) {
        self.keys.insert(key.clone());
        self.items.push(BatchItem {
            key,
            request: Arc::clone(call.shared_request()),
            decoder: Arc::clone(call.decoder()),
        });
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn contains_key(&self, key: &K) -> bool {
        self.keys.contains(key)
    }

    /// Runs the batch on the calling thread's behalf and returns after the
    /// terminal callback.
    ///
    /// # Errors
    ///
    /// `Usage` if this batch already ran. Every other failure is reported
    /// through `callback`.
    pub fn execute<C: BatchCallback<K, T>>(&self, callback: C) -> Result<()> {
        self.start()?;
        run(&self.dispatcher, self.items.clone(), &self.state, callback);
        Ok(())
    }

    /// Runs the batch on a background thread and returns immediately.
    pub fn enqueue<C>(&self, callback: C) -> Result<BatchHandle>
    where
        C: BatchCallback<K, T> + Send + 'static,
    {
        self.start()?;
        let dispatcher = Arc::clone(&self.dispatcher);
        let items = self.items.clone();
        let state = Arc::clone(&self.state);

        let thread = thread::Builder::new()
            .name("wirecall-batch".to_string())
            .spawn({
                let state = Arc::clone(&state);
                move || run(&dispatcher, items, &state, callback)
            })
            .map_err(|e| WirecallError::Transport(format!("failed to start batch thread: {}", e)))?;

        Ok(BatchHandle {
            cancel: BatchCancelHandle { state },
            thread,
        })
    }

    /// Stops the batch from any thread: no further items are sent, in-flight
    /// exchanges are interrupted and the callback receives `on_failure` with
    /// `Cancelled`. Does nothing once the batch has finished.
    pub fn cancel(&self) {
        self.state.cancel();
    }

    pub fn cancel_handle(&self) -> BatchCancelHandle {
        BatchCancelHandle {
            state: Arc::clone(&self.state),
        }
    }

    fn start(&self) -> Result<()> {
        if self.state.started.swap(true, Ordering::SeqCst) {
            return Err(WirecallError::Usage(
                "batch was already executed; clone it to run again".to_string(),
            ));
        }
        Ok(())
    }
}

impl<K: Clone, T> Clone for MultiCall<K, T>
where
    K: Eq + Hash,
{
    fn clone(&self) -> Self {
        Self {
            dispatcher: Arc::clone(&self.dispatcher),
            items: self.items.clone(),
            keys: self.keys.clone(),
            state: Arc::new(BatchState::default()),
        }
    }
}

impl<K, T> fmt::Debug for MultiCall<K, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MultiCall")
            .field("items", &self.items.len())
            .field("started", &self.state.started.load(Ordering::SeqCst))
            .finish()
    }
}

/// Cancels a running batch from another thread.
#[derive(Clone)]
pub struct BatchCancelHandle {
    state: Arc<BatchState>,
}

impl BatchCancelHandle {
    pub fn cancel(&self) {
        self.state.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.state.is_cancelled()
    }
}

/// A batch running in the background.
pub struct BatchHandle {
    cancel: BatchCancelHandle,
    thread: JoinHandle<()>,
}

impl BatchHandle {
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn cancel_handle(&self) -> BatchCancelHandle {
        self.cancel.clone()
    }

    pub fn is_finished(&self) -> bool {
        self.thread.is_finished()
    }

    /// Waits for the terminal callback to return.
    pub fn join(self) -> Result<()> {
        self.thread
            .join()
            .map_err(|_| WirecallError::Transport("batch thread panicked".to_string()))
    }
}

fn run<K, T, C>(
    dispatcher: &Arc<Dispatcher>,
    items: Vec<BatchItem<K, T>>,
    state: &BatchState,
    mut callback: C,
) where
    K: Send,
    T: Send + 'static,
    C: BatchCallback<K, T>,
{
    let total = items.len();
    let config = dispatcher.config();
    // more workers than the pool holds would only wait on each other
    let workers = config
        .batch_connections
        .min(dispatcher.pool().max_connections())
        .min(total);
    let depth = config.pipeline_depth.max(1);
    tracing::debug!(items = total, workers, depth, "Starting batch");

    let queue = Mutex::new(items.into_iter().collect::<VecDeque<_>>());
    let (tx, rx) = crossbeam_channel::unbounded::<Event<K, T>>();

    let mut completed = Vec::new();
    let mut errors = Vec::new();
    let mut failure = None;

    thread::scope(|scope| {
        for _ in 0..workers {
            let tx = tx.clone();
            let queue = &queue;
            scope.spawn(move || work(dispatcher, queue, depth, state, &tx));
        }
        drop(tx);

        for event in rx.iter() {
            if state.is_cancelled() {
                failure = Some(WirecallError::Cancelled);
                break;
            }
            match event {
                Event::Response(key, value) => {
                    callback.on_response(&key, &value);
                    completed.push((key, value));
                }
                Event::ItemError(key, error) => {
                    callback.on_item_error(&key, &error);
                    errors.push((key, error));
                }
                Event::Failed(error) => {
                    failure = Some(if state.is_cancelled() {
                        WirecallError::Cancelled
                    } else {
                        error
                    });
                    break;
                }
            }
        }

        if failure.is_some() {
            state.halt();
        }
    });

    if failure.is_none() && state.is_cancelled() {
        failure = Some(WirecallError::Cancelled);
    }
    if failure.is_none() && completed.len() + errors.len() < total {
        failure = Some(state.acquire_error.lock().take().unwrap_or_else(|| {
            WirecallError::Transport(format!(
                "batch ended with {} of {} items answered",
                completed.len() + errors.len(),
                total
            ))
        }));
    }
    // later cancels are no-ops
    state.halted.store(true, Ordering::SeqCst);
    state.aborts.lock().clear();

    match failure {
        Some(error) => {
            tracing::warn!(
                completed = completed.len(),
                total,
                error = %error,
                "Batch aborted"
            );
            callback.on_failure(error, completed);
        }
        None => {
            tracing::debug!(responses = completed.len(), errors = errors.len(), "Batch complete");
            callback.on_complete(BatchResults {
                responses: completed,
                errors,
            });
        }
    }
}

/// One batch worker: leases a connection and drains the shared queue in
/// pipelined chunks.
///
/// A worker that cannot get a connection leaves the queue to the others. The
/// batch only fails on it if every worker came back empty-handed.
fn work<K, T: 'static>(
    dispatcher: &Dispatcher,
    queue: &Mutex<VecDeque<BatchItem<K, T>>>,
    depth: usize,
    state: &BatchState,
    tx: &Sender<Event<K, T>>,
) {
    let mut lease = match dispatcher.pool().acquire_unless(|| state.should_stop()) {
        Ok(lease) => lease,
        Err(e) => {
            tracing::debug!(error = %e, "Batch worker found no connection");
            *state.acquire_error.lock() = Some(e);
            return;
        }
    };
    let slot = match lease.abort_handle() {
        Ok(abort) => state.register(abort),
        Err(e) => {
            let _ = tx.send(Event::Failed(e));
            return;
        }
    };
    let Some(slot) = slot else {
        lease.mark_broken();
        let _ = tx.send(Event::Failed(WirecallError::Cancelled));
        return;
    };

    loop {
        if state.should_stop() {
            lease.mark_broken();
            let _ = tx.send(Event::Failed(WirecallError::Cancelled));
            return;
        }

        let chunk: Vec<_> = {
            let mut queue = queue.lock();
            let n = depth.min(queue.len());
            queue.drain(..n).collect()
        };
        if chunk.is_empty() {
            if !state.unregister(slot) {
                lease.mark_broken();
            }
            return;
        }

        if let Err(e) = exchange(&mut lease, chunk, tx) {
            lease.mark_broken();
            let _ = tx.send(Event::Failed(e));
            return;
        }
    }
}

/// Sends every request of `chunk`, then reads the responses in order.
///
/// If a send fails, the requests already written are still answered before
/// the send error is returned.
fn exchange<K, T: 'static>(
    lease: &mut Lease,
    chunk: Vec<BatchItem<K, T>>,
    tx: &Sender<Event<K, T>>,
) -> Result<()> {
    let mut sent = 0;
    let mut outcome = Ok(());
    for item in &chunk {
        if let Err(e) = lease.send(&item.request.to_frame()) {
            outcome = Err(e);
            break;
        }
        sent += 1;
    }
    for item in chunk.into_iter().take(sent) {
        let frame = lease.receive()?;
        let event = match ResponseEnvelope::decode_with(&frame, item.decoder.as_ref()) {
            Ok(value) => Event::Response(item.key, value),
            Err(error) => Event::ItemError(item.key, error),
        };
        if tx.send(event).is_err() {
            // delivery has stopped
            return Err(WirecallError::Cancelled);
        }
    }
    outcome
}
