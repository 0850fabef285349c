mod support;

use std::sync::Arc;
use std::thread;
use std::time::Duration;

use crossbeam_channel::Sender;
use parking_lot::Mutex;
use serde_json::Value;
use support::{init_tracing, MockServer};
use wirecall_client::{
    BatchCallback, BatchResults, Client, ClientConfig, Method, MethodSpec, PoolStats,
};
use wirecall_common::protocol::ResponseEnvelope;
use wirecall_common::WirecallError;

#[derive(Default)]
struct Log {
    delivered: Vec<(i64, i64)>,
    item_errors: Vec<i64>,
    complete: Option<BatchResults<i64, i64>>,
    failure: Option<(WirecallError, Vec<(i64, i64)>)>,
    terminal_calls: usize,
}

#[derive(Clone, Default)]
struct Recorder(Arc<Mutex<Log>>);

impl BatchCallback<i64, i64> for Recorder {
    fn on_response(&mut self, key: &i64, value: &i64) {
        self.0.lock().delivered.push((*key, *value));
    }

    fn on_item_error(&mut self, key: &i64, _error: &WirecallError) {
        self.0.lock().item_errors.push(*key);
    }

    fn on_failure(self, error: WirecallError, completed: Vec<(i64, i64)>) {
        let mut log = self.0.lock();
        log.terminal_calls += 1;
        log.failure = Some((error, completed));
    }

    fn on_complete(self, results: BatchResults<i64, i64>) {
        let mut log = self.0.lock();
        log.terminal_calls += 1;
        log.complete = Some(results);
    }
}

fn echo_method(client: &Client) -> Method<(i64,), i64> {
    client
        .composer()
        .compose(MethodSpec::new("echo").param("value"))
        .unwrap()
}

#[test]
fn test_batch_completes() {
    init_tracing();
    let server = MockServer::echo();
    let client = server.client(
        ClientConfig::default()
            .with_batch_connections(3)
            .with_pipeline_depth(4),
    );
    let echo = echo_method(&client);

    let mut batch = client.multi_call();
    for i in 0..50 {
        batch.add(i, &echo, (i * 10,)).unwrap();
    }
    assert_eq!(batch.len(), 50);

    let recorder = Recorder::default();
    batch.execute(recorder.clone()).unwrap();

    let log = recorder.0.lock();
    assert_eq!(log.terminal_calls, 1);
    let results = log.complete.as_ref().unwrap();
    assert_eq!(results.responses.len(), 50);
    assert!(results.errors.is_empty());
    for (key, value) in &results.responses {
        assert_eq!(*value, key * 10);
    }
    assert_eq!(log.delivered.len(), 50);
    assert!(server.connects() <= 3);
    assert_eq!(client.pool_stats().leased, 0);
}

#[test]
fn test_item_errors_do_not_stop_the_batch() {
    let server = MockServer::echo();
    let client = server.client(ClientConfig::default().with_batch_connections(1));
    let echo = echo_method(&client);
    let fail = client
        .composer()
        .compose::<(), i64>(MethodSpec::new("fail"))
        .unwrap();

    let mut batch = client.multi_call();
    batch.add(1, &echo, (1,)).unwrap();
    batch.add(2, &fail, ()).unwrap();
    batch.add(3, &echo, (3,)).unwrap();

    let recorder = Recorder::default();
    batch.execute(recorder.clone()).unwrap();

    let log = recorder.0.lock();
    let results = log.complete.as_ref().unwrap();
    assert_eq!(results.responses, vec![(1, 1), (3, 3)]);
    assert_eq!(results.errors.len(), 1);
    assert!(matches!(
        results.errors[0],
        (2, WirecallError::Application { code: 7, .. })
    ));
    assert_eq!(log.item_errors, vec![2]);
}

#[test]
fn test_transport_failure_stops_the_batch() {
    let server = MockServer::echo();
    server.fail_at(4);
    let client = server.client(
        ClientConfig::default()
            .with_batch_connections(1)
            .with_pipeline_depth(1),
    );
    let echo = echo_method(&client);

    let mut batch = client.multi_call();
    for i in 1..=10 {
        batch.add(i, &echo, (i,)).unwrap();
    }
    let recorder = Recorder::default();
    batch.execute(recorder.clone()).unwrap();

    let log = recorder.0.lock();
    assert_eq!(log.terminal_calls, 1);
    assert!(log.complete.is_none());
    let (error, completed) = log.failure.as_ref().unwrap();
    assert!(error.is_transport(), "got {:?}", error);
    assert_eq!(completed, &vec![(1, 1), (2, 2), (3, 3)]);
    assert_eq!(server.sends(), 4);
    assert_eq!(client.pool_stats(), PoolStats::default());
}

#[test]
fn test_send_failure_mid_chunk_keeps_earlier_responses() {
    let server = MockServer::echo();
    server.fail_at(4);
    // default depth puts all ten requests in one pipelined chunk
    let client = server.client(ClientConfig::default().with_batch_connections(1));
    let echo = echo_method(&client);

    let mut batch = client.multi_call();
    for i in 1..=10 {
        batch.add(i, &echo, (i,)).unwrap();
    }
    let recorder = Recorder::default();
    batch.execute(recorder.clone()).unwrap();

    let log = recorder.0.lock();
    assert_eq!(log.terminal_calls, 1);
    let (error, completed) = log.failure.as_ref().unwrap();
    assert!(error.is_transport(), "got {:?}", error);
    assert_eq!(completed, &vec![(1, 1), (2, 2), (3, 3)]);
    assert_eq!(log.delivered, vec![(1, 1), (2, 2), (3, 3)]);
    assert_eq!(client.pool_stats(), PoolStats::default());
}

#[test]
fn test_more_batch_workers_than_pool_slots() {
    let server = MockServer::new(|request| {
        thread::sleep(Duration::from_millis(20));
        ResponseEnvelope::success(request.param("value").cloned().unwrap_or(Value::Null))
    });
    let client = server.client(
        ClientConfig::default()
            .with_max_connections(1)
            .with_batch_connections(2)
            .with_acquire_timeout_ms(50),
    );
    let echo = echo_method(&client);

    let mut batch = client.multi_call();
    for i in 0..10 {
        batch.add(i, &echo, (i,)).unwrap();
    }
    let recorder = Recorder::default();
    batch.execute(recorder.clone()).unwrap();

    let log = recorder.0.lock();
    assert!(log.failure.is_none(), "got {:?}", log.failure.as_ref().map(|f| &f.0));
    assert_eq!(log.complete.as_ref().unwrap().responses.len(), 10);
    assert_eq!(server.connects(), 1);
}

/// Echoes like the default server, except `block` holds its connection
/// until the returned sender fires.
fn gated_server() -> (Arc<MockServer>, Sender<()>) {
    let (release, gate) = crossbeam_channel::bounded::<()>(0);
    let server = MockServer::new(move |request| {
        if request.method == "block" {
            let _ = gate.recv_timeout(Duration::from_secs(10));
        }
        ResponseEnvelope::success(request.param("value").cloned().unwrap_or(Value::Null))
    });
    (server, release)
}

/// Occupies one pool slot from another thread until `release` fires.
fn occupy_slot(client: &Client) -> thread::JoinHandle<wirecall_common::Result<i64>> {
    let block = client
        .composer()
        .compose::<(i64,), i64>(MethodSpec::new("block").param("value"))
        .unwrap();
    let call = block.call((0,)).unwrap();
    let blocked = thread::spawn(move || call.execute());
    while client.pool_stats().leased == 0 {
        thread::sleep(Duration::from_millis(5));
    }
    blocked
}

#[test]
fn test_batch_worker_without_connection_leaves_items_to_others() {
    let (server, release) = gated_server();
    let client = server.client(
        ClientConfig::default()
            .with_max_connections(2)
            .with_batch_connections(2)
            .with_pipeline_depth(1)
            .with_acquire_timeout_ms(50),
    );
    let echo = echo_method(&client);
    let blocked = occupy_slot(&client);

    let mut batch = client.multi_call();
    for i in 1..=5 {
        batch.add(i, &echo, (i,)).unwrap();
    }
    let recorder = Recorder::default();
    batch.execute(recorder.clone()).unwrap();

    {
        let log = recorder.0.lock();
        assert!(log.failure.is_none(), "got {:?}", log.failure.as_ref().map(|f| &f.0));
        assert_eq!(log.complete.as_ref().unwrap().responses.len(), 5);
    }

    release.send(()).unwrap();
    assert_eq!(blocked.join().unwrap().unwrap(), 0);
}

#[test]
fn test_batch_fails_when_no_worker_gets_a_connection() {
    let (server, release) = gated_server();
    let client = server.client(
        ClientConfig::default()
            .with_max_connections(1)
            .with_acquire_timeout_ms(50),
    );
    let echo = echo_method(&client);
    let blocked = occupy_slot(&client);

    let mut batch = client.multi_call();
    batch.add(1, &echo, (1,)).unwrap();
    let recorder = Recorder::default();
    batch.execute(recorder.clone()).unwrap();

    {
        let log = recorder.0.lock();
        assert_eq!(log.terminal_calls, 1);
        let (error, completed) = log.failure.as_ref().unwrap();
        assert!(matches!(error, WirecallError::PoolTimeout(50)), "got {:?}", error);
        assert!(completed.is_empty());
    }

    release.send(()).unwrap();
    assert_eq!(blocked.join().unwrap().unwrap(), 0);
}

#[test]
fn test_cancel_reports_failure() {
    let server = MockServer::echo();
    server.hold(true);
    let client = server.client(ClientConfig::default().with_batch_connections(2));
    let echo = echo_method(&client);

    let mut batch = client.multi_call();
    for i in 0..6 {
        batch.add(i, &echo, (i,)).unwrap();
    }
    let recorder = Recorder::default();
    let handle = batch.enqueue(recorder.clone()).unwrap();
    while server.sends() == 0 {
        thread::sleep(Duration::from_millis(5));
    }
    handle.cancel();
    handle.join().unwrap();

    let log = recorder.0.lock();
    assert_eq!(log.terminal_calls, 1);
    let (error, completed) = log.failure.as_ref().unwrap();
    assert!(error.is_cancelled(), "got {:?}", error);
    assert!(completed.is_empty());
    assert_eq!(client.pool_stats().leased, 0);
}

#[test]
fn test_cancel_before_execute() {
    let server = MockServer::echo();
    let client = server.client(ClientConfig::default());
    let echo = echo_method(&client);

    let mut batch = client.multi_call();
    batch.add(1, &echo, (1,)).unwrap();
    batch.cancel();

    let recorder = Recorder::default();
    batch.execute(recorder.clone()).unwrap();
    let log = recorder.0.lock();
    assert!(log.failure.as_ref().unwrap().0.is_cancelled());
    assert_eq!(server.sends(), 0);
}

#[test]
fn test_duplicate_key_is_rejected() {
    let server = MockServer::echo();
    let client = server.client(ClientConfig::default());
    let echo = echo_method(&client);

    let mut batch = client.multi_call();
    batch.add(1, &echo, (1,)).unwrap();
    let err = batch.add(1, &echo, (2,)).unwrap_err();
    assert!(matches!(err, WirecallError::Usage(_)));
    assert_eq!(batch.len(), 1);
}

#[test]
fn test_batch_runs_once_and_clones_run_again() {
    let server = MockServer::echo();
    let client = server.client(ClientConfig::default());
    let echo = echo_method(&client);

    let mut batch = client.multi_call();
    batch
        .add(1, &echo, (1,))
        .unwrap()
        .add_call(2, &echo.call((2,)).unwrap())
        .unwrap();

    let again = batch.clone();
    batch.execute(Recorder::default()).unwrap();
    assert!(matches!(
        batch.execute(Recorder::default()),
        Err(WirecallError::Usage(_))
    ));
    assert!(matches!(
        batch.add(3, &echo, (3,)),
        Err(WirecallError::Usage(_))
    ));

    let recorder = Recorder::default();
    again.execute(recorder.clone()).unwrap();
    let log = recorder.0.lock();
    assert_eq!(log.complete.as_ref().unwrap().responses.len(), 2);
}

#[test]
fn test_empty_batch_completes() {
    let server = MockServer::echo();
    let client = server.client(ClientConfig::default());
    let batch = client.multi_call::<i64, i64>();

    let recorder = Recorder::default();
    batch.execute(recorder.clone()).unwrap();
    let log = recorder.0.lock();
    assert!(log.complete.as_ref().unwrap().responses.is_empty());
    assert_eq!(server.connects(), 0);
}
