mod support;

use std::thread;
use std::time::{Duration, Instant};

use serde_json::json;
use support::{init_tracing, MockServer};
use wirecall_client::{ClientConfig, MethodSpec, PoolStats};
use wirecall_common::protocol::Request;
use wirecall_common::WirecallError;

#[test]
fn test_execute_roundtrip() {
    init_tracing();
    let server = MockServer::echo();
    let client = server.client(ClientConfig::default());
    let echo = client
        .composer()
        .compose::<(String,), String>(MethodSpec::new("echo").param("value"))
        .unwrap();

    let call = echo.call(("hello".to_string(),)).unwrap();
    assert!(!call.is_executed());
    assert_eq!(call.execute().unwrap(), "hello");
    assert!(call.is_executed());

    let received = server.received();
    assert_eq!(received.len(), 1);
    assert_eq!(received[0].method, "echo");
    assert_eq!(received[0].param("value"), Some(&json!("hello")));
    assert_eq!(client.pool_stats(), PoolStats { idle: 1, leased: 0 });
}

#[test]
fn test_connections_are_reused() {
    let server = MockServer::echo();
    let client = server.client(ClientConfig::default());
    let echo = client
        .composer()
        .compose::<(i64,), i64>(MethodSpec::new("echo").param("value"))
        .unwrap();

    for i in 0..5 {
        assert_eq!(echo.call((i,)).unwrap().execute().unwrap(), i);
    }
    assert_eq!(server.connects(), 1);
}

#[test]
fn test_second_execute_is_usage_error() {
    let server = MockServer::echo();
    let client = server.client(ClientConfig::default());
    let call = client
        .call::<String>(Request::new("ping", |_| Ok(())).unwrap())
        .unwrap();

    assert_eq!(call.execute().unwrap(), "ping");
    let err = call.execute().unwrap_err();
    assert!(matches!(err, WirecallError::Usage(_)), "got {:?}", err);
    assert_eq!(server.sends(), 1);
}

#[test]
fn test_clone_runs_independently() {
    let server = MockServer::echo();
    let client = server.client(ClientConfig::default());
    let call = client
        .call::<String>(Request::new("ping", |_| Ok(())).unwrap())
        .unwrap();

    let retry = call.clone();
    call.execute().unwrap();
    assert!(!retry.is_executed());
    assert_eq!(retry.execute().unwrap(), "ping");
    assert_eq!(server.sends(), 2);
}

#[test]
fn test_cancel_before_execute() {
    let server = MockServer::echo();
    let client = server.client(ClientConfig::default());
    let call = client
        .call::<String>(Request::new("ping", |_| Ok(())).unwrap())
        .unwrap();

    call.cancel();
    assert!(call.execute().unwrap_err().is_cancelled());
    assert_eq!(server.connects(), 0);
    assert_eq!(client.pool_stats(), PoolStats::default());
}

#[test]
fn test_cancel_interrupts_in_flight_call() {
    init_tracing();
    let server = MockServer::echo();
    server.hold(true);
    let client = server.client(ClientConfig::default());
    let call = client
        .call::<String>(Request::new("slow", |_| Ok(())).unwrap())
        .unwrap();
    let cancel = call.cancel_handle();

    let started = Instant::now();
    let worker = thread::spawn(move || call.execute());
    while server.sends() == 0 {
        thread::sleep(Duration::from_millis(5));
    }
    cancel.cancel();

    let err = worker.join().unwrap().unwrap_err();
    assert!(err.is_cancelled(), "got {:?}", err);
    assert!(started.elapsed() < Duration::from_secs(5));
    // the interrupted connection is discarded, not pooled
    assert_eq!(client.pool_stats(), PoolStats::default());
}

#[test]
fn test_cancel_after_completion_is_noop() {
    let server = MockServer::echo();
    let client = server.client(ClientConfig::default());
    let call = client
        .call::<String>(Request::new("ping", |_| Ok(())).unwrap())
        .unwrap();

    call.execute().unwrap();
    call.cancel();
    assert!(!call.is_cancelled());
    assert_eq!(client.pool_stats(), PoolStats { idle: 1, leased: 0 });
}

#[test]
fn test_cancel_racing_execute_has_one_outcome() {
    let server = MockServer::echo();
    let client = server.client(ClientConfig::default());
    let echo = client
        .composer()
        .compose::<(i64,), i64>(MethodSpec::new("echo").param("value"))
        .unwrap();

    for i in 0..100 {
        let call = echo.call((i,)).unwrap();
        let cancel = call.cancel_handle();
        let canceller = thread::spawn(move || cancel.cancel());
        let result = call.execute();
        canceller.join().unwrap();
        match result {
            Ok(value) => {
                assert_eq!(value, i);
                assert!(!call.is_cancelled());
            }
            Err(e) => {
                assert!(e.is_cancelled(), "got {:?}", e);
                assert!(call.is_cancelled());
            }
        }
    }
    assert_eq!(client.pool_stats().leased, 0);
}

#[test]
fn test_application_error_keeps_connection() {
    let server = MockServer::echo();
    let client = server.client(ClientConfig::default());
    let fail = client
        .composer()
        .compose::<(), String>(MethodSpec::new("fail"))
        .unwrap();

    match fail.call(()).unwrap().execute() {
        Err(WirecallError::Application { code, message }) => {
            assert_eq!(code, 7);
            assert_eq!(message, "rejected");
        }
        other => panic!("expected application error, got {:?}", other),
    }
    assert_eq!(client.pool_stats(), PoolStats { idle: 1, leased: 0 });
}

#[test]
fn test_transport_error_discards_connection() {
    let server = MockServer::echo();
    server.fail_at(1);
    let client = server.client(ClientConfig::default());
    let call = client
        .call::<String>(Request::new("ping", |_| Ok(())).unwrap())
        .unwrap();

    let err = call.execute().unwrap_err();
    assert!(err.is_transport(), "got {:?}", err);
    assert_eq!(client.pool_stats(), PoolStats::default());

    assert_eq!(call.clone().execute().unwrap(), "ping");
    assert_eq!(server.connects(), 2);
}

#[test]
fn test_payload_is_sent_after_stream() {
    let server = MockServer::echo();
    let client = server.client(ClientConfig::default());
    let upload = client
        .composer()
        .compose::<(String,), i64>(MethodSpec::new("payload_size").param("file_name"))
        .unwrap();

    let call = upload
        .call_with_payload(("a.bin".to_string(),), vec![0xAB; 300])
        .unwrap();
    assert_eq!(call.execute().unwrap(), 300);

    let received = server.received();
    assert_eq!(received[0].method, "payloadSize");
    assert_eq!(received[0].param("fileName"), Some(&json!("a.bin")));
    assert_eq!(received[0].payload, vec![0xAB; 300]);
}

#[test]
fn test_pool_timeout_when_exhausted() {
    let server = MockServer::echo();
    server.hold(true);
    let client = server.client(
        ClientConfig::default()
            .with_max_connections(1)
            .with_acquire_timeout_ms(50),
    );
    let slow = client
        .call::<String>(Request::new("slow", |_| Ok(())).unwrap())
        .unwrap();
    let cancel = slow.cancel_handle();
    let worker = thread::spawn(move || slow.execute());
    while server.sends() == 0 {
        thread::sleep(Duration::from_millis(5));
    }

    let blocked = client
        .call::<String>(Request::new("ping", |_| Ok(())).unwrap())
        .unwrap();
    assert!(matches!(
        blocked.execute().unwrap_err(),
        WirecallError::PoolTimeout(50)
    ));

    cancel.cancel();
    assert!(worker.join().unwrap().is_err());
}
