//! Tests for the dispatcher and the collector front end.

use std::{
    io::Write,
    net::{SocketAddr, TcpListener, TcpStream},
    sync::{Arc, mpsc},
    thread,
    time::{Duration, Instant},
};

use parking_lot::Mutex;
use rstest::{fixture, rstest};
use serial_test::serial;

use super::{
    Collector, CollectorConfig, CollectorError, Dispatcher, DispatcherConfig, EnqueueError,
};
use crate::{
    codec::RecordWriter,
    config::ConfigError,
    test_utils::{
        capture_logger::{install_test_logger, warnings_containing},
        collecting_handler::{CollectingHandler, GatedHandler},
        events::sample_event,
        failing_handler::FailingHandler,
    },
    transport::{ClientConfig, TransportClient},
};

fn wait_until(mut condition: impl FnMut() -> bool) {
    let deadline = Instant::now() + Duration::from_secs(5);
    while !condition() {
        assert!(Instant::now() < deadline, "condition not met within 5s");
        thread::sleep(Duration::from_millis(5));
    }
}

fn new_dispatcher() -> Dispatcher {
    Dispatcher::new(DispatcherConfig::default()).expect("default config is valid")
}

#[fixture]
fn dispatcher() -> Dispatcher {
    new_dispatcher()
}

#[rstest]
fn rejects_zero_capacity() {
    let err = Dispatcher::new(DispatcherConfig::default().with_capacity(0))
        .expect_err("zero capacity must fail");
    assert!(matches!(err, ConfigError::Invalid(msg) if msg.contains("capacity")));
}

#[rstest]
fn fans_out_in_registration_order(dispatcher: Dispatcher) {
    let journal = Arc::new(Mutex::new(Vec::new()));
    let first = CollectingHandler::new("first").with_journal(Arc::clone(&journal));
    let second = CollectingHandler::new("second").with_journal(Arc::clone(&journal));
    dispatcher.add_handler(Arc::new(first.clone()));
    dispatcher.add_handler(Arc::new(second.clone()));
    assert_eq!(dispatcher.handler_names(), ["first", "second"]);

    for id in 1..=2 {
        dispatcher
            .enqueue(sample_event(id, 1_000, "fan out"))
            .expect("queued");
    }
    assert!(dispatcher.flush());

    let expected: Vec<(String, u64)> = [("first", 1), ("second", 1), ("first", 2), ("second", 2)]
        .into_iter()
        .map(|(name, id)| (name.to_owned(), id))
        .collect();
    assert_eq!(*journal.lock(), expected);
    assert_eq!(second.ids(), [1, 2]);
    assert_eq!(dispatcher.processed(), 2);
}

#[rstest]
#[serial]
fn failing_handler_does_not_starve_others(dispatcher: Dispatcher) {
    install_test_logger();
    let failing = Arc::new(FailingHandler::default());
    let healthy = CollectingHandler::new("healthy");
    dispatcher.add_handler(failing.clone());
    dispatcher.add_handler(Arc::new(healthy.clone()));

    for id in 1..=3 {
        dispatcher
            .enqueue(sample_event(id, 1_000, "isolated"))
            .expect("queued");
    }
    assert!(dispatcher.flush());

    assert_eq!(healthy.ids(), [1, 2, 3]);
    assert_eq!(failing.attempts(), 3);
    assert_eq!(dispatcher.handler_names(), ["failing", "healthy"]);
    let warnings = warnings_containing("handler failing failed");
    assert_eq!(warnings.len(), 3, "{warnings:?}");
}

#[rstest]
fn full_queue_applies_backpressure() {
    let dispatcher =
        Dispatcher::new(DispatcherConfig::default().with_capacity(1)).expect("valid config");
    let (gated, gate) = GatedHandler::new("gated");
    let collected = gated.collector();
    dispatcher.add_handler(Arc::new(gated));

    dispatcher
        .enqueue(sample_event(1, 1_000, "in handler"))
        .expect("queued");
    assert_eq!(
        gate.entered.recv_timeout(Duration::from_secs(5)),
        Ok(1),
        "worker should pick up the first event"
    );
    dispatcher
        .enqueue(sample_event(2, 1_000, "queued"))
        .expect("queued");
    assert_eq!(
        dispatcher.try_enqueue(sample_event(3, 1_000, "rejected")),
        Err(EnqueueError::Full)
    );

    let sender = dispatcher.sender();
    let (done_tx, done_rx) = mpsc::channel();
    let producer = thread::spawn(move || {
        let result = sender.enqueue(sample_event(3, 1_000, "blocked"));
        done_tx.send(result).expect("report result");
    });
    assert!(
        done_rx.recv_timeout(Duration::from_millis(100)).is_err(),
        "enqueue must block while the queue is full"
    );

    for _ in 0..3 {
        gate.release.send(()).expect("release handler");
    }
    assert_eq!(done_rx.recv_timeout(Duration::from_secs(5)), Ok(Ok(())));
    producer.join().expect("producer thread");
    assert!(dispatcher.flush());
    assert_eq!(collected.ids(), [1, 2, 3]);
}

#[rstest]
fn shutdown_drains_then_closes_handlers(dispatcher: Dispatcher) {
    let handler = CollectingHandler::new("sink");
    dispatcher.add_handler(Arc::new(handler.clone()));
    for id in 0..200 {
        dispatcher
            .enqueue(sample_event(id, 1_000, "drain me"))
            .expect("queued");
    }
    dispatcher.shutdown();

    assert_eq!(handler.ids(), (0..200).collect::<Vec<_>>());
    assert!(handler.flushes() >= 1);
    assert!(handler.is_closed());
}

#[rstest]
fn closed_dispatcher_refuses_events(dispatcher: Dispatcher) {
    let sender = dispatcher.sender();
    dispatcher.shutdown();
    dispatcher.shutdown();
    assert!(!dispatcher.is_open());
    assert!(!dispatcher.flush());
    assert_eq!(
        sender.enqueue(sample_event(1, 1_000, "late")),
        Err(EnqueueError::Closed)
    );
    assert_eq!(
        sender.try_enqueue(sample_event(2, 1_000, "late")),
        Err(EnqueueError::Closed)
    );
}

#[rstest]
fn drop_closes_handlers() {
    let handler = CollectingHandler::new("sink");
    {
        let dispatcher = new_dispatcher();
        dispatcher.add_handler(Arc::new(handler.clone()));
        dispatcher
            .enqueue(sample_event(9, 1_000, "last words"))
            .expect("queued");
    }
    assert_eq!(handler.ids(), [9]);
    assert!(handler.is_closed());
}

fn loopback() -> CollectorConfig {
    CollectorConfig::new(SocketAddr::from(([127, 0, 0, 1], 0)))
}

fn start_collector(handler: &CollectingHandler) -> Collector {
    let dispatcher = Arc::new(new_dispatcher());
    dispatcher.add_handler(Arc::new(handler.clone()));
    Collector::bind(loopback(), dispatcher).expect("bind collector")
}

fn send_events(addr: SocketAddr, ids: impl IntoIterator<Item = u64>) -> TcpStream {
    let stream = TcpStream::connect(addr).expect("connect to collector");
    let mut writer = RecordWriter::new(stream);
    for id in ids {
        writer
            .write(&sample_event(id, 1_000, "over the wire"))
            .expect("write record");
    }
    writer.flush().expect("flush stream");
    writer.into_inner()
}

#[rstest]
fn rejects_invalid_listener_config() {
    let dispatcher = Arc::new(new_dispatcher());
    let err = Collector::bind(loopback().with_backlog(0), dispatcher)
        .expect_err("zero backlog must fail");
    assert!(matches!(err, CollectorError::Config(ConfigError::Invalid(_))));
}

#[rstest]
fn collector_preserves_order_per_connection() {
    let handler = CollectingHandler::new("sink");
    let collector = start_collector(&handler);
    let stream = send_events(collector.local_addr(), 1..=50);
    drop(stream);

    wait_until(|| handler.ids().len() == 50);
    assert_eq!(handler.ids(), (1..=50).collect::<Vec<_>>());
    wait_until(|| collector.active_connections() == 0);
    collector.shutdown();
    assert!(handler.is_closed());
}

#[rstest]
#[serial]
fn malformed_frame_only_ends_its_connection() {
    install_test_logger();
    let handler = CollectingHandler::new("sink");
    let collector = start_collector(&handler);
    let addr = collector.local_addr();

    let mut bad = TcpStream::connect(addr).expect("connect to collector");
    bad.write_all(&[0x02, 0xc1, 0xc1]).expect("write garbage");
    bad.flush().expect("flush garbage");

    let good = send_events(addr, [10, 11]);
    wait_until(|| handler.ids().len() == 2);
    wait_until(|| collector.active_connections() == 1);
    assert_eq!(handler.ids(), [10, 11]);
    assert!(!warnings_containing("Collector: dropping connection").is_empty());

    drop(good);
    collector.shutdown();
}

#[rstest]
fn shutdown_closes_live_connections() {
    let handler = CollectingHandler::new("sink");
    let collector = start_collector(&handler);
    let idle = send_events(collector.local_addr(), [1]);
    wait_until(|| handler.ids().len() == 1);
    assert_eq!(collector.active_connections(), 1);

    let started = Instant::now();
    collector.shutdown();
    assert!(started.elapsed() < Duration::from_secs(2));
    assert_eq!(collector.active_connections(), 0);
    assert!(handler.is_closed());
    assert!(!collector.dispatcher().is_open());
    drop(idle);
}

#[rstest]
#[serial]
fn idle_forwarder_flushes_and_closes_quietly(dispatcher: Dispatcher) {
    install_test_logger();
    let vacant = TcpListener::bind(("127.0.0.1", 0))
        .and_then(|listener| listener.local_addr())
        .expect("reserve a port");
    let forwarder = TransportClient::new(ClientConfig::new(vacant)).expect("client starts");
    dispatcher.add_handler(Arc::new(forwarder));

    assert!(dispatcher.flush());
    dispatcher.shutdown();
    let warnings = warnings_containing("handler forwarder failed to flush");
    assert!(warnings.is_empty(), "{warnings:?}");
}
