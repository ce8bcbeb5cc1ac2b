//! Helpers shared by the integration tests.
//!
//! Each test binary compiles this module separately and uses only part of it.

use std::{
    net::SocketAddr,
    path::Path,
    sync::Arc,
    thread,
    time::{Duration, Instant},
};

use femtoship::{
    Archiver, ArchiverConfig, Collector, CollectorConfig, Consistency, Dispatcher,
    DispatcherConfig, EventHandler, LogEvent, Payload,
};

#[allow(dead_code)]
pub fn wait_until(mut condition: impl FnMut() -> bool) {
    let deadline = Instant::now() + Duration::from_secs(10);
    while !condition() {
        assert!(Instant::now() < deadline, "condition not met within 10s");
        thread::sleep(Duration::from_millis(10));
    }
}

/// Collector on an ephemeral loopback port delivering to `handlers`.
#[allow(dead_code)]
pub fn collector_with(handlers: Vec<Arc<dyn EventHandler>>) -> Collector {
    let dispatcher = Dispatcher::new(DispatcherConfig::default()).expect("dispatcher");
    for handler in handlers {
        dispatcher.add_handler(handler);
    }
    let bind = SocketAddr::from(([127, 0, 0, 1], 0));
    Collector::bind(CollectorConfig::new(bind), Arc::new(dispatcher)).expect("bind collector")
}

#[allow(dead_code)]
pub fn archiver(root: &Path) -> Arc<Archiver> {
    Arc::new(Archiver::from_config(ArchiverConfig::new(root)).expect("archiver"))
}

#[allow(dead_code)]
pub fn plain_event(id: u64, message: &str) -> LogEvent {
    LogEvent {
        id,
        timestamp: 1_714_568_400_000,
        level: 40,
        consistency: Consistency::Durable,
        host: "edge-1".into(),
        service: "checkout".into(),
        source: String::new(),
        pid: 1,
        tid: 1,
        kind: "log".into(),
        payloads: vec![Payload::text("message", message)],
    }
}
