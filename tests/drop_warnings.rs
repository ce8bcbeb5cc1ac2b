//! Dropped events surface as a warning through the `log` facade.
//!
//! `logtest` installs a process-wide logger, so this file holds one test.

mod common;

use std::{net::TcpListener, time::Duration};

use femtoship::{BackoffPolicy, ClientConfig, ClientError, OverflowPolicy, TransportClient};
use logtest::Logger;

use common::plain_event;

#[test]
fn full_queue_drop_is_reported() {
    let mut logger = Logger::start();
    let listener = TcpListener::bind(("127.0.0.1", 0)).expect("bind");
    let addr = listener.local_addr().expect("addr");
    drop(listener);

    let config = ClientConfig::new(addr)
        .with_name("relay")
        .with_capacity(1)
        .with_overflow_policy(OverflowPolicy::Drop)
        .with_backoff(BackoffPolicy {
            initial: Duration::from_secs(10),
            max: Duration::from_secs(10),
            reset_after: Duration::from_secs(30),
        });
    let client = TransportClient::new(config).expect("client");

    let results: Vec<_> = (0..50)
        .map(|id| client.send(plain_event(id, "overflow")))
        .collect();
    assert!(results.contains(&Err(ClientError::QueueFull)));
    client.close();

    let mut found = false;
    while let Some(record) = logger.pop() {
        if record.level() == log::Level::Warn
            && record.args().contains("relay: dropped")
            && record.args().contains("client queue is full")
        {
            found = true;
        }
    }
    assert!(found, "expected a drop warning");
}
