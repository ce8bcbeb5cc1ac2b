//! Ready-made events for tests.

use bytes::Bytes;

use crate::event::{Consistency, LogEvent, Payload};

/// Event with fixed process details and a single text payload.
pub fn sample_event(id: u64, timestamp: u64, message: &str) -> LogEvent {
    LogEvent {
        id,
        timestamp,
        level: 20,
        consistency: Consistency::BestEffort,
        host: "test-host".into(),
        service: "test-service".into(),
        source: "tests.rs:1".into(),
        pid: 4242,
        tid: 7,
        kind: "log".into(),
        payloads: vec![Payload::text("message", message)],
    }
}

/// Event carrying a binary payload of `size` bytes after the message.
pub fn sized_event(id: u64, timestamp: u64, size: usize) -> LogEvent {
    let mut event = sample_event(id, timestamp, "sized");
    event
        .payloads
        .push(Payload::new("blob", Bytes::from(vec![0xAB; size])));
    event
}
