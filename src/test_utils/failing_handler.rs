//! Handler that rejects every event.

use std::sync::atomic::{AtomicUsize, Ordering};

use crate::{
    event::LogEvent,
    handler::{EventHandler, HandlerError},
};

#[derive(Default)]
pub struct FailingHandler {
    attempts: AtomicUsize,
}

impl FailingHandler {
    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }
}

impl EventHandler for FailingHandler {
    fn handle(&self, _event: &LogEvent) -> Result<(), HandlerError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        Err(HandlerError::Other("simulated failure".into()))
    }

    fn name(&self) -> &str {
        "failing"
    }
}
