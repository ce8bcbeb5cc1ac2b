//! Handlers that record what they receive for test assertions.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use crossbeam_channel::{Receiver, Sender, unbounded};
use parking_lot::Mutex;

use crate::{
    event::LogEvent,
    handler::{EventHandler, HandlerError},
};

/// Handler that stores every event it receives for later inspection.
#[derive(Clone)]
pub struct CollectingHandler {
    name: String,
    events: Arc<Mutex<Vec<LogEvent>>>,
    flushes: Arc<AtomicUsize>,
    closed: Arc<AtomicBool>,
    /// Shared log of `(handler, event id)` across handlers.
    journal: Option<Arc<Mutex<Vec<(String, u64)>>>>,
}

impl CollectingHandler {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_owned(),
            events: Arc::default(),
            flushes: Arc::default(),
            closed: Arc::default(),
            journal: None,
        }
    }

    /// Also append `(name, id)` to `journal` so tests can assert the order in
    /// which several handlers saw events.
    pub fn with_journal(mut self, journal: Arc<Mutex<Vec<(String, u64)>>>) -> Self {
        self.journal = Some(journal);
        self
    }

    pub fn ids(&self) -> Vec<u64> {
        self.events.lock().iter().map(|e| e.id).collect()
    }

    pub fn flushes(&self) -> usize {
        self.flushes.load(Ordering::SeqCst)
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

impl EventHandler for CollectingHandler {
    fn handle(&self, event: &LogEvent) -> Result<(), HandlerError> {
        if let Some(journal) = &self.journal {
            journal.lock().push((self.name.clone(), event.id));
        }
        self.events.lock().push(event.clone());
        Ok(())
    }

    fn flush(&self) -> bool {
        self.flushes.fetch_add(1, Ordering::SeqCst);
        true
    }

    fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }

    fn name(&self) -> &str {
        &self.name
    }
}

/// Handler that blocks in `handle` until the test releases it.
pub struct GatedHandler {
    inner: CollectingHandler,
    gate: Receiver<()>,
    entered: Sender<u64>,
}

/// Test-side controls for a [`GatedHandler`].
pub struct Gate {
    /// Lets one pending `handle` call proceed per message.
    pub release: Sender<()>,
    /// Receives the id of each event as `handle` starts waiting on it.
    pub entered: Receiver<u64>,
}

impl GatedHandler {
    pub fn new(name: &str) -> (Self, Gate) {
        let (release, gate) = unbounded();
        let (entered_tx, entered) = unbounded();
        let handler = Self {
            inner: CollectingHandler::new(name),
            gate,
            entered: entered_tx,
        };
        (handler, Gate { release, entered })
    }

    pub fn collector(&self) -> CollectingHandler {
        self.inner.clone()
    }
}

impl EventHandler for GatedHandler {
    fn handle(&self, event: &LogEvent) -> Result<(), HandlerError> {
        let _ = self.entered.send(event.id);
        self.gate.recv().map_err(|_| HandlerError::Closed)?;
        self.inner.handle(event)
    }

    fn name(&self) -> &str {
        self.inner.name()
    }
}
