//! Collector side of the pipeline.
//!
//! A [`Dispatcher`] owns a bounded queue and the drain worker that fans each
//! queued event out to its handlers. Producers hold an [`EventSender`] and
//! block when the queue is full, so a slow handler slows the network readers
//! down instead of losing events. The [`Collector`] accepts TCP connections
//! and feeds decoded events into a dispatcher.

mod config;
mod server;
mod worker;

#[cfg(test)]
mod tests;

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::thread::JoinHandle;
use std::time::Duration;

use crossbeam_channel::{Sender, TrySendError, bounded};
use delegate::delegate;
use log::warn;
use parking_lot::{Mutex, RwLock};
use thiserror::Error;

pub use config::{
    CollectorConfig, DEFAULT_BACKLOG, DEFAULT_COLLECTOR_PORT, DEFAULT_QUEUE_CAPACITY,
    DEFAULT_RECV_BUFFER_SIZE, DispatcherConfig,
};
pub use server::{Collector, CollectorError};

use crate::{config::ConfigError, event::LogEvent, handler::EventHandler};
use worker::{DispatchCommand, HandlerSet, spawn_worker};

/// How long [`Dispatcher::flush`] waits for the queue to go idle.
const IDLE_TIMEOUT: Duration = Duration::from_secs(5);

/// Reasons an event could not be queued.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum EnqueueError {
    #[error("dispatch queue is full")]
    Full,
    #[error("dispatcher has shut down")]
    Closed,
}

/// Cloneable producer handle for a [`Dispatcher`] queue.
#[derive(Clone)]
pub struct EventSender {
    tx: Sender<DispatchCommand>,
    open: Arc<AtomicBool>,
}

impl EventSender {
    /// Queue an event, blocking while the queue is full.
    pub fn enqueue(&self, event: LogEvent) -> Result<(), EnqueueError> {
        if !self.is_open() {
            return Err(EnqueueError::Closed);
        }
        self.tx
            .send(DispatchCommand::Event(Box::new(event)))
            .map_err(|_| EnqueueError::Closed)
    }

    /// Queue an event without blocking.
    pub fn try_enqueue(&self, event: LogEvent) -> Result<(), EnqueueError> {
        if !self.is_open() {
            return Err(EnqueueError::Closed);
        }
        self.tx
            .try_send(DispatchCommand::Event(Box::new(event)))
            .map_err(|err| match err {
                TrySendError::Full(_) => EnqueueError::Full,
                TrySendError::Disconnected(_) => EnqueueError::Closed,
            })
    }

    pub fn is_open(&self) -> bool {
        self.open.load(Ordering::Acquire)
    }

    /// Events currently waiting in the queue.
    pub fn queued(&self) -> usize {
        self.tx.len()
    }
}

impl std::fmt::Debug for EventSender {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventSender")
            .field("open", &self.is_open())
            .field("queued", &self.queued())
            .finish()
    }
}

/// Bounded queue plus drain worker fanning events out to handlers.
pub struct Dispatcher {
    handlers: HandlerSet,
    sender: EventSender,
    shutdown_tx: Mutex<Option<Sender<()>>>,
    handle: Mutex<Option<JoinHandle<()>>>,
    processed: Arc<AtomicU64>,
}

impl Dispatcher {
    pub fn new(config: DispatcherConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        let handlers: HandlerSet = Arc::new(RwLock::new(Vec::new()));
        let processed = Arc::new(AtomicU64::new(0));
        let parts = spawn_worker(config.capacity, Arc::clone(&handlers), Arc::clone(&processed));
        Ok(Self {
            handlers,
            sender: EventSender {
                tx: parts.tx,
                open: Arc::new(AtomicBool::new(true)),
            },
            shutdown_tx: Mutex::new(Some(parts.shutdown_tx)),
            handle: Mutex::new(Some(parts.handle)),
            processed,
        })
    }

    /// Register a handler. Every event is offered to handlers in
    /// registration order.
    pub fn add_handler(&self, handler: Arc<dyn EventHandler>) {
        self.handlers.write().push(handler);
    }

    pub fn handler_names(&self) -> Vec<String> {
        self.handlers
            .read()
            .iter()
            .map(|h| h.name().to_owned())
            .collect()
    }

    pub fn sender(&self) -> EventSender {
        self.sender.clone()
    }

    delegate! {
        to self.sender {
            /// Queue an event, blocking while the queue is full.
            pub fn enqueue(&self, event: LogEvent) -> Result<(), EnqueueError>;
            /// Queue an event without blocking.
            pub fn try_enqueue(&self, event: LogEvent) -> Result<(), EnqueueError>;
            pub fn is_open(&self) -> bool;
        }
    }

    /// Events handed to the handler set so far.
    pub fn processed(&self) -> u64 {
        self.processed.load(Ordering::Relaxed)
    }

    /// Wait for everything queued so far to be handled, then flush every
    /// handler. Returns `false` if the dispatcher is closed, the queue did
    /// not go idle in time, or a handler failed to flush.
    pub fn flush(&self) -> bool {
        if !self.is_open() {
            return false;
        }
        let (ack_tx, ack_rx) = bounded(1);
        if self.sender.tx.send(DispatchCommand::Idle(ack_tx)).is_err()
            || ack_rx.recv_timeout(IDLE_TIMEOUT).is_err()
        {
            return false;
        }
        self.handlers
            .read()
            .iter()
            .fold(true, |ok, h| h.flush() && ok)
    }

    /// Stop accepting events, drain the queue, then flush and close every
    /// handler in registration order.
    ///
    /// Idempotent; also runs on drop.
    pub fn shutdown(&self) {
        self.sender.open.store(false, Ordering::Release);
        if let Some(shutdown_tx) = self.shutdown_tx.lock().take() {
            let _ = shutdown_tx.send(());
        }
        let handle = { self.handle.lock().take() };
        if let Some(handle) = handle
            && handle.join().is_err()
        {
            warn!("Dispatcher: drain worker panicked");
        }
    }
}

impl Drop for Dispatcher {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("handlers", &self.handler_names())
            .field("processed", &self.processed())
            .finish()
    }
}
