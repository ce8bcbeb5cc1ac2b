//! Drain worker fanning queued events out to the handler set.
//!
//! One thread pops events from the bounded queue and calls every registered
//! handler in registration order. On shutdown it drains whatever is still
//! queued, then flushes and closes each handler.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::thread::{self, JoinHandle};

use crossbeam_channel::{Receiver, Sender, TryRecvError, bounded, select};
use log::warn;
use parking_lot::RwLock;

use crate::{event::LogEvent, handler::EventHandler};

pub(crate) type HandlerSet = Arc<RwLock<Vec<Arc<dyn EventHandler>>>>;

/// Messages travelling through the dispatch queue.
pub(crate) enum DispatchCommand {
    Event(Box<LogEvent>),
    /// Answered once every command queued before it has been handled.
    Idle(Sender<()>),
}

pub(crate) struct WorkerParts {
    pub(crate) tx: Sender<DispatchCommand>,
    pub(crate) shutdown_tx: Sender<()>,
    pub(crate) handle: JoinHandle<()>,
}

pub(crate) fn spawn_worker(
    capacity: usize,
    handlers: HandlerSet,
    processed: Arc<AtomicU64>,
) -> WorkerParts {
    let (tx, rx) = bounded(capacity);
    let (shutdown_tx, shutdown_rx) = bounded(1);
    let handle = thread::spawn(move || {
        let worker = DrainWorker {
            handlers,
            processed,
        };
        worker.run(&rx, &shutdown_rx);
    });
    WorkerParts {
        tx,
        shutdown_tx,
        handle,
    }
}

struct DrainWorker {
    handlers: HandlerSet,
    processed: Arc<AtomicU64>,
}

impl DrainWorker {
    fn run(&self, rx: &Receiver<DispatchCommand>, shutdown_rx: &Receiver<()>) {
        loop {
            // Checked before blocking so a saturated queue cannot starve
            // the shutdown branch of `select!`.
            if shutdown_requested(shutdown_rx) {
                break;
            }
            select! {
                recv(shutdown_rx) -> _ => break,
                recv(rx) -> cmd => match cmd {
                    Ok(cmd) => self.process(cmd),
                    Err(_) => break,
                },
            }
        }
        self.drain(rx);
        self.close_handlers();
    }

    fn process(&self, cmd: DispatchCommand) {
        match cmd {
            DispatchCommand::Event(event) => self.fan_out(&event),
            DispatchCommand::Idle(ack) => {
                let _ = ack.send(());
            }
        }
    }

    fn fan_out(&self, event: &LogEvent) {
        for handler in self.handlers.read().iter() {
            if let Err(err) = handler.handle(event) {
                warn!(
                    "Dispatcher: handler {} failed on event {}: {err}",
                    handler.name(),
                    event.id
                );
            }
        }
        self.processed.fetch_add(1, Ordering::Relaxed);
    }

    fn drain(&self, rx: &Receiver<DispatchCommand>) {
        while let Ok(cmd) = rx.try_recv() {
            self.process(cmd);
        }
    }

    fn close_handlers(&self) {
        for handler in self.handlers.read().iter() {
            if !handler.flush() {
                warn!("Dispatcher: handler {} failed to flush", handler.name());
            }
            handler.close();
        }
    }
}

fn shutdown_requested(shutdown_rx: &Receiver<()>) -> bool {
    matches!(
        shutdown_rx.try_recv(),
        Ok(()) | Err(TryRecvError::Disconnected)
    )
}
