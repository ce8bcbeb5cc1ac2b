//! Worker thread driving the collector connection.
//!
//! The worker owns the socket. It frames each queued event, connects on
//! demand and, when a connect or write fails, sleeps for the delay chosen by
//! the [`ReconnectDelayManager`] before retrying the same frame. The sleep
//! waits on the shutdown channel so `close` interrupts it at once.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::thread::{self, JoinHandle};

use crossbeam_channel::{Receiver, Sender, bounded, select};
use log::{debug, warn};

use super::{backoff::ReconnectDelayManager, config::ClientConfig, connection::Connection};
use crate::{codec::frame_event, event::LogEvent, rate_limited_warner::RateLimitedWarner};

/// Commands processed by the worker thread.
#[derive(Debug)]
pub enum ClientCommand {
    Event(Box<LogEvent>),
    Flush(Sender<bool>),
}

/// Counters shared between the client and its worker.
#[derive(Debug, Default)]
pub struct ClientStats {
    sent: AtomicU64,
    dropped: AtomicU64,
    connects: AtomicU64,
    failed_attempts: AtomicU64,
}

impl ClientStats {
    /// Events written to a collector socket.
    pub fn sent(&self) -> u64 {
        self.sent.load(Ordering::Relaxed)
    }

    /// Events given up on (queue overflow, shutdown without a connection,
    /// serialisation failures).
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    /// Successful connection establishments.
    pub fn connects(&self) -> u64 {
        self.connects.load(Ordering::Relaxed)
    }

    /// Failed connects and writes.
    pub fn failed_attempts(&self) -> u64 {
        self.failed_attempts.load(Ordering::Relaxed)
    }

    pub(crate) fn record_drop(&self) {
        self.dropped.fetch_add(1, Ordering::Relaxed);
    }
}

pub(crate) struct WorkerParts {
    pub(crate) tx: Sender<ClientCommand>,
    pub(crate) shutdown_tx: Sender<Sender<()>>,
    pub(crate) handle: JoinHandle<()>,
}

/// Shutdown requested while the worker was busy; carries the ack channel.
struct ShutdownRequested(Option<Sender<()>>);

pub(crate) fn spawn_worker(
    config: ClientConfig,
    delays: Arc<ReconnectDelayManager>,
    stats: Arc<ClientStats>,
) -> WorkerParts {
    let (tx, rx) = bounded(config.capacity);
    let (shutdown_tx, shutdown_rx) = bounded(1);
    let worker = Worker {
        warner: RateLimitedWarner::new(config.warn_interval),
        config,
        delays,
        stats,
        connection: None,
    };
    let handle = thread::spawn(move || worker.run(&rx, &shutdown_rx));
    WorkerParts {
        tx,
        shutdown_tx,
        handle,
    }
}

struct Worker {
    config: ClientConfig,
    delays: Arc<ReconnectDelayManager>,
    stats: Arc<ClientStats>,
    warner: RateLimitedWarner,
    connection: Option<Connection>,
}

impl Worker {
    fn run(mut self, rx: &Receiver<ClientCommand>, shutdown_rx: &Receiver<Sender<()>>) {
        loop {
            select! {
                recv(rx) -> cmd => match cmd {
                    Ok(ClientCommand::Event(event)) => {
                        if let Err(ShutdownRequested(ack)) = self.deliver(&event, shutdown_rx) {
                            // Interrupted mid-backoff: the collector is known to be down.
                            self.finish(rx, ack, false);
                            return;
                        }
                    }
                    Ok(ClientCommand::Flush(ack)) => {
                        let ok = self.flush_connection();
                        let _ = ack.send(ok);
                    }
                    Err(_) => break,
                },
                recv(shutdown_rx) -> ack => {
                    self.finish(rx, ack.ok(), true);
                    return;
                }
            }
        }
        self.finish(rx, None, true);
    }

    /// Send one event, retrying with backoff until it is written or a
    /// shutdown arrives.
    fn deliver(
        &mut self,
        event: &LogEvent,
        shutdown_rx: &Receiver<Sender<()>>,
    ) -> Result<(), ShutdownRequested> {
        let frame = match frame_event(event) {
            Ok(frame) => frame,
            Err(err) => {
                warn!("TransportClient: dropping event {}: {err}", event.id);
                self.stats.record_drop();
                return Ok(());
            }
        };
        loop {
            match self.try_send(&frame) {
                Ok(()) => {
                    self.stats.sent.fetch_add(1, Ordering::Relaxed);
                    return Ok(());
                }
                Err(err) => {
                    self.stats.failed_attempts.fetch_add(1, Ordering::Relaxed);
                    let delay = self.delays.delay_for(self.config.collector);
                    debug!(
                        "TransportClient: send to {} failed: {err}; retrying in {delay:?}",
                        self.config.collector
                    );
                    self.warner.record_drop();
                    self.warner.warn_if_due(|count| {
                        warn!(
                            "TransportClient: {count} failed attempts to reach {}; last error: {err}",
                            self.config.collector
                        );
                    });
                    select! {
                        recv(shutdown_rx) -> ack => {
                            self.stats.record_drop();
                            return Err(ShutdownRequested(ack.ok()));
                        }
                        default(delay) => {}
                    }
                }
            }
        }
    }

    fn try_send(&mut self, frame: &[u8]) -> std::io::Result<()> {
        if self.connection.is_none() {
            let conn = Connection::open(
                self.config.collector,
                self.config.connect_timeout,
                self.config.write_timeout,
            )?;
            self.stats.connects.fetch_add(1, Ordering::Relaxed);
            debug!("TransportClient: connected to {}", conn.peer());
            self.connection = Some(conn);
        }
        let Some(conn) = self.connection.as_mut() else {
            return Err(std::io::Error::other("no active connection"));
        };
        let result = conn.send(frame);
        if result.is_err() {
            self.connection = None;
        }
        result
    }

    /// Nothing is buffered without a connection, so that counts as flushed.
    fn flush_connection(&mut self) -> bool {
        match self.connection.as_mut() {
            Some(conn) => match conn.flush() {
                Ok(()) => true,
                Err(err) => {
                    warn!("TransportClient: flush failed: {err}");
                    self.connection = None;
                    false
                }
            },
            None => true,
        }
    }

    /// Write what is still queued without backing off, then acknowledge.
    ///
    /// The first failed send marks the collector unreachable and the rest of
    /// the queue is dropped.
    fn finish(
        mut self,
        rx: &Receiver<ClientCommand>,
        ack: Option<Sender<()>>,
        mut reachable: bool,
    ) {
        let mut abandoned = 0u64;
        while let Ok(cmd) = rx.try_recv() {
            match cmd {
                ClientCommand::Event(event) => {
                    let sent = reachable
                        && match frame_event(&event) {
                            Ok(frame) => {
                                reachable = self.try_send(&frame).is_ok();
                                reachable
                            }
                            Err(_) => false,
                        };
                    if sent {
                        self.stats.sent.fetch_add(1, Ordering::Relaxed);
                    } else {
                        self.stats.record_drop();
                        abandoned += 1;
                    }
                }
                ClientCommand::Flush(flush_ack) => {
                    let _ = flush_ack.send(false);
                }
            }
        }
        if abandoned > 0 {
            warn!("TransportClient: dropped {abandoned} queued events at shutdown");
        }
        self.flush_connection();
        self.warner.flush(|count| {
            debug!("TransportClient: {count} failed attempts before shutdown");
        });
        if let Some(ack) = ack {
            let _ = ack.send(());
        }
    }
}
