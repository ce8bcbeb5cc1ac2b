//! Public client type forwarding events to a collector.

use std::{sync::Arc, thread::JoinHandle, time::Duration};

use crossbeam_channel::{SendTimeoutError, Sender, TrySendError, bounded};
use log::warn;
use parking_lot::{Mutex, RwLock};
use thiserror::Error;

use super::{
    backoff::ReconnectDelayManager,
    config::{ClientConfig, OverflowPolicy},
    worker::{ClientCommand, ClientStats, spawn_worker},
};
use crate::{
    config::ConfigError,
    event::LogEvent,
    handler::{EventHandler, HandlerError},
    rate_limited_warner::RateLimitedWarner,
};

/// Errors surfaced to callers of [`TransportClient::send`].
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ClientError {
    #[error("client queue is full")]
    QueueFull,
    #[error("client is closed")]
    Closed,
    #[error("timed out after {0:?} waiting for client queue")]
    Timeout(Duration),
}

impl From<ClientError> for HandlerError {
    fn from(err: ClientError) -> Self {
        match err {
            ClientError::QueueFull => HandlerError::QueueFull,
            ClientError::Closed => HandlerError::Closed,
            ClientError::Timeout(dur) => HandlerError::Timeout(dur),
        }
    }
}

/// Ships events to one collector over TCP.
///
/// Sends are queued to a worker thread which reconnects with exponential
/// backoff whenever the collector is unreachable. Delivery is at least
/// once: a frame whose write failed is sent again after reconnecting.
pub struct TransportClient {
    name: String,
    tx: RwLock<Option<Sender<ClientCommand>>>,
    shutdown_tx: Mutex<Option<Sender<Sender<()>>>>,
    handle: Mutex<Option<JoinHandle<()>>>,
    overflow_policy: OverflowPolicy,
    flush_timeout: Duration,
    stats: Arc<ClientStats>,
    warner: RateLimitedWarner,
}

impl TransportClient {
    /// Start a client whose reconnect delays come from `config.backoff`.
    pub fn new(config: ClientConfig) -> Result<Self, ConfigError> {
        let delays = ReconnectDelayManager::from_policy(&config.backoff)?;
        Self::with_delay_manager(config, Arc::new(delays))
    }

    /// Start a client sharing a delay manager, e.g. with other clients or a
    /// test clock.
    pub fn with_delay_manager(
        config: ClientConfig,
        delays: Arc<ReconnectDelayManager>,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        let stats = Arc::new(ClientStats::default());
        let name = config.name.clone();
        let overflow_policy = config.overflow_policy;
        let flush_timeout = config.flush_timeout;
        let warner = RateLimitedWarner::new(config.warn_interval);
        let parts = spawn_worker(config, delays, Arc::clone(&stats));
        Ok(Self {
            name,
            tx: RwLock::new(Some(parts.tx)),
            shutdown_tx: Mutex::new(Some(parts.shutdown_tx)),
            handle: Mutex::new(Some(parts.handle)),
            overflow_policy,
            flush_timeout,
            stats,
            warner,
        })
    }

    /// Queue an event for delivery according to the overflow policy.
    pub fn send(&self, event: LogEvent) -> Result<(), ClientError> {
        let Some(tx) = self.tx.read().clone() else {
            self.note_drop("after close");
            return Err(ClientError::Closed);
        };
        let cmd = ClientCommand::Event(Box::new(event));
        let result = match self.overflow_policy {
            OverflowPolicy::Drop => tx.try_send(cmd).map_err(|err| match err {
                TrySendError::Full(_) => ClientError::QueueFull,
                TrySendError::Disconnected(_) => ClientError::Closed,
            }),
            OverflowPolicy::Block => tx.send(cmd).map_err(|_| ClientError::Closed),
            OverflowPolicy::Timeout(dur) => tx.send_timeout(cmd, dur).map_err(|err| match err {
                SendTimeoutError::Timeout(_) => ClientError::Timeout(dur),
                SendTimeoutError::Disconnected(_) => ClientError::Closed,
            }),
        };
        if let Err(err) = &result {
            self.note_drop(&err.to_string());
        }
        result
    }

    /// Wait until everything queued before this call has been written.
    ///
    /// Returns `false` when the client is closed, the socket flush fails, or
    /// the worker does not answer within the flush timeout. An idle client
    /// with no connection has nothing buffered and reports `true`.
    pub fn flush(&self) -> bool {
        let Some(tx) = self.tx.read().clone() else {
            return false;
        };
        self.warner.flush(|count| {
            warn!("{}: dropped {count} events in the last interval", self.name);
        });
        let (ack_tx, ack_rx) = bounded(1);
        if tx
            .send_timeout(ClientCommand::Flush(ack_tx), self.flush_timeout)
            .is_err()
        {
            return false;
        }
        ack_rx.recv_timeout(self.flush_timeout).unwrap_or(false)
    }

    /// Stop the worker, interrupting any backoff sleep, and wait for it.
    ///
    /// Idempotent.
    pub fn close(&self) {
        if let Some(shutdown_tx) = self.shutdown_tx.lock().take() {
            let (ack_tx, ack_rx) = bounded(1);
            if shutdown_tx.send(ack_tx).is_ok()
                && ack_rx.recv_timeout(self.flush_timeout).is_err()
            {
                warn!("{}: worker did not acknowledge shutdown", self.name);
            }
        }
        self.tx.write().take();
        if let Some(handle) = self.handle.lock().take()
            && handle.join().is_err()
        {
            warn!("{}: worker thread panicked", self.name);
        }
    }

    pub fn stats(&self) -> &ClientStats {
        &self.stats
    }

    fn note_drop(&self, reason: &str) {
        self.stats.record_drop();
        self.warner.record_drop();
        self.warner.warn_if_due(|count| {
            warn!("{}: dropped {count} events ({reason})", self.name);
        });
    }
}

impl EventHandler for TransportClient {
    fn handle(&self, event: &LogEvent) -> Result<(), HandlerError> {
        self.send(event.clone()).map_err(HandlerError::from)
    }

    fn flush(&self) -> bool {
        TransportClient::flush(self)
    }

    fn close(&self) {
        TransportClient::close(self);
    }

    fn name(&self) -> &str {
        &self.name
    }
}

impl Drop for TransportClient {
    fn drop(&mut self) {
        self.close();
    }
}

impl std::fmt::Debug for TransportClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransportClient")
            .field("name", &self.name)
            .field("overflow_policy", &self.overflow_policy)
            .finish()
    }
}
