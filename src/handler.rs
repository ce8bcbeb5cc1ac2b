//! Handler contract for consumers of the dispatched event stream.

use std::io;
use std::time::Duration;

use thiserror::Error;

use crate::codec::CodecError;
use crate::event::LogEvent;

/// Errors a handler may report for a single event.
///
/// The dispatcher logs these and carries on with the next handler.
#[derive(Debug, Error)]
pub enum HandlerError {
    #[error("handler queue is full")]
    QueueFull,
    #[error("handler is closed")]
    Closed,
    #[error("timed out after {0:?} waiting for handler queue")]
    Timeout(Duration),
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error(transparent)]
    Codec(#[from] CodecError),
    #[error("{0}")]
    Other(String),
}

/// Trait implemented by every archival or forwarding backend.
///
/// Handlers are shared between the dispatcher and their owners, so every
/// method takes `&self`; implementations use interior mutability.
pub trait EventHandler: Send + Sync {
    /// Deliver one event.
    fn handle(&self, event: &LogEvent) -> Result<(), HandlerError>;

    /// Push buffered state to durable or observable storage.
    ///
    /// Returns `false` when the flush could not be confirmed.
    fn flush(&self) -> bool {
        true
    }

    /// Flush and release resources. Further events are rejected.
    fn close(&self) {
        self.flush();
    }

    /// Name used in diagnostics.
    fn name(&self) -> &str;
}
