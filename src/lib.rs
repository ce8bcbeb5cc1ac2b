//! Log shipping and archival.
//!
//! Producers tag [`LogEvent`]s with ids from an [`IdGenerator`] and hand them
//! to a [`TransportClient`], which forwards them to a [`Collector`] and keeps
//! reconnecting with backoff while the collector is unreachable. The
//! collector decodes each connection's stream and queues the events on a
//! [`Dispatcher`], whose worker fans them out to the registered
//! [`EventHandler`]s. The [`Archiver`] handler stores events in time-slotted,
//! size-rotated files and journals every event's byte range.
//!
//! ```text
//! producer -> TransportClient -> TCP -> Collector -> Dispatcher -> Archiver
//!                                                              \-> TransportClient (forwarder)
//! ```

pub mod archive;
pub mod clock;
pub mod codec;
pub mod config;
pub mod dispatcher;
pub mod event;
pub mod handler;
pub mod id_gen;
mod rate_limited_warner;
pub mod transport;

#[cfg(test)]
mod test_utils;

pub use archive::{ArchiveError, Archiver, ArchiverConfig, MetadataStore, Slot, SlotFile};
pub use clock::{Clock, ManualClock, SystemClock};
pub use codec::{CodecError, CountingWriter, RecordReader, RecordWriter};
pub use config::{ConfigError, Settings};
pub use dispatcher::{
    Collector, CollectorConfig, CollectorError, Dispatcher, DispatcherConfig, EnqueueError,
    EventSender,
};
pub use event::{Consistency, LogEvent, LogEventBuilder, Payload};
pub use handler::{EventHandler, HandlerError};
pub use id_gen::{IdGenerator, IdParts};
pub use transport::{
    BackoffPolicy, ClientConfig, ClientError, OverflowPolicy, ReconnectDelayManager,
    TransportClient,
};
