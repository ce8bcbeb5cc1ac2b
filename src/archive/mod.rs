//! Slot-based archival storage.
//!
//! [`Archiver`] buckets events by time into slots, writes them framed into
//! size-rotated SlotFiles and journals each event's byte range through a
//! [`MetadataStore`]. The [`scan`] functions read archives back sequentially.
//!
//! On-disk layout under the archive root:
//!
//! ```text
//! 202405011300_0       framed events
//! 202405011300_0.md    <eventId>,<writeCount>,<startOffset>,<endOffset>
//!                      ack,<eventId>
//! 202405011300_1       next rotation of the same slot
//! ```

mod archiver;
mod config;
mod lru;
mod metadata;
pub mod scan;
mod slot;


use std::io;
use std::path::PathBuf;

use thiserror::Error;

pub use archiver::Archiver;
pub use config::{
    ArchiverConfig, DEFAULT_MAX_FILE_SIZE, DEFAULT_METADATA_CAPACITY, DEFAULT_SLOT_INTERVAL,
};
pub use metadata::{MetadataEntry, MetadataLine, MetadataStore};
pub use slot::{METADATA_SUFFIX, Slot, SlotFile};

use crate::{codec::CodecError, config::ConfigError, handler::HandlerError};

/// Errors raised by the archiver and the archive readers.
#[derive(Debug, Error)]
pub enum ArchiveError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("I/O error on {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error(transparent)]
    Codec(#[from] CodecError),
    #[error("{}:{line}: malformed metadata line {content:?}", .path.display())]
    Metadata {
        path: PathBuf,
        line: usize,
        content: String,
    },
    #[error("archiver is closed")]
    Closed,
}

impl From<ArchiveError> for HandlerError {
    fn from(err: ArchiveError) -> Self {
        match err {
            ArchiveError::Io { path, source } => HandlerError::Io(io::Error::new(
                source.kind(),
                format!("{}: {source}", path.display()),
            )),
            ArchiveError::Codec(err) => HandlerError::Codec(err),
            ArchiveError::Closed => HandlerError::Closed,
            other => HandlerError::Other(other.to_string()),
        }
    }
}
