//! Length-delimited framing for [`LogEvent`](crate::event::LogEvent) values.
//!
//! Every record on the wire and in archive files is a LEB128 varint holding
//! the body length followed by the MessagePack body:
//!
//! ```text
//! <varint len><len bytes of MessagePack> <varint len><...> ...
//! ```
//!
//! A stream that ends exactly on a record boundary is a clean end of stream.
//! Readers and writers are not synchronised; callers serialise access to a
//! single stream.

mod reader;
mod serialise;
pub mod varint;
mod writer;

#[cfg(test)]
mod tests;

use std::io;

use thiserror::Error;

pub use reader::RecordReader;
pub use serialise::{decode_event, encode_event, frame_event};
pub use writer::{CountingWriter, RecordWriter};

/// Largest record body a [`RecordReader`] accepts by default.
pub const DEFAULT_MAX_RECORD_SIZE: usize = 16 << 20; // 16 MiB

/// Errors raised while encoding or decoding records.
#[derive(Debug, Error)]
pub enum CodecError {
    #[error(transparent)]
    Io(#[from] io::Error),
    /// The stream ended inside a length prefix or record body.
    #[error("stream ended mid-record ({expected} bytes expected, {read} read)")]
    Truncated { expected: usize, read: usize },
    #[error("record of {len} bytes exceeds the {max} byte limit")]
    FrameTooLarge { len: u64, max: usize },
    #[error("varint length prefix is malformed")]
    BadLength,
    #[error("failed to encode event: {0}")]
    Encode(#[from] rmp_serde::encode::Error),
    #[error("failed to decode event: {0}")]
    Decode(#[from] rmp_serde::decode::Error),
}
