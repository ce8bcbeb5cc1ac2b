//! Sequential record reader.

use std::io::{self, Read};

use super::{CodecError, DEFAULT_MAX_RECORD_SIZE, decode_event, varint};
use crate::event::LogEvent;

/// Reads framed events one at a time from a byte stream.
///
/// Wrap unbuffered sources such as sockets or files in a
/// [`BufReader`](std::io::BufReader); varints are read a byte at a time.
pub struct RecordReader<R> {
    inner: R,
    max_record_size: usize,
    buf: Vec<u8>,
    records_read: u64,
}

impl<R: Read> RecordReader<R> {
    pub fn new(inner: R) -> Self {
        Self::with_max_record_size(inner, DEFAULT_MAX_RECORD_SIZE)
    }

    pub fn with_max_record_size(inner: R, max_record_size: usize) -> Self {
        Self {
            inner,
            max_record_size,
            buf: Vec::new(),
            records_read: 0,
        }
    }

    /// Read the next event.
    ///
    /// Returns `Ok(None)` when the stream ends cleanly between records and
    /// [`CodecError::Truncated`] when it ends inside one.
    pub fn read(&mut self) -> Result<Option<LogEvent>, CodecError> {
        let len = match varint::read(&mut self.inner)? {
            varint::VarintRead::Eof => return Ok(None),
            varint::VarintRead::Truncated { read } => {
                return Err(CodecError::Truncated {
                    expected: read + 1,
                    read,
                });
            }
            varint::VarintRead::Overlong => return Err(CodecError::BadLength),
            varint::VarintRead::Value(len) => len,
        };
        if len > self.max_record_size as u64 {
            return Err(CodecError::FrameTooLarge {
                len,
                max: self.max_record_size,
            });
        }
        let len = len as usize;
        self.buf.resize(len, 0);
        let read = read_full(&mut self.inner, &mut self.buf)?;
        if read < len {
            return Err(CodecError::Truncated {
                expected: len,
                read,
            });
        }
        let event = decode_event(&self.buf)?;
        self.records_read += 1;
        Ok(Some(event))
    }

    /// Number of events decoded so far.
    pub fn records_read(&self) -> u64 {
        self.records_read
    }

    pub fn get_ref(&self) -> &R {
        &self.inner
    }

    pub fn into_inner(self) -> R {
        self.inner
    }
}

impl<R: Read> Iterator for RecordReader<R> {
    type Item = Result<LogEvent, CodecError>;

    fn next(&mut self) -> Option<Self::Item> {
        self.read().transpose()
    }
}

/// Like `read_exact`, but reports how much was read before end of input.
fn read_full<R: Read>(reader: &mut R, buf: &mut [u8]) -> io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(err) if err.kind() == io::ErrorKind::Interrupted => {}
            Err(err) => return Err(err),
        }
    }
    Ok(filled)
}
