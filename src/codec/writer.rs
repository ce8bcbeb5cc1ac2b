//! Record writer and the byte-counting wrapper used for offset bookkeeping.

use std::io::{self, Write};

use super::{CodecError, frame_event};
use crate::event::LogEvent;

/// Writer that tracks the total bytes written and the size of the last write.
///
/// The archiver reads [`bytes_written`](Self::bytes_written) before and after
/// each record to obtain its start and end offsets.
#[derive(Debug)]
pub struct CountingWriter<W> {
    inner: W,
    total: u64,
    last: u64,
}

impl<W: Write> CountingWriter<W> {
    pub fn new(inner: W) -> Self {
        Self::with_offset(inner, 0)
    }

    /// Start counting from `offset`, for writers appending to existing data.
    pub fn with_offset(inner: W, offset: u64) -> Self {
        Self {
            inner,
            total: offset,
            last: 0,
        }
    }

    pub fn bytes_written(&self) -> u64 {
        self.total
    }

    pub fn last_write_size(&self) -> u64 {
        self.last
    }

    pub fn get_ref(&self) -> &W {
        &self.inner
    }

    pub fn get_mut(&mut self) -> &mut W {
        &mut self.inner
    }

    pub fn into_inner(self) -> W {
        self.inner
    }
}

impl<W: Write> Write for CountingWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let n = self.inner.write(buf)?;
        self.total += n as u64;
        self.last = n as u64;
        Ok(n)
    }

    // A whole frame counts as one write even if the inner writer splits it.
    fn write_all(&mut self, buf: &[u8]) -> io::Result<()> {
        let before = self.total;
        let mut rest = buf;
        while !rest.is_empty() {
            match self.inner.write(rest) {
                Ok(0) => {
                    self.last = self.total - before;
                    return Err(io::Error::new(
                        io::ErrorKind::WriteZero,
                        "failed to write whole record",
                    ));
                }
                Ok(n) => {
                    self.total += n as u64;
                    rest = &rest[n..];
                }
                Err(err) if err.kind() == io::ErrorKind::Interrupted => {}
                Err(err) => {
                    self.last = self.total - before;
                    return Err(err);
                }
            }
        }
        self.last = self.total - before;
        Ok(())
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

/// Writes framed events to a byte stream.
pub struct RecordWriter<W> {
    inner: W,
    records_written: u64,
}

impl<W: Write> RecordWriter<W> {
    pub fn new(inner: W) -> Self {
        Self {
            inner,
            records_written: 0,
        }
    }

    /// Frame and write one event, returning the bytes written.
    ///
    /// The frame goes out in a single `write_all` call.
    pub fn write(&mut self, event: &LogEvent) -> Result<u64, CodecError> {
        let frame = frame_event(event)?;
        self.inner.write_all(&frame)?;
        self.records_written += 1;
        Ok(frame.len() as u64)
    }

    /// Write an already framed record.
    pub fn write_frame(&mut self, frame: &[u8]) -> io::Result<u64> {
        self.inner.write_all(frame)?;
        self.records_written += 1;
        Ok(frame.len() as u64)
    }

    pub fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }

    pub fn records_written(&self) -> u64 {
        self.records_written
    }

    pub fn get_ref(&self) -> &W {
        &self.inner
    }

    pub fn get_mut(&mut self) -> &mut W {
        &mut self.inner
    }

    pub fn into_inner(self) -> W {
        self.inner
    }
}
