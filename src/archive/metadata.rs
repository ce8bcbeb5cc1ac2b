//! Metadata journals and the bounded cache of their open handles.
//!
//! Every SlotFile has a journal beside it. Entry lines record where each
//! event landed in the data file; ack lines record downstream confirmation.
//! Both kinds are only ever appended.

use std::fmt;
use std::fs::{File, OpenOptions};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use log::warn;
use parking_lot::Mutex;

use super::lru::LruCache;

const ACK_TAG: &str = "ack";

/// Placement of one event inside a SlotFile.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct MetadataEntry {
    pub event_id: u64,
    pub write_count: u32,
    /// Offset of the first byte of the framed record.
    pub start_offset: u64,
    /// Offset one past the last byte of the framed record.
    pub end_offset: u64,
}

impl MetadataEntry {
    pub fn len(&self) -> u64 {
        self.end_offset - self.start_offset
    }

    pub fn is_empty(&self) -> bool {
        self.start_offset == self.end_offset
    }
}

/// One parsed journal line.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MetadataLine {
    /// `<eventId>,<writeCount>,<startOffset>,<endOffset>`
    Entry(MetadataEntry),
    /// `ack,<eventId>`
    Ack(u64),
}

impl MetadataLine {
    pub fn parse(line: &str) -> Option<Self> {
        let mut fields = line.split(',');
        let first = fields.next()?;
        let line = if first == ACK_TAG {
            Self::Ack(fields.next()?.parse().ok()?)
        } else {
            Self::Entry(MetadataEntry {
                event_id: first.parse().ok()?,
                write_count: fields.next()?.parse().ok()?,
                start_offset: fields.next()?.parse().ok()?,
                end_offset: fields.next()?.parse().ok()?,
            })
        };
        fields.next().is_none().then_some(line)
    }

    pub fn event_id(&self) -> u64 {
        match self {
            Self::Entry(entry) => entry.event_id,
            Self::Ack(id) => *id,
        }
    }
}

impl fmt::Display for MetadataLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Entry(e) => write!(
                f,
                "{},{},{},{}",
                e.event_id, e.write_count, e.start_offset, e.end_offset
            ),
            Self::Ack(id) => write!(f, "{ACK_TAG},{id}"),
        }
    }
}

/// Appends journal lines through a bounded cache of open handles.
///
/// Handles are opened lazily in append mode. When more journals are in use
/// than the capacity allows, the least recently used handle is flushed and
/// closed; a later write to that journal reopens it. One lock serialises all
/// journal writes.
pub struct MetadataStore {
    handles: Mutex<LruCache<PathBuf, BufWriter<File>>>,
    evictions: AtomicU64,
}

impl MetadataStore {
    pub fn new(capacity: usize) -> Self {
        Self {
            handles: Mutex::new(LruCache::new(capacity)),
            evictions: AtomicU64::new(0),
        }
    }

    /// Append an entry line to the journal at `path`.
    pub fn write_entry(&self, path: &Path, entry: MetadataEntry) -> io::Result<()> {
        self.append(path, MetadataLine::Entry(entry))
    }

    /// Append an ack line for `event_id` to the journal at `path`.
    pub fn write_ack(&self, path: &Path, event_id: u64) -> io::Result<()> {
        self.append(path, MetadataLine::Ack(event_id))
    }

    fn append(&self, path: &Path, line: MetadataLine) -> io::Result<()> {
        let mut handles = self.handles.lock();
        let key = path.to_path_buf();
        if let Some(writer) = handles.get_mut(&key) {
            return writeln!(writer, "{line}");
        }
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        let mut writer = BufWriter::new(file);
        writeln!(writer, "{line}")?;
        if let Some((evicted, writer)) = handles.push(key, writer) {
            self.evictions.fetch_add(1, Ordering::Relaxed);
            release(&evicted, writer);
        }
        Ok(())
    }

    /// Flush every open journal. Returns `false` if any flush failed.
    pub fn flush(&self) -> bool {
        let mut ok = true;
        for (path, writer) in self.handles.lock().values_mut() {
            if let Err(err) = writer.flush() {
                warn!("MetadataStore: failed to flush {}: {err}", path.display());
                ok = false;
            }
        }
        ok
    }

    /// Flush and close every open journal. The store stays usable; later
    /// writes reopen their journals.
    pub fn close(&self) {
        let drained = self.handles.lock().drain();
        for (path, writer) in drained {
            release(&path, writer);
        }
    }

    /// Number of journals currently held open.
    pub fn cached_len(&self) -> usize {
        self.handles.lock().len()
    }

    pub fn is_cached(&self, path: &Path) -> bool {
        self.handles.lock().contains(&path.to_path_buf())
    }

    pub fn capacity(&self) -> usize {
        self.handles.lock().capacity()
    }

    /// Handles closed to make room for others.
    pub fn evictions(&self) -> u64 {
        self.evictions.load(Ordering::Relaxed)
    }
}

impl Default for MetadataStore {
    fn default() -> Self {
        Self::new(super::config::DEFAULT_METADATA_CAPACITY)
    }
}

impl Drop for MetadataStore {
    fn drop(&mut self) {
        self.close();
    }
}

impl fmt::Debug for MetadataStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MetadataStore")
            .field("cached", &self.cached_len())
            .field("evictions", &self.evictions())
            .finish()
    }
}

/// Flush and close a handle leaving the cache. Errors are logged only.
fn release(path: &Path, writer: BufWriter<File>) {
    match writer.into_inner() {
        Ok(file) => {
            if let Err(err) = file.sync_data() {
                warn!("MetadataStore: failed to sync {}: {err}", path.display());
            }
        }
        Err(err) => warn!(
            "MetadataStore: failed to close {}: {}",
            path.display(),
            err.error()
        ),
    }
}
