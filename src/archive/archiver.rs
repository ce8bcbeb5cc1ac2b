//! Handler writing events into rotating SlotFiles.

use std::fs::{self, File, OpenOptions};
use std::io::{self, BufWriter};
use std::path::Path;
#[cfg(test)]
use std::sync::atomic::AtomicUsize;
use std::sync::atomic::{AtomicBool, Ordering};

use log::{debug, warn};
use parking_lot::Mutex;

use super::{
    ArchiveError,
    config::ArchiverConfig,
    metadata::{MetadataEntry, MetadataStore},
    slot::{Slot, SlotFile},
};
use crate::{
    codec::{CodecError, CountingWriter, RecordWriter},
    event::LogEvent,
    handler::{EventHandler, HandlerError},
};

type DataWriter = RecordWriter<CountingWriter<BufWriter<File>>>;

/// The SlotFile currently taking writes.
struct ActiveFile {
    slot_file: SlotFile,
    writer: DataWriter,
}

impl ActiveFile {
    fn size(&self) -> u64 {
        self.writer.get_ref().bytes_written()
    }
}

/// Archives events into `<slot>_<rotation>` files under a root directory and
/// journals each event's byte range in the file's metadata journal.
///
/// A new SlotFile is started when the event belongs to another slot than the
/// active file or the active file has reached the size limit. New files
/// always take the next unused rotation index, so files left by an earlier
/// process are never appended to.
pub struct Archiver {
    name: String,
    config: ArchiverConfig,
    metadata: MetadataStore,
    active: Mutex<Option<ActiveFile>>,
    closed: AtomicBool,
    #[cfg(test)]
    forced_write_failures: AtomicUsize,
}

impl Archiver {
    /// Create the archive root if needed and take ownership of `metadata`.
    pub fn new(config: ArchiverConfig, metadata: MetadataStore) -> Result<Self, ArchiveError> {
        config.validate()?;
        fs::create_dir_all(&config.root).map_err(|source| ArchiveError::Io {
            path: config.root.clone(),
            source,
        })?;
        Ok(Self {
            name: "archiver".into(),
            config,
            metadata,
            active: Mutex::new(None),
            closed: AtomicBool::new(false),
            #[cfg(test)]
            forced_write_failures: AtomicUsize::new(0),
        })
    }

    /// Like [`Archiver::new`] with a store sized by `config.metadata_capacity`.
    pub fn from_config(config: ArchiverConfig) -> Result<Self, ArchiveError> {
        let metadata = MetadataStore::new(config.metadata_capacity);
        Self::new(config, metadata)
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn root(&self) -> &Path {
        &self.config.root
    }

    pub fn metadata_store(&self) -> &MetadataStore {
        &self.metadata
    }

    /// SlotFile currently taking writes, if any.
    pub fn active_slot_file(&self) -> Option<SlotFile> {
        self.active.lock().as_ref().map(|f| f.slot_file)
    }

    /// Write one event and journal its placement.
    pub fn archive(&self, event: &LogEvent) -> Result<(SlotFile, MetadataEntry), ArchiveError> {
        if self.closed.load(Ordering::Acquire) {
            return Err(ArchiveError::Closed);
        }
        let slot = Slot::of(event.timestamp, self.config.slot_interval);
        let mut active = self.active.lock();
        let rotate = active
            .as_ref()
            .is_none_or(|f| f.slot_file.slot() != slot || f.size() >= self.config.max_file_size);
        if rotate {
            if let Some(previous) = active.take() {
                self.retire(previous);
            }
            *active = Some(self.open_next(slot)?);
        }
        let Some(file) = active.as_mut() else {
            return Err(ArchiveError::Closed);
        };
        let slot_file = file.slot_file;
        let start_offset = file.size();
        match self.write_record(file, event) {
            Ok(()) => {}
            Err(CodecError::Io(source)) => {
                // A partial frame may be on disk; never write after it.
                warn!("{}: discarding {slot_file} after write failure: {source}", self.name);
                active.take();
                return Err(ArchiveError::Io {
                    path: slot_file.path(self.root()),
                    source,
                });
            }
            Err(err) => return Err(err.into()),
        }
        let entry = MetadataEntry {
            event_id: event.id,
            write_count: 1,
            start_offset,
            end_offset: file.size(),
        };
        let journal = slot_file.metadata_path(self.root());
        self.metadata
            .write_entry(&journal, entry)
            .map_err(|source| ArchiveError::Io {
                path: journal,
                source,
            })?;
        Ok((slot_file, entry))
    }

    /// Record downstream confirmation of `event_id` in the journal of
    /// `slot_file`.
    pub fn write_ack(&self, slot_file: &SlotFile, event_id: u64) -> Result<(), ArchiveError> {
        let journal = slot_file.metadata_path(self.root());
        self.metadata
            .write_ack(&journal, event_id)
            .map_err(|source| ArchiveError::Io {
                path: journal,
                source,
            })
    }

    /// Flush the active data file and every open journal.
    pub fn flush(&self) -> bool {
        let data_ok = match self.active.lock().as_mut() {
            Some(file) => match file.writer.flush() {
                Ok(()) => true,
                Err(err) => {
                    warn!("{}: failed to flush {}: {err}", self.name, file.slot_file);
                    false
                }
            },
            None => true,
        };
        self.metadata.flush() && data_ok
    }

    /// Flush and close the active data file and every open journal. Later
    /// events are rejected.
    pub fn close(&self) {
        self.closed.store(true, Ordering::Release);
        if let Some(file) = self.active.lock().take() {
            self.retire(file);
        }
        self.metadata.close();
    }

    /// Append one record and push it out of the buffer, so a journal entry
    /// never describes bytes that only exist in memory.
    fn write_record(&self, file: &mut ActiveFile, event: &LogEvent) -> Result<(), CodecError> {
        #[cfg(test)]
        if self
            .forced_write_failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
        {
            return Err(CodecError::Io(io::Error::other("simulated archive write failure")));
        }
        file.writer.write(event)?;
        file.writer.flush()?;
        Ok(())
    }

    /// Make the next `count` data writes fail with an I/O error.
    #[cfg(test)]
    pub(crate) fn fail_next_writes(&self, count: usize) {
        self.forced_write_failures.store(count, Ordering::SeqCst);
    }

    fn open_next(&self, slot: Slot) -> Result<ActiveFile, ArchiveError> {
        let root = self.root();
        let mut slot_file = SlotFile::next_free(root, slot).map_err(|source| ArchiveError::Io {
            path: root.to_path_buf(),
            source,
        })?;
        loop {
            let path = slot_file.path(root);
            match OpenOptions::new().write(true).create_new(true).open(&path) {
                Ok(file) => {
                    debug!("{}: opened {}", self.name, path.display());
                    let writer = RecordWriter::new(CountingWriter::new(BufWriter::new(file)));
                    return Ok(ActiveFile { slot_file, writer });
                }
                // Another writer claimed this index between the scan and the open.
                Err(err) if err.kind() == io::ErrorKind::AlreadyExists => {
                    slot_file = slot_file.next_rotation();
                }
                Err(source) => return Err(ArchiveError::Io { path, source }),
            }
        }
    }

    fn retire(&self, mut file: ActiveFile) {
        if let Err(err) = file.writer.flush() {
            warn!("{}: failed to flush {}: {err}", self.name, file.slot_file);
        } else if let Err(err) = file.writer.get_ref().get_ref().get_ref().sync_data() {
            warn!("{}: failed to sync {}: {err}", self.name, file.slot_file);
        }
        debug!(
            "{}: closed {} after {} records ({} bytes)",
            self.name,
            file.slot_file,
            file.writer.records_written(),
            file.size()
        );
    }
}

impl EventHandler for Archiver {
    fn handle(&self, event: &LogEvent) -> Result<(), HandlerError> {
        self.archive(event).map(|_| ()).map_err(HandlerError::from)
    }

    fn flush(&self) -> bool {
        Archiver::flush(self)
    }

    fn close(&self) {
        Archiver::close(self);
    }

    fn name(&self) -> &str {
        &self.name
    }
}

impl Drop for Archiver {
    fn drop(&mut self) {
        self.close();
    }
}

impl std::fmt::Debug for Archiver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Archiver")
            .field("name", &self.name)
            .field("root", &self.config.root)
            .field("active", &self.active_slot_file())
            .finish()
    }
}
