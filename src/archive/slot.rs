//! Time buckets and the files that store them.

use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::{DateTime, NaiveDateTime, Utc};

const LABEL_FORMAT: &str = "%Y%m%d%H%M";
const LABEL_LEN: usize = 12;
/// Suffix of the metadata journal written beside each SlotFile.
pub const METADATA_SUFFIX: &str = ".md";

/// Coarse time bucket grouping events into files.
///
/// A slot is identified by the start of its bucket, so the mapping from a
/// timestamp depends only on the timestamp and the interval.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Slot {
    start_ms: u64,
}

impl Slot {
    /// Bucket containing `timestamp_ms` for buckets `interval` wide.
    pub fn of(timestamp_ms: u64, interval: Duration) -> Self {
        let width = (interval.as_millis() as u64).max(1);
        Self {
            start_ms: timestamp_ms - timestamp_ms % width,
        }
    }

    pub fn start_millis(&self) -> u64 {
        self.start_ms
    }

    /// UTC start of the bucket as `YYYYMMDDHHMM`.
    pub fn label(&self) -> String {
        match i64::try_from(self.start_ms)
            .ok()
            .and_then(DateTime::<Utc>::from_timestamp_millis)
        {
            Some(start) => start.format(LABEL_FORMAT).to_string(),
            None => format!("{:012}", self.start_ms),
        }
    }

    /// Inverse of [`Slot::label`].
    pub fn parse_label(label: &str) -> Option<Self> {
        if label.len() != LABEL_LEN || !label.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }
        let start = NaiveDateTime::parse_from_str(label, LABEL_FORMAT).ok()?;
        let start_ms = u64::try_from(start.and_utc().timestamp_millis()).ok()?;
        Some(Self { start_ms })
    }
}

impl fmt::Display for Slot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.label())
    }
}

/// One rotation of a slot's storage: `<label>_<index>` under the archive
/// root.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SlotFile {
    slot: Slot,
    index: u32,
}

impl SlotFile {
    pub fn new(slot: Slot, index: u32) -> Self {
        Self { slot, index }
    }

    pub fn slot(&self) -> Slot {
        self.slot
    }

    pub fn index(&self) -> u32 {
        self.index
    }

    pub fn file_name(&self) -> String {
        format!("{}_{}", self.slot.label(), self.index)
    }

    pub fn path(&self, root: &Path) -> PathBuf {
        root.join(self.file_name())
    }

    /// Path of the metadata journal, `<slotFilePath>.md`.
    pub fn metadata_path(&self, root: &Path) -> PathBuf {
        root.join(format!("{}{METADATA_SUFFIX}", self.file_name()))
    }

    /// Parse a data file name; metadata journals and foreign files yield
    /// `None`.
    pub fn parse(file_name: &str) -> Option<Self> {
        let (label, index) = file_name.split_once('_')?;
        if index.is_empty() || !index.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }
        Some(Self {
            slot: Slot::parse_label(label)?,
            index: index.parse().ok()?,
        })
    }

    /// First rotation of `slot` with neither a data file nor a journal under
    /// `root`, so completed files are never reopened.
    pub fn next_free(root: &Path, slot: Slot) -> io::Result<Self> {
        let mut next = 0;
        for entry in fs::read_dir(root)? {
            let name = entry?.file_name();
            let Some(name) = name.to_str() else { continue };
            let name = name.strip_suffix(METADATA_SUFFIX).unwrap_or(name);
            if let Some(existing) = Self::parse(name)
                && existing.slot == slot
            {
                next = next.max(existing.index.saturating_add(1));
            }
        }
        Ok(Self::new(slot, next))
    }

    pub fn next_rotation(&self) -> Self {
        Self::new(self.slot, self.index.saturating_add(1))
    }
}

impl fmt::Display for SlotFile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}_{}", self.slot, self.index)
    }
}
