//! Configuration consumed by [`Archiver`](super::Archiver).

use std::path::PathBuf;
use std::time::Duration;

use crate::config::ConfigError;

/// Default size at which a SlotFile stops taking new events.
pub const DEFAULT_MAX_FILE_SIZE: u64 = 100 * 1024 * 1024;
/// Default width of a slot.
pub const DEFAULT_SLOT_INTERVAL: Duration = Duration::from_secs(60 * 60);
/// Default number of metadata files kept open at once.
pub const DEFAULT_METADATA_CAPACITY: usize = 64;

const MINUTE: Duration = Duration::from_secs(60);

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ArchiverConfig {
    /// Directory holding SlotFiles and their metadata journals.
    pub root: PathBuf,
    pub max_file_size: u64,
    pub slot_interval: Duration,
    pub metadata_capacity: usize,
}

impl ArchiverConfig {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            max_file_size: DEFAULT_MAX_FILE_SIZE,
            slot_interval: DEFAULT_SLOT_INTERVAL,
            metadata_capacity: DEFAULT_METADATA_CAPACITY,
        }
    }

    pub fn with_max_file_size(mut self, bytes: u64) -> Self {
        self.max_file_size = bytes;
        self
    }

    pub fn with_slot_interval(mut self, interval: Duration) -> Self {
        self.slot_interval = interval;
        self
    }

    pub fn with_metadata_capacity(mut self, capacity: usize) -> Self {
        self.metadata_capacity = capacity;
        self
    }

    pub(crate) fn validate(&self) -> Result<(), ConfigError> {
        if self.max_file_size == 0 {
            return Err(ConfigError::Invalid(
                "max archive file size must be greater than zero".into(),
            ));
        }
        // Slot labels have minute resolution.
        if self.slot_interval < MINUTE || self.slot_interval.as_nanos() % MINUTE.as_nanos() != 0 {
            return Err(ConfigError::Invalid(format!(
                "slot interval {:?} is not a whole number of minutes",
                self.slot_interval
            )));
        }
        if self.metadata_capacity == 0 {
            return Err(ConfigError::Invalid(
                "metadata cache capacity must be greater than zero".into(),
            ));
        }
        Ok(())
    }
}
