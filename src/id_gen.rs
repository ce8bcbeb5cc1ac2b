//! Time-ordered 64-bit event identifiers.
//!
//! Layout, most significant bits first:
//!
//! ```text
//! | 40 bits: ms since ID_EPOCH_MS | 12 bits: worker | 12 bits: sequence |
//! ```
//!
//! Ids from one generator never repeat while its worker id is unique among
//! running generators. When the clock stalls or runs backwards the generator
//! keeps the previous timestamp and spends sequence numbers; once 4096 have
//! been used in a millisecond it advances the timestamp by itself. The
//! timestamp field wraps after roughly 35 years.

use std::sync::Arc;

use parking_lot::Mutex;

use crate::clock::{Clock, SystemClock};
use crate::config::ConfigError;

/// Start of the id timestamp field: 2024-01-01T00:00:00Z.
pub const ID_EPOCH_MS: u64 = 1_704_067_200_000;

const TIMESTAMP_BITS: u32 = 40;
const WORKER_BITS: u32 = 12;
const SEQUENCE_BITS: u32 = 12;

const TIMESTAMP_MASK: u64 = (1 << TIMESTAMP_BITS) - 1;
/// Highest valid worker id.
pub const MAX_WORKER_ID: u16 = (1 << WORKER_BITS) - 1;
const MAX_SEQUENCE: u64 = (1 << SEQUENCE_BITS) - 1;

#[derive(Debug, Default)]
struct IdState {
    previous_timestamp: u64,
    sequence: u64,
}

/// Thread-safe generator of unique event ids for one worker.
pub struct IdGenerator {
    worker_id: u16,
    clock: Arc<dyn Clock>,
    state: Mutex<IdState>,
}

impl IdGenerator {
    /// Generator reading the system clock.
    pub fn new(worker_id: u16) -> Result<Self, ConfigError> {
        Self::with_clock(worker_id, Arc::new(SystemClock))
    }

    pub fn with_clock(worker_id: u16, clock: Arc<dyn Clock>) -> Result<Self, ConfigError> {
        if worker_id > MAX_WORKER_ID {
            return Err(ConfigError::Invalid(format!(
                "worker id {worker_id} exceeds {MAX_WORKER_ID}"
            )));
        }
        Ok(Self {
            worker_id,
            clock,
            state: Mutex::new(IdState::default()),
        })
    }

    pub fn worker_id(&self) -> u16 {
        self.worker_id
    }

    /// Current reading of the generator's clock in UNIX milliseconds.
    pub fn now_millis(&self) -> u64 {
        self.clock.now_millis()
    }

    /// Produce the next id.
    pub fn next_id(&self) -> u64 {
        let now = self.clock.now_millis().saturating_sub(ID_EPOCH_MS);
        let mut state = self.state.lock();
        if now > state.previous_timestamp {
            state.previous_timestamp = now;
            state.sequence = 0;
        } else if state.sequence == MAX_SEQUENCE {
            state.previous_timestamp += 1;
            state.sequence = 0;
        } else {
            state.sequence += 1;
        }
        compose(state.previous_timestamp, self.worker_id, state.sequence)
    }
}

impl std::fmt::Debug for IdGenerator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IdGenerator")
            .field("worker_id", &self.worker_id)
            .finish()
    }
}

fn compose(timestamp: u64, worker_id: u16, sequence: u64) -> u64 {
    ((timestamp & TIMESTAMP_MASK) << (WORKER_BITS + SEQUENCE_BITS))
        | (u64::from(worker_id) << SEQUENCE_BITS)
        | sequence
}

/// Fields recovered from an id.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct IdParts {
    /// Milliseconds since [`ID_EPOCH_MS`], modulo 2^40.
    pub timestamp: u64,
    pub worker_id: u16,
    pub sequence: u16,
}

impl IdParts {
    pub fn decode(id: u64) -> Self {
        Self {
            timestamp: id >> (WORKER_BITS + SEQUENCE_BITS),
            worker_id: ((id >> SEQUENCE_BITS) & u64::from(MAX_WORKER_ID)) as u16,
            sequence: (id & MAX_SEQUENCE) as u16,
        }
    }

    /// UNIX milliseconds, assuming the id was minted before the first wrap.
    pub fn unix_millis(&self) -> u64 {
        self.timestamp + ID_EPOCH_MS
    }
}
