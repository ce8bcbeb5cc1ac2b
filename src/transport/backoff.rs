//! Per-peer reconnect delays.

use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use thiserror::Error;

use super::config::BackoffPolicy;
use crate::clock::{Clock, SystemClock};

/// Rejected backoff parameters.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum BackoffConfigError {
    #[error("initial reconnect delay must be greater than zero")]
    ZeroInitialDelay,
    #[error("max reconnect delay {max:?} is shorter than the initial delay {initial:?}")]
    MaxBelowInitial { initial: Duration, max: Duration },
    #[error("reset time {reset:?} is shorter than the max delay {max:?}")]
    ResetBelowMax { max: Duration, reset: Duration },
}

pub(crate) fn check_delays(
    initial: Duration,
    max: Duration,
    reset: Duration,
) -> Result<(), BackoffConfigError> {
    if initial.is_zero() {
        return Err(BackoffConfigError::ZeroInitialDelay);
    }
    if max < initial {
        return Err(BackoffConfigError::MaxBelowInitial { initial, max });
    }
    if reset < max {
        return Err(BackoffConfigError::ResetBelowMax { max, reset });
    }
    Ok(())
}

#[derive(Clone, Copy, Debug)]
struct BackoffState {
    current_delay: Duration,
    last_attempt: u64,
}

/// Hands out exponentially growing reconnect delays per peer address.
///
/// The first attempt against a peer waits `initial`; each later attempt
/// doubles the previous delay up to `max`. A peer that goes `reset` without
/// an attempt starts over at `initial`.
pub struct ReconnectDelayManager {
    initial: Duration,
    max: Duration,
    reset: Duration,
    clock: Arc<dyn Clock>,
    peers: Mutex<HashMap<SocketAddr, BackoffState>>,
}

impl ReconnectDelayManager {
    pub fn new(
        initial: Duration,
        max: Duration,
        reset: Duration,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, BackoffConfigError> {
        check_delays(initial, max, reset)?;
        Ok(Self {
            initial,
            max,
            reset,
            clock,
            peers: Mutex::new(HashMap::new()),
        })
    }

    /// Build from a policy using the system clock.
    pub fn from_policy(policy: &BackoffPolicy) -> Result<Self, BackoffConfigError> {
        Self::new(
            policy.initial,
            policy.max,
            policy.reset_after,
            Arc::new(SystemClock),
        )
    }

    /// Delay to wait before the next connection attempt to `addr`.
    pub fn delay_for(&self, addr: SocketAddr) -> Duration {
        let now = self.clock.now_millis();
        let mut peers = self.peers.lock();
        match peers.entry(addr) {
            Entry::Vacant(slot) => {
                slot.insert(BackoffState {
                    current_delay: self.initial,
                    last_attempt: now,
                });
                self.initial
            }
            Entry::Occupied(mut slot) => {
                let state = slot.get_mut();
                let idle = Duration::from_millis(now.saturating_sub(state.last_attempt));
                state.current_delay = if idle >= self.reset {
                    self.initial
                } else {
                    state.current_delay.saturating_mul(2).min(self.max)
                };
                state.last_attempt = now;
                state.current_delay
            }
        }
    }

    /// Last delay handed out for `addr`, if any.
    pub fn current_delay(&self, addr: SocketAddr) -> Option<Duration> {
        self.peers.lock().get(&addr).map(|s| s.current_delay)
    }
}

impl std::fmt::Debug for ReconnectDelayManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReconnectDelayManager")
            .field("initial", &self.initial)
            .field("max", &self.max)
            .field("reset", &self.reset)
            .finish()
    }
}
