//! Configuration consumed by [`TransportClient`](super::TransportClient).

use std::net::SocketAddr;
use std::time::Duration;

use super::backoff::{BackoffConfigError, check_delays};
use crate::config::ConfigError;
use crate::rate_limited_warner::DEFAULT_WARN_INTERVAL;

/// Default bounded channel capacity between callers and the client worker.
pub const DEFAULT_CHANNEL_CAPACITY: usize = 1024;
/// Default connection timeout applied when establishing sockets.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);
/// Default write timeout applied to socket writes.
pub const DEFAULT_WRITE_TIMEOUT: Duration = Duration::from_secs(1);
/// Default time `flush` and `close` wait for the worker to acknowledge.
pub const DEFAULT_FLUSH_TIMEOUT: Duration = Duration::from_secs(5);
/// Default delay before the first reconnect attempt.
pub const DEFAULT_BACKOFF_INITIAL: Duration = Duration::from_millis(100);
/// Default ceiling for reconnect delays.
pub const DEFAULT_BACKOFF_MAX: Duration = Duration::from_secs(10);
/// Default quiet period after which a peer's backoff starts over.
pub const DEFAULT_BACKOFF_RESET: Duration = Duration::from_secs(30);

/// Determines how the client reacts when its queue is full.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OverflowPolicy {
    /// Drop new events, preserving queued ones.
    Drop,
    /// Block the caller until space becomes available.
    Block,
    /// Block up to the specified duration before giving up.
    Timeout(Duration),
}

/// Exponential backoff policy for reconnection attempts.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BackoffPolicy {
    pub initial: Duration,
    pub max: Duration,
    pub reset_after: Duration,
}

impl BackoffPolicy {
    pub fn validate(&self) -> Result<(), BackoffConfigError> {
        check_delays(self.initial, self.max, self.reset_after)
    }
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            initial: DEFAULT_BACKOFF_INITIAL,
            max: DEFAULT_BACKOFF_MAX,
            reset_after: DEFAULT_BACKOFF_RESET,
        }
    }
}

/// Everything a client needs besides the collector's resolved address.
#[derive(Clone, Debug)]
pub struct ClientConfig {
    pub collector: SocketAddr,
    /// Name reported when the client is registered as a handler.
    pub name: String,
    pub capacity: usize,
    pub connect_timeout: Duration,
    pub write_timeout: Duration,
    pub flush_timeout: Duration,
    pub overflow_policy: OverflowPolicy,
    pub backoff: BackoffPolicy,
    pub warn_interval: Duration,
}

impl ClientConfig {
    pub fn new(collector: SocketAddr) -> Self {
        Self {
            collector,
            name: "forwarder".into(),
            capacity: DEFAULT_CHANNEL_CAPACITY,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            write_timeout: DEFAULT_WRITE_TIMEOUT,
            flush_timeout: DEFAULT_FLUSH_TIMEOUT,
            overflow_policy: OverflowPolicy::Block,
            backoff: BackoffPolicy::default(),
            warn_interval: DEFAULT_WARN_INTERVAL,
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_capacity(mut self, capacity: usize) -> Self {
        self.capacity = capacity;
        self
    }

    pub fn with_overflow_policy(mut self, policy: OverflowPolicy) -> Self {
        self.overflow_policy = policy;
        self
    }

    pub fn with_backoff(mut self, backoff: BackoffPolicy) -> Self {
        self.backoff = backoff;
        self
    }

    pub fn with_timeouts(mut self, connect: Duration, write: Duration) -> Self {
        self.connect_timeout = connect;
        self.write_timeout = write;
        self
    }

    pub fn with_flush_timeout(mut self, timeout: Duration) -> Self {
        self.flush_timeout = timeout;
        self
    }

    pub(crate) fn validate(&self) -> Result<(), ConfigError> {
        if self.capacity == 0 {
            return Err(ConfigError::Invalid(
                "client capacity must be greater than zero".into(),
            ));
        }
        for (field, value) in [
            ("connect_timeout", self.connect_timeout),
            ("write_timeout", self.write_timeout),
            ("flush_timeout", self.flush_timeout),
        ] {
            if value.is_zero() {
                return Err(ConfigError::Invalid(format!(
                    "{field} must be greater than zero"
                )));
            }
        }
        if let OverflowPolicy::Timeout(dur) = self.overflow_policy
            && dur.is_zero()
        {
            return Err(ConfigError::Invalid(
                "overflow timeout must be greater than zero".into(),
            ));
        }
        self.backoff.validate()?;
        Ok(())
    }
}
