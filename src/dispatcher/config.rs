//! Configuration for the dispatcher and the collector listener.

use std::net::{Ipv4Addr, SocketAddr};

use crate::config::ConfigError;

/// Default capacity of the queue between connection readers and handlers.
pub const DEFAULT_QUEUE_CAPACITY: usize = 2048;
/// Default TCP port the collector listens on.
pub const DEFAULT_COLLECTOR_PORT: u16 = 9202;
/// Default socket receive buffer for the listener, in bytes.
pub const DEFAULT_RECV_BUFFER_SIZE: usize = 100 * 1024;
/// Default listen backlog.
pub const DEFAULT_BACKLOG: i32 = 500;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DispatcherConfig {
    pub capacity: usize,
}

impl DispatcherConfig {
    pub fn with_capacity(mut self, capacity: usize) -> Self {
        self.capacity = capacity;
        self
    }

    pub(crate) fn validate(&self) -> Result<(), ConfigError> {
        if self.capacity == 0 {
            return Err(ConfigError::Invalid(
                "dispatch queue capacity must be greater than zero".into(),
            ));
        }
        Ok(())
    }
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            capacity: DEFAULT_QUEUE_CAPACITY,
        }
    }
}

/// Listener settings for a [`Collector`](super::Collector).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CollectorConfig {
    pub bind: SocketAddr,
    pub recv_buffer_size: usize,
    pub backlog: i32,
}

impl CollectorConfig {
    pub fn new(bind: SocketAddr) -> Self {
        Self {
            bind,
            ..Self::default()
        }
    }

    pub fn with_recv_buffer_size(mut self, bytes: usize) -> Self {
        self.recv_buffer_size = bytes;
        self
    }

    pub fn with_backlog(mut self, backlog: i32) -> Self {
        self.backlog = backlog;
        self
    }

    pub(crate) fn validate(&self) -> Result<(), ConfigError> {
        if self.recv_buffer_size == 0 {
            return Err(ConfigError::Invalid(
                "receive buffer size must be greater than zero".into(),
            ));
        }
        if self.backlog <= 0 {
            return Err(ConfigError::Invalid(format!(
                "backlog must be positive, got {}",
                self.backlog
            )));
        }
        Ok(())
    }
}

impl Default for CollectorConfig {
    fn default() -> Self {
        Self {
            bind: SocketAddr::from((Ipv4Addr::UNSPECIFIED, DEFAULT_COLLECTOR_PORT)),
            recv_buffer_size: DEFAULT_RECV_BUFFER_SIZE,
            backlog: DEFAULT_BACKLOG,
        }
    }
}
