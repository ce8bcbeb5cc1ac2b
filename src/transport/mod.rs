//! Client side of the pipeline.
//!
//! [`TransportClient`] frames [`LogEvent`](crate::event::LogEvent) values with
//! the record codec and writes them to a collector over TCP. A worker thread
//! owns the connection and reconnects using the per-peer delays handed out by
//! [`ReconnectDelayManager`]. The client also implements
//! [`EventHandler`](crate::handler::EventHandler), so a collector can forward
//! its stream to another collector.

mod backoff;
mod client;
mod config;
mod connection;
mod worker;


pub use backoff::{BackoffConfigError, ReconnectDelayManager};
pub use client::{ClientError, TransportClient};
pub use config::{
    BackoffPolicy, ClientConfig, DEFAULT_BACKOFF_INITIAL, DEFAULT_BACKOFF_MAX,
    DEFAULT_BACKOFF_RESET, DEFAULT_CHANNEL_CAPACITY, DEFAULT_CONNECT_TIMEOUT,
    DEFAULT_FLUSH_TIMEOUT, DEFAULT_WRITE_TIMEOUT, OverflowPolicy,
};
pub use worker::ClientStats;
