//! TCP front end feeding a [`Dispatcher`].

use std::collections::HashMap;
use std::io;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, Shutdown, SocketAddr, TcpListener, TcpStream};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::thread::{self, JoinHandle};

use delegate::delegate;
use log::{debug, warn};
use parking_lot::Mutex;
use socket2::{Domain, Protocol, Socket, Type};
use thiserror::Error;

use super::{CollectorConfig, Dispatcher, EventSender};
use crate::{codec::RecordReader, config::ConfigError, handler::EventHandler};

/// Failure to start a collector.
#[derive(Debug, Error)]
pub enum CollectorError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: io::Error,
    },
}

type ConnectionTable = Arc<Mutex<HashMap<u64, TcpStream>>>;

/// Shared between the collector handle and its accept thread.
struct AcceptState {
    running: AtomicBool,
    next_id: AtomicU64,
    connections: ConnectionTable,
    readers: Mutex<Vec<JoinHandle<()>>>,
}

/// Accepts framed event streams and enqueues every decoded event on a
/// [`Dispatcher`].
///
/// Each connection gets its own reader thread, so events from one connection
/// keep their order while different connections interleave freely.
pub struct Collector {
    local_addr: SocketAddr,
    dispatcher: Arc<Dispatcher>,
    state: Arc<AcceptState>,
    accept_handle: Mutex<Option<JoinHandle<()>>>,
}

impl Collector {
    /// Bind the listener and start accepting connections.
    pub fn bind(config: CollectorConfig, dispatcher: Arc<Dispatcher>) -> Result<Self, CollectorError> {
        config.validate()?;
        let listener = listen(&config).map_err(|source| CollectorError::Bind {
            addr: config.bind,
            source,
        })?;
        let local_addr = listener.local_addr().map_err(|source| CollectorError::Bind {
            addr: config.bind,
            source,
        })?;
        let state = Arc::new(AcceptState {
            running: AtomicBool::new(true),
            next_id: AtomicU64::new(0),
            connections: Arc::new(Mutex::new(HashMap::new())),
            readers: Mutex::new(Vec::new()),
        });
        let accept_state = Arc::clone(&state);
        let sender = dispatcher.sender();
        let accept_handle = thread::spawn(move || accept_loop(&listener, &accept_state, &sender));
        debug!("Collector: listening on {local_addr}");
        Ok(Self {
            local_addr,
            dispatcher,
            state,
            accept_handle: Mutex::new(Some(accept_handle)),
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn dispatcher(&self) -> &Arc<Dispatcher> {
        &self.dispatcher
    }

    /// Connections currently being read.
    pub fn active_connections(&self) -> usize {
        self.state.connections.lock().len()
    }

    delegate! {
        to self.dispatcher {
            pub fn add_handler(&self, handler: Arc<dyn EventHandler>);
            pub fn handler_names(&self) -> Vec<String>;
            /// Wait for queued events to be handled and flush every handler.
            pub fn flush(&self) -> bool;
        }
    }

    /// Stop accepting, close live connections and join their readers, then
    /// shut the dispatcher down.
    ///
    /// Idempotent; also runs on drop.
    pub fn shutdown(&self) {
        if self.state.running.swap(false, Ordering::AcqRel) {
            // The accept thread only notices the flag once `accept` returns.
            if let Err(err) = TcpStream::connect(wake_addr(self.local_addr)) {
                debug!("Collector: wake-up connect failed: {err}");
            }
        }
        let handle = { self.accept_handle.lock().take() };
        if let Some(handle) = handle
            && handle.join().is_err()
        {
            warn!("Collector: accept thread panicked");
        }
        for (_, stream) in self.state.connections.lock().drain() {
            let _ = stream.shutdown(Shutdown::Both);
        }
        let readers = std::mem::take(&mut *self.state.readers.lock());
        for reader in readers {
            if reader.join().is_err() {
                warn!("Collector: connection reader panicked");
            }
        }
        self.dispatcher.shutdown();
    }
}

impl Drop for Collector {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl std::fmt::Debug for Collector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Collector")
            .field("local_addr", &self.local_addr)
            .field("active_connections", &self.active_connections())
            .finish()
    }
}

fn listen(config: &CollectorConfig) -> io::Result<TcpListener> {
    let socket = Socket::new(
        Domain::for_address(config.bind),
        Type::STREAM,
        Some(Protocol::TCP),
    )?;
    socket.set_reuse_address(true)?;
    socket.set_recv_buffer_size(config.recv_buffer_size)?;
    socket.bind(&config.bind.into())?;
    socket.listen(config.backlog)?;
    Ok(socket.into())
}

/// Loopback address reaching a listener bound to `addr`.
fn wake_addr(addr: SocketAddr) -> SocketAddr {
    let ip = match addr.ip() {
        IpAddr::V4(ip) if ip.is_unspecified() => IpAddr::V4(Ipv4Addr::LOCALHOST),
        IpAddr::V6(ip) if ip.is_unspecified() => IpAddr::V6(Ipv6Addr::LOCALHOST),
        ip => ip,
    };
    SocketAddr::new(ip, addr.port())
}

fn accept_loop(listener: &TcpListener, state: &Arc<AcceptState>, sender: &EventSender) {
    for stream in listener.incoming() {
        if !state.running.load(Ordering::Acquire) {
            break;
        }
        match stream {
            Ok(stream) => {
                if let Err(err) = register(stream, state, sender) {
                    warn!("Collector: failed to register connection: {err}");
                }
            }
            Err(err) => warn!("Collector: accept failed: {err}"),
        }
    }
}

fn register(stream: TcpStream, state: &Arc<AcceptState>, sender: &EventSender) -> io::Result<()> {
    let peer = stream.peer_addr()?;
    let id = state.next_id.fetch_add(1, Ordering::Relaxed);
    state.connections.lock().insert(id, stream.try_clone()?);
    let connections = Arc::clone(&state.connections);
    let sender = sender.clone();
    let handle = thread::spawn(move || {
        read_connection(stream, peer, &sender);
        connections.lock().remove(&id);
    });
    let mut readers = state.readers.lock();
    readers.retain(|h| !h.is_finished());
    readers.push(handle);
    debug!("Collector: accepted connection from {peer}");
    Ok(())
}

fn read_connection(stream: TcpStream, peer: SocketAddr, sender: &EventSender) {
    let mut reader = RecordReader::new(io::BufReader::new(stream));
    loop {
        match reader.read() {
            Ok(Some(event)) => {
                if sender.enqueue(event).is_err() {
                    debug!("Collector: dispatcher closed; dropping connection from {peer}");
                    break;
                }
            }
            Ok(None) => {
                debug!("Collector: {peer} closed after {} records", reader.records_read());
                break;
            }
            Err(err) => {
                warn!("Collector: dropping connection from {peer}: {err}");
                break;
            }
        }
    }
}
