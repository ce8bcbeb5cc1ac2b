//! Log event representation shipped through the pipeline.
//!
//! A [`LogEvent`] is the unit producers emit, the transport frames, the
//! dispatcher fans out and the archiver persists. Events are immutable once
//! built; [`LogEventBuilder`] assigns the id and captures process context.

use std::fmt;
use std::thread;

use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::id_gen::IdGenerator;

/// Delivery hint attached by the producer.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum Consistency {
    /// The producer accepts loss under failure.
    #[default]
    BestEffort,
    /// The producer expects the event to be archived and acknowledged.
    Durable,
}

/// Named blob carried by an event.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Payload {
    pub name: String,
    pub content_type: Option<String>,
    pub data: Bytes,
}

impl Payload {
    pub fn new(name: impl Into<String>, data: impl Into<Bytes>) -> Self {
        Self {
            name: name.into(),
            content_type: None,
            data: data.into(),
        }
    }

    /// Plain UTF-8 text payload.
    pub fn text(name: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            content_type: Some("text/plain".into()),
            data: Bytes::from(text.into()),
        }
    }

    pub fn with_content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = Some(content_type.into());
        self
    }
}

/// One structured log record.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogEvent {
    /// Unique id assigned by an [`IdGenerator`].
    pub id: u64,
    /// Creation time in milliseconds since the UNIX epoch.
    pub timestamp: u64,
    pub level: i32,
    pub consistency: Consistency,
    pub host: String,
    pub service: String,
    /// Source locator, for example `module::path:42`.
    pub source: String,
    pub pid: u32,
    pub tid: u64,
    /// Short type tag such as `log` or `exception`.
    pub kind: String,
    /// Ordered payloads; the first one is the primary message.
    pub payloads: Vec<Payload>,
}

impl LogEvent {
    /// Return the primary payload as text when it is valid UTF-8.
    pub fn message(&self) -> Option<&str> {
        self.payloads
            .first()
            .and_then(|p| std::str::from_utf8(&p.data).ok())
    }

    /// Look up a payload by name.
    pub fn payload(&self, name: &str) -> Option<&Payload> {
        self.payloads.iter().find(|p| p.name == name)
    }
}

impl fmt::Display for LogEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "#{} {}@{} [{}] {}",
            self.id,
            self.service,
            self.host,
            self.level,
            self.message().unwrap_or("<binary>")
        )
    }
}

/// Builds events tagged with the next id from an [`IdGenerator`].
///
/// Host, process id and thread id default to the calling process and
/// thread; the timestamp defaults to the generator's clock.
pub struct LogEventBuilder<'a> {
    ids: &'a IdGenerator,
    timestamp: Option<u64>,
    level: i32,
    consistency: Consistency,
    host: String,
    service: String,
    source: String,
    tid: u64,
    kind: String,
    payloads: Vec<Payload>,
}

impl<'a> LogEventBuilder<'a> {
    pub fn new(ids: &'a IdGenerator, service: impl Into<String>) -> Self {
        Self {
            ids,
            timestamp: None,
            level: 0,
            consistency: Consistency::default(),
            host: local_host_name(),
            service: service.into(),
            source: String::new(),
            tid: current_thread_number(),
            kind: "log".into(),
            payloads: Vec::new(),
        }
    }

    pub fn level(mut self, level: i32) -> Self {
        self.level = level;
        self
    }

    pub fn timestamp(mut self, timestamp: u64) -> Self {
        self.timestamp = Some(timestamp);
        self
    }

    pub fn consistency(mut self, consistency: Consistency) -> Self {
        self.consistency = consistency;
        self
    }

    pub fn host(mut self, host: impl Into<String>) -> Self {
        self.host = host.into();
        self
    }

    pub fn source(mut self, source: impl Into<String>) -> Self {
        self.source = source.into();
        self
    }

    pub fn kind(mut self, kind: impl Into<String>) -> Self {
        self.kind = kind.into();
        self
    }

    /// Set the primary message, replacing any existing first payload.
    pub fn message(mut self, text: impl Into<String>) -> Self {
        let payload = Payload::text("message", text);
        if self.payloads.is_empty() {
            self.payloads.push(payload);
        } else {
            self.payloads[0] = payload;
        }
        self
    }

    pub fn payload(mut self, payload: Payload) -> Self {
        self.payloads.push(payload);
        self
    }

    pub fn build(self) -> LogEvent {
        LogEvent {
            id: self.ids.next_id(),
            timestamp: self.timestamp.unwrap_or_else(|| self.ids.now_millis()),
            level: self.level,
            consistency: self.consistency,
            host: self.host,
            service: self.service,
            source: self.source,
            pid: std::process::id(),
            tid: self.tid,
            kind: self.kind,
            payloads: self.payloads,
        }
    }
}

fn local_host_name() -> String {
    std::env::var("HOSTNAME")
        .ok()
        .filter(|h| !h.is_empty())
        .unwrap_or_else(|| "localhost".into())
}

/// `ThreadId` has no stable integer accessor, so hash it.
fn current_thread_number() -> u64 {
    use std::hash::{Hash, Hasher};
    let mut hasher = std::collections::hash_map::DefaultHasher::new();
    thread::current().id().hash(&mut hasher);
    hasher.finish()
}
