//! INI settings for the client, collector and archiver.
//!
//! ```ini
//! [client]
//! collector = 10.0.0.5:9202
//! overflow_policy = timeout
//! overflow_timeout_ms = 250
//!
//! [collector]
//! bind = 0.0.0.0:9202
//! queue_capacity = 4096
//!
//! [archiver]
//! root = /var/lib/femtoship
//! max_file_size = 104857600
//! ```
//!
//! Missing keys keep their defaults; unknown sections and keys are errors.

use std::fmt::Display;
use std::fs;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use ini::{Ini, Properties};

use super::ConfigError;
use crate::{
    archive::ArchiverConfig,
    dispatcher::{CollectorConfig, DispatcherConfig},
    transport::{ClientConfig, OverflowPolicy},
};

const CLIENT_KEYS: &[&str] = &[
    "collector",
    "name",
    "capacity",
    "overflow_policy",
    "overflow_timeout_ms",
    "connect_timeout_ms",
    "write_timeout_ms",
    "flush_timeout_ms",
    "backoff_initial_ms",
    "backoff_max_ms",
    "backoff_reset_ms",
];
const COLLECTOR_KEYS: &[&str] = &["bind", "recv_buffer_size", "backlog", "queue_capacity"];
const ARCHIVER_KEYS: &[&str] = &[
    "root",
    "max_file_size",
    "slot_interval_secs",
    "metadata_capacity",
];

/// Typed configuration loaded from an INI document.
#[derive(Clone, Debug, Default)]
pub struct Settings {
    /// Present when the document has a `[client]` section.
    pub client: Option<ClientConfig>,
    pub collector: CollectorConfig,
    pub dispatcher: DispatcherConfig,
    /// Present when the document has an `[archiver]` section.
    pub archiver: Option<ArchiverConfig>,
}

impl Settings {
    /// Read and parse the settings file at `path`.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_ini_str(&text)
    }

    pub fn from_ini_str(text: &str) -> Result<Self, ConfigError> {
        let ini = Ini::load_from_str(text).map_err(|err| ConfigError::Parse(err.to_string()))?;
        let mut settings = Self::default();
        for (name, props) in ini.iter() {
            let Some(name) = name else {
                if let Some((key, _)) = props.iter().next() {
                    return Err(ConfigError::UnknownKey {
                        section: "general".into(),
                        key: key.into(),
                    });
                }
                continue;
            };
            let section = Section { name, props };
            match name {
                "client" => settings.client = Some(section.client()?),
                "collector" => {
                    let (collector, dispatcher) = section.collector()?;
                    settings.collector = collector;
                    settings.dispatcher = dispatcher;
                }
                "archiver" => settings.archiver = Some(section.archiver()?),
                other => return Err(ConfigError::UnknownSection(other.into())),
            }
        }
        settings.validate()?;
        Ok(settings)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if let Some(client) = &self.client {
            client.validate()?;
        }
        self.collector.validate()?;
        self.dispatcher.validate()?;
        if let Some(archiver) = &self.archiver {
            archiver.validate()?;
        }
        Ok(())
    }
}

struct Section<'a> {
    name: &'a str,
    props: &'a Properties,
}

impl Section<'_> {
    fn check_keys(&self, allowed: &[&str]) -> Result<(), ConfigError> {
        match self.props.iter().find(|(key, _)| !allowed.contains(key)) {
            Some((key, _)) => Err(ConfigError::UnknownKey {
                section: self.name.into(),
                key: key.into(),
            }),
            None => Ok(()),
        }
    }

    fn get<T>(&self, key: &str) -> Result<Option<T>, ConfigError>
    where
        T: FromStr,
        T::Err: Display,
    {
        self.props
            .get(key)
            .map(|raw| {
                raw.trim().parse().map_err(|err: T::Err| self.invalid(key, raw, err))
            })
            .transpose()
    }

    fn require<T>(&self, key: &str) -> Result<T, ConfigError>
    where
        T: FromStr,
        T::Err: Display,
    {
        self.get(key)?.ok_or_else(|| ConfigError::MissingKey {
            section: self.name.into(),
            key: key.into(),
        })
    }

    fn millis(&self, key: &str) -> Result<Option<Duration>, ConfigError> {
        Ok(self.get::<u64>(key)?.map(Duration::from_millis))
    }

    fn invalid(&self, key: &str, value: &str, reason: impl Display) -> ConfigError {
        ConfigError::InvalidValue {
            section: self.name.into(),
            key: key.into(),
            value: value.into(),
            reason: reason.to_string(),
        }
    }

    fn client(&self) -> Result<ClientConfig, ConfigError> {
        self.check_keys(CLIENT_KEYS)?;
        let mut config = ClientConfig::new(self.require::<SocketAddr>("collector")?);
        if let Some(name) = self.props.get("name") {
            config.name = name.trim().to_owned();
        }
        if let Some(capacity) = self.get("capacity")? {
            config.capacity = capacity;
        }
        if let Some(policy) = self.overflow_policy()? {
            config.overflow_policy = policy;
        }
        if let Some(timeout) = self.millis("connect_timeout_ms")? {
            config.connect_timeout = timeout;
        }
        if let Some(timeout) = self.millis("write_timeout_ms")? {
            config.write_timeout = timeout;
        }
        if let Some(timeout) = self.millis("flush_timeout_ms")? {
            config.flush_timeout = timeout;
        }
        if let Some(initial) = self.millis("backoff_initial_ms")? {
            config.backoff.initial = initial;
        }
        if let Some(max) = self.millis("backoff_max_ms")? {
            config.backoff.max = max;
        }
        if let Some(reset) = self.millis("backoff_reset_ms")? {
            config.backoff.reset_after = reset;
        }
        Ok(config)
    }

    fn overflow_policy(&self) -> Result<Option<OverflowPolicy>, ConfigError> {
        let timeout = self.millis("overflow_timeout_ms")?;
        let Some(raw) = self.props.get("overflow_policy") else {
            return match timeout {
                Some(_) => Err(self.invalid(
                    "overflow_timeout_ms",
                    "",
                    "requires overflow_policy = timeout",
                )),
                None => Ok(None),
            };
        };
        let policy = match raw.trim().to_ascii_lowercase().as_str() {
            "drop" => OverflowPolicy::Drop,
            "block" => OverflowPolicy::Block,
            "timeout" => OverflowPolicy::Timeout(timeout.ok_or_else(|| ConfigError::MissingKey {
                section: self.name.into(),
                key: "overflow_timeout_ms".into(),
            })?),
            _ => {
                return Err(self.invalid(
                    "overflow_policy",
                    raw,
                    "expected drop, block or timeout",
                ));
            }
        };
        Ok(Some(policy))
    }

    fn collector(&self) -> Result<(CollectorConfig, DispatcherConfig), ConfigError> {
        self.check_keys(COLLECTOR_KEYS)?;
        let mut collector = CollectorConfig::default();
        let mut dispatcher = DispatcherConfig::default();
        if let Some(bind) = self.get("bind")? {
            collector.bind = bind;
        }
        if let Some(bytes) = self.get("recv_buffer_size")? {
            collector.recv_buffer_size = bytes;
        }
        if let Some(backlog) = self.get("backlog")? {
            collector.backlog = backlog;
        }
        if let Some(capacity) = self.get("queue_capacity")? {
            dispatcher.capacity = capacity;
        }
        Ok((collector, dispatcher))
    }

    fn archiver(&self) -> Result<ArchiverConfig, ConfigError> {
        self.check_keys(ARCHIVER_KEYS)?;
        let mut config = ArchiverConfig::new(self.require::<PathBuf>("root")?);
        if let Some(bytes) = self.get("max_file_size")? {
            config.max_file_size = bytes;
        }
        if let Some(secs) = self.get::<u64>("slot_interval_secs")? {
            config.slot_interval = Duration::from_secs(secs);
        }
        if let Some(capacity) = self.get("metadata_capacity")? {
            config.metadata_capacity = capacity;
        }
        Ok(config)
    }
}
