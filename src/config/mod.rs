//! Configuration errors and the INI settings loader.
//!
//! Each component validates its own typed config at construction and reports
//! problems as [`ConfigError`]. [`Settings`] fills those configs from an INI
//! document.

mod settings;


use std::io;
use std::path::PathBuf;

use thiserror::Error;

use crate::transport::BackoffConfigError;

pub use settings::Settings;

/// Errors raised while building or loading a configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A value failed validation at construction time.
    #[error("invalid configuration: {0}")]
    Invalid(String),
    #[error(transparent)]
    Backoff(#[from] BackoffConfigError),
    #[error("failed to read {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    /// The document is not valid INI.
    #[error("malformed settings: {0}")]
    Parse(String),
    #[error("unknown section [{0}]")]
    UnknownSection(String),
    #[error("unknown key {key} in [{section}]")]
    UnknownKey { section: String, key: String },
    #[error("missing key {key} in [{section}]")]
    MissingKey { section: String, key: String },
    #[error("invalid value {value:?} for {key} in [{section}]: {reason}")]
    InvalidValue {
        section: String,
        key: String,
        value: String,
        reason: String,
    },
}
