//! Error types for the herald-common crate.

use std::{io, path::PathBuf};

use thiserror::Error;

/// Errors produced while loading or validating configuration.
///
/// Validation never partially applies a configuration: a caller that receives
/// one of these keeps whatever configuration it had before.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A required configuration field is absent.
    #[error("Missing required field: {0}")]
    MissingField(&'static str),

    /// The configured port does not fit in a TCP port number.
    #[error("Port {0} is out of range (maximum is 65535)")]
    PortOutOfRange(u32),

    /// The configuration file could not be read.
    #[error("Failed to read config from {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// The configuration file is not valid RON for this schema.
    #[error("Failed to parse config: {0}")]
    Parse(#[from] ron::error::SpannedError),
}

impl ConfigError {
    /// Returns `true` if the error came from validating values rather than from
    /// reading or parsing a file.
    #[must_use]
    pub const fn is_validation(&self) -> bool {
        matches!(self, Self::MissingField(_) | Self::PortOutOfRange(_))
    }
}
