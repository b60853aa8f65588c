//! Configuration types for herald.
//!
//! - [`smtp`]: mail server address, credentials and CA bundle
//! - [`dispatch`]: pool size and poller pacing
//! - [`timeouts`]: per-phase SMTP client timeouts
//! - [`tls`]: how the connection is secured
//!
//! The whole tree deserialises from a single RON document, see
//! [`HeraldConfig::from_path`].

pub mod dispatch;
pub mod smtp;
pub mod timeouts;
pub mod tls;

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

pub use dispatch::DispatchConfig;
pub use smtp::{SmtpConfig, SmtpPreferences};
pub use timeouts::ClientTimeouts;
pub use tls::TlsMode;

use crate::error::ConfigError;

/// Environment variable naming the configuration file.
pub const CONFIG_ENV: &str = "HERALD_CONFIG";

/// Top level configuration document.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HeraldConfig {
    #[serde(default)]
    pub smtp: SmtpPreferences,

    #[serde(default)]
    pub dispatch: DispatchConfig,
}

impl HeraldConfig {
    /// Read and parse a RON configuration file.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Read`] if the file cannot be read and
    /// [`ConfigError::Parse`] if its contents do not match the schema.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;

        Self::from_ron(&content)
    }

    /// Parse a RON configuration document.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`] if the document does not match the schema.
    pub fn from_ron(content: &str) -> Result<Self, ConfigError> {
        Ok(ron::from_str(content)?)
    }
}

/// Find the configuration file using the following precedence:
/// 1. `HERALD_CONFIG` environment variable
/// 2. ./herald.config.ron (current working directory)
/// 3. /etc/herald/herald.config.ron (system-wide config)
///
/// # Errors
///
/// Fails if `HERALD_CONFIG` names a missing file, or if none of the default
/// locations exist.
pub fn find_config_file() -> anyhow::Result<PathBuf> {
    let default_paths = [
        PathBuf::from("./herald.config.ron"),
        PathBuf::from("/etc/herald/herald.config.ron"),
    ];

    locate(std::env::var_os(CONFIG_ENV).map(PathBuf::from), &default_paths)
}

fn locate(env_path: Option<PathBuf>, default_paths: &[PathBuf]) -> anyhow::Result<PathBuf> {
    if let Some(path) = env_path {
        if path.exists() {
            return Ok(path);
        }
        anyhow::bail!("{CONFIG_ENV} points to non-existent file: {}", path.display());
    }

    if let Some(path) = default_paths.iter().find(|path| path.exists()) {
        return Ok(path.clone());
    }

    let paths_tried = default_paths
        .iter()
        .map(|p| format!("  - {}", p.display()))
        .collect::<Vec<_>>()
        .join("\n");

    anyhow::bail!(
        "No configuration file found. Tried:\n  - {CONFIG_ENV} environment variable\n{paths_tried}"
    )
}
