//! Mail server connection settings.
//!
//! [`SmtpPreferences`] is the raw shape handed over by the configuration
//! source: every string may be absent and the port is an unchecked integer.
//! [`SmtpPreferences::validate`] turns it into an [`SmtpConfig`], the immutable
//! snapshot read by every submission.

use std::{fmt, path::PathBuf};

use serde::{Deserialize, Serialize};

use super::TlsMode;
use crate::error::ConfigError;

/// Port used for implicit TLS submission when none is configured.
pub const DEFAULT_SMTPS_PORT: u16 = 465;

/// Port used for plain SMTP when none is configured.
pub const DEFAULT_SMTP_PORT: u16 = 25;

/// Unvalidated mail server settings as supplied by the configuration source.
#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SmtpPreferences {
    /// PEM bundle of trusted certificate authorities. An empty path selects the
    /// platform trust store.
    #[serde(default)]
    pub ca_cert_store: Option<PathBuf>,

    /// Host name of the mail server, without scheme.
    #[serde(default)]
    pub server: Option<String>,

    /// TCP port. `0` selects the default port for the TLS mode.
    #[serde(default)]
    pub port: u32,

    #[serde(default)]
    pub username: Option<String>,

    #[serde(default)]
    pub password: Option<String>,

    #[serde(default)]
    pub tls: TlsMode,
}

impl SmtpPreferences {
    /// Preferences with every required field present.
    #[must_use]
    pub fn new(
        ca_cert_store: impl Into<PathBuf>,
        server: impl Into<String>,
        port: u32,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        Self {
            ca_cert_store: Some(ca_cert_store.into()),
            server: Some(server.into()),
            port,
            username: Some(username.into()),
            password: Some(password.into()),
            tls: TlsMode::default(),
        }
    }

    #[must_use]
    pub const fn with_tls(mut self, tls: TlsMode) -> Self {
        self.tls = tls;
        self
    }

    /// Check the preferences and build a configuration snapshot.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::MissingField`] for the first absent string
    /// (checked in the order CA store, server, port range, username, password)
    /// and [`ConfigError::PortOutOfRange`] for a port above 65535.
    pub fn validate(&self) -> Result<SmtpConfig, ConfigError> {
        let ca_cert_store = self
            .ca_cert_store
            .clone()
            .ok_or(ConfigError::MissingField("ca_cert_store"))?;

        let host = self
            .server
            .clone()
            .ok_or(ConfigError::MissingField("server"))?;

        let port = u16::try_from(self.port).map_err(|_| ConfigError::PortOutOfRange(self.port))?;
        let port = match (port, self.tls) {
            (0, TlsMode::Implicit) => DEFAULT_SMTPS_PORT,
            (0, TlsMode::Disabled) => DEFAULT_SMTP_PORT,
            (port, _) => port,
        };

        let username = self
            .username
            .clone()
            .ok_or(ConfigError::MissingField("username"))?;

        let password = self
            .password
            .clone()
            .ok_or(ConfigError::MissingField("password"))?;

        Ok(SmtpConfig {
            url: format!("{}://{host}", self.tls.scheme()),
            ca_cert_store,
            host,
            port,
            username,
            password,
            tls: self.tls,
        })
    }
}

impl fmt::Debug for SmtpPreferences {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SmtpPreferences")
            .field("ca_cert_store", &self.ca_cert_store)
            .field("server", &self.server)
            .field("port", &self.port)
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .field("tls", &self.tls)
            .finish()
    }
}

/// Validated mail server settings.
///
/// Instances are only created by [`SmtpPreferences::validate`] and never
/// mutated; reconfiguration swaps in a whole new snapshot.
#[derive(Clone, PartialEq, Eq)]
pub struct SmtpConfig {
    ca_cert_store: PathBuf,
    url: String,
    host: String,
    port: u16,
    username: String,
    password: String,
    tls: TlsMode,
}

impl SmtpConfig {
    #[must_use]
    pub fn ca_cert_store(&self) -> &std::path::Path {
        &self.ca_cert_store
    }

    /// Server URL including scheme, e.g. `smtps://mail.example.com`.
    #[must_use]
    pub fn url(&self) -> &str {
        &self.url
    }

    #[must_use]
    pub fn host(&self) -> &str {
        &self.host
    }

    #[must_use]
    pub const fn port(&self) -> u16 {
        self.port
    }

    #[must_use]
    pub fn username(&self) -> &str {
        &self.username
    }

    #[must_use]
    pub fn password(&self) -> &str {
        &self.password
    }

    #[must_use]
    pub const fn tls(&self) -> TlsMode {
        self.tls
    }

    /// `host:port`, suitable for a TCP connect.
    #[must_use]
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl fmt::Debug for SmtpConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SmtpConfig")
            .field("ca_cert_store", &self.ca_cert_store)
            .field("url", &self.url)
            .field("port", &self.port)
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .field("tls", &self.tls)
            .finish_non_exhaustive()
    }
}
