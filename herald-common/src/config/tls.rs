//! TLS configuration for outbound SMTP connections.

use serde::{Deserialize, Serialize};

/// How the connection to the mail server is secured.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum TlsMode {
    /// TLS from the first byte ("smtps", usually port 465).
    ///
    /// This is the default and the only mode that should be used against a
    /// remote relay: credentials are sent during the SMTP dialogue.
    #[default]
    Implicit,

    /// Plain TCP, no TLS at all.
    ///
    /// **WARNING**: Only use for a relay on the loopback interface or for
    /// testing. Credentials travel in the clear.
    Disabled,
}

impl TlsMode {
    /// URL scheme used when describing a server in this mode.
    #[must_use]
    pub const fn scheme(self) -> &'static str {
        match self {
            Self::Implicit => "smtps",
            Self::Disabled => "smtp",
        }
    }

    /// Returns `true` if the connection is wrapped in TLS.
    #[must_use]
    pub const fn is_secure(self) -> bool {
        matches!(self, Self::Implicit)
    }
}
