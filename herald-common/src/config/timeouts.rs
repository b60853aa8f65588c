//! Per-phase timeouts for the outbound SMTP dialogue.
//!
//! Every phase of a transfer is bounded, so a mail server that accepts the
//! connection and then stalls cannot pin a transfer (and its memory) in a
//! multiplexer forever.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Client-side SMTP timeout configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientTimeouts {
    /// Timeout for establishing the TCP connection and TLS handshake.
    ///
    /// Default: 30 seconds
    #[serde(default = "defaults::connect_secs")]
    pub connect_secs: u64,

    /// Timeout for the greeting and EHLO/HELO.
    ///
    /// Default: 30 seconds
    #[serde(default = "defaults::ehlo_secs")]
    pub ehlo_secs: u64,

    /// Timeout for each step of the AUTH exchange.
    ///
    /// Default: 30 seconds
    #[serde(default = "defaults::auth_secs")]
    pub auth_secs: u64,

    /// Timeout for MAIL FROM command.
    ///
    /// Default: 30 seconds
    #[serde(default = "defaults::mail_from_secs")]
    pub mail_from_secs: u64,

    /// Timeout for RCPT TO command.
    ///
    /// Default: 30 seconds
    #[serde(default = "defaults::rcpt_to_secs")]
    pub rcpt_to_secs: u64,

    /// Timeout for DATA command and message transfer.
    ///
    /// Default: 120 seconds (2 minutes)
    #[serde(default = "defaults::data_secs")]
    pub data_secs: u64,

    /// Timeout for QUIT command.
    ///
    /// Default: 10 seconds (doesn't fail the transfer if it elapses)
    #[serde(default = "defaults::quit_secs")]
    pub quit_secs: u64,
}

impl Default for ClientTimeouts {
    fn default() -> Self {
        Self {
            connect_secs: defaults::connect_secs(),
            ehlo_secs: defaults::ehlo_secs(),
            auth_secs: defaults::auth_secs(),
            mail_from_secs: defaults::mail_from_secs(),
            rcpt_to_secs: defaults::rcpt_to_secs(),
            data_secs: defaults::data_secs(),
            quit_secs: defaults::quit_secs(),
        }
    }
}

impl ClientTimeouts {
    #[must_use]
    pub const fn connect(&self) -> Duration {
        Duration::from_secs(self.connect_secs)
    }

    #[must_use]
    pub const fn ehlo(&self) -> Duration {
        Duration::from_secs(self.ehlo_secs)
    }

    #[must_use]
    pub const fn auth(&self) -> Duration {
        Duration::from_secs(self.auth_secs)
    }

    #[must_use]
    pub const fn mail_from(&self) -> Duration {
        Duration::from_secs(self.mail_from_secs)
    }

    #[must_use]
    pub const fn rcpt_to(&self) -> Duration {
        Duration::from_secs(self.rcpt_to_secs)
    }

    #[must_use]
    pub const fn data(&self) -> Duration {
        Duration::from_secs(self.data_secs)
    }

    #[must_use]
    pub const fn quit(&self) -> Duration {
        Duration::from_secs(self.quit_secs)
    }

    /// Upper bound on a whole transfer: the sum of every phase.
    #[must_use]
    pub const fn total(&self) -> Duration {
        Duration::from_secs(
            self.connect_secs
                + self.ehlo_secs
                + self.auth_secs
                + self.mail_from_secs
                + self.rcpt_to_secs
                + self.data_secs
                + self.quit_secs,
        )
    }
}

/// Default timeout values.
mod defaults {
    pub const fn connect_secs() -> u64 {
        30
    }
    pub const fn ehlo_secs() -> u64 {
        30
    }
    pub const fn auth_secs() -> u64 {
        30
    }
    pub const fn mail_from_secs() -> u64 {
        30
    }
    pub const fn rcpt_to_secs() -> u64 {
        30
    }
    pub const fn data_secs() -> u64 {
        120 // 2 minutes
    }
    pub const fn quit_secs() -> u64 {
        10
    }
}
