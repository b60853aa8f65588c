use std::{num::NonZeroUsize, time::Duration};

use serde::{Deserialize, Serialize};

use super::ClientTimeouts;

const fn default_pool_size() -> NonZeroUsize {
    NonZeroUsize::MIN.saturating_add(1)
}

const fn default_poll_timeout_ms() -> u64 {
    1000
}

/// Shape of the dispatch engine: how many multiplexer slots exist and how the
/// poller paces itself.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DispatchConfig {
    /// Number of independent multiplexer slots.
    ///
    /// Default: 2
    #[serde(default = "default_pool_size")]
    pub pool_size: NonZeroUsize,

    /// How long the poller waits on a slot whose multiplexer expresses no
    /// timeout preference (in milliseconds).
    ///
    /// Default: 1000
    #[serde(default = "default_poll_timeout_ms")]
    pub default_poll_timeout_ms: u64,

    /// Per-phase limits for each SMTP transfer.
    #[serde(default)]
    pub timeouts: ClientTimeouts,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            pool_size: default_pool_size(),
            default_poll_timeout_ms: default_poll_timeout_ms(),
            timeouts: ClientTimeouts::default(),
        }
    }
}

impl DispatchConfig {
    #[must_use]
    pub const fn default_poll_timeout(&self) -> Duration {
        Duration::from_millis(self.default_poll_timeout_ms)
    }

    #[must_use]
    pub const fn with_pool_size(mut self, pool_size: NonZeroUsize) -> Self {
        self.pool_size = pool_size;
        self
    }

    #[must_use]
    pub fn with_default_poll_timeout(mut self, timeout: Duration) -> Self {
        self.default_poll_timeout_ms = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX);
        self
    }

    #[must_use]
    pub fn with_timeouts(mut self, timeouts: ClientTimeouts) -> Self {
        self.timeouts = timeouts;
        self
    }
}
