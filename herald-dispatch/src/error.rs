use std::io;

use herald_common::ConfigError;
use herald_smtp::{ClientError, MessageError};
use thiserror::Error;

/// Failure of a lifecycle operation. Whatever the operation had allocated is
/// released before this is returned.
#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("Invalid mail configuration: {0}")]
    Config(#[from] ConfigError),

    #[error("Mailer is already initialized")]
    AlreadyInitialized,

    #[error("Transport failed to initialize: {0}")]
    TransportInit(#[source] TransportError),

    #[error("Failed to allocate multiplexer for slot {slot}: {source}")]
    MultiplexerInit {
        slot: usize,
        #[source]
        source: TransportError,
    },

    #[error("Failed to start poller thread: {0}")]
    PollerSpawn(#[source] io::Error),
}

/// Why a message never reached a multiplexer.
///
/// These are logged inside [`Mailer::send`](crate::Mailer::send) and never
/// returned to the caller.
#[derive(Debug, Error)]
pub enum SubmissionError {
    #[error("Invalid recipient address {0:?}")]
    InvalidRecipient(String),

    #[error("Invalid sender address {0:?}")]
    InvalidSender(String),

    #[error("Unable to compose message: {0}")]
    Compose(#[from] MessageError),

    #[error("Unable to attach transfer: {0}")]
    Attach(#[from] TransportError),
}

/// Errors raised by a [`Transport`](crate::Transport) or one of its
/// multiplexers.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("Unable to start transport runtime: {0}")]
    Runtime(#[source] io::Error),

    #[error("Transfer rejected: {0}")]
    Rejected(String),

    #[error("Multiplexer has been shut down")]
    Closed,

    #[error("{0}")]
    Unavailable(String),
}

/// Outcome of a transfer that ran and did not deliver.
#[derive(Debug, Error)]
pub enum TransferError {
    #[error(transparent)]
    Client(#[from] ClientError),

    #[error("Transfer is missing its {0}")]
    Incomplete(&'static str),

    #[error("Transfer task ended abnormally: {0}")]
    Aborted(String),
}

impl TransferError {
    /// Returns `true` if a later attempt might succeed. Nothing in herald
    /// retries; this only shapes the log line.
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        match self {
            Self::Client(e) => e.is_transient(),
            Self::Incomplete(_) | Self::Aborted(_) => false,
        }
    }
}
