//! Error types for the SMTP client.

use std::{io, time::Duration};

use thiserror::Error;

/// Errors that can occur while talking to a mail server.
#[derive(Error, Debug)]
pub enum ClientError {
    /// IO error occurred during network operations.
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// Failed to parse an SMTP response from the server.
    #[error("Failed to parse SMTP response: {0}")]
    ParseError(String),

    /// The server answered a command with a code other than the one expected.
    #[error("{command} rejected: {code} {message}")]
    Rejected {
        command: &'static str,
        code: u16,
        message: String,
    },

    /// The CA bundle could not be loaded.
    #[error("Certificate error: {0}")]
    Certificate(String),

    /// TLS handshake or configuration failure.
    #[error("TLS error: {0}")]
    TlsError(String),

    /// AUTH was required but no supported mechanism was advertised.
    #[error("Server offers no supported AUTH mechanism")]
    NoAuthMechanism,

    /// A phase of the dialogue ran past its deadline.
    #[error("{phase} timed out after {after:?}")]
    Timeout { phase: &'static str, after: Duration },

    /// Connection was closed unexpectedly.
    #[error("Connection closed unexpectedly")]
    ConnectionClosed,

    /// UTF-8 decoding error.
    #[error("UTF-8 error: {0}")]
    Utf8Error(#[from] std::str::Utf8Error),
}

impl ClientError {
    /// Returns `true` for 4xx rejections, which a later attempt might get past.
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        matches!(self, Self::Rejected { code, .. } if *code >= 400 && *code < 500)
            || matches!(self, Self::Timeout { .. } | Self::ConnectionClosed)
    }
}

/// Specialized `Result` type for SMTP client operations.
pub type Result<T> = std::result::Result<T, ClientError>;
