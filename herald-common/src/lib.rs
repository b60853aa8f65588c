//! Shared building blocks for the herald mail dispatch crates: configuration,
//! logging, and the configuration error type.

pub mod config;
pub mod error;
pub mod logging;

pub use tracing;

pub use crate::{
    config::{
        ClientTimeouts, DispatchConfig, HeraldConfig, SmtpConfig, SmtpPreferences, TlsMode,
    },
    error::ConfigError,
};
