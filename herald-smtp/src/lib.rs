//! Outbound SMTP for herald.
//!
//! [`client`] speaks the submission dialogue (implicit TLS, AUTH, MAIL, RCPT,
//! DATA) and composes notification messages; [`payload`] holds the pull-based
//! message source the client drains during DATA.

pub mod client;
pub mod payload;

pub use client::{ClientError, MessageBuilder, MessageError, Response, SmtpClient};
pub use payload::Payload;
