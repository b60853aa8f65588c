//! SMTP submission client.
//!
//! The pieces a transfer needs, in the order it uses them:
//!
//! - [`connector`]: trust anchors for implicit TLS from a PEM bundle or the
//!   platform store
//! - [`SmtpClient`]: the command/reply dialogue, AUTH PLAIN/LOGIN and the
//!   streamed DATA phase
//! - [`MessageBuilder`]: the plain text header block prepended to a body
//!
//! ```no_run
//! use herald_smtp::{MessageBuilder, Payload, SmtpClient};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let message = MessageBuilder::new()
//!     .from("noreply@example.com", "Example")
//!     .to("player@example.com")
//!     .subject("Welcome")
//!     .body("Hello!")
//!     .build()?;
//!
//! let mut client = SmtpClient::connect("127.0.0.1:2525").await?;
//! client.read_greeting().await?;
//! client.ehlo("localhost").await?;
//! client.mail_from("<noreply@example.com>").await?;
//! client.rcpt_to("<player@example.com>").await?;
//! client.data().await?;
//! client.send_payload(&mut Payload::new(message)).await?;
//! client.quit().await?;
//! # Ok(())
//! # }
//! ```

mod data;
mod error;
mod message;
mod response;
mod smtp_client;
mod tls;

pub use data::DataEncoder;
pub use error::{ClientError, Result};
pub use message::{DATE_FORMAT, MessageBuilder, MessageError};
pub use response::{Response, ResponseLine};
pub use smtp_client::SmtpClient;
pub use tls::connector;
