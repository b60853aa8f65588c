//! Non-blocking dispatch of notification mail.
//!
//! A [`Mailer`] owns a small pool of transport [multiplexers](transport::Multiplexer),
//! each behind its own mutex, and one background thread that drives every
//! in-flight transfer and reclaims finished ones. [`Mailer::send`] only
//! composes the message and hands it to whichever slot it can lock first; it
//! never waits on the network.
//!
//! ```no_run
//! use herald_common::{DispatchConfig, SmtpPreferences};
//! use herald_dispatch::Mailer;
//!
//! let mailer = Mailer::smtps(DispatchConfig::default());
//! mailer
//!     .initialize(&SmtpPreferences::new(
//!         "/etc/ssl/certs/ca-bundle.pem",
//!         "mail.example.com",
//!         465,
//!         "bnetd",
//!         "secret",
//!     ))
//!     .expect("valid mail settings");
//!
//! mailer.send(
//!     "player@example.com",
//!     "noreply@example.com",
//!     "Example Realm",
//!     "Verify your account",
//!     "Follow the link to finish registration.",
//! );
//!
//! mailer.shutdown();
//! ```

pub mod error;
pub mod mailer;
pub mod poller;
pub mod pool;
mod smtp_transaction;
pub mod stats;
pub mod transport;

pub use error::{DispatchError, SubmissionError, TransferError, TransportError};
pub use mailer::Mailer;
pub use stats::{DispatchStats, StatsSnapshot};
pub use transport::{
    Completion, Multiplexer, RecipientList, Transfer, TransferId, TransferOptions, Transport,
    smtps::SmtpsTransport,
};
