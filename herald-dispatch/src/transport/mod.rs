//! The seam between dispatch and the network.
//!
//! A [`Transport`] is the process-wide half: global setup and teardown, and a
//! factory for [`Multiplexer`]s. A multiplexer holds any number of in-flight
//! [`Transfer`]s and only makes progress when driven through
//! [`Multiplexer::wait`] and [`Multiplexer::perform`]; none of its methods are
//! meant to be called concurrently, which is why the pool keeps each one
//! behind a mutex.
//!
//! Ownership of a transfer moves in two steps: the submitter gives it away in
//! [`Multiplexer::add`], and the poller takes it back with
//! [`Multiplexer::remove`] once [`Multiplexer::info_read`] reports it done.

pub mod smtps;

use std::{fmt, path::PathBuf, time::Duration};

use herald_common::{ClientTimeouts, SmtpConfig, TlsMode};
use herald_smtp::Payload;

use crate::error::{SubmissionError, TransferError, TransportError};

/// Process-wide transport context.
pub trait Transport: Send + Sync + 'static {
    type Multiplexer: Multiplexer + 'static;

    /// Prepare process-wide state. Called once per successful initialization,
    /// before any multiplexer is allocated.
    ///
    /// # Errors
    ///
    /// Returns an error if the transport cannot be used at all.
    fn global_init(&self) -> Result<(), TransportError>;

    /// Undo [`Transport::global_init`]. Called after every multiplexer from
    /// the same initialization has been released.
    fn global_cleanup(&self);

    /// Allocate an empty multiplexer.
    ///
    /// # Errors
    ///
    /// Returns an error if the multiplexer's resources cannot be acquired.
    fn multiplexer(&self) -> Result<Self::Multiplexer, TransportError>;
}

/// A set of concurrently progressing transfers, driven by the poller.
pub trait Multiplexer: Send {
    /// Take ownership of `transfer` and start it.
    ///
    /// # Errors
    ///
    /// Returns an error if the transfer is incomplete or the multiplexer can no
    /// longer accept work. The transfer is dropped in that case.
    fn add(&mut self, transfer: Transfer) -> Result<TransferId, TransportError>;

    /// How long the caller should wait for activity before performing, or
    /// `None` if the multiplexer has no preference.
    fn timeout(&self) -> Option<Duration>;

    /// Block for at most `timeout` or until some transfer has activity.
    fn wait(&mut self, timeout: Duration);

    /// Advance every in-flight transfer as far as it can go without blocking.
    /// Returns the number still running.
    fn perform(&mut self) -> usize;

    /// Pop the next finished transfer's outcome.
    fn info_read(&mut self) -> Option<Completion>;

    /// Detach a transfer and hand it back to the caller.
    ///
    /// Returns `None` if the id is unknown, or if the transfer did not finish
    /// normally and there is nothing left to return.
    fn remove(&mut self, id: TransferId) -> Option<Transfer>;
}

/// Identifies a transfer within the multiplexer that holds it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TransferId(u64);

impl TransferId {
    #[must_use]
    pub const fn new(id: u64) -> Self {
        Self(id)
    }
}

impl fmt::Display for TransferId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Reported by [`Multiplexer::info_read`] once a transfer stops running.
#[derive(Debug)]
pub struct Completion {
    pub id: TransferId,
    pub outcome: Result<(), TransferError>,
}

/// Checks a mailbox for characters that would break out of an SMTP path.
fn is_valid_mailbox(address: &str) -> bool {
    !address.trim().is_empty()
        && !address
            .chars()
            .any(|c| matches!(c, '\r' | '\n' | '<' | '>' | '\0'))
}

/// Forward-paths for RCPT TO, each including its angle brackets.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecipientList(Vec<String>);

impl RecipientList {
    /// A list holding the single recipient `to`.
    ///
    /// # Errors
    ///
    /// Returns [`SubmissionError::InvalidRecipient`] if `to` is empty or
    /// contains CR, LF, NUL or angle brackets.
    pub fn new(to: &str) -> Result<Self, SubmissionError> {
        if !is_valid_mailbox(to) {
            return Err(SubmissionError::InvalidRecipient(to.to_string()));
        }
        Ok(Self(vec![format!("<{}>", to.trim())]))
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Connection settings captured from one configuration snapshot.
#[derive(Clone, PartialEq, Eq)]
pub struct TransferOptions {
    pub url: String,
    pub host: String,
    pub port: u16,
    pub ca_cert_store: PathBuf,
    pub username: String,
    pub password: String,
    pub tls: TlsMode,
    /// Name announced in EHLO
    pub helo_domain: String,
    pub timeouts: ClientTimeouts,
}

impl TransferOptions {
    #[must_use]
    pub fn new(config: &SmtpConfig, timeouts: &ClientTimeouts) -> Self {
        Self {
            url: config.url().to_string(),
            host: config.host().to_string(),
            port: config.port(),
            ca_cert_store: config.ca_cert_store().to_path_buf(),
            username: config.username().to_string(),
            password: config.password().to_string(),
            tls: config.tls(),
            helo_domain: "localhost".to_string(),
            timeouts: timeouts.clone(),
        }
    }

    /// `host:port` for the TCP connect.
    #[must_use]
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl fmt::Debug for TransferOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransferOptions")
            .field("url", &self.url)
            .field("port", &self.port)
            .field("ca_cert_store", &self.ca_cert_store)
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .field("tls", &self.tls)
            .field("helo_domain", &self.helo_domain)
            .finish_non_exhaustive()
    }
}

/// One outbound message: where it goes, who it is from and to, and the
/// source its bytes are read from.
#[derive(Debug)]
pub struct Transfer {
    pub(crate) options: TransferOptions,
    pub(crate) mail_from: Option<String>,
    pub(crate) recipients: Option<RecipientList>,
    pub(crate) payload: Option<Payload>,
    pub(crate) upload: bool,
}

impl Transfer {
    #[must_use]
    pub const fn new(options: TransferOptions) -> Self {
        Self {
            options,
            mail_from: None,
            recipients: None,
            payload: None,
            upload: false,
        }
    }

    #[must_use]
    pub const fn options(&self) -> &TransferOptions {
        &self.options
    }

    /// Sets the envelope sender. `from` is stored as a reverse-path, inside
    /// angle brackets.
    ///
    /// # Errors
    ///
    /// Returns [`SubmissionError::InvalidSender`] for the same inputs
    /// [`RecipientList::new`] refuses.
    pub fn set_mail_from(&mut self, from: &str) -> Result<(), SubmissionError> {
        if !is_valid_mailbox(from) {
            return Err(SubmissionError::InvalidSender(from.to_string()));
        }
        self.mail_from = Some(format!("<{}>", from.trim()));
        Ok(())
    }

    #[must_use]
    pub fn mail_from(&self) -> Option<&str> {
        self.mail_from.as_deref()
    }

    pub fn set_recipients(&mut self, recipients: RecipientList) {
        self.recipients = Some(recipients);
    }

    #[must_use]
    pub const fn recipients(&self) -> Option<&RecipientList> {
        self.recipients.as_ref()
    }

    /// Detach the recipient list so it can be released separately from the
    /// transfer.
    pub const fn take_recipients(&mut self) -> Option<RecipientList> {
        self.recipients.take()
    }

    /// Register the source read during the DATA phase.
    pub fn set_payload(&mut self, payload: Payload) {
        self.payload = Some(payload);
    }

    pub const fn payload_mut(&mut self) -> Option<&mut Payload> {
        self.payload.as_mut()
    }

    pub const fn set_upload(&mut self, upload: bool) {
        self.upload = upload;
    }

    #[must_use]
    pub const fn is_upload(&self) -> bool {
        self.upload
    }

    /// Name of the first piece a transfer still needs before it can run.
    #[must_use]
    pub const fn missing(&self) -> Option<&'static str> {
        if !self.upload {
            Some("upload flag")
        } else if self.mail_from.is_none() {
            Some("sender")
        } else if self.recipients.is_none() {
            Some("recipients")
        } else if self.payload.is_none() {
            Some("payload")
        } else {
            None
        }
    }
}
