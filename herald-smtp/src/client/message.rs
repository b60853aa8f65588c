//! Composition of single-part plain text notification messages.

use chrono::{DateTime, FixedOffset, Local};
use thiserror::Error;

/// RFC 2822 date layout used in the `Date` header.
pub const DATE_FORMAT: &str = "%a, %d %b %Y %H:%M:%S %z";

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MessageError {
    #[error("Message has no {0} header")]
    MissingHeader(&'static str),
}

/// Builder for a notification message: a fixed header block followed by the
/// body, all lines CRLF-terminated.
///
/// Headers are emitted in this order: `MIME-Version`, `Content-Type`, `Date`,
/// `From`, `To`, `Subject`. Header values never contain CR or LF; any found in
/// the input are dropped.
///
/// ```
/// use herald_smtp::MessageBuilder;
///
/// let message = MessageBuilder::new()
///     .from("noreply@example.com", "Example Game")
///     .to("player@example.com")
///     .subject("Verify your account")
///     .body("Follow the link to verify your account.")
///     .build()
///     .unwrap();
///
/// assert!(message.starts_with("MIME-Version: 1.0\r\n"));
/// assert!(message.contains("From: \"Example Game\" <noreply@example.com>\r\n"));
/// ```
#[derive(Debug, Clone, Default)]
pub struct MessageBuilder {
    from: Option<(String, String)>,
    to: Option<String>,
    subject: String,
    body: String,
    date: Option<DateTime<FixedOffset>>,
}

impl MessageBuilder {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the sender address and its display name.
    #[must_use]
    pub fn from(mut self, address: impl Into<String>, name: impl Into<String>) -> Self {
        self.from = Some((address.into(), name.into()));
        self
    }

    #[must_use]
    pub fn to(mut self, address: impl Into<String>) -> Self {
        self.to = Some(address.into());
        self
    }

    #[must_use]
    pub fn subject(mut self, subject: impl Into<String>) -> Self {
        self.subject = subject.into();
        self
    }

    #[must_use]
    pub fn body(mut self, body: impl Into<String>) -> Self {
        self.body = body.into();
        self
    }

    /// Overrides the `Date` header, which defaults to the local time at build.
    #[must_use]
    pub fn date(mut self, date: DateTime<FixedOffset>) -> Self {
        self.date = Some(date);
        self
    }

    /// # Errors
    ///
    /// Returns [`MessageError::MissingHeader`] if no sender or recipient was
    /// set.
    pub fn build(self) -> Result<String, MessageError> {
        let (from, name) = self.from.ok_or(MessageError::MissingHeader("From"))?;
        let to = self.to.ok_or(MessageError::MissingHeader("To"))?;
        let date = self
            .date
            .unwrap_or_else(|| Local::now().fixed_offset())
            .format(DATE_FORMAT);

        let mut message = String::with_capacity(256 + self.body.len());
        message.push_str("MIME-Version: 1.0\r\n");
        message.push_str("Content-Type: text/plain; charset=UTF-8\r\n");
        push_header(&mut message, "Date", &date.to_string());
        push_header(
            &mut message,
            "From",
            &format!("\"{}\" <{}>", quote(&name), header_value(&from)),
        );
        push_header(&mut message, "To", &format!("<{to}>"));
        push_header(&mut message, "Subject", &self.subject);
        message.push_str("\r\n");
        message.push_str(&self.body);

        Ok(message)
    }
}

fn push_header(message: &mut String, name: &str, value: &str) {
    message.push_str(name);
    message.push_str(": ");
    message.push_str(&header_value(value));
    message.push_str("\r\n");
}

fn header_value(value: &str) -> String {
    value.chars().filter(|c| !matches!(c, '\r' | '\n')).collect()
}

/// Escapes a display name for use inside a quoted-string.
fn quote(name: &str) -> String {
    let mut quoted = String::with_capacity(name.len());
    for c in name.chars() {
        match c {
            '\r' | '\n' => {}
            '"' | '\\' => {
                quoted.push('\\');
                quoted.push(c);
            }
            _ => quoted.push(c),
        }
    }
    quoted
}
