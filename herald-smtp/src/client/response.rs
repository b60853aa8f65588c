//! SMTP reply parsing.

use super::error::{ClientError, Result};

/// One line of a reply: `<code><sep><text>` where `sep` is `-` on every line
/// but the last.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResponseLine {
    pub code: u16,
    pub is_last: bool,
    pub message: String,
}

/// A complete, possibly multi-line, SMTP reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    pub code: u16,
    pub lines: Vec<String>,
}

impl Response {
    #[must_use]
    pub const fn new(code: u16, lines: Vec<String>) -> Self {
        Self { code, lines }
    }

    /// All reply text joined with spaces, suitable for a log line.
    #[must_use]
    pub fn message(&self) -> String {
        self.lines.join(" ")
    }

    #[must_use]
    pub const fn is_success(&self) -> bool {
        self.code >= 200 && self.code < 300
    }

    /// 3xx: the server wants more input (DATA body, AUTH continuation).
    #[must_use]
    pub const fn is_intermediate(&self) -> bool {
        self.code >= 300 && self.code < 400
    }

    #[must_use]
    pub const fn is_error(&self) -> bool {
        self.code >= 400 && self.code < 600
    }

    /// EHLO keywords advertised in this reply.
    ///
    /// The first line of an EHLO reply is the server's greeting, every later
    /// line names one extension followed by its parameters.
    pub fn capabilities(&self) -> impl Iterator<Item = &str> {
        self.lines.iter().skip(1).map(String::as_str)
    }

    /// Whether the server advertised `mechanism` in an `AUTH` capability line.
    ///
    /// Accepts the obsolete `AUTH=` spelling some servers still emit.
    #[must_use]
    pub fn supports_auth(&self, mechanism: &str) -> bool {
        self.capabilities().any(|line| {
            let mut words = line.split(|c: char| c == ' ' || c == '=');
            words
                .next()
                .is_some_and(|keyword| keyword.eq_ignore_ascii_case("AUTH"))
                && words.any(|word| word.eq_ignore_ascii_case(mechanism))
        })
    }

    /// Parses a single reply line, without its line terminator.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::ParseError`] if the line does not start with a
    /// three digit code followed by a space, a dash or nothing.
    pub fn parse_line(line: &str) -> Result<ResponseLine> {
        let (code, rest) = line
            .split_at_checked(3)
            .ok_or_else(|| ClientError::ParseError(format!("Response line too short: '{line}'")))?;

        if !code.bytes().all(|b| b.is_ascii_digit()) {
            return Err(ClientError::ParseError(format!(
                "Invalid status code: '{code}'"
            )));
        }
        let code = code
            .parse::<u16>()
            .map_err(|_| ClientError::ParseError(format!("Invalid status code: '{code}'")))?;

        let mut chars = rest.chars();
        let is_last = match chars.next() {
            None | Some(' ') => true,
            Some('-') => false,
            Some(c) => {
                return Err(ClientError::ParseError(format!(
                    "Invalid separator character: '{c}'"
                )));
            }
        };

        Ok(ResponseLine {
            code,
            is_last,
            message: chars.as_str().to_string(),
        })
    }

    /// Parses the first complete reply in `buffer`.
    ///
    /// Returns the reply and the number of bytes it occupied, or `None` when
    /// the buffer does not yet hold a final line.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::ParseError`] for malformed lines or when the
    /// lines of a multi-line reply disagree on the code.
    pub fn parse_response(buffer: &[u8]) -> Result<Option<(Self, usize)>> {
        let mut consumed = 0;
        let mut code = None;
        let mut lines = Vec::new();

        while let Some(offset) = buffer[consumed..].iter().position(|&b| b == b'\n') {
            let raw = &buffer[consumed..consumed + offset];
            consumed += offset + 1;

            let raw = raw.strip_suffix(b"\r").unwrap_or(raw);
            if raw.is_empty() {
                continue;
            }

            let line = Self::parse_line(std::str::from_utf8(raw)?)?;
            match code {
                None => code = Some(line.code),
                Some(expected) if expected != line.code => {
                    return Err(ClientError::ParseError(format!(
                        "Status code mismatch in multi-line response: expected {expected}, got {}",
                        line.code
                    )));
                }
                Some(_) => {}
            }

            lines.push(line.message);
            if line.is_last {
                return Ok(code.map(|code| (Self::new(code, lines), consumed)));
            }
        }

        Ok(None)
    }
}
