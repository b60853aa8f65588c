//! Transparency encoding for the DATA phase (RFC 5321 section 4.5.2).
//!
//! Chunks arrive in arbitrary sizes from a [`Payload`](crate::Payload), so the
//! encoder keeps just enough state to recognise line starts and bare line feeds
//! across chunk boundaries.

#[derive(Debug)]
pub struct DataEncoder {
    at_line_start: bool,
    last_was_cr: bool,
}

impl Default for DataEncoder {
    fn default() -> Self {
        Self::new()
    }
}

impl DataEncoder {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            at_line_start: true,
            last_was_cr: false,
        }
    }

    /// Append the encoded form of `chunk` to `out`.
    ///
    /// Lines starting with `.` get an extra `.` and bare `LF` becomes `CRLF`.
    pub fn encode(&mut self, chunk: &[u8], out: &mut Vec<u8>) {
        for &byte in chunk {
            if self.at_line_start && byte == b'.' {
                out.push(b'.');
            }
            if byte == b'\n' && !self.last_was_cr {
                out.push(b'\r');
            }
            out.push(byte);

            self.last_was_cr = byte == b'\r';
            self.at_line_start = byte == b'\n';
        }
    }

    /// Append the end-of-data marker, closing an unterminated last line first.
    pub fn finish(&mut self, out: &mut Vec<u8>) {
        if self.last_was_cr {
            out.push(b'\n');
        } else if !self.at_line_start {
            out.extend_from_slice(b"\r\n");
        }
        out.extend_from_slice(b".\r\n");

        *self = Self::new();
    }
}
