//! Pull-based message source for the DATA phase.
//!
//! The transport never holds the whole message in a socket buffer: it asks the
//! [`Payload`] for the next chunk whenever the connection can take more bytes,
//! and stops when a read returns `0`.

use std::io;

/// A composed message plus the number of bytes not yet handed to the transport.
///
/// `remaining` only ever decreases, reaches zero exactly once, and from then on
/// every read returns `0`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Payload {
    message: Vec<u8>,
    remaining: usize,
}

impl Payload {
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        let message = message.into().into_bytes();
        Self {
            remaining: message.len(),
            message,
        }
    }

    /// Total size of the message in bytes.
    #[must_use]
    pub const fn len(&self) -> usize {
        self.message.len()
    }

    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.message.is_empty()
    }

    /// Bytes not yet served.
    #[must_use]
    pub const fn remaining(&self) -> usize {
        self.remaining
    }

    /// Returns `true` once every byte has been served.
    #[must_use]
    pub const fn is_exhausted(&self) -> bool {
        self.remaining == 0
    }

    /// Copy up to `buffer.len()` unread bytes into `buffer`.
    ///
    /// Returns the number of bytes copied; `0` means end of stream. A zero
    /// length buffer also yields `0` without consuming anything, so callers must
    /// always offer at least one byte of space.
    pub fn read_chunk(&mut self, buffer: &mut [u8]) -> usize {
        let copy = self.remaining.min(buffer.len());
        if copy > 0 {
            let start = self.message.len() - self.remaining;
            buffer[..copy].copy_from_slice(&self.message[start..start + copy]);
            self.remaining -= copy;
        }

        copy
    }
}

impl io::Read for Payload {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        Ok(self.read_chunk(buf))
    }
}
