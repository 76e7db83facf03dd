//! Incremental UTF-8 validation for Text messages (RFC 6455 Section 8.1).
//!
//! Text payloads are checked fragment by fragment as they arrive, so a bad
//! byte fails the connection without waiting for the final fragment. A
//! multi-byte sequence split across fragments is carried over.

use crate::error::{Error, Result};

/// Incremental UTF-8 validator for fragmented WebSocket messages.
///
/// Holds at most three bytes of an unfinished multi-byte sequence between
/// calls; fragments themselves are never copied.
#[derive(Debug, Clone)]
pub struct Utf8Validator {
    /// Buffer for incomplete multi-byte sequences.
    incomplete: [u8; 4],
    /// Number of bytes in the incomplete buffer.
    incomplete_len: usize,
}

impl Default for Utf8Validator {
    fn default() -> Self {
        Self::new()
    }
}

impl Utf8Validator {
    /// Create a new UTF-8 validator.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            incomplete: [0; 4],
            incomplete_len: 0,
        }
    }

    /// Validate a fragment of UTF-8 data.
    ///
    /// For non-final fragments (`is_final = false`), an incomplete multi-byte
    /// sequence at the end is kept for the next fragment.
    ///
    /// For final fragments (`is_final = true`), all bytes must form complete
    /// valid UTF-8 sequences.
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidUtf8` if the data contains invalid UTF-8 sequences.
    pub fn validate(&mut self, data: &[u8], is_final: bool) -> Result<()> {
        let mut data = data;

        // Finish the carried-over sequence one byte at a time.
        while self.incomplete_len > 0 && !data.is_empty() {
            self.incomplete[self.incomplete_len] = data[0];
            self.incomplete_len += 1;
            data = &data[1..];

            match std::str::from_utf8(&self.incomplete[..self.incomplete_len]) {
                Ok(_) => self.incomplete_len = 0,
                Err(e) if e.error_len().is_some() => return Err(Error::InvalidUtf8),
                Err(_) if self.incomplete_len == 4 => return Err(Error::InvalidUtf8),
                Err(_) => {}
            }
        }

        if self.incomplete_len > 0 {
            return if is_final { Err(Error::InvalidUtf8) } else { Ok(()) };
        }

        match std::str::from_utf8(data) {
            Ok(_) => Ok(()),
            Err(e) => {
                let tail = &data[e.valid_up_to()..];
                // error_len() is None only for a truncated sequence at the end
                if !is_final && e.error_len().is_none() && tail.len() < 4 {
                    self.incomplete[..tail.len()].copy_from_slice(tail);
                    self.incomplete_len = tail.len();
                    return Ok(());
                }
                Err(Error::InvalidUtf8)
            }
        }
    }

    /// Reset the validator state, discarding any incomplete sequences.
    pub fn reset(&mut self) {
        self.incomplete_len = 0;
    }

    /// Check if there are pending incomplete bytes.
    #[must_use]
    pub const fn has_incomplete(&self) -> bool {
        self.incomplete_len > 0
    }
}

/// Validate that a byte slice is valid UTF-8.
///
/// # Errors
///
/// Returns `Error::InvalidUtf8` if the data is not valid UTF-8.
pub fn validate_utf8(data: &[u8]) -> Result<()> {
    std::str::from_utf8(data)
        .map(|_| ())
        .map_err(|_| Error::InvalidUtf8)
}
