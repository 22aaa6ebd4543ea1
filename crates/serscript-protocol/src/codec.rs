//! Line-based codec for reading responses.
//!
//! Responses end with a single `\n`. A carriage return inside a line is part of
//! the text (an intra-message newline), so only `\n` terminates.

use bytes::BytesMut;

use crate::frame::TERMINATOR;

/// Initial capacity of the receive buffer: tag, length byte, payload, terminator.
pub const MAX_LINE_LENGTH: usize = 258;

/// A codec for accumulating received bytes into response lines.
///
/// Bytes past the first terminator stay buffered for the next line, so a
/// transport can read in chunks without losing data.
#[derive(Debug, Default)]
pub struct LineCodec {
    /// Buffer for accumulating incoming data.
    buffer: BytesMut,
}

impl LineCodec {
    /// Create a new line codec.
    pub fn new() -> Self {
        LineCodec {
            buffer: BytesMut::with_capacity(MAX_LINE_LENGTH),
        }
    }

    /// Add received data to the buffer.
    pub fn push(&mut self, data: &[u8]) {
        self.buffer.extend_from_slice(data);
    }

    /// Try to decode a complete line, terminator included.
    ///
    /// Returns `None` if no terminator has been received yet.
    pub fn decode_line(&mut self) -> Option<Vec<u8>> {
        self.decode_until(TERMINATOR)
    }

    /// Try to decode everything up to and including `terminator`.
    pub fn decode_until(&mut self, terminator: u8) -> Option<Vec<u8>> {
        let end = self.buffer.iter().position(|&b| b == terminator)?;
        Some(self.buffer.split_to(end + 1).to_vec())
    }

    /// Take whatever is buffered without a terminator (used at end of stream).
    pub fn take_partial(&mut self) -> Option<Vec<u8>> {
        if self.buffer.is_empty() {
            None
        } else {
            Some(self.buffer.split().to_vec())
        }
    }

    /// Get the number of buffered bytes.
    pub fn buffered_len(&self) -> usize {
        self.buffer.len()
    }

    /// Clear the buffer.
    pub fn clear(&mut self) {
        self.buffer.clear();
    }

    /// Get the current buffer contents as a string (for debugging).
    pub fn buffer_as_str(&self) -> String {
        String::from_utf8_lossy(&self.buffer).to_string()
    }
}
