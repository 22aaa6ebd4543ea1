//! Error types for the line protocol.

use thiserror::Error;

/// Errors that can occur when encoding, decoding or transporting frames.
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// Hex text has an odd number of digits.
    #[error("odd number of hex digits: {len}")]
    OddHexLength {
        /// Number of hex characters received.
        len: usize,
    },

    /// Hex text contains a character that is not a hex digit.
    #[error("invalid hex character {ch:?} at index {index}")]
    InvalidHex {
        /// The offending character.
        ch: char,
        /// Position of the character in the input.
        index: usize,
    },

    /// No hex digits remained after stripping the command tag and spaces.
    #[error("no hex digits in {0:?}")]
    EmptyHex(String),

    /// Binary payload does not fit the one-byte length field.
    #[error("payload too long: max {max} bytes, got {actual}")]
    PayloadTooLong {
        /// Maximum payload length.
        max: usize,
        /// Actual payload length.
        actual: usize,
    },

    /// Underlying stream failed.
    #[error("transport I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Timed out waiting for the response terminator.
    #[error("timeout waiting for response")]
    Timeout,

    /// The stream ended before any response byte arrived.
    #[error("transport closed")]
    Closed,
}

impl ProtocolError {
    /// Whether this error is caused by malformed input rather than the transport.
    pub fn is_format(&self) -> bool {
        matches!(
            self,
            ProtocolError::OddHexLength { .. }
                | ProtocolError::InvalidHex { .. }
                | ProtocolError::EmptyHex(_)
                | ProtocolError::PayloadTooLong { .. }
        )
    }
}

/// Result type alias for protocol operations.
pub type ProtocolResult<T> = Result<T, ProtocolError>;
