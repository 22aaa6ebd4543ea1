//! Wire frames and response parsing.
//!
//! Outbound frames are either a text command line or a tagged binary payload:
//!
//! ```text
//! text:    <tag> <text...>                   0x0A
//! binary:  <tag> <len:1> <payload[0..len]>   0x0A
//! ```

use crate::error::{ProtocolError, ProtocolResult};

/// Line terminator for every frame.
pub const TERMINATOR: u8 = b'\n';

/// Tag of a binary data frame.
pub const TAG_DATA: char = 'D';

/// Tag of a checksum frame.
pub const TAG_CHECKSUM: char = 'X';

/// Largest payload the one-byte length field can describe.
pub const MAX_PAYLOAD_LEN: usize = 255;

/// A frame to be written to the transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    /// A text command line, sent as ASCII.
    Text(String),
    /// A tagged binary payload with a length byte.
    Binary {
        /// Frame tag (`D` or `X`).
        tag: char,
        /// Raw payload bytes.
        payload: Vec<u8>,
    },
}

impl Frame {
    /// Build a text frame.
    pub fn text(line: impl Into<String>) -> Self {
        Frame::Text(line.into())
    }

    /// Build a binary data frame (`D`).
    pub fn data(payload: impl Into<Vec<u8>>) -> Self {
        Frame::Binary {
            tag: TAG_DATA,
            payload: payload.into(),
        }
    }

    /// Build a single-byte checksum frame (`X`).
    pub fn checksum(checksum: u8) -> Self {
        Frame::Binary {
            tag: TAG_CHECKSUM,
            payload: vec![checksum],
        }
    }

    /// The binary payload carried by this frame, if any.
    pub fn payload(&self) -> Option<&[u8]> {
        match self {
            Frame::Text(_) => None,
            Frame::Binary { payload, .. } => Some(payload),
        }
    }

    /// Encode the frame to wire bytes, including the terminator.
    pub fn encode(&self) -> ProtocolResult<Vec<u8>> {
        match self {
            Frame::Text(line) => {
                let mut buf = encode_ascii(line);
                buf.push(TERMINATOR);
                Ok(buf)
            }
            Frame::Binary { tag, payload } => {
                if payload.len() > MAX_PAYLOAD_LEN {
                    return Err(ProtocolError::PayloadTooLong {
                        max: MAX_PAYLOAD_LEN,
                        actual: payload.len(),
                    });
                }
                let mut buf = Vec::with_capacity(payload.len() + 3);
                buf.extend_from_slice(&encode_ascii(&tag.to_string()));
                buf.push(payload.len() as u8);
                buf.extend_from_slice(payload);
                buf.push(TERMINATOR);
                Ok(buf)
            }
        }
    }
}

/// ASCII-encode text, replacing anything outside the ASCII range with `?`.
pub fn encode_ascii(text: &str) -> Vec<u8> {
    text.chars()
        .map(|c| if c.is_ascii() { c as u8 } else { b'?' })
        .collect()
}

/// A response line read from the device.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Response {
    /// Response text without the terminator.
    pub row: String,
    /// Binary payload when the response is a binary frame, otherwise empty.
    pub data: Vec<u8>,
}

impl Response {
    /// Parse the bytes of one response line (terminator optional).
    pub fn parse(line: &[u8]) -> Response {
        let body = line.strip_suffix(&[TERMINATOR]).unwrap_or(line);
        let row = String::from_utf8_lossy(body).into_owned();
        let data = binary_payload(body).map(<[u8]>::to_vec).unwrap_or_default();
        Response { row, data }
    }

    /// Whether the device answered with a bare terminator.
    pub fn is_confirmation(&self) -> bool {
        self.row.is_empty()
    }
}

/// Extract the payload of a well-formed binary frame body.
fn binary_payload(body: &[u8]) -> Option<&[u8]> {
    let (&tag, rest) = body.split_first()?;
    if tag != TAG_DATA as u8 && tag != TAG_CHECKSUM as u8 {
        return None;
    }
    let (&len, payload) = rest.split_first()?;
    (payload.len() == len as usize).then_some(payload)
}
