//! Checksum and integrity primitives.
//!
//! Two independent mechanisms live here:
//! - an advisory XOR checksum used on the wire (`X` frames), and
//! - an MD5 fingerprint over script lines used to detect edited script files.

use crate::error::{ProtocolError, ProtocolResult};

/// XOR all bytes together. Returns 0 for empty input.
pub fn xor_checksum(bytes: &[u8]) -> u8 {
    bytes.iter().fold(0u8, |acc, b| acc ^ b)
}

/// Render a checksum byte as two lowercase hex digits.
pub fn checksum_hex(checksum: u8) -> String {
    format!("{:02x}", checksum)
}

/// Encode bytes as lowercase hex.
pub fn bytes_to_hex(bytes: &[u8]) -> String {
    hex::encode(bytes)
}

/// Decode pairs of hex digits into bytes.
pub fn hex_to_bytes(hex_text: &str) -> ProtocolResult<Vec<u8>> {
    hex::decode(hex_text).map_err(|e| match e {
        hex::FromHexError::InvalidHexCharacter { c, index } => {
            ProtocolError::InvalidHex { ch: c, index }
        }
        _ => ProtocolError::OddHexLength { len: hex_text.len() },
    })
}

/// Compute the fingerprint of a sequence of script lines.
///
/// Each line is hashed followed by `\n`, so the digest equals the MD5 of the
/// lines joined with newlines plus a trailing newline.
pub fn fingerprint<S: AsRef<str>>(lines: &[S]) -> String {
    let mut context = md5::Context::new();
    for line in lines {
        context.consume(line.as_ref().as_bytes());
        context.consume(b"\n");
    }
    format!("{:x}", context.compute())
}

/// Check a computed digest against a fingerprint marker line.
///
/// The marker may carry extra annotation around the digest, so this is a
/// containment test rather than equality.
pub fn verify_fingerprint(candidate: &str, expected_line: &str) -> bool {
    !candidate.is_empty() && expected_line.contains(candidate)
}
