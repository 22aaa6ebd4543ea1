//! Serial Script Line Protocol
//!
//! This crate provides types and utilities for talking to embedded devices over a
//! byte-oriented transport (usually a UART) using a compact, human-readable
//! line protocol. It is the wire layer underneath the `serscript-engine`
//! interpreter.
//!
//! # Protocol Overview
//!
//! Every message is a single line:
//!
//! ```text
//! +-------+-----------------+---------------------+------+
//! | tag   | len-or-spacer   | payload (0..255)    | 0x0A |
//! +-------+-----------------+---------------------+------+
//! ```
//!
//! - **Text commands** (host → device): the tag character, usually a space, then
//!   ASCII text, terminated with `\n`.
//! - **Binary frames**: tag `D` (data) or `X` (checksum), one length byte, then the
//!   raw payload bytes, terminated with `\n`.
//! - **Responses** (device → host): the same shape. A bare `\n` is a valid
//!   confirmation. A carriage return inside text is an intra-message newline, not
//!   a terminator.
//!
//! The protocol is blocking and strictly request/response: every write is followed
//! by exactly one read-until-newline before the next operation.
//!
//! # Example
//!
//! ```rust,ignore
//! use serscript_protocol::{Frame, LineSession, ScriptedTransport};
//!
//! let (transport, log) = ScriptedTransport::new();
//! let mut session = LineSession::new(Box::new(transport));
//! let response = session.exchange(&Frame::text("P 1"))?;
//! assert!(response.is_confirmation());
//! ```

mod checksum;
mod codec;
mod display;
mod error;
mod frame;
mod transport;

pub use checksum::*;
pub use codec::*;
pub use display::*;
pub use error::*;
pub use frame::*;
pub use transport::*;
