//! Byte-stream transports and the request/response session.
//!
//! The physical link (serial port, TCP socket exposing a UART) is supplied by the
//! caller. [`StreamTransport`] adapts anything that is `Read + Write`;
//! [`ScriptedTransport`] is an in-memory stand-in for tests and dry runs.

use std::collections::VecDeque;
use std::io::{self, Read, Write};
use std::sync::Arc;

use parking_lot::Mutex;

use crate::codec::LineCodec;
use crate::error::{ProtocolError, ProtocolResult};
use crate::frame::{Frame, Response, TERMINATOR};

/// A byte-stream connection to a device.
pub trait Transport {
    /// Write all bytes to the device.
    fn write(&mut self, bytes: &[u8]) -> ProtocolResult<()>;

    /// Read up to and including `terminator`, or until the stream ends.
    fn read_until(&mut self, terminator: u8) -> ProtocolResult<Vec<u8>>;

    /// Release the connection. Further calls may fail.
    fn close(&mut self) {}
}

impl<T: Transport + ?Sized> Transport for Box<T> {
    fn write(&mut self, bytes: &[u8]) -> ProtocolResult<()> {
        (**self).write(bytes)
    }

    fn read_until(&mut self, terminator: u8) -> ProtocolResult<Vec<u8>> {
        (**self).read_until(terminator)
    }

    fn close(&mut self) {
        (**self).close()
    }
}

/// Size of each chunk read from the underlying stream.
const READ_CHUNK: usize = 64;

/// Transport over any blocking byte stream.
///
/// Read timeouts are configured on the stream itself (for example
/// `TcpStream::set_read_timeout` or the serial port timeout) and surface as
/// [`ProtocolError::Timeout`].
#[derive(Debug)]
pub struct StreamTransport<S> {
    stream: Option<S>,
    codec: LineCodec,
}

impl<S: Read + Write> StreamTransport<S> {
    /// Wrap an open stream.
    pub fn new(stream: S) -> Self {
        StreamTransport {
            stream: Some(stream),
            codec: LineCodec::new(),
        }
    }

    /// Get a reference to the underlying stream, if still open.
    pub fn get_ref(&self) -> Option<&S> {
        self.stream.as_ref()
    }

    fn stream_mut(&mut self) -> ProtocolResult<&mut S> {
        self.stream.as_mut().ok_or(ProtocolError::Closed)
    }
}

impl<S: Read + Write> Transport for StreamTransport<S> {
    fn write(&mut self, bytes: &[u8]) -> ProtocolResult<()> {
        let stream = self.stream_mut()?;
        stream.write_all(bytes).map_err(map_io_error)?;
        stream.flush().map_err(map_io_error)?;
        log::trace!("wrote {} bytes", bytes.len());
        Ok(())
    }

    fn read_until(&mut self, terminator: u8) -> ProtocolResult<Vec<u8>> {
        let mut chunk = [0u8; READ_CHUNK];
        loop {
            if let Some(line) = self.codec.decode_until(terminator) {
                return Ok(line);
            }

            let stream = self.stream_mut()?;
            match stream.read(&mut chunk) {
                Ok(0) => {
                    log::debug!("stream ended with {} bytes buffered", self.codec.buffered_len());
                    return self.codec.take_partial().ok_or(ProtocolError::Closed);
                }
                Ok(n) => self.codec.push(&chunk[..n]),
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => {
                    // A failed read abandons the exchange; its partial line must not
                    // prefix the next response
                    if self.codec.buffered_len() > 0 {
                        log::debug!("discarding {} buffered bytes", self.codec.buffered_len());
                        self.codec.clear();
                    }
                    return Err(map_io_error(e));
                }
            }
        }
    }

    fn close(&mut self) {
        if self.stream.take().is_some() {
            log::debug!("transport closed");
        }
        self.codec.clear();
    }
}

fn map_io_error(e: io::Error) -> ProtocolError {
    match e.kind() {
        io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock => ProtocolError::Timeout,
        _ => ProtocolError::Io(e),
    }
}

/// Shared record of everything written to a [`ScriptedTransport`].
#[derive(Debug, Clone, Default)]
pub struct TransportLog {
    writes: Arc<Mutex<Vec<Vec<u8>>>>,
}

impl TransportLog {
    /// All writes so far, in order.
    pub fn writes(&self) -> Vec<Vec<u8>> {
        self.writes.lock().clone()
    }

    /// Number of writes so far.
    pub fn len(&self) -> usize {
        self.writes.lock().len()
    }

    /// Whether nothing has been written.
    pub fn is_empty(&self) -> bool {
        self.writes.lock().is_empty()
    }

    fn record(&self, bytes: &[u8]) {
        self.writes.lock().push(bytes.to_vec());
    }
}

/// In-memory transport that answers from a queue of canned responses.
///
/// With an empty queue every read returns a bare confirmation (`\n`), which
/// makes it a no-op device.
#[derive(Debug, Default)]
pub struct ScriptedTransport {
    responses: VecDeque<Vec<u8>>,
    log: TransportLog,
    closed: bool,
}

impl ScriptedTransport {
    /// Create a transport with no canned responses.
    pub fn new() -> (Self, TransportLog) {
        Self::with_responses(Vec::<Vec<u8>>::new())
    }

    /// Create a transport that replies with `responses` in order.
    ///
    /// Responses without a terminator get one appended.
    pub fn with_responses<I, R>(responses: I) -> (Self, TransportLog)
    where
        I: IntoIterator<Item = R>,
        R: Into<Vec<u8>>,
    {
        let log = TransportLog::default();
        let responses = responses
            .into_iter()
            .map(|r| with_terminator(r.into()))
            .collect();
        let transport = ScriptedTransport {
            responses,
            log: log.clone(),
            closed: false,
        };
        (transport, log)
    }

    /// Queue another response, appending a terminator if it lacks one.
    pub fn push_response(&mut self, response: impl Into<Vec<u8>>) {
        self.responses.push_back(with_terminator(response.into()));
    }
}

fn with_terminator(mut bytes: Vec<u8>) -> Vec<u8> {
    if bytes.last() != Some(&TERMINATOR) {
        bytes.push(TERMINATOR);
    }
    bytes
}

impl Transport for ScriptedTransport {
    fn write(&mut self, bytes: &[u8]) -> ProtocolResult<()> {
        if self.closed {
            return Err(ProtocolError::Closed);
        }
        self.log.record(bytes);
        Ok(())
    }

    fn read_until(&mut self, _terminator: u8) -> ProtocolResult<Vec<u8>> {
        if self.closed {
            return Err(ProtocolError::Closed);
        }
        Ok(self.responses.pop_front().unwrap_or_else(|| vec![TERMINATOR]))
    }

    fn close(&mut self) {
        self.closed = true;
    }
}

/// A synchronous request/response session over a transport.
///
/// Each [`exchange`](LineSession::exchange) writes one frame and reads exactly
/// one response line before returning.
pub struct LineSession {
    transport: Box<dyn Transport>,
}

impl LineSession {
    /// Create a session over an open transport.
    pub fn new(transport: Box<dyn Transport>) -> Self {
        LineSession { transport }
    }

    /// Send a frame and wait for its response.
    pub fn exchange(&mut self, frame: &Frame) -> ProtocolResult<Response> {
        let bytes = frame.encode()?;
        self.transport.write(&bytes)?;
        let line = self.transport.read_until(TERMINATOR)?;
        let response = Response::parse(&line);
        log::trace!("exchange {:?} -> {:?}", frame, response.row);
        Ok(response)
    }

    /// Close the underlying transport.
    pub fn close(&mut self) {
        self.transport.close();
    }
}

impl std::fmt::Debug for LineSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LineSession").finish_non_exhaustive()
    }
}
