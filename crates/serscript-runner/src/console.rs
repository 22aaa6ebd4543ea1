//! Terminal front end: shows notifications and reads prompt answers.

use std::io::{self, BufRead, Write};
use std::sync::atomic::{AtomicBool, Ordering};

use serscript_engine::{InfoSink, Notification, Severity};
use tracing::{debug, warn};

/// [`InfoSink`] that writes notifications to a terminal.
///
/// Trace notifications are only shown when `show_trace` is set.
pub struct ConsoleSink<W> {
    out: W,
    show_trace: bool,
}

impl ConsoleSink<io::Stdout> {
    /// Sink writing to standard output.
    pub fn stdout(show_trace: bool) -> Self {
        ConsoleSink::new(io::stdout(), show_trace)
    }
}

impl<W: Write> ConsoleSink<W> {
    /// Sink writing to `out`.
    pub fn new(out: W, show_trace: bool) -> Self {
        ConsoleSink { out, show_trace }
    }

    /// The underlying writer.
    pub fn get_ref(&self) -> &W {
        &self.out
    }

    fn render(&mut self, notification: &Notification) -> io::Result<()> {
        let message = &notification.message;
        match notification.severity {
            Severity::Trace if !self.show_trace => return Ok(()),
            Severity::Trace => writeln!(self.out, "  {}", message)?,
            Severity::Info if notification.requires_input => write!(self.out, "{} ", message)?,
            Severity::Info => writeln!(self.out, "{}", message)?,
            Severity::Warning => writeln!(self.out, "warning: {}", message)?,
            Severity::Error => writeln!(self.out, "error: {}", message)?,
        }
        self.out.flush()
    }
}

impl<W: Write> InfoSink for ConsoleSink<W> {
    fn notify(&mut self, notification: &Notification) {
        if let Err(e) = self.render(notification) {
            warn!("Console: failed to write notification: {}", e);
        }
    }
}

/// Read one answer line. `None` at end of input or on a read error.
pub fn read_answer<R: BufRead>(input: &mut R) -> Option<String> {
    let mut line = String::new();
    match input.read_line(&mut line) {
        Ok(0) => None,
        Ok(_) => Some(line.trim_end_matches(&['\r', '\n'][..]).to_string()),
        Err(e) => {
            warn!("Console: failed to read input: {}", e);
            None
        }
    }
}

/// Read one answer unless `cancel` is raised before or during the read.
///
/// A blocked terminal read is not interrupted, so Ctrl-C at a prompt takes
/// effect once the line is entered.
pub fn answer_unless_cancelled<R: BufRead>(cancel: &AtomicBool, input: &mut R) -> Option<String> {
    if cancel.load(Ordering::SeqCst) {
        return None;
    }
    let answer = read_answer(input)?;
    if cancel.load(Ordering::SeqCst) {
        debug!("Console: dropping answer given after cancel");
        return None;
    }
    Some(answer)
}
