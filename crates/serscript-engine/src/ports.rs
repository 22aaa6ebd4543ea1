//! Collaborator interfaces the engine calls into.
//!
//! The engine never touches the console or file system directly. The caller
//! supplies:
//! - an [`InfoSink`] for user-visible messages and prompts,
//! - an optional [`CommandObserver`] notified after every command,
//! - a [`FileStore`] for `L`/`W` commands and script loading.

use std::collections::BTreeMap;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::Mutex;

use crate::error::{ScriptError, ScriptResult};

/// How prominent a notification is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Severity {
    /// Echo of script activity (variable definitions and the like).
    Trace,
    /// Script messages and prompts.
    Info,
    /// Non-fatal problems; execution continues.
    Warning,
    /// The run was aborted.
    Error,
}

/// A message for the user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    /// Display text.
    pub message: String,
    /// The engine is suspended until one input value is delivered.
    pub requires_input: bool,
    /// How prominent the message is.
    pub severity: Severity,
}

impl Notification {
    /// A plain message.
    pub fn new(message: impl Into<String>, severity: Severity) -> Self {
        Notification {
            message: message.into(),
            requires_input: false,
            severity,
        }
    }

    /// A prompt that expects input.
    pub fn prompt(message: impl Into<String>) -> Self {
        Notification {
            message: message.into(),
            requires_input: true,
            severity: Severity::Info,
        }
    }
}

/// Receives user-visible messages.
pub trait InfoSink {
    /// Show a message. When `requires_input` is set the caller must eventually
    /// hand exactly one value back through `Engine::resume`.
    fn notify(&mut self, notification: &Notification);
}

impl<F: FnMut(&Notification)> InfoSink for F {
    fn notify(&mut self, notification: &Notification) {
        self(notification)
    }
}

/// Observes every executed or gate-skipped command.
pub trait CommandObserver {
    /// Called with the command line, the current last row and last data.
    fn on_command(&mut self, command: &str, last_row: &str, last_data: &[u8]);
}

impl<F: FnMut(&str, &str, &[u8])> CommandObserver for F {
    fn on_command(&mut self, command: &str, last_row: &str, last_data: &[u8]) {
        self(command, last_row, last_data)
    }
}

/// Line-oriented file access.
pub trait FileStore {
    /// Read every line of a file.
    fn read_all_lines(&self, path: &Path) -> ScriptResult<Vec<String>>;

    /// Append one line to a file, creating it if needed.
    fn append_line(&mut self, path: &Path, text: &str) -> ScriptResult<()>;
}

/// [`FileStore`] backed by the local file system.
#[derive(Debug, Clone, Copy, Default)]
pub struct FsFileStore;

impl FileStore for FsFileStore {
    fn read_all_lines(&self, path: &Path) -> ScriptResult<Vec<String>> {
        let text = std::fs::read_to_string(path).map_err(|source| file_error(path, source))?;
        Ok(text.lines().map(str::to_string).collect())
    }

    fn append_line(&mut self, path: &Path, text: &str) -> ScriptResult<()> {
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .map_err(|source| file_error(path, source))?;
        writeln!(file, "{}", text).map_err(|source| file_error(path, source))
    }
}

fn file_error(path: &Path, source: std::io::Error) -> ScriptError {
    ScriptError::File {
        path: path.to_path_buf(),
        source,
    }
}

/// In-memory [`FileStore`]. Clones share the same files.
#[derive(Debug, Clone, Default)]
pub struct MemoryFileStore {
    files: Arc<Mutex<BTreeMap<PathBuf, Vec<String>>>>,
}

impl MemoryFileStore {
    /// Create an empty store.
    pub fn new() -> Self {
        MemoryFileStore::default()
    }

    /// Create or replace a file.
    pub fn insert<I, S>(&self, path: impl Into<PathBuf>, lines: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let lines = lines.into_iter().map(Into::into).collect();
        self.files.lock().insert(path.into(), lines);
    }

    /// Current contents of a file.
    pub fn lines(&self, path: impl AsRef<Path>) -> Option<Vec<String>> {
        self.files.lock().get(path.as_ref()).cloned()
    }
}

impl FileStore for MemoryFileStore {
    fn read_all_lines(&self, path: &Path) -> ScriptResult<Vec<String>> {
        self.lines(path).ok_or_else(|| {
            file_error(
                path,
                std::io::Error::new(std::io::ErrorKind::NotFound, "no such file"),
            )
        })
    }

    fn append_line(&mut self, path: &Path, text: &str) -> ScriptResult<()> {
        self.files
            .lock()
            .entry(path.to_path_buf())
            .or_default()
            .push(text.to_string());
        Ok(())
    }
}
