//! Error types for loading and running scripts.

use std::path::PathBuf;

use serscript_protocol::ProtocolError;
use thiserror::Error;

/// Errors that can occur while loading or executing a script.
#[derive(Debug, Error)]
pub enum ScriptError {
    /// Malformed hex, condition, routine marker or assignment.
    #[error("format error: {0}")]
    Format(String),

    /// A fingerprint marker does not match the lines before it.
    #[error("fingerprint mismatch at line {line}: computed {computed}, marker {marker:?}")]
    Integrity {
        /// 1-based line number of the marker.
        line: usize,
        /// Digest computed over the preceding lines.
        computed: String,
        /// The marker line as written.
        marker: String,
    },

    /// Lookup of a variable that was never defined.
    #[error("undefined variable ${0}")]
    UndefinedVariable(String),

    /// Jump or run targeting a routine that does not exist.
    #[error("routine not found: {0:?}")]
    RoutineNotFound(String),

    /// The shared jump budget ran out.
    #[error("call depth exceeded (budget {budget})")]
    CallDepthExceeded {
        /// The configured budget.
        budget: u32,
    },

    /// The device link failed.
    #[error("transport error: {0}")]
    Transport(ProtocolError),

    /// Reading or writing a script-side file failed.
    #[error("file error on {path}: {source}")]
    File {
        /// The file involved.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// The engine was built without a required collaborator or with bad settings.
    #[error("configuration error: {0}")]
    Config(String),

    /// Input was delivered while no prompt was outstanding.
    #[error("no prompt is waiting for input")]
    NoPendingInput,

    /// A run or load was requested while a prompt is outstanding.
    #[error("engine is suspended waiting for input")]
    Busy,
}

impl From<ProtocolError> for ScriptError {
    fn from(e: ProtocolError) -> Self {
        if e.is_format() {
            ScriptError::Format(e.to_string())
        } else {
            ScriptError::Transport(e)
        }
    }
}

/// Result type alias for script operations.
pub type ScriptResult<T> = Result<T, ScriptError>;
