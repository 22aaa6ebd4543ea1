//! Script loading.
//!
//! A script is a list of lines, one command per line:
//!
//! ```text
//! # comment            ignored, as are blank lines
//! M starting           commands of the entry routine ("")
//! J : flash
//! O 3f2a...            fingerprint of every line above this one
//! : flash              starts routine "flash"
//! H 0102ff
//! ```
//!
//! Loading is two passes: lines become commands (verifying fingerprints on the
//! way), then the command stream is split into routines at `:` markers.

use std::collections::BTreeMap;

use serscript_protocol::{fingerprint, verify_fingerprint};
use tracing::debug;

use crate::command::{Command, CommandKind};
use crate::error::{ScriptError, ScriptResult};

/// Name of the entry routine.
pub const DEFAULT_ROUTINE: &str = "";

/// Tag of comment lines.
pub const COMMENT_TAG: char = '#';

/// Tag of fingerprint marker lines.
pub const FINGERPRINT_TAG: char = 'O';

/// Tag of binary data lines.
pub const DATA_TAG: char = 'D';

/// Build the `O` marker line sealing `lines`.
pub fn fingerprint_marker<S: AsRef<str>>(lines: &[S]) -> String {
    format!("{} {}", FINGERPRINT_TAG, fingerprint(lines))
}

/// Routines of a loaded script, by name.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RoutineTable {
    routines: BTreeMap<String, Vec<Command>>,
}

impl RoutineTable {
    /// Parse script lines into a routine table.
    pub fn parse<S: AsRef<str>>(lines: &[S]) -> ScriptResult<RoutineTable> {
        let commands = parse_commands(lines)?;
        split_routines(commands)
    }

    /// Commands of a routine.
    pub fn get(&self, name: &str) -> Option<&[Command]> {
        self.routines.get(name).map(Vec::as_slice)
    }

    /// Whether a routine exists.
    pub fn contains(&self, name: &str) -> bool {
        self.routines.contains_key(name)
    }

    /// Routine names in sorted order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.routines.keys().map(String::as_str)
    }

    /// Number of routines.
    pub fn len(&self) -> usize {
        self.routines.len()
    }

    /// Whether the table has no routines at all.
    pub fn is_empty(&self) -> bool {
        self.routines.is_empty()
    }
}

/// First pass: lines to commands, checking fingerprint markers.
fn parse_commands<S: AsRef<str>>(lines: &[S]) -> ScriptResult<Vec<(usize, Command)>> {
    let mut commands = Vec::new();

    for (index, line) in lines.iter().enumerate() {
        let line = line.as_ref();
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with(COMMENT_TAG) {
            continue;
        }

        if trimmed.starts_with(FINGERPRINT_TAG) {
            let computed = fingerprint(&lines[..index]);
            if !verify_fingerprint(&computed, line) {
                return Err(ScriptError::Integrity {
                    line: index + 1,
                    computed,
                    marker: line.to_string(),
                });
            }
            debug!("fingerprint verified at line {}", index + 1);
            continue;
        }

        let command = if trimmed.starts_with(DATA_TAG) {
            Command::binary(line.trim_start())
        } else {
            match Command::parse(trimmed) {
                Some(command) => command,
                None => continue,
            }
        };
        commands.push((index + 1, command));
    }

    Ok(commands)
}

/// Second pass: split the command stream at routine markers.
fn split_routines(commands: Vec<(usize, Command)>) -> ScriptResult<RoutineTable> {
    let mut routines = BTreeMap::new();
    let mut name = DEFAULT_ROUTINE.to_string();
    let mut current = Vec::new();

    for (line_no, command) in commands {
        if command.kind() != CommandKind::Routine {
            current.push(command);
            continue;
        }

        let next = command.argument().to_string();
        if next.is_empty() {
            return Err(ScriptError::Format(format!(
                "routine marker without a name at line {}",
                line_no
            )));
        }
        if next == name || routines.contains_key(&next) {
            return Err(ScriptError::Format(format!(
                "duplicate routine {:?} at line {}",
                next, line_no
            )));
        }

        let finished = std::mem::take(&mut current);
        routines.insert(std::mem::replace(&mut name, next), finished);
    }

    routines.insert(name, current);
    Ok(RoutineTable { routines })
}
