//! Script variables.
//!
//! Variables are defined by `$` lines and referenced as `$name` in conditions,
//! transparent commands and displayed text.

use std::collections::BTreeMap;

use crate::error::{ScriptError, ScriptResult};

/// Mapping from variable name to string value.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VariableStore {
    values: BTreeMap<String, String>,
}

impl VariableStore {
    /// Create an empty store.
    pub fn new() -> Self {
        VariableStore::default()
    }

    /// Define a variable from an assignment: `name` or `name=value`.
    ///
    /// Without a literal value the variable takes `last_row`. A value starting
    /// with `$` is read from another variable (one level only). Spaces are
    /// stripped from the name. An existing variable is overwritten.
    ///
    /// Returns the stored name.
    pub fn define(&mut self, assignment: &str, last_row: &str) -> ScriptResult<String> {
        let (name, value) = match assignment.split_once('=') {
            Some((name, value)) => (name, Some(value.trim())),
            None => (assignment, None),
        };

        let name: String = name.chars().filter(|c| *c != ' ').collect();
        if name.is_empty() {
            return Err(ScriptError::Format(format!(
                "variable assignment without a name: {:?}",
                assignment
            )));
        }

        let value = match value {
            None => last_row.to_string(),
            Some(v) => match v.strip_prefix('$') {
                Some(other) => self.resolve(other)?.to_string(),
                None => v.to_string(),
            },
        };

        self.values.insert(name.clone(), value);
        Ok(name)
    }

    /// Set a variable directly.
    pub fn set(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.values.insert(name.into(), value.into());
    }

    /// Look up a variable, failing if it is not defined.
    pub fn resolve(&self, name: &str) -> ScriptResult<&str> {
        self.lookup(name)
            .ok_or_else(|| ScriptError::UndefinedVariable(name.to_string()))
    }

    /// Look up a variable.
    pub fn lookup(&self, name: &str) -> Option<&str> {
        self.values.get(name).map(String::as_str)
    }

    /// Resolve an operand: `$name` is looked up, anything else is literal.
    pub fn resolve_operand(&self, operand: &str) -> ScriptResult<String> {
        match operand.strip_prefix('$') {
            Some(name) => Ok(self.resolve(name)?.to_string()),
            None => Ok(operand.to_string()),
        }
    }

    /// Replace every `$name` token (up to the next space) with its value.
    ///
    /// An undefined name is an error; a lone `$` is kept as is.
    pub fn substitute(&self, text: &str) -> ScriptResult<String> {
        let mut out = String::with_capacity(text.len());
        let mut rest = text;

        while let Some(start) = rest.find('$') {
            out.push_str(&rest[..start]);
            let after = &rest[start + 1..];
            let end = after.find(' ').unwrap_or(after.len());
            let name = &after[..end];
            if name.is_empty() {
                out.push('$');
            } else {
                out.push_str(self.resolve(name)?);
            }
            rest = &after[end..];
        }

        out.push_str(rest);
        Ok(out)
    }

    /// Number of defined variables.
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Whether no variables are defined.
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Remove all variables.
    pub fn clear(&mut self) {
        self.values.clear();
    }

    /// Iterate over variables in name order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.values.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}
