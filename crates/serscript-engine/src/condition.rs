//! Gate conditions (`?` lines).
//!
//! Grammar, after the leading `?`:
//!
//! ```text
//! (empty)            always true
//! left<>right        true when operands differ
//! left==right        true when operands are equal
//! operand            true when operand equals the last response row
//! ```
//!
//! `<>` takes precedence when both delimiters appear. Operands starting with `$`
//! are variable lookups. Comparison is exact string equality.

use crate::error::{ScriptError, ScriptResult};
use crate::variables::VariableStore;

/// A parsed gate condition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Condition {
    /// A bare `?`: the gate is open.
    Always,
    /// Compare two operands.
    Compare {
        /// Left operand as written.
        left: String,
        /// Right operand as written; `None` compares against the last row.
        right: Option<String>,
        /// `<>` instead of `==`.
        negate: bool,
    },
}

impl Condition {
    /// Parse the text of a condition line, with or without the leading `?`.
    pub fn parse(text: &str) -> ScriptResult<Condition> {
        let trimmed = text.trim();
        let body = trimmed.strip_prefix('?').unwrap_or(trimmed).trim();
        if body.is_empty() {
            return Ok(Condition::Always);
        }

        let (delimiter, negate) = if body.contains("<>") {
            ("<>", true)
        } else {
            ("==", false)
        };

        match body.split_once(delimiter) {
            Some((left, right)) => {
                let left = non_blank(left, body)?;
                let right = non_blank(right, body)?;
                Ok(Condition::Compare {
                    left,
                    right: Some(right),
                    negate,
                })
            }
            None => Ok(Condition::Compare {
                left: body.to_string(),
                right: None,
                negate: false,
            }),
        }
    }

    /// Evaluate against the current variables and last response row.
    pub fn evaluate(&self, vars: &VariableStore, last_row: &str) -> ScriptResult<bool> {
        match self {
            Condition::Always => Ok(true),
            Condition::Compare { left, right, negate } => {
                let left = vars.resolve_operand(left)?;
                let right = match right {
                    Some(r) => vars.resolve_operand(r)?,
                    None => last_row.to_string(),
                };
                Ok((left == right) != *negate)
            }
        }
    }
}

fn non_blank(operand: &str, body: &str) -> ScriptResult<String> {
    let operand = operand.trim();
    if operand.is_empty() {
        return Err(ScriptError::Format(format!(
            "blank operand in condition {:?}",
            body
        )));
    }
    Ok(operand.to_string())
}
