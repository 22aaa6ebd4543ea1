//! Human-readable rendering of protocol lines.
//!
//! Only for logs and the console. Never feed the output back to the wire.

use chrono::NaiveDateTime;

/// Shown for a response consisting of just the terminator.
pub const CONFIRMATION_GLYPH: &str = "\u{2713}";

/// Replaces the content of binary data lines.
pub const BINARY_PLACEHOLDER: &str = "[binary]";

/// Shown for a `$name` token with no value.
pub const UNKNOWN_PLACEHOLDER: &str = "<unknown>";

/// Format of the timestamp substituted for a backtick.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";

#[cfg(windows)]
const LINE_SEPARATOR: &str = "\r\n";
#[cfg(not(windows))]
const LINE_SEPARATOR: &str = "\n";

/// Render a command or response line for display, stamped with the local time.
pub fn format_for_display_now<F>(line: &str, lookup: F) -> String
where
    F: Fn(&str) -> Option<String>,
{
    format_for_display(line, lookup, chrono::Local::now().naive_local())
}

/// Render a command or response line for display.
///
/// `lookup` resolves variable names (without the `$`); `now` replaces backticks.
pub fn format_for_display<F>(line: &str, lookup: F, now: NaiveDateTime) -> String
where
    F: Fn(&str) -> Option<String>,
{
    if line == "\n" {
        return CONFIRMATION_GLYPH.to_string();
    }

    let mut chars: Vec<char> = line.chars().collect();
    if chars.len() > 1 && chars[1] != ' ' {
        chars.insert(1, ' ');
    }

    let mut text: String = if chars.first() == Some(&'D') && chars.len() > 1 {
        format!("D {}", BINARY_PLACEHOLDER)
    } else {
        chars.iter().collect()
    };

    if chars.len() > 1 {
        text = text.replace('\r', LINE_SEPARATOR);
    }

    let text = substitute_tokens(&text, &lookup);
    text.replace('`', &now.format(TIMESTAMP_FORMAT).to_string())
}

/// Replace each `$name` token, delimited by the next space or end of text.
fn substitute_tokens<F>(text: &str, lookup: &F) -> String
where
    F: Fn(&str) -> Option<String>,
{
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
            match lookup(name) {
                Some(value) => out.push_str(&value),
                None => out.push_str(UNKNOWN_PLACEHOLDER),
            }
        }
        rest = &after[end..];
    }

    out.push_str(rest);
    out
}
