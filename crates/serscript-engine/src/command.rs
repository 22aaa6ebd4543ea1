//! Parsed script commands.
//!
//! A script line is a single-character tag followed by its argument text:
//!
//! ```text
//! M hello          message, text "hello"
//! ?$mode==boot     condition, raw "$mode==boot"
//! J : flash        jump to routine "flash"
//! D <raw bytes>    binary payload from offset 2
//! ```

/// The action selected by a command's tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandKind {
    /// `?` opens or closes the gate for the following commands.
    Condition,
    /// `$` defines a variable.
    Define,
    /// `J` jumps into another routine.
    Jump,
    /// `D` sends a binary data frame.
    Data,
    /// `H` or `Z` sends hex text as bytes.
    Hex,
    /// `L` sends every line of a file as hex.
    LoadFile,
    /// `M` shows a message locally; nothing is transmitted.
    Message,
    /// `Q` stops the script.
    Quit,
    /// `U` prompts the user and waits for input.
    UserInput,
    /// `W` appends the last response to a file.
    WriteFile,
    /// `X` sends a checksum or hex payload.
    Checksum,
    /// `:` starts a new routine (loader only).
    Routine,
    /// Any other tag is forwarded to the device unchanged.
    Transparent(char),
}

impl CommandKind {
    /// Map a tag character to its command kind.
    pub fn from_tag(tag: char) -> CommandKind {
        match tag {
            '?' => CommandKind::Condition,
            '$' => CommandKind::Define,
            'J' => CommandKind::Jump,
            'D' => CommandKind::Data,
            'H' | 'Z' => CommandKind::Hex,
            'L' => CommandKind::LoadFile,
            'M' => CommandKind::Message,
            'Q' => CommandKind::Quit,
            'U' => CommandKind::UserInput,
            'W' => CommandKind::WriteFile,
            'X' => CommandKind::Checksum,
            ':' => CommandKind::Routine,
            other => CommandKind::Transparent(other),
        }
    }
}

/// One parsed script line. Immutable once created.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Command {
    /// The full line as written.
    line: String,
    /// The action tag (first character).
    tag: char,
    /// Everything after the tag.
    raw: String,
    /// Text after the tag and its spacer, when the line is long enough.
    text: Option<String>,
    /// Raw payload bytes of a binary data line.
    binary_payload: Option<Vec<u8>>,
    /// Whitespace-separated tokens of `text`.
    parameters: Vec<String>,
    kind: CommandKind,
}

impl Command {
    /// Parse a script line. Returns `None` for an empty line.
    pub fn parse(line: &str) -> Option<Command> {
        let mut chars = line.char_indices();
        let (_, tag) = chars.next()?;
        let raw = line[tag.len_utf8()..].to_string();
        let text = chars.nth(1).map(|(offset, _)| line[offset..].to_string());
        let parameters = text
            .as_deref()
            .map(|t| t.split_whitespace().map(str::to_string).collect())
            .unwrap_or_default();

        Some(Command {
            line: line.to_string(),
            tag,
            raw,
            text,
            binary_payload: None,
            parameters,
            kind: CommandKind::from_tag(tag),
        })
    }

    /// Build a binary data command from a `D` line.
    ///
    /// The payload is the line's bytes from offset 2; no parameter parsing is done.
    pub fn binary(line: &str) -> Command {
        let bytes = line.as_bytes();
        let payload = bytes.get(2..).map(<[u8]>::to_vec).unwrap_or_default();
        Command {
            line: line.to_string(),
            tag: 'D',
            raw: line.get(1..).unwrap_or_default().to_string(),
            text: None,
            binary_payload: Some(payload),
            parameters: Vec::new(),
            kind: CommandKind::Data,
        }
    }

    /// The full line as written.
    pub fn line(&self) -> &str {
        &self.line
    }

    /// The action tag.
    pub fn tag(&self) -> char {
        self.tag
    }

    /// Everything after the tag.
    pub fn raw(&self) -> &str {
        &self.raw
    }

    /// Text after the tag and spacer, if the line has any.
    pub fn text(&self) -> Option<&str> {
        self.text.as_deref()
    }

    /// Payload bytes of a binary data line.
    pub fn binary_payload(&self) -> Option<&[u8]> {
        self.binary_payload.as_deref()
    }

    /// Whitespace-separated tokens of the text.
    pub fn parameters(&self) -> &[String] {
        &self.parameters
    }

    /// The command kind selected by the tag.
    pub fn kind(&self) -> CommandKind {
        self.kind
    }

    /// The trimmed argument, with one leading `:` removed.
    ///
    /// Used for routine names, jump targets and file paths so that `J loop`,
    /// `J : loop` and `J:loop` all name the same routine.
    pub fn argument(&self) -> &str {
        let trimmed = self.raw.trim();
        trimmed.strip_prefix(':').unwrap_or(trimmed).trim()
    }
}
