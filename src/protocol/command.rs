//! Outgoing command lines and argument quoting.

use std::fmt;

/// Backslash-escape `"` and `\` so the value can sit inside double quotes.
pub fn escape(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        if c == '"' || c == '\\' {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

/// Inverse of [`escape`]: drop each escaping backslash.
pub fn unescape(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    let mut chars = value.chars();
    while let Some(c) = chars.next() {
        if c == '\\' {
            if let Some(next) = chars.next() {
                out.push(next);
                continue;
            }
        }
        out.push(c);
    }
    out
}

/// Render a value as a double-quoted, escaped argument.
pub fn quote(value: &str) -> String {
    format!("\"{}\"", escape(value))
}

/// A single command line, without its trailing newline.
///
/// ```
/// use mpdlink::protocol::Command;
///
/// let cmd = Command::new("find").arg_raw("artist").arg("Sly & the \"Family\"");
/// assert_eq!(cmd.as_str(), r#"find artist "Sly & the \"Family\"""#);
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Command {
    line: String,
}

impl Command {
    pub fn new(verb: &str) -> Self {
        Self {
            line: verb.to_string(),
        }
    }

    /// Append a string argument, always quoted.
    pub fn arg(mut self, value: impl AsRef<str>) -> Self {
        self.line.push(' ');
        self.line.push_str(&quote(value.as_ref()));
        self
    }

    /// Append an argument verbatim (numbers, tag names, keywords).
    pub fn arg_raw(mut self, value: impl fmt::Display) -> Self {
        self.line.push(' ');
        self.line.push_str(&value.to_string());
        self
    }

    pub fn verb(&self) -> &str {
        self.line.split(' ').next().unwrap_or_default()
    }

    pub fn as_str(&self) -> &str {
        &self.line
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.line)
    }
}

impl From<&str> for Command {
    fn from(line: &str) -> Self {
        Self {
            line: line.to_string(),
        }
    }
}
