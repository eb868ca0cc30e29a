//! Decoding of `ACK [<code>@<pos>] {<command>} <message>` error lines.

use std::fmt;

/// Error codes the server reports in `ACK` lines.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AckCode {
    NotList,
    Arg,
    Password,
    Permission,
    UnknownCommand,
    NoExist,
    PlaylistMax,
    System,
    PlaylistLoad,
    UpdateAlready,
    PlayerSync,
    Exist,
    /// A code this client does not know, or `-1` when the line had none.
    Unknown(i32),
}

impl AckCode {
    pub fn from_code(code: i32) -> Self {
        match code {
            1 => AckCode::NotList,
            2 => AckCode::Arg,
            3 => AckCode::Password,
            4 => AckCode::Permission,
            5 => AckCode::UnknownCommand,
            50 => AckCode::NoExist,
            51 => AckCode::PlaylistMax,
            52 => AckCode::System,
            53 => AckCode::PlaylistLoad,
            54 => AckCode::UpdateAlready,
            55 => AckCode::PlayerSync,
            56 => AckCode::Exist,
            other => AckCode::Unknown(other),
        }
    }

    pub fn code(self) -> i32 {
        match self {
            AckCode::NotList => 1,
            AckCode::Arg => 2,
            AckCode::Password => 3,
            AckCode::Permission => 4,
            AckCode::UnknownCommand => 5,
            AckCode::NoExist => 50,
            AckCode::PlaylistMax => 51,
            AckCode::System => 52,
            AckCode::PlaylistLoad => 53,
            AckCode::UpdateAlready => 54,
            AckCode::PlayerSync => 55,
            AckCode::Exist => 56,
            AckCode::Unknown(code) => code,
        }
    }
}

/// A structured server error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AckError {
    pub code: AckCode,
    /// Index of the failing command inside a command list.
    pub position: Option<u32>,
    /// The command the server rejected, when it named one.
    pub command: Option<String>,
    pub message: String,
}

impl AckError {
    /// Decode an `ACK` line. Never fails: anything that does not fit the
    /// bracketed layout yields [`AckCode::Unknown`] and keeps the text as the
    /// message.
    pub fn parse(line: &str) -> Self {
        let rest = line.strip_prefix("ACK").unwrap_or(line).trim_start();

        let unknown = || AckError {
            code: AckCode::Unknown(-1),
            position: None,
            command: None,
            message: rest.to_string(),
        };

        let Some(bracketed) = rest.strip_prefix('[') else {
            return unknown();
        };
        let Some(close) = bracketed.find(']') else {
            return unknown();
        };
        let Some((code, position)) = bracketed[..close].split_once('@') else {
            return unknown();
        };
        let Ok(code) = code.trim().parse::<i32>() else {
            return unknown();
        };
        // The server sends -1 when the position does not apply.
        let position = position
            .trim()
            .parse::<i64>()
            .ok()
            .and_then(|p| u32::try_from(p).ok());

        let mut tail = bracketed[close + 1..].trim_start();
        let mut command = None;
        if let Some(braced) = tail.strip_prefix('{') {
            if let Some(end) = braced.find('}') {
                let name = &braced[..end];
                if !name.is_empty() {
                    command = Some(name.to_string());
                }
                tail = &braced[end + 1..];
            }
        }

        AckError {
            code: AckCode::from_code(code),
            position,
            command,
            message: tail.strip_prefix(' ').unwrap_or(tail).to_string(),
        }
    }
}

impl fmt::Display for AckError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ACK [{}", self.code.code())?;
        match self.position {
            Some(pos) => write!(f, "@{}]", pos)?,
            None => f.write_str("]")?,
        }
        if let Some(ref command) = self.command {
            write!(f, " {{{}}}", command)?;
        }
        write!(f, " {}", self.message)
    }
}

impl std::error::Error for AckError {}
