//! Tokenizing response lines into pairs and terminators.

use crate::error::{MpdError, Result};
use crate::protocol::ack::AckError;

/// One `key: value` line of a response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pair {
    pub key: String,
    pub value: String,
}

impl Pair {
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }

    /// ASCII case-insensitive key comparison; the server is not consistent
    /// about key casing across versions.
    pub fn is(&self, key: &str) -> bool {
        self.key.eq_ignore_ascii_case(key)
    }
}

/// A classified response line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    Pair(Pair),
    /// `OK`: the response (or the whole command list) succeeded.
    Ok,
    /// `list_OK`: one sub-command of a `command_list_ok_begin` list finished.
    ListOk,
    /// `ACK ...`: the response ended in a server error.
    Ack(AckError),
}

/// Classify one line. Terminators are matched case-sensitively; anything else
/// must contain a `": "` separator.
pub fn parse_line(line: &str) -> Result<Reply> {
    if line == "OK" {
        return Ok(Reply::Ok);
    }
    if line == "list_OK" {
        return Ok(Reply::ListOk);
    }
    if line.starts_with("ACK") {
        return Ok(Reply::Ack(AckError::parse(line)));
    }

    match line.split_once(": ") {
        Some((key, value)) => Ok(Reply::Pair(Pair::new(key, value))),
        None => Err(MpdError::Protocol(format!("error parsing: {}", line))),
    }
}
