//! Error types for the MPD client engine.
//!
//! Every fallible engine operation returns [`MpdError`]. Transport and
//! protocol failures poison the connection: once one has been returned, the
//! connection answers every later call with [`MpdError::Broken`] and has to be
//! closed and recreated.

use std::io;
use thiserror::Error;

use crate::protocol::ack::AckError;

/// Coarse classification of an [`MpdError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Timeout,
    System,
    UnknownHost,
    ConnPort,
    NotMpd,
    NoResponse,
    Sending,
    ConnClosed,
    Ack,
    BufferOverrun,
    Protocol,
    Usage,
}

impl ErrorKind {
    /// Whether errors of this kind leave the connection unusable.
    pub fn is_fatal(self) -> bool {
        !matches!(self, ErrorKind::Ack | ErrorKind::Usage)
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ErrorKind::Timeout => "timeout",
            ErrorKind::System => "system error",
            ErrorKind::UnknownHost => "unknown host",
            ErrorKind::ConnPort => "connection refused",
            ErrorKind::NotMpd => "not mpd",
            ErrorKind::NoResponse => "no response",
            ErrorKind::Sending => "send failure",
            ErrorKind::ConnClosed => "connection closed",
            ErrorKind::Ack => "server error",
            ErrorKind::BufferOverrun => "buffer overrun",
            ErrorKind::Protocol => "protocol error",
            ErrorKind::Usage => "usage error",
        };
        f.write_str(name)
    }
}

#[derive(Error, Debug)]
pub enum MpdError {
    #[error("Unknown host: {0}")]
    UnknownHost(String),

    #[error("Problems connecting to {addr}: {source}")]
    Connect {
        addr: String,
        #[source]
        source: io::Error,
    },

    /// The peer answered, but not with an MPD welcome line.
    #[error("MPD not running at {0}")]
    NotMpd(String),

    #[error("No response from server: {0}")]
    NoResponse(String),

    #[error("Timeout talking to mpd")]
    Timeout,

    #[error("Error sending command: {0}")]
    Sending(#[source] io::Error),

    #[error("Connection closed by mpd")]
    ConnectionClosed,

    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Buffer overrun: no line terminator within {0} bytes")]
    BufferOverrun(usize),

    #[error("Protocol error: {0}")]
    Protocol(String),

    #[error("{0}")]
    Ack(AckError),

    #[error("Invalid usage: {0}")]
    Usage(String),

    /// An earlier fatal error left the connection unusable.
    #[error("Connection unusable after earlier {0}")]
    Broken(ErrorKind),
}

impl MpdError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            MpdError::UnknownHost(_) => ErrorKind::UnknownHost,
            MpdError::Connect { .. } => ErrorKind::ConnPort,
            MpdError::NotMpd(_) => ErrorKind::NotMpd,
            MpdError::NoResponse(_) => ErrorKind::NoResponse,
            MpdError::Timeout => ErrorKind::Timeout,
            MpdError::Sending(_) => ErrorKind::Sending,
            MpdError::ConnectionClosed => ErrorKind::ConnClosed,
            MpdError::Io(_) => ErrorKind::System,
            MpdError::BufferOverrun(_) => ErrorKind::BufferOverrun,
            MpdError::Protocol(_) => ErrorKind::Protocol,
            MpdError::Ack(_) => ErrorKind::Ack,
            MpdError::Usage(_) => ErrorKind::Usage,
            MpdError::Broken(kind) => *kind,
        }
    }

    pub fn is_fatal(&self) -> bool {
        self.kind().is_fatal()
    }

    /// The server-reported error, if this is one.
    pub fn as_ack(&self) -> Option<&AckError> {
        match self {
            MpdError::Ack(ack) => Some(ack),
            _ => None,
        }
    }

    pub(crate) fn usage(msg: impl Into<String>) -> Self {
        let msg = msg.into();
        tracing::error!("mpd usage error: {}", msg);
        MpdError::Usage(msg)
    }
}

pub type Result<T> = std::result::Result<T, MpdError>;
