//! Wire-level pieces of the MPD protocol: line buffering, response
//! tokenizing, ACK decoding, command quoting, search rendering and idle flags.
//!
//! Nothing here owns a socket; [`crate::client::Connection`] joins these
//! together over a stream.

pub mod ack;
pub mod command;
pub mod idle;
pub mod reader;
pub mod response;
pub mod search;
pub mod tag;

pub use ack::{AckCode, AckError};
pub use command::{escape, quote, unescape, Command};
pub use idle::IdleFlags;
pub use reader::{LineReader, BUFFER_CAPACITY};
pub use response::{parse_line, Pair, Reply};
pub use search::{SearchBuilder, SearchKind, SearchRequest};
pub use tag::TagType;

/// Prefix of the line the server greets every new connection with.
pub const WELCOME_PREFIX: &str = "OK MPD ";

/// Protocol version announced in the welcome line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
pub struct ProtocolVersion {
    pub major: u32,
    pub minor: u32,
    pub patch: u32,
}

impl ProtocolVersion {
    pub fn new(major: u32, minor: u32, patch: u32) -> Self {
        Self {
            major,
            minor,
            patch,
        }
    }

    /// Parse the version out of a welcome line. `None` when the line is not
    /// an MPD welcome or the version is unreadable.
    pub fn from_welcome(line: &str) -> Option<Self> {
        let version = line.strip_prefix(WELCOME_PREFIX)?.trim();
        let mut parts = version.splitn(3, '.');
        let major = parts.next()?.parse().ok()?;
        let minor = parts.next()?.parse().ok()?;
        // Some servers stop at major.minor; anything after the patch digits
        // is ignored.
        let patch = parts
            .next()
            .map(|p| {
                p.chars()
                    .take_while(|c| c.is_ascii_digit())
                    .collect::<String>()
            })
            .and_then(|p| p.parse().ok())
            .unwrap_or(0);
        Some(Self::new(major, minor, patch))
    }

    pub fn at_least(&self, major: u32, minor: u32, patch: u32) -> bool {
        *self >= Self::new(major, minor, patch)
    }
}

impl std::fmt::Display for ProtocolVersion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
    }
}
