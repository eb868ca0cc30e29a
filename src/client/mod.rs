//! Asynchronous MPD client built on the [`crate::protocol`] pieces.

mod connection;
mod entity;
mod idle;
mod pipeline;
mod transport;

pub use connection::{Connection, DEFAULT_PORT, DEFAULT_TIMEOUT};
pub use entity::{Directory, InfoEntity, PlaylistFile, Song};
pub use idle::{IdleCallback, IdleCanceller, IdleProgress, IdleStatus};
pub use pipeline::{ListMode, ListOkStep};
pub use transport::Transport;
