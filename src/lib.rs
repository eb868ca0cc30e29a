//! mpdlink - asynchronous client for the Music Player Daemon protocol
//!
//! This library provides:
//! - Line-oriented response reading with bounded buffers and timeouts
//! - Command dispatch, command lists and `list_OK` tracking
//! - Blocking and reactor-driven idle notifications with cancellation
//! - Incremental search/list/count command building
//! - A reconnecting watcher that republishes idle events on a broadcast bus

pub mod bus;
pub mod client;
pub mod config;
pub mod error;
pub mod protocol;
pub mod watcher;

pub use client::{Connection, IdleCanceller, IdleProgress, IdleStatus, InfoEntity, ListOkStep};
pub use error::{ErrorKind, MpdError, Result};
pub use protocol::{AckCode, AckError, Command, IdleFlags, Pair, SearchKind, TagType};
