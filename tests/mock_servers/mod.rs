//! Mock servers for integration testing
//!
//! These mock servers simulate the real backend service, allowing full
//! integration testing without a running MPD.

pub mod mpd;

pub use mpd::{MockMpdServer, MockMpdState};
