//! Mock servers for connection integration testing
//!
//! The MPD mock speaks the line protocol over TCP so the connection engine
//! can be exercised without a real server.

pub mod mpd;

pub use mpd::{MockMpdServer, MockMpdState};
