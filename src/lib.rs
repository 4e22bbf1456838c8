//! mpd-link
//!
//! Client for the Music Player Daemon text protocol.
//!
//! This library provides:
//! - A connection engine that keeps one socket, serializes requests and
//!   parks the connection in `idle` between them
//! - Command builders and response decoders for the library, queue,
//!   playlist, playback and output commands
//! - Capability negotiation against the server version and tag set
//! - Connection and idle events on a broadcast bus

pub mod bus;
pub mod config;
pub mod mpd;

pub use mpd::{ConnectionSettings, MpdConnection, MpdError};
