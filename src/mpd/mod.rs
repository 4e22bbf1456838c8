//! MPD protocol client
//!
//! - `commands`: command line construction
//! - `responses`: line-prefix response decoding
//! - `capabilities`: version/command/tag feature negotiation
//! - `idle`: idle/noidle handshake pieces
//! - `connection`: the socket-owning engine tying them together

pub mod capabilities;
pub mod commands;
pub mod connection;
pub mod error;
pub mod idle;
pub mod objects;
pub mod responses;

pub use capabilities::{Capabilities, ServerVersion};
pub use commands::SearchType;
pub use connection::{ConnectionSettings, MpdConnection, Response, DEFAULT_PORT};
pub use error::{AckError, MpdError, MpdResult};
pub use idle::IdleState;
pub use objects::{
    Album, Artist, Directory, FileEntry, Output, PlaybackState, Playlist, Statistics, Status,
    Track,
};
pub use responses::TrackFilter;
