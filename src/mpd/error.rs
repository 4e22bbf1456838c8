//! Error taxonomy for the MPD client
//!
//! `Ack` is the expected failure value a server hands back for a rejected
//! command. Transport faults tear the session down.

use regex::Regex;
use serde::Serialize;
use std::fmt;
use std::sync::LazyLock;
use thiserror::Error;

/// Parsed `ACK [code@index] {command} message` line
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AckError {
    pub code: u32,
    pub index: u32,
    pub command: String,
    pub message: String,
}

static ACK_PATTERN: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"^ACK \[(\d+)@(\d+)\] \{([^}]*)\}\s*(.*)$").ok());

impl AckError {
    /// Parse an ACK terminal line. Lines that do not follow the usual layout
    /// keep their full text as the message.
    pub fn parse(line: &str) -> Self {
        if let Some(caps) = ACK_PATTERN.as_ref().and_then(|re| re.captures(line)) {
            return Self {
                code: caps[1].parse().unwrap_or(0),
                index: caps[2].parse().unwrap_or(0),
                command: caps[3].to_string(),
                message: caps[4].to_string(),
            };
        }

        Self {
            code: 0,
            index: 0,
            command: String::new(),
            message: line.strip_prefix("ACK").unwrap_or(line).trim().to_string(),
        }
    }

    /// Mopidy rejects grouped `list` queries with this text
    pub fn is_parse_args_failure(&self) -> bool {
        self.message.contains("not able to parse args")
    }
}

impl fmt::Display for AckError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}@{}] {{{}}} {}",
            self.code, self.index, self.command, self.message
        )
    }
}

#[derive(Debug, Error)]
pub enum MpdError {
    #[error("MPD host not configured")]
    NotConfigured,

    #[error("not connected to MPD")]
    NotConnected,

    #[error("connection failed: {0}")]
    Connect(#[source] std::io::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("timed out waiting for MPD")]
    Timeout,

    #[error("unexpected greeting: {0}")]
    Greeting(String),

    #[error("connection closed by server")]
    Closed,

    #[error("idle listener went away before handing the connection back")]
    ListenerLost,

    #[error("server rejected command: {0}")]
    Ack(AckError),
}

impl MpdError {
    /// True for faults that invalidate the socket
    pub fn is_transport(&self) -> bool {
        !matches!(
            self,
            MpdError::Ack(_) | MpdError::NotConfigured | MpdError::NotConnected
        )
    }

    pub fn ack(&self) -> Option<&AckError> {
        match self {
            MpdError::Ack(ack) => Some(ack),
            _ => None,
        }
    }
}

pub type MpdResult<T> = std::result::Result<T, MpdError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_ack_line() {
        let ack = AckError::parse("ACK [50@0] {lsinfo} No such directory");
        assert_eq!(ack.code, 50);
        assert_eq!(ack.index, 0);
        assert_eq!(ack.command, "lsinfo");
        assert_eq!(ack.message, "No such directory");
    }

    #[test]
    fn test_parse_ack_in_command_list() {
        let ack = AckError::parse("ACK [2@3] {add} directory or file not found");
        assert_eq!(ack.index, 3);
        assert_eq!(ack.command, "add");
    }

    #[test]
    fn test_parse_malformed_ack_keeps_text() {
        let ack = AckError::parse("ACK something odd");
        assert_eq!(ack.code, 0);
        assert_eq!(ack.message, "something odd");
    }

    #[test]
    fn test_mopidy_signature() {
        let ack = AckError::parse("ACK [2@0] {list} Not able to parse args");
        assert!(!ack.is_parse_args_failure(), "match is case sensitive");

        let ack = AckError::parse("ACK [2@0] {list} not able to parse args");
        assert!(ack.is_parse_args_failure());
    }

    #[test]
    fn test_transport_classification() {
        assert!(MpdError::Timeout.is_transport());
        assert!(MpdError::Closed.is_transport());
        assert!(!MpdError::Ack(AckError::parse("ACK [5@0] {x} y")).is_transport());
        assert!(!MpdError::NotConnected.is_transport());
    }
}
