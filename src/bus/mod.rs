//! Event bus for connection and idle notifications
//!
//! Uses tokio::sync::broadcast for pub/sub pattern.
//! Higher layers subscribe instead of registering callbacks on the connection.

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::broadcast;

/// Events published by an `MpdConnection`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload")]
pub enum MpdEvent {
    /// Handshake finished and capabilities are known
    Connected {
        host: String,
        port: u16,
        version: String,
    },
    /// Socket released, either on request or after an I/O failure
    Disconnected { host: String },
    /// `idle` was written and the listener is waiting for the server
    Idle { host: String },
    /// The connection left idle. `external` is set when the server reported
    /// changed subsystems, even if our own `noidle` crossed it on the wire.
    NonIdle {
        host: String,
        changed: Vec<String>,
        external: bool,
    },
}

/// Event bus handle for publishing and subscribing
#[derive(Clone)]
pub struct EventBus {
    sender: broadcast::Sender<MpdEvent>,
}

impl EventBus {
    /// Create a new event bus with specified capacity
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Publish an event to all subscribers
    pub fn publish(&self, event: MpdEvent) {
        // Ignore send errors (no subscribers)
        let _ = self.sender.send(event);
    }

    /// Subscribe to all events
    pub fn subscribe(&self) -> broadcast::Receiver<MpdEvent> {
        self.sender.subscribe()
    }

    /// Get the number of current subscribers
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventBus {
    /// Default capacity of 256 events
    fn default() -> Self {
        Self::new(256)
    }
}

/// Shared event bus wrapped in Arc for thread-safe sharing
pub type SharedBus = Arc<EventBus>;

/// Create a new shared event bus
pub fn create_bus() -> SharedBus {
    Arc::new(EventBus::default())
}
