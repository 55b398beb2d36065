//! Session event system for connection notifications.
//!
//! The connection manager emits a [`SessionEvent`] at every interesting point
//! of a session's life. Events are informational; the authoritative state is
//! the status watch on the manager.

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use crate::connection::ConnectionState;
use crate::error::FailureReason;
use crate::transport::Channel;

/// Events emitted by a live session.
///
/// All events are serializable for logging and for pushing to clients.
///
/// This enum is marked `#[non_exhaustive]` to allow adding new event types
/// in future versions without breaking downstream code.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
#[non_exhaustive]
pub enum SessionEvent {
    /// Connection state changed.
    StateChanged {
        /// Session generation the change belongs to.
        generation: u64,
        /// New state.
        state: ConnectionState,
    },
    /// A handshake attempt failed.
    HandshakeFailed { channel: Channel, error: String },
    /// Primary handshake failed; trying the fallback channel.
    FallbackEngaged { url: String },
    /// Handshake acknowledged.
    Connected { channel: Channel, url: String },
    /// Subscribe command issued.
    Subscribed { topic: String },
    /// Link dropped without `close()`.
    Disconnected { error: String },
    /// Reconnection attempt started.
    ReconnectStarted { attempt: u32 },
    /// Reconnection succeeded.
    ReconnectSucceeded { attempts: u32 },
    /// Session reached a terminal failure.
    Failed { reason: FailureReason },
    /// Session closed by the caller.
    Closed,
}

/// Sender for session events.
pub type EventSender = broadcast::Sender<SessionEvent>;

/// Receiver for session events.
pub type EventReceiver = broadcast::Receiver<SessionEvent>;

/// Event dispatcher for sending events to multiple receivers.
#[derive(Debug, Clone)]
pub struct EventDispatcher {
    sender: EventSender,
}

impl EventDispatcher {
    /// Create a new event dispatcher.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    /// Subscribe to events.
    pub fn subscribe(&self) -> EventReceiver {
        self.sender.subscribe()
    }

    /// Send an event.
    pub fn send(&self, event: SessionEvent) {
        // Ignore error if no receivers
        let _ = self.sender.send(event);
    }

    /// Get the number of active receivers.
    pub fn receiver_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventDispatcher {
    fn default() -> Self {
        Self::new(100)
    }
}
