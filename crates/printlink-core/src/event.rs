//! Event system for link telemetry
//!
//! Provides:
//! - Event types for wire traffic, link state, and print state changes
//! - Event dispatcher for publishing events to subscribers
//!
//! Events are best effort: publishing with no subscriber is not an error.

use crate::data::{Capabilities, LinkState, PrintState};
use tokio::sync::broadcast;
use tracing::trace;

/// Link event types
#[derive(Debug, Clone, PartialEq)]
pub enum LinkEvent {
    /// A command line was written to the controller
    LineSent(String),
    /// A reply line was received from the controller
    LineReceived(String),
    /// A reply line matched no known pattern
    Unclassified(String),
    /// Link state changed
    LinkStateChanged(LinkState),
    /// Handshake completed
    Connected {
        /// The negotiated baud rate.
        baud_rate: u32,
        /// What the controller reported about itself.
        capabilities: Capabilities,
    },
    /// Every baud/attempt combination failed
    HandshakeFailed,
    /// Acknowledgment timeout while connected
    LinkLost,
    /// Print state changed
    PrintStateChanged(PrintState),
    /// Controller reported an error
    ControllerError(String),
    /// Controller asked for a line to be resent
    ResendRequested(String),
}

impl std::fmt::Display for LinkEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LinkEvent::LineSent(line) => write!(f, ">{}", line),
            LinkEvent::LineReceived(line) => write!(f, "<{}", line),
            LinkEvent::Unclassified(line) => write!(f, "?{}", line),
            LinkEvent::LinkStateChanged(state) => write!(f, "Link: {}", state),
            LinkEvent::Connected {
                baud_rate,
                capabilities,
            } => write!(
                f,
                "Connected at {} to {}",
                baud_rate, capabilities.machine_type
            ),
            LinkEvent::HandshakeFailed => write!(f, "Handshake failed"),
            LinkEvent::LinkLost => write!(f, "Link lost"),
            LinkEvent::PrintStateChanged(state) => write!(f, "Print: {}", state),
            LinkEvent::ControllerError(msg) => write!(f, "Error: {}", msg),
            LinkEvent::ResendRequested(msg) => write!(f, "Resend: {}", msg),
        }
    }
}

/// Event dispatcher for publishing events to subscribers
#[derive(Clone)]
pub struct EventDispatcher {
    /// Broadcast sender channel for link events.
    tx: broadcast::Sender<LinkEvent>,
}

impl EventDispatcher {
    /// Create a new event dispatcher
    ///
    /// # Arguments
    /// * `buffer_size` - Size of the broadcast buffer (default 256)
    pub fn new(buffer_size: usize) -> Self {
        let (tx, _) = broadcast::channel(buffer_size.max(1));
        Self { tx }
    }

    /// Subscribe to events
    pub fn subscribe(&self) -> broadcast::Receiver<LinkEvent> {
        self.tx.subscribe()
    }

    /// Publish an event to all subscribers, returning how many received it
    pub fn publish(&self, event: LinkEvent) -> usize {
        match self.tx.send(event) {
            Ok(receivers) => receivers,
            Err(broadcast::error::SendError(event)) => {
                trace!("No subscribers for {}", event);
                0
            }
        }
    }

    /// Get number of active subscribers
    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for EventDispatcher {
    fn default() -> Self {
        Self::new(256)
    }
}
