//! Link state of one serial connection.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Connection state of the serial link
///
/// `Probing` carries the index into the configured baud list and the
/// zero-based attempt at that baud. `Connected` carries the baud rate the
/// controller answered on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum LinkState {
    /// No link, no handshake in progress
    #[default]
    Unconnected,
    /// Handshake in progress
    Probing {
        /// Index into the candidate baud list.
        baud_index: usize,
        /// Attempt number at this baud, starting at 0.
        attempt: u32,
    },
    /// Controller answered; commands may flow
    Connected {
        /// The negotiated baud rate.
        baud_rate: u32,
    },
    /// Controller stopped replying while connected
    Lost,
}

impl LinkState {
    /// Check if commands can be sent
    pub fn is_connected(&self) -> bool {
        matches!(self, LinkState::Connected { .. })
    }

    /// The negotiated baud rate, if connected
    pub fn baud_rate(&self) -> Option<u32> {
        match self {
            LinkState::Connected { baud_rate } => Some(*baud_rate),
            _ => None,
        }
    }
}

impl fmt::Display for LinkState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LinkState::Unconnected => write!(f, "Unconnected"),
            LinkState::Probing {
                baud_index,
                attempt,
            } => write!(f, "Probing(baud #{}, attempt {})", baud_index, attempt),
            LinkState::Connected { baud_rate } => write!(f, "Connected @ {}", baud_rate),
            LinkState::Lost => write!(f, "Lost"),
        }
    }
}
