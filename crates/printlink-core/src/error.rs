//! Error handling for PrintLink
//!
//! Provides error types for every layer of the serial link engine:
//! - Link errors (handshake, acknowledgment timeouts, queue back-pressure)
//! - Session errors (print job control issued from the wrong state)
//! - Connection errors (opening and talking to the transport)
//! - Reply errors (controller replies that fail strict parsing)
//!
//! All error types use `thiserror` for ergonomic error handling.

use thiserror::Error;

/// Serial link error type
///
/// Represents failures of the link engine itself. None of these are fatal to
/// the process; the engine clears transient state and reports them.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum LinkError {
    /// The command queue has no free slot; the caller must retry or drop
    #[error("Command queue full ({capacity} slots)")]
    QueueFull {
        /// Total slot count of the queue.
        capacity: usize,
    },

    /// An empty command line was rejected
    #[error("Empty command rejected")]
    EmptyCommand,

    /// Every baud/attempt combination was tried without a usable reply
    #[error("Handshake failed after {attempts} attempts across {bauds} baud rates")]
    HandshakeFailed {
        /// Number of capability queries sent.
        attempts: u32,
        /// Number of candidate baud rates tried.
        bauds: usize,
    },

    /// The controller stopped acknowledging commands
    #[error("Link lost: no reply for {timeout_ms}ms")]
    LinkLost {
        /// The acknowledgment timeout that expired, in milliseconds.
        timeout_ms: u64,
    },

    /// The controller reported an error for the current command
    #[error("Controller error: {message}")]
    ControllerError {
        /// The error text as reported by the controller.
        message: String,
    },

    /// An operation needs an established link
    #[error("Link not connected")]
    NotConnected,

    /// The transport failed while the link was up
    #[error("Transport failure: {reason}")]
    Transport {
        /// The underlying transport error.
        reason: String,
    },
}

/// Print session error type
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SessionError {
    /// A control call was issued from an incompatible state
    #[error("Invalid transition: cannot {action} while {current}")]
    InvalidTransition {
        /// The requested action (start, pause, resume, cancel).
        action: &'static str,
        /// The current print state.
        current: String,
    },

    /// The job source could not be read
    #[error("Job source error: {reason}")]
    JobSource {
        /// The reason the job could not be read.
        reason: String,
    },
}

/// Reply parsing error type
///
/// Raised when a line carries a recognised marker but the value behind it
/// fails strict numeric parsing. Only the affected field is dropped.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ReplyError {
    /// A marker was found but its value is not a number
    #[error("Malformed value for {field}: {value:?}")]
    MalformedReply {
        /// The field or heater marker.
        field: String,
        /// The raw text that failed to parse.
        value: String,
    },

    /// The requested field is not present in the line
    #[error("Field {0} not present")]
    MissingField(String),
}

/// Connection error type
///
/// Represents errors related to the byte-stream transport.
#[derive(Error, Debug, Clone)]
pub enum ConnectionError {
    /// Failed to open port
    #[error("Failed to open port {port} at {baud} baud: {reason}")]
    FailedToOpen {
        /// The name of the port that failed to open.
        port: String,
        /// The baud rate that was requested.
        baud: u32,
        /// The reason the port failed to open.
        reason: String,
    },

    /// The transport is not open
    #[error("Transport not open")]
    NotOpen,

    /// Failed to enumerate ports
    #[error("Failed to enumerate ports: {reason}")]
    Enumeration {
        /// The reason enumeration failed.
        reason: String,
    },

    /// Write to the transport failed
    #[error("Write failed: {reason}")]
    WriteFailed {
        /// The reason for the write failure.
        reason: String,
    },

    /// The reader side of the transport went away
    #[error("Reader disconnected")]
    ReaderDisconnected,
}

/// Main error type for PrintLink
///
/// A unified error type that can represent any error from all layers.
/// This is the primary error type used in public APIs.
#[derive(Error, Debug)]
pub enum Error {
    /// Link engine error
    #[error(transparent)]
    Link(#[from] LinkError),

    /// Print session error
    #[error(transparent)]
    Session(#[from] SessionError),

    /// Reply parsing error
    #[error(transparent)]
    Reply(#[from] ReplyError),

    /// Connection error
    #[error(transparent)]
    Connection(#[from] ConnectionError),

    /// Standard I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Check if this is a link loss
    pub fn is_link_lost(&self) -> bool {
        matches!(self, Error::Link(LinkError::LinkLost { .. }))
    }

    /// Check if this is a connection error
    pub fn is_connection_error(&self) -> bool {
        matches!(self, Error::Connection(_))
    }

    /// Check if this is an invalid print-state transition
    pub fn is_invalid_transition(&self) -> bool {
        matches!(self, Error::Session(SessionError::InvalidTransition { .. }))
    }
}

/// Result type using Error
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_link_error_display() {
        let err = LinkError::QueueFull { capacity: 16 };
        assert_eq!(err.to_string(), "Command queue full (16 slots)");

        let err = LinkError::HandshakeFailed {
            attempts: 3,
            bauds: 3,
        };
        assert_eq!(
            err.to_string(),
            "Handshake failed after 3 attempts across 3 baud rates"
        );
    }

    #[test]
    fn test_session_error_display() {
        let err = SessionError::InvalidTransition {
            action: "pause",
            current: "Idle".to_string(),
        };
        assert_eq!(err.to_string(), "Invalid transition: cannot pause while Idle");
    }

    #[test]
    fn test_error_conversion() {
        let err: Error = LinkError::LinkLost { timeout_ms: 2500 }.into();
        assert!(err.is_link_lost());
        assert!(!err.is_connection_error());

        let err: Error = SessionError::InvalidTransition {
            action: "resume",
            current: "Printing".to_string(),
        }
        .into();
        assert!(err.is_invalid_transition());

        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "gone");
        let err: Error = io_err.into();
        assert!(matches!(err, Error::Io(_)));
    }
}
