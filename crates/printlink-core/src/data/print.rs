//! Print session state and progress snapshots.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle of a print job
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum PrintState {
    /// No job
    #[default]
    Idle,
    /// Job accepted, waiting for the upload to complete
    Uploading,
    /// Job lines are being streamed
    Printing,
    /// Streaming suspended by the caller
    Paused,
    /// Job aborted, reset sequence being sent
    Cancelling,
    /// Every job line transmitted and acknowledged
    Finished,
}

impl PrintState {
    /// Check if a job is in progress (not idle and not finished)
    pub fn is_active(&self) -> bool {
        !matches!(self, PrintState::Idle | PrintState::Finished)
    }
}

impl fmt::Display for PrintState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PrintState::Idle => write!(f, "Idle"),
            PrintState::Uploading => write!(f, "Uploading"),
            PrintState::Printing => write!(f, "Printing"),
            PrintState::Paused => write!(f, "Paused"),
            PrintState::Cancelling => write!(f, "Cancelling"),
            PrintState::Finished => write!(f, "Finished"),
        }
    }
}

/// Point-in-time copy of the print session handed to callers
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct PrintSessionSnapshot {
    /// Current lifecycle state
    pub state: PrintState,
    /// Name of the active (or last) job
    pub job_name: Option<String>,
    /// Wall-clock time streaming began
    pub started_at: Option<DateTime<Utc>>,
    /// Seconds since streaming began
    pub elapsed_secs: Option<u64>,
    /// Job bytes handed to the sender so far
    pub bytes_sent: u64,
    /// Total job size in bytes
    pub total_bytes: u64,
    /// Job lines handed to the sender so far
    pub lines_sent: u64,
}

impl PrintSessionSnapshot {
    /// Progress in percent, based on transmitted bytes
    pub fn progress_percent(&self) -> f32 {
        if self.total_bytes == 0 {
            return 0.0;
        }
        (self.bytes_sent as f64 * 100.0 / self.total_bytes as f64).min(100.0) as f32
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_progress_percent() {
        let snapshot = PrintSessionSnapshot {
            bytes_sent: 250,
            total_bytes: 1000,
            ..Default::default()
        };
        assert_eq!(snapshot.progress_percent(), 25.0);
        assert_eq!(PrintSessionSnapshot::default().progress_percent(), 0.0);
    }

    #[test]
    fn test_active_states() {
        assert!(!PrintState::Idle.is_active());
        assert!(!PrintState::Finished.is_active());
        assert!(PrintState::Paused.is_active());
        assert!(PrintState::Cancelling.is_active());
    }
}
