//! Line handoff between an I/O context and the link engine
//!
//! The producer side receives raw bytes as they arrive from the port and
//! frames them into lines. Only complete lines cross the channel, so the
//! consumer never observes a partial reply.

use printlink_core::{ConnectionError, Result};
use tokio::sync::mpsc;

/// Longest line the producer buffers before flushing it as-is
pub const MAX_LINE_LENGTH: usize = 1024;

/// Create a connected producer/consumer pair
pub fn line_channel() -> (LineProducer, LineConsumer) {
    let (tx, rx) = mpsc::unbounded_channel();
    (
        LineProducer {
            tx,
            partial: Vec::with_capacity(128),
        },
        LineConsumer { rx },
    )
}

/// Frames raw bytes into lines and forwards them
#[derive(Debug)]
pub struct LineProducer {
    tx: mpsc::UnboundedSender<String>,
    partial: Vec<u8>,
}

impl LineProducer {
    /// Feed raw bytes; every completed line is forwarded
    ///
    /// Carriage returns are dropped and `\n` ends a line. Returns false once
    /// the consumer has gone away.
    pub fn push_bytes(&mut self, bytes: &[u8]) -> bool {
        for &byte in bytes {
            match byte {
                b'\r' => {}
                b'\n' => {
                    if !self.flush() {
                        return false;
                    }
                }
                _ => {
                    self.partial.push(byte);
                    if self.partial.len() >= MAX_LINE_LENGTH && !self.flush() {
                        return false;
                    }
                }
            }
        }
        true
    }

    /// Forward a complete line directly, bypassing framing
    pub fn push_line(&self, line: impl Into<String>) -> bool {
        self.tx.send(line.into()).is_ok()
    }

    /// Check if the consumer is still listening
    pub fn is_connected(&self) -> bool {
        !self.tx.is_closed()
    }

    fn flush(&mut self) -> bool {
        let line = String::from_utf8_lossy(&self.partial).into_owned();
        self.partial.clear();
        self.tx.send(line).is_ok()
    }
}

/// Receives complete lines from a [`LineProducer`]
#[derive(Debug)]
pub struct LineConsumer {
    rx: mpsc::UnboundedReceiver<String>,
}

impl LineConsumer {
    /// Next complete line, if one is waiting
    ///
    /// Returns `ReaderDisconnected` once the producer has been dropped and
    /// every buffered line has been drained.
    pub fn try_next_line(&mut self) -> Result<Option<String>> {
        match self.rx.try_recv() {
            Ok(line) => Ok(Some(line)),
            Err(mpsc::error::TryRecvError::Empty) => Ok(None),
            Err(mpsc::error::TryRecvError::Disconnected) => {
                Err(ConnectionError::ReaderDisconnected.into())
            }
        }
    }
}
