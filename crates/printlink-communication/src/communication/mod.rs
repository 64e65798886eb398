//! Communication layer
//!
//! The byte-stream side of the link: the `Transport` trait the engine talks
//! through, the serial implementation, the line handoff between an I/O
//! context and the engine, the command queue, and the flow-controlled
//! sender that drains it.

pub mod command_queue;
pub mod line_channel;
pub mod sender;
pub mod serial;

pub use command_queue::{Command, CommandOrigin, CommandQueue, DEFAULT_QUEUE_CAPACITY};
pub use line_channel::{line_channel, LineConsumer, LineProducer};
pub use sender::{FlowControlledSender, SendBudget, SenderConfig};
pub use serial::{list_ports, SerialPortInfo, SerialTransport};

use printlink_core::Result;

/// Line terminator appended to every outbound command
pub const LINE_TERMINATOR: &[u8] = b"\n";

/// Byte-stream connection to a controller
///
/// Implementations hand out whole reply lines only; a line still being
/// received is never returned.
pub trait Transport: Send {
    /// Open (or re-open) the connection at the given baud rate
    fn open(&mut self, baud_rate: u32) -> Result<()>;

    /// Close the connection; closing a closed transport is a no-op
    fn close(&mut self) -> Result<()>;

    /// Check if the connection is open
    fn is_open(&self) -> bool;

    /// Write raw bytes, returning the number written
    fn write(&mut self, data: &[u8]) -> Result<usize>;

    /// Next complete reply line without its terminator, if one is available
    fn read_line(&mut self) -> Result<Option<String>>;

    /// Human readable name of the underlying port
    fn name(&self) -> String;
}

/// Write one command line followed by the line terminator
pub fn write_line(transport: &mut dyn Transport, line: &str) -> Result<()> {
    let mut out = Vec::with_capacity(line.len() + LINE_TERMINATOR.len());
    out.extend_from_slice(line.as_bytes());
    out.extend_from_slice(LINE_TERMINATOR);
    let mut written = 0;
    while written < out.len() {
        let n = transport.write(&out[written..])?;
        if n == 0 {
            return Err(printlink_core::ConnectionError::WriteFailed {
                reason: "zero-length write".to_string(),
            }
            .into());
        }
        written += n;
    }
    Ok(())
}
