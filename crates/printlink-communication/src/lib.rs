//! # PrintLink Communication
//!
//! Serial link engine for G-code printer controllers.
//! Discovers the controller's baud rate and capabilities, pipelines
//! commands without overrunning its receive buffer, classifies its replies
//! and tracks temperatures and print progress.

pub mod communication;
pub mod engine;
pub mod firmware;
pub mod session;

pub use communication::{
    line_channel, list_ports, write_line, Command, CommandOrigin, CommandQueue,
    FlowControlledSender, LineConsumer, LineProducer, SendBudget, SenderConfig, SerialPortInfo,
    SerialTransport, Transport, DEFAULT_QUEUE_CAPACITY, LINE_TERMINATOR,
};
pub use engine::{LinkConfig, LinkEngine, MAX_LINES_PER_TICK};
pub use firmware::{
    Handshake, HandshakeConfig, HandshakeStep, HeaterReading, Reply, ResponseClassifier,
    DEFAULT_BAUD_RATES,
};
pub use session::{JobLine, PrintJob, PrintSession};
