//! # PrintLink
//!
//! A serial link engine that bridges a host to a Marlin-style 3D printer
//! controller:
//! - Baud-rate discovery and `M115` capability handshake
//! - Pipelined command streaming that never overruns the controller's receive buffer
//! - Reply classification (acknowledgments, errors, temperatures, positions)
//! - Print sessions with progress reporting, pause, resume and cancel
//!
//! ## Architecture
//!
//! PrintLink is organized as a workspace with multiple crates:
//!
//! 1. **printlink-core** - Core types, errors, events
//! 2. **printlink-communication** - Serial transport, command queue, flow control, reply parsing, link engine
//! 3. **printlink-settings** - Link configuration and persistence
//! 4. **printlink** - Command-line binary that drives one link

pub mod app;
pub mod cli;

pub use printlink_communication::{firmware, session};
pub use printlink_core::data;

pub use printlink_core::{
    Capabilities, ConnectionError, Error, EventDispatcher, Heater, LinkError, LinkEvent,
    LinkState, PrintSessionSnapshot, PrintState, Result, SessionError, TemperatureReading,
    Temperatures,
};

pub use printlink_communication::{
    list_ports, CommandQueue, FlowControlledSender, LinkConfig, LinkEngine, PrintJob,
    PrintSession, ResponseClassifier, SendBudget, SerialPortInfo, SerialTransport, Transport,
};

pub use printlink_settings::{Config, LinkSettings, LoggingSettings};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Initialize logging
///
/// Sets up structured logging with:
/// - `RUST_LOG` environment variable support, falling back to the configured filter
/// - Human-readable or JSON output on stderr (stdout stays free for the console)
pub fn init_logging(settings: &LoggingSettings) -> anyhow::Result<()> {
    use tracing_subscriber::fmt;
    use tracing_subscriber::prelude::*;
    use tracing_subscriber::EnvFilter;

    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&settings.filter))
        .map_err(|e| anyhow::anyhow!("Invalid log filter {:?}: {}", settings.filter, e))?;

    let registry = tracing_subscriber::registry().with(env_filter);
    if settings.json {
        registry
            .with(
                fmt::layer()
                    .json()
                    .with_writer(std::io::stderr)
                    .with_target(true)
                    .with_thread_names(true),
            )
            .try_init()?;
    } else {
        registry
            .with(
                fmt::layer()
                    .with_writer(std::io::stderr)
                    .with_target(true)
                    .with_level(true)
                    .with_thread_names(true)
                    .with_line_number(true),
            )
            .try_init()?;
    }

    Ok(())
}
