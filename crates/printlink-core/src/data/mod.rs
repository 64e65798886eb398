//! Data models for link, controller, and print state
//!
//! This module provides:
//! - Link state of a serial connection
//! - Controller capabilities reported by the handshake
//! - Per-heater temperature readings
//! - Print session state and progress snapshots

pub mod capabilities;
pub mod link;
pub mod print;
pub mod temperature;

pub use capabilities::{Capabilities, MAX_SUPPORTED_EXTRUDERS};
pub use link::LinkState;
pub use print::{PrintSessionSnapshot, PrintState};
pub use temperature::{Heater, TemperatureReading, Temperatures};
