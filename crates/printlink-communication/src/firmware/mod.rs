//! Firmware support for serial printer controllers
//!
//! Supported dialects:
//! - Marlin (and derivatives such as Prusa firmware): `M115` capability
//!   reports, `M105` temperature reports, `ok`-based acknowledgment

pub mod handshake;
pub mod marlin;

pub use handshake::{Handshake, HandshakeConfig, HandshakeStep, DEFAULT_BAUD_RATES};
pub use marlin::{HeaterReading, Reply, ResponseClassifier};
