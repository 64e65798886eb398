//! # PrintLink Core
//!
//! Core types, errors, and events for PrintLink.
//! Provides the data model shared by the serial link engine and the
//! programs that embed it: link state, controller capabilities, heater
//! temperatures, and print session snapshots.

pub mod data;
pub mod error;
pub mod event;

pub use data::{
    Capabilities, Heater, LinkState, PrintSessionSnapshot, PrintState, TemperatureReading,
    Temperatures, MAX_SUPPORTED_EXTRUDERS,
};

pub use error::{ConnectionError, Error, LinkError, ReplyError, Result, SessionError};

pub use event::{EventDispatcher, LinkEvent};
