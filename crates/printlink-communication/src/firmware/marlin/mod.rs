//! Marlin-dialect firmware support
//!
//! Reply classification, capability/temperature field extraction, and the
//! M-codes the engine emits on its own behalf.

pub mod commands;
pub mod fields;
pub mod response_parser;

pub use fields::{
    extract_field, extract_flag, is_position_report, parse_capabilities, parse_heating_temp,
    parse_temp, strict_float,
};
pub use response_parser::{HeaterReading, Reply, ResponseClassifier};
