//! PrintLink Settings Crate
//!
//! Handles link configuration: defaults, validation, and persistence.

pub mod config;
pub mod error;

pub use config::{Config, LinkSettings, LoggingSettings, CONFIG_DIR_NAME, CONFIG_FILE_NAME};
pub use error::{ConfigError, ConfigResult, SettingsError, SettingsResult};
