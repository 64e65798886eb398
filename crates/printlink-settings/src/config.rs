//! Configuration management for PrintLink
//!
//! Provides configuration file handling and validation for the serial link.
//! Supports JSON and TOML file formats stored in platform-specific directories.
//!
//! Configuration is organized into sections:
//! - Link settings (port, baud discovery, timeouts, flow control, cancel sequence)
//! - Logging preferences

use crate::error::{ConfigError, SettingsError, SettingsResult};
use printlink_communication::{LinkConfig, DEFAULT_BAUD_RATES, DEFAULT_QUEUE_CAPACITY};
use printlink_communication::firmware::marlin::commands;
use printlink_core::MAX_SUPPORTED_EXTRUDERS;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;

/// Directory under the platform config dir holding PrintLink files
pub const CONFIG_DIR_NAME: &str = "printlink";

/// Default configuration file name
pub const CONFIG_FILE_NAME: &str = "config.toml";

/// Serial link settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LinkSettings {
    /// Serial device; the command line may override it
    pub port: Option<String>,
    /// Baud rates tried during the handshake, in order
    pub baud_rates: Vec<u32>,
    /// Capability queries per baud rate
    pub handshake_retries: u32,
    /// Wait per capability query in milliseconds
    pub handshake_timeout_ms: u64,
    /// Wait for an acknowledgment before the link counts as lost
    pub ack_timeout_ms: u64,
    /// Silence after which the link is marked idle
    pub keepalive_interval_ms: u64,
    /// Temperature poll interval
    pub temperature_interval_ms: u64,
    /// Controller receive buffer in bytes, 0 when unknown
    pub rx_buffer_size: usize,
    /// Usable share of the receive buffer, 1 to 100
    pub rx_buffer_usage_percent: u8,
    /// Command queue ring slots
    pub queue_capacity: usize,
    /// Upper bound for the reported extruder count
    pub max_extruders: usize,
    /// Free queue slots kept out of reach of job lines
    pub job_slot_reserve: usize,
    /// Commands sent to the controller when a print is cancelled
    pub cancel_commands: Vec<String>,
}

impl Default for LinkSettings {
    fn default() -> Self {
        let defaults = LinkConfig::default();
        Self {
            port: None,
            baud_rates: DEFAULT_BAUD_RATES.to_vec(),
            handshake_retries: defaults.handshake_retries,
            handshake_timeout_ms: millis(defaults.handshake_timeout),
            ack_timeout_ms: millis(defaults.ack_timeout),
            keepalive_interval_ms: millis(defaults.keepalive_interval),
            temperature_interval_ms: millis(defaults.temperature_interval),
            rx_buffer_size: defaults.rx_buffer_size,
            rx_buffer_usage_percent: defaults.rx_buffer_usage_percent,
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            max_extruders: defaults.max_extruders,
            job_slot_reserve: defaults.job_slot_reserve,
            cancel_commands: commands::default_cancel_sequence(),
        }
    }
}

fn millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

impl LinkSettings {
    /// Engine configuration for these settings
    pub fn to_link_config(&self) -> LinkConfig {
        LinkConfig {
            baud_rates: self.baud_rates.clone(),
            handshake_retries: self.handshake_retries,
            handshake_timeout: Duration::from_millis(self.handshake_timeout_ms),
            ack_timeout: Duration::from_millis(self.ack_timeout_ms),
            keepalive_interval: Duration::from_millis(self.keepalive_interval_ms),
            temperature_interval: Duration::from_millis(self.temperature_interval_ms),
            rx_buffer_size: self.rx_buffer_size,
            rx_buffer_usage_percent: self.rx_buffer_usage_percent,
            queue_capacity: self.queue_capacity,
            max_extruders: self.max_extruders,
            job_slot_reserve: self.job_slot_reserve,
            cancel_commands: self.cancel_commands.clone(),
            ..LinkConfig::default()
        }
    }

    fn validate(&self) -> SettingsResult<()> {
        if self.baud_rates.is_empty() {
            return Err(SettingsError::invalid("link.baud_rates", "must not be empty"));
        }
        if self.baud_rates.contains(&0) {
            return Err(SettingsError::invalid("link.baud_rates", "baud rates must be > 0"));
        }
        if self.handshake_timeout_ms == 0 {
            return Err(SettingsError::invalid("link.handshake_timeout_ms", "must be > 0"));
        }
        if self.ack_timeout_ms == 0 {
            return Err(SettingsError::invalid("link.ack_timeout_ms", "must be > 0"));
        }
        if self.temperature_interval_ms == 0 {
            return Err(SettingsError::invalid("link.temperature_interval_ms", "must be > 0"));
        }
        if !(1..=100).contains(&self.rx_buffer_usage_percent) {
            return Err(ConfigError::ValueOutOfRange {
                key: "link.rx_buffer_usage_percent".to_string(),
                value: self.rx_buffer_usage_percent.to_string(),
            }
            .into());
        }
        if self.queue_capacity < 2 {
            return Err(SettingsError::invalid("link.queue_capacity", "must be >= 2"));
        }
        if self.job_slot_reserve >= self.queue_capacity - 1 {
            return Err(SettingsError::invalid(
                "link.job_slot_reserve",
                format!(
                    "must leave room for job lines in a {}-slot queue",
                    self.queue_capacity
                ),
            ));
        }
        if self.max_extruders == 0 || self.max_extruders > MAX_SUPPORTED_EXTRUDERS {
            return Err(ConfigError::ValueOutOfRange {
                key: "link.max_extruders".to_string(),
                value: self.max_extruders.to_string(),
            }
            .into());
        }
        if let Some(bad) = self
            .cancel_commands
            .iter()
            .find(|c| c.trim().is_empty() || c.contains(['\n', '\r']))
        {
            return Err(SettingsError::invalid(
                "link.cancel_commands",
                format!("{:?} is not a single command line", bad),
            ));
        }
        Ok(())
    }
}

/// Logging preferences
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSettings {
    /// `tracing` filter directive used when `RUST_LOG` is unset
    pub filter: String,
    /// Emit JSON lines instead of human-readable output
    pub json: bool,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            filter: "info".to_string(),
            json: false,
        }
    }
}

/// Complete PrintLink configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    /// Serial link settings
    pub link: LinkSettings,
    /// Logging preferences
    pub logging: LoggingSettings,
}

impl Config {
    /// Create new config with defaults
    pub fn new() -> Self {
        Self::default()
    }

    /// Platform config file location, e.g. `~/.config/printlink/config.toml`
    pub fn default_path() -> SettingsResult<PathBuf> {
        let dir = dirs::config_dir().ok_or_else(|| {
            ConfigError::UnsupportedPlatform(std::env::consts::OS.to_string())
        })?;
        Ok(dir.join(CONFIG_DIR_NAME).join(CONFIG_FILE_NAME))
    }

    /// Load config from file (JSON or TOML)
    pub fn load_from_file(path: &Path) -> SettingsResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            SettingsError::LoadError(format!("{}: {}", path.display(), e))
        })?;

        let config: Self = match Format::of(path)? {
            Format::Json => serde_json::from_str(&content)?,
            Format::Toml => toml::from_str(&content)?,
        };

        config.validate()?;
        debug!("Loaded configuration from {}", path.display());
        Ok(config)
    }

    /// Load config from file, or defaults when the file does not exist
    pub fn load_or_default(path: &Path) -> SettingsResult<Self> {
        if path.exists() {
            Self::load_from_file(path)
        } else {
            debug!("No configuration at {}, using defaults", path.display());
            Ok(Self::default())
        }
    }

    /// Save config to file (JSON or TOML)
    pub fn save_to_file(&self, path: &Path) -> SettingsResult<()> {
        self.validate()?;

        let content = match Format::of(path)? {
            Format::Json => serde_json::to_string_pretty(self)?,
            Format::Toml => toml::to_string_pretty(self)?,
        };

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| {
                SettingsError::ConfigDirectory(format!("{}: {}", parent.display(), e))
            })?;
        }
        std::fs::write(path, content)
            .map_err(|e| SettingsError::SaveError(format!("{}: {}", path.display(), e)))?;

        Ok(())
    }

    /// Validate configuration
    pub fn validate(&self) -> SettingsResult<()> {
        self.link.validate()?;
        if self.logging.filter.trim().is_empty() {
            return Err(SettingsError::invalid("logging.filter", "must not be empty"));
        }
        Ok(())
    }

    /// Engine configuration for the link section
    pub fn link_config(&self) -> LinkConfig {
        self.link.to_link_config()
    }
}

impl From<&Config> for LinkConfig {
    fn from(config: &Config) -> Self {
        config.link_config()
    }
}

enum Format {
    Json,
    Toml,
}

impl Format {
    fn of(path: &Path) -> SettingsResult<Self> {
        match path.extension().and_then(|ext| ext.to_str()) {
            Some("json") => Ok(Self::Json),
            Some("toml") => Ok(Self::Toml),
            other => Err(ConfigError::UnsupportedFormat(
                other.unwrap_or("<none>").to_string(),
            )
            .into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        assert!(Config::default().validate().is_ok());
    }

    #[test]
    fn test_defaults_match_engine() {
        let config = Config::default().link_config();
        let engine = LinkConfig::default();
        assert_eq!(config.baud_rates, engine.baud_rates);
        assert_eq!(config.ack_timeout, engine.ack_timeout);
        assert_eq!(config.handshake_timeout, engine.handshake_timeout);
        assert_eq!(config.queue_capacity, engine.queue_capacity);
        assert_eq!(config.cancel_commands, engine.cancel_commands);
    }

    #[test]
    fn test_validation_rejects_bad_values() {
        let mut config = Config::default();
        config.link.baud_rates.clear();
        assert!(matches!(
            config.validate(),
            Err(SettingsError::InvalidSetting { .. })
        ));

        let mut config = Config::default();
        config.link.rx_buffer_usage_percent = 0;
        assert!(matches!(
            config.validate(),
            Err(SettingsError::Config(ConfigError::ValueOutOfRange { .. }))
        ));

        let mut config = Config::default();
        config.link.queue_capacity = 4;
        config.link.job_slot_reserve = 3;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.link.max_extruders = MAX_SUPPORTED_EXTRUDERS + 1;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.link.cancel_commands.push("M104 S0\nM140 S0".to_string());
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_format_by_extension() {
        assert!(matches!(Format::of(Path::new("a.json")), Ok(Format::Json)));
        assert!(matches!(Format::of(Path::new("a.toml")), Ok(Format::Toml)));
        assert!(Format::of(Path::new("a.ini")).is_err());
        assert!(Format::of(Path::new("config")).is_err());
    }
}
