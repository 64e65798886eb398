use printlink_settings::{Config, ConfigError, SettingsError};
use std::time::Duration;
use tempfile::TempDir;

#[test]
fn test_toml_save_and_load() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("printlink").join("config.toml");

    let mut config = Config::default();
    config.link.port = Some("/dev/ttyUSB0".to_string());
    config.link.baud_rates = vec![250000, 115200];
    config.link.rx_buffer_size = 128;
    config.save_to_file(&path).unwrap();

    let loaded = Config::load_from_file(&path).unwrap();
    assert_eq!(loaded, config);
}

#[test]
fn test_json_save_and_load() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("config.json");

    let mut config = Config::default();
    config.link.cancel_commands = vec!["M104 S0".to_string(), "M84".to_string()];
    config.logging.json = true;
    config.save_to_file(&path).unwrap();

    let loaded = Config::load_from_file(&path).unwrap();
    assert_eq!(loaded.link.cancel_commands, vec!["M104 S0", "M84"]);
    assert!(loaded.logging.json);
}

#[test]
fn test_partial_file_uses_defaults() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("config.toml");
    std::fs::write(
        &path,
        "[link]\nport = \"/dev/ttyACM0\"\nack_timeout_ms = 4000\nrx_buffer_size = 64\n",
    )
    .unwrap();

    let config = Config::load_from_file(&path).unwrap();
    assert_eq!(config.link.port.as_deref(), Some("/dev/ttyACM0"));
    assert_eq!(config.link.baud_rates, vec![115200, 250000, 57600]);
    assert_eq!(config.logging.filter, "info");

    let link = config.link_config();
    assert_eq!(link.ack_timeout, Duration::from_millis(4000));
    assert_eq!(link.rx_buffer_size, 64);
    assert_eq!(link.handshake_timeout, Duration::from_secs(3));
}

#[test]
fn test_invalid_file_is_rejected() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("config.toml");
    std::fs::write(&path, "[link]\nrx_buffer_usage_percent = 150\n").unwrap();

    assert!(matches!(
        Config::load_from_file(&path),
        Err(SettingsError::Config(ConfigError::ValueOutOfRange { .. }))
    ));

    std::fs::write(&path, "[link\nport = ").unwrap();
    assert!(matches!(
        Config::load_from_file(&path),
        Err(SettingsError::TomlError(_))
    ));
}

#[test]
fn test_unsupported_extension() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("config.yaml");
    assert!(matches!(
        Config::default().save_to_file(&path),
        Err(SettingsError::Config(ConfigError::UnsupportedFormat(_)))
    ));
    assert!(!path.exists());
}

#[test]
fn test_load_or_default() {
    let dir = TempDir::new().unwrap();
    let missing = dir.path().join("missing.toml");
    assert_eq!(Config::load_or_default(&missing).unwrap(), Config::default());

    let unreadable = dir.path().join("missing.json");
    assert!(matches!(
        Config::load_from_file(&unreadable),
        Err(SettingsError::LoadError(_))
    ));
}

#[test]
fn test_default_path_location() {
    if let Ok(path) = Config::default_path() {
        assert!(path.ends_with("printlink/config.toml"));
    }
}
