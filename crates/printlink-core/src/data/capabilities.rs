//! Controller capabilities
//!
//! Filled in once from the capability report (`M115`) answered during the
//! handshake and left untouched until the next reconnect.

use serde::{Deserialize, Serialize};

/// Upper bound on extruders tracked per controller
pub const MAX_SUPPORTED_EXTRUDERS: usize = 6;

/// What the controller told us about itself
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Capabilities {
    /// Reported `MACHINE_TYPE`, "Unknown" when absent
    pub machine_type: String,
    /// Reported `FIRMWARE_NAME`
    pub firmware_name: Option<String>,
    /// Number of extruders, clamped to `1..=MAX_SUPPORTED_EXTRUDERS`
    pub extruder_count: u8,
    /// Controller can push temperatures on its own (`M155`)
    pub autoreport_temp: bool,
    /// Controller accepts progress announcements (`M530`/`M531`)
    pub progress: bool,
    /// Controller accepts build percentage (`M73`)
    pub build_percent: bool,
}

impl Capabilities {
    /// Clamp and store an extruder count
    pub fn set_extruder_count(&mut self, count: i64, max_extruders: usize) {
        let max = max_extruders.clamp(1, MAX_SUPPORTED_EXTRUDERS) as i64;
        self.extruder_count = count.clamp(1, max) as u8;
    }
}

impl Default for Capabilities {
    fn default() -> Self {
        Self {
            machine_type: "Unknown".to_string(),
            firmware_name: None,
            extruder_count: 1,
            autoreport_temp: false,
            progress: false,
            build_percent: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let caps = Capabilities::default();
        assert_eq!(caps.machine_type, "Unknown");
        assert_eq!(caps.extruder_count, 1);
        assert!(!caps.autoreport_temp && !caps.progress && !caps.build_percent);
    }

    #[test]
    fn test_extruder_clamp() {
        let mut caps = Capabilities::default();
        caps.set_extruder_count(12, MAX_SUPPORTED_EXTRUDERS);
        assert_eq!(caps.extruder_count, 6);
        caps.set_extruder_count(0, MAX_SUPPORTED_EXTRUDERS);
        assert_eq!(caps.extruder_count, 1);
        caps.set_extruder_count(4, 2);
        assert_eq!(caps.extruder_count, 2);
    }
}
