//! Heater temperature tracking
//!
//! One reading per extruder slot plus one for the bed. Each heater is
//! updated independently by whichever reply last mentioned it; values are
//! never cleared, so a stale reading persists until overwritten.

use super::capabilities::MAX_SUPPORTED_EXTRUDERS;
use serde::{Deserialize, Serialize};
use std::fmt;

/// A heater addressed by a temperature report
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Heater {
    /// Extruder by zero-based index
    Tool(u8),
    /// Heated bed
    Bed,
}

impl fmt::Display for Heater {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Heater::Tool(index) => write!(f, "T{}", index),
            Heater::Bed => write!(f, "B"),
        }
    }
}

/// Actual and target temperature of one heater, in degrees Celsius
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct TemperatureReading {
    /// Last reported actual temperature
    pub actual: Option<f32>,
    /// Last reported target temperature
    pub target: Option<f32>,
}

impl fmt::Display for TemperatureReading {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.actual {
            Some(actual) => write!(f, "{:.1}", actual)?,
            None => write!(f, "-")?,
        }
        match self.target {
            Some(target) => write!(f, "/{:.1}", target),
            None => write!(f, "/-"),
        }
    }
}

/// Temperatures of every tracked heater
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Temperatures {
    tools: [TemperatureReading; MAX_SUPPORTED_EXTRUDERS],
    bed: TemperatureReading,
}

impl Temperatures {
    /// Create an empty set of readings
    pub fn new() -> Self {
        Self {
            tools: [TemperatureReading::default(); MAX_SUPPORTED_EXTRUDERS],
            bed: TemperatureReading::default(),
        }
    }

    /// Record a reading. A `None` target leaves the previous target in place.
    ///
    /// Returns false when the heater index is out of range.
    pub fn update(&mut self, heater: Heater, actual: f32, target: Option<f32>) -> bool {
        let reading = match heater {
            Heater::Tool(index) => match self.tools.get_mut(index as usize) {
                Some(reading) => reading,
                None => return false,
            },
            Heater::Bed => &mut self.bed,
        };
        reading.actual = Some(actual);
        if target.is_some() {
            reading.target = target;
        }
        true
    }

    /// Reading of one heater
    pub fn get(&self, heater: Heater) -> Option<&TemperatureReading> {
        match heater {
            Heater::Tool(index) => self.tools.get(index as usize),
            Heater::Bed => Some(&self.bed),
        }
    }

    /// Reading of an extruder
    pub fn tool(&self, index: usize) -> Option<&TemperatureReading> {
        self.tools.get(index)
    }

    /// Reading of the bed
    pub fn bed(&self) -> &TemperatureReading {
        &self.bed
    }

    /// The first `count` extruder readings
    pub fn tools(&self, count: usize) -> &[TemperatureReading] {
        &self.tools[..count.min(MAX_SUPPORTED_EXTRUDERS)]
    }
}

impl Default for Temperatures {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_update_keeps_target_when_absent() {
        let mut temps = Temperatures::new();
        assert!(temps.update(Heater::Tool(0), 20.0, Some(210.0)));
        assert!(temps.update(Heater::Tool(0), 25.5, None));
        let reading = temps.tool(0).unwrap();
        assert_eq!(reading.actual, Some(25.5));
        assert_eq!(reading.target, Some(210.0));
    }

    #[test]
    fn test_heaters_are_independent() {
        let mut temps = Temperatures::new();
        temps.update(Heater::Bed, 60.0, Some(60.0));
        assert_eq!(temps.bed().actual, Some(60.0));
        assert_eq!(temps.tool(0).unwrap().actual, None);
        assert!(!temps.update(Heater::Tool(9), 1.0, None));
        assert_eq!(temps.tools(2).len(), 2);
    }

    #[test]
    fn test_reading_display() {
        let reading = TemperatureReading {
            actual: Some(204.56),
            target: Some(205.0),
        };
        assert_eq!(reading.to_string(), "204.6/205.0");
        assert_eq!(TemperatureReading::default().to_string(), "-/-");
    }
}
