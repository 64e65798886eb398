//! Marlin Response Classifier
//!
//! Turns one reply line into a [`Reply`]. Matchers run in a fixed order and
//! the first one that recognises the line wins:
//!
//! 1. capability report
//! 2. temperature report (full or heating-phase)
//! 3. position report
//! 4. acknowledgment
//! 5. error
//! 6. busy keep-alive, resend request
//! 7. anything else is unclassified
//!
//! Temperature and position replies to a query carry the acknowledgment on
//! the same line (`ok T:...`), so those variants record whether they also ack.

use super::fields::{is_position_report, parse_heating_temp, parse_temp};
use printlink_core::{Heater, ReplyError};
use std::fmt;
use tracing::warn;

const CAPABILITY_MARKERS: [&str; 3] = ["MACHINE_TYPE:", "EXTRUDER_COUNT:", "FIRMWARE_NAME:"];

/// One heater value taken from a temperature report
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HeaterReading {
    /// Which heater
    pub heater: Heater,
    /// Measured temperature
    pub actual: f32,
    /// Set point, absent in heating-phase reports
    pub target: Option<f32>,
}

/// Classified controller reply
#[derive(Debug, Clone, PartialEq)]
pub enum Reply {
    /// Part of an `M115` capability report
    Capability {
        /// The report line ends with a glued `ok`
        ack: bool,
    },
    /// Heater readings
    Temperature {
        /// Every heater that parsed
        readings: Vec<HeaterReading>,
        /// The line starts with `ok`
        ack: bool,
    },
    /// Axis positions (`X:`, `Y:`, `Z:`, `E:`)
    Position {
        /// The line starts with `ok`
        ack: bool,
    },
    /// Plain acknowledgment
    Ack,
    /// Controller error, with the message after the `Error:` prefix
    Error(String),
    /// Controller is busy but alive
    Busy,
    /// Controller asks for a line to be resent
    Resend(String),
    /// Nothing recognised
    Unclassified(String),
}

impl Reply {
    /// Whether this reply acknowledges the oldest outstanding command
    pub fn is_ack(&self) -> bool {
        match self {
            Reply::Ack => true,
            Reply::Capability { ack } | Reply::Position { ack } => *ack,
            Reply::Temperature { ack, .. } => *ack,
            _ => false,
        }
    }
}

impl fmt::Display for Reply {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Capability { .. } => write!(f, "capability"),
            Self::Temperature { readings, .. } => write!(f, "temperature:{}", readings.len()),
            Self::Position { .. } => write!(f, "position"),
            Self::Ack => write!(f, "ok"),
            Self::Error(msg) => write!(f, "error:{}", msg),
            Self::Busy => write!(f, "busy"),
            Self::Resend(msg) => write!(f, "resend:{}", msg),
            Self::Unclassified(line) => write!(f, "unclassified:{}", line),
        }
    }
}

/// Marlin reply classifier
///
/// Knows how many extruders the controller has so it can pick the right
/// heater markers (`T` for one, `T0`..`Tn` for several).
#[derive(Debug, Clone)]
pub struct ResponseClassifier {
    extruder_count: u8,
}

impl ResponseClassifier {
    /// Create a classifier for a controller with the given extruder count
    pub fn new(extruder_count: u8) -> Self {
        Self {
            extruder_count: extruder_count.max(1),
        }
    }

    pub fn extruder_count(&self) -> u8 {
        self.extruder_count
    }

    pub fn set_extruder_count(&mut self, extruder_count: u8) {
        self.extruder_count = extruder_count.max(1);
    }

    /// Classify one reply line
    pub fn classify(&self, line: &str) -> Reply {
        let line = line.trim();

        if is_capability_report(line) {
            return Reply::Capability {
                ack: ends_with_glued_ok(line),
            };
        }

        let readings = self.temperature_readings(line);
        if !readings.is_empty() {
            return Reply::Temperature {
                readings,
                ack: line.starts_with("ok"),
            };
        }

        if is_position_report(line) {
            return Reply::Position {
                ack: line.starts_with("ok"),
            };
        }

        if line.starts_with("ok") {
            return Reply::Ack;
        }

        if line.starts_with("Error") || line.starts_with("error") {
            let message = line
                .split_once(':')
                .map(|(_, msg)| msg.trim())
                .filter(|msg| !msg.is_empty())
                .unwrap_or(line);
            return Reply::Error(message.to_string());
        }

        if line.starts_with("echo:busy") || line.starts_with("busy:") {
            return Reply::Busy;
        }

        if let Some(rest) = line.strip_prefix("Resend:") {
            return Reply::Resend(rest.trim().to_string());
        }

        Reply::Unclassified(line.to_string())
    }

    fn tool_markers(&self) -> Vec<(String, Heater)> {
        if self.extruder_count <= 1 {
            vec![("T".to_string(), Heater::Tool(0))]
        } else {
            (0..self.extruder_count)
                .map(|index| (format!("T{}", index), Heater::Tool(index)))
                .collect()
        }
    }

    fn temperature_readings(&self, line: &str) -> Vec<HeaterReading> {
        let mut readings = Vec::new();
        let mut malformed = false;

        let mut markers = self.tool_markers();
        markers.push(("B".to_string(), Heater::Bed));

        for (marker, heater) in &markers {
            match parse_temp(line, marker) {
                Ok((actual, target)) => readings.push(HeaterReading {
                    heater: *heater,
                    actual,
                    target: Some(target),
                }),
                Err(err @ ReplyError::MalformedReply { .. }) => {
                    warn!("Dropping heater reading in {:?}: {}", line, err);
                    malformed = true;
                }
                Err(ReplyError::MissingField(_)) => {}
            }
        }

        if readings.is_empty() && !malformed {
            readings = heating_readings(line);
        }
        readings
    }
}

impl Default for ResponseClassifier {
    fn default() -> Self {
        Self::new(1)
    }
}

fn is_capability_report(line: &str) -> bool {
    line.starts_with("Cap:") || CAPABILITY_MARKERS.iter().any(|marker| line.contains(marker))
}

/// Some firmware glues the closing `ok` onto the last numeric field
fn ends_with_glued_ok(line: &str) -> bool {
    line.strip_suffix("ok")
        .is_some_and(|head| head.ends_with(|c: char| c.is_ascii_digit()))
}

/// Actual-only readings of the heating-phase report `T:32.8 E:0 B:31.8`
fn heating_readings(line: &str) -> Vec<HeaterReading> {
    let mut readings = Vec::new();

    if let Ok(actual) = parse_heating_temp(line, "T") {
        let extruder = parse_heating_temp(line, "E")
            .ok()
            .filter(|index| *index >= 0.0)
            .map(|index| index as u8)
            .unwrap_or(0);
        readings.push(HeaterReading {
            heater: Heater::Tool(extruder),
            actual,
            target: None,
        });
    }
    if let Ok(actual) = parse_heating_temp(line, "B") {
        readings.push(HeaterReading {
            heater: Heater::Bed,
            actual,
            target: None,
        });
    }
    readings
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_ack() {
        let classifier = ResponseClassifier::default();
        assert_eq!(classifier.classify("ok"), Reply::Ack);
        assert_eq!(classifier.classify("ok N10"), Reply::Ack);
        assert!(classifier.classify("ok").is_ack());
    }

    #[test]
    fn test_classify_temperature() {
        let classifier = ResponseClassifier::default();
        let reply = classifier.classify("ok T:32.8 /60.0 B:31.8 /30.0 T0:32.8 /0.0 @:0 B@:0");
        assert_eq!(
            reply,
            Reply::Temperature {
                readings: vec![
                    HeaterReading {
                        heater: Heater::Tool(0),
                        actual: 32.8,
                        target: Some(60.0)
                    },
                    HeaterReading {
                        heater: Heater::Bed,
                        actual: 31.8,
                        target: Some(30.0)
                    },
                ],
                ack: true
            }
        );
        assert!(reply.is_ack());
    }

    #[test]
    fn test_classify_autoreport_is_not_ack() {
        let classifier = ResponseClassifier::default();
        let reply = classifier.classify(" T:200.1 /200.0 B:60.0 /60.0 @:64 B@:0");
        assert!(matches!(reply, Reply::Temperature { ack: false, .. }));
        assert!(!reply.is_ack());
    }

    #[test]
    fn test_classify_multi_extruder() {
        let classifier = ResponseClassifier::new(2);
        let reply =
            classifier.classify("ok T:200.0 /200.0 B:60.0 /60.0 T0:200.0 /200.0 T1:25.0 /0.0 @:0");
        match reply {
            Reply::Temperature { readings, .. } => {
                let heaters: Vec<Heater> = readings.iter().map(|r| r.heater).collect();
                assert_eq!(heaters, vec![Heater::Tool(0), Heater::Tool(1), Heater::Bed]);
                assert_eq!(readings[1].actual, 25.0);
            }
            other => panic!("unexpected reply {:?}", other),
        }
    }

    #[test]
    fn test_classify_heating() {
        let classifier = ResponseClassifier::new(2);
        let reply = classifier.classify("T:32.8 E:1 B:31.8");
        assert_eq!(
            reply,
            Reply::Temperature {
                readings: vec![
                    HeaterReading {
                        heater: Heater::Tool(1),
                        actual: 32.8,
                        target: None
                    },
                    HeaterReading {
                        heater: Heater::Bed,
                        actual: 31.8,
                        target: None
                    },
                ],
                ack: false
            }
        );
    }

    #[test]
    fn test_classify_malformed_heater_dropped() {
        let classifier = ResponseClassifier::default();
        match classifier.classify("ok T:nan? /60.0 B:31.8 /30.0") {
            Reply::Temperature { readings, ack } => {
                assert!(ack);
                assert_eq!(readings.len(), 1);
                assert_eq!(readings[0].heater, Heater::Bed);
            }
            other => panic!("unexpected reply {:?}", other),
        }
    }

    #[test]
    fn test_classify_capability() {
        let classifier = ResponseClassifier::default();
        assert_eq!(
            classifier.classify("FIRMWARE_NAME:Marlin MACHINE_TYPE:Prusa EXTRUDER_COUNT:1"),
            Reply::Capability { ack: false }
        );
        assert_eq!(
            classifier.classify("Cap:AUTOREPORT_TEMP:1"),
            Reply::Capability { ack: false }
        );
        assert!(classifier.classify("MACHINE_TYPE:bar EXTRUDER_COUNT:1ok").is_ack());
    }

    #[test]
    fn test_classify_position() {
        let classifier = ResponseClassifier::default();
        assert_eq!(
            classifier.classify("X:10.00 Y:20.00 Z:0.30 E:1.20 Count X:800 Y:1600 Z:120"),
            Reply::Position { ack: false }
        );
    }

    #[test]
    fn test_classify_error() {
        let classifier = ResponseClassifier::default();
        assert_eq!(
            classifier.classify("Error:Printer halted. kill() called!"),
            Reply::Error("Printer halted. kill() called!".to_string())
        );
        assert_eq!(
            classifier.classify("error"),
            Reply::Error("error".to_string())
        );
    }

    #[test]
    fn test_classify_busy_and_resend() {
        let classifier = ResponseClassifier::default();
        assert_eq!(classifier.classify("echo:busy: processing"), Reply::Busy);
        assert_eq!(classifier.classify("busy: paused for user"), Reply::Busy);
        assert_eq!(classifier.classify("Resend: 42"), Reply::Resend("42".to_string()));
        assert!(!classifier.classify("Resend: 42").is_ack());
    }

    #[test]
    fn test_classify_unclassified() {
        let classifier = ResponseClassifier::default();
        assert_eq!(
            classifier.classify("echo:SD card ok"),
            Reply::Unclassified("echo:SD card ok".to_string())
        );
        assert_eq!(classifier.classify("start"), Reply::Unclassified("start".to_string()));
    }
}
