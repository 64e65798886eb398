//! Field extraction from Marlin replies
//!
//! Capability reports (`M115`) and temperature reports (`M105`) are loosely
//! structured `KEY:value` text. These helpers pull single values out of
//! them with strict numeric parsing: a value is a number only if the whole
//! substring converts.

use printlink_core::{Capabilities, ReplyError};

/// Parse a float only if the whole string converts
pub fn strict_float(value: &str) -> Option<f32> {
    if value.is_empty() {
        return None;
    }
    value.parse::<f32>().ok()
}

/// Extract the value of `field` from a capability report
///
/// The value starts right after `field:` and runs to the end of the text,
/// or, when another `:`-introduced field or a line break follows, up to the
/// space or line break in front of it. Multi-line reports and values glued
/// to a trailing `ok` are handled, e.g. `MACHINE_TYPE:bar EXTRUDER_COUNT:1ok`
/// yields `bar` for `MACHINE_TYPE` and `1ok` for `EXTRUDER_COUNT`.
pub fn extract_field<'a>(response: &'a str, field: &str) -> Option<&'a str> {
    let key = format!("{}:", field);
    let start = response.find(&key)? + key.len();
    let rest = &response[start..];

    let end = match rest.find(':').or_else(|| rest.find('\n')) {
        None => rest.len(),
        Some(mut end) => {
            let bytes = rest.as_bytes();
            while end > 0 && bytes[end] != b' ' && bytes[end] != b'\n' {
                end -= 1;
            }
            end
        }
    };

    let value = &rest[..end];
    if value.is_empty() {
        None
    } else {
        Some(value)
    }
}

/// A capability flag is set when its value begins with `1`
pub fn extract_flag(response: &str, field: &str) -> bool {
    extract_field(response, field).is_some_and(|value| value.starts_with('1'))
}

/// Build capabilities from an accumulated `M115` transcript
///
/// Absent fields keep their defaults.
pub fn parse_capabilities(transcript: &str, max_extruders: usize) -> Capabilities {
    let mut caps = Capabilities::default();

    if let Some(machine_type) = extract_field(transcript, "MACHINE_TYPE") {
        caps.machine_type = machine_type.trim().to_string();
    }
    if let Some(name) = extract_field(transcript, "FIRMWARE_NAME") {
        caps.firmware_name = Some(name.trim().to_string());
    }
    if let Some(count) = extract_field(transcript, "EXTRUDER_COUNT") {
        let digits: String = count.chars().take_while(|c| c.is_ascii_digit()).collect();
        if let Ok(count) = digits.parse::<i64>() {
            caps.set_extruder_count(count, max_extruders);
        }
    }
    caps.autoreport_temp = extract_flag(transcript, "Cap:AUTOREPORT_TEMP");
    caps.progress = extract_flag(transcript, "Cap:PROGRESS");
    caps.build_percent = extract_flag(transcript, "Cap:BUILD_PERCENT");
    caps
}

/// Byte offset just past `marker:`, where the marker starts a word
///
/// `COUNT:` does not match marker `T`, `B@:` does not match marker `B`.
fn find_marker(line: &str, marker: &str) -> Option<usize> {
    let key = format!("{}:", marker);
    line.match_indices(&key).find_map(|(index, _)| {
        let at_word_start = line[..index]
            .chars()
            .next_back()
            .is_none_or(char::is_whitespace);
        at_word_start.then_some(index + key.len())
    })
}

fn next_token(text: &str) -> &str {
    text.split(' ').next().unwrap_or_default()
}

/// Parse a `<marker>:<actual> /<target>` heater reading
///
/// Returns `MissingField` when the marker or its `/target` part is absent
/// and `MalformedReply` when either number fails strict parsing.
pub fn parse_temp(line: &str, marker: &str) -> Result<(f32, f32), ReplyError> {
    let start = find_marker(line, marker)
        .ok_or_else(|| ReplyError::MissingField(marker.to_string()))?;
    let rest = &line[start..];
    let actual_text = next_token(rest);
    let target_text = rest[actual_text.len()..]
        .strip_prefix(" /")
        .map(next_token)
        .ok_or_else(|| ReplyError::MissingField(format!("{} target", marker)))?;

    let malformed = |value: &str| ReplyError::MalformedReply {
        field: marker.to_string(),
        value: value.to_string(),
    };
    let actual = strict_float(actual_text).ok_or_else(|| malformed(actual_text))?;
    let target = strict_float(target_text).ok_or_else(|| malformed(target_text))?;
    Ok((actual, target))
}

/// Parse a heating-phase `<marker>:<value>` reading without a target
///
/// While waiting for a heater some firmware reports `T:32.8 E:0 B:31.8`,
/// where `E` names the active extruder.
pub fn parse_heating_temp(line: &str, marker: &str) -> Result<f32, ReplyError> {
    let start = find_marker(line, marker)
        .ok_or_else(|| ReplyError::MissingField(marker.to_string()))?;
    let value = next_token(&line[start..]);
    strict_float(value).ok_or_else(|| ReplyError::MalformedReply {
        field: marker.to_string(),
        value: value.to_string(),
    })
}

/// A position report carries `X:`, `Y:`, `Z:` and `E:` together
pub fn is_position_report(line: &str) -> bool {
    ["X:", "Y:", "Z:", "E:"].iter().all(|axis| line.contains(axis))
}
