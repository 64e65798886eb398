//! Marlin command builders used by the link engine

/// Capability query
pub const CAPABILITY_QUERY: &str = "M115";

/// Temperature query
pub const TEMPERATURE_QUERY: &str = "M105";

/// Display message shown when a print starts
pub const PRINT_START_MESSAGE: &str = "M117 Printing...";

/// Prefix of the temperature auto-report command
pub const AUTOREPORT_PREFIX: &str = "M155";

/// Enable temperature auto-report every `interval_secs` seconds (0 disables)
pub fn autoreport_temperature(interval_secs: u64) -> String {
    format!("{} S{}", AUTOREPORT_PREFIX, interval_secs)
}

/// Interval requested by an `M155 S<n>` command, if `line` is one
pub fn parse_autoreport_interval(line: &str) -> Option<u64> {
    let rest = line.trim().strip_prefix(AUTOREPORT_PREFIX)?;
    rest.split_whitespace()
        .find_map(|word| word.strip_prefix('S'))
        .and_then(|value| value.parse().ok())
}

/// Announce that a print from the host has started (`M530 S1 L0`)
pub fn progress_start() -> String {
    "M530 S1 L0".to_string()
}

/// Announce that the host print has stopped
pub fn progress_stop() -> String {
    "M530 S0".to_string()
}

/// Tell the controller the name of the job (`M531`)
pub fn progress_filename(name: &str) -> String {
    format!("M531 {}", name)
}

/// Report build progress in percent (`M73`)
pub fn build_percent(percent: u8) -> String {
    format!("M73 P{}", percent.min(100))
}

/// Default controller reset sequence sent when a print is cancelled
///
/// Breaks out of heating waits, switches heaters and the part fan off, and
/// releases the steppers.
pub fn default_cancel_sequence() -> Vec<String> {
    ["M108", "M104 S0", "M140 S0", "M107", "M84"]
        .iter()
        .map(|cmd| cmd.to_string())
        .collect()
}
