//! Duration parsing and formatting for configuration values
//!
//! Accepts Go-style compound durations ("23h", "1h30m", "250ms", "1.5h") as
//! well as bare integer seconds, and renders durations back in the same form
//! for logging.

use std::time::Duration;

/// Parse a duration string such as "23h", "1h30m", "45s" or "250ms"
///
/// A bare number is interpreted as seconds. Negative values are rejected.
pub fn parse_duration(input: &str) -> Result<Duration, String> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return Err("Duration cannot be empty".to_string());
    }
    if trimmed.starts_with('-') {
        return Err(format!("Duration '{}' must not be negative", input));
    }

    // Bare seconds
    if let Ok(secs) = trimmed.parse::<u64>() {
        return Ok(Duration::from_secs(secs));
    }

    let mut total = Duration::ZERO;
    let mut rest = trimmed.strip_prefix('+').unwrap_or(trimmed);

    while !rest.is_empty() {
        let number_len = rest
            .find(|c: char| !(c.is_ascii_digit() || c == '.'))
            .ok_or_else(|| format!("Missing unit in duration '{}'", input))?;
        if number_len == 0 {
            return Err(format!("Expected a number in duration '{}'", input));
        }
        let (number, tail) = rest.split_at(number_len);
        let value = number
            .parse::<f64>()
            .map_err(|_| format!("Invalid number '{}' in duration '{}'", number, input))?;

        let unit_len = tail
            .find(|c: char| c.is_ascii_digit() || c == '.')
            .unwrap_or(tail.len());
        let (unit, next) = tail.split_at(unit_len);

        let part = unit_to_duration(unit, value)
            .map_err(|e| format!("{} in duration '{}'", e, input))?;
        total = total
            .checked_add(part)
            .ok_or_else(|| format!("Duration '{}' is out of range", input))?;
        rest = next;
    }

    Ok(total)
}

fn unit_to_duration(unit: &str, value: f64) -> Result<Duration, String> {
    let seconds_per_unit = match unit {
        "ns" => 1e-9,
        "us" | "µs" => 1e-6,
        "ms" => 1e-3,
        "s" | "sec" | "secs" => 1.0,
        "m" | "min" | "mins" => 60.0,
        "h" | "hr" | "hrs" => 3600.0,
        "d" | "day" | "days" => 86400.0,
        _ => return Err(format!("Unknown time unit '{}'", unit)),
    };
    Duration::try_from_secs_f64(value * seconds_per_unit)
        .map_err(|_| format!("Value {} out of range for unit '{}'", value, unit))
}

/// Render a duration in compound form, e.g. `1h30m`, `45s`, `250ms`
pub fn format_duration(duration: Duration) -> String {
    if duration.is_zero() {
        return "0s".to_string();
    }
    if duration < Duration::from_secs(1) {
        return format!("{}ms", duration.as_millis());
    }

    let total_secs = duration.as_secs();
    let hours = total_secs / 3600;
    let minutes = (total_secs % 3600) / 60;
    let seconds = total_secs % 60;

    let mut out = String::new();
    if hours > 0 {
        out.push_str(&format!("{}h", hours));
    }
    if minutes > 0 {
        out.push_str(&format!("{}m", minutes));
    }
    if seconds > 0 {
        out.push_str(&format!("{}s", seconds));
    }
    out
}
