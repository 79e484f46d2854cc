// src/config/duration.rs

//! Delay values such as `requeue_delay = "250ms"`.

use std::time::Duration;

/// Milliseconds per accepted unit suffix.
const UNITS: &[(&str, u64)] = &[("ms", 1), ("s", 1_000), ("m", 60_000), ("h", 3_600_000)];

/// Parse `<digits><unit>` where unit is one of `ms`, `s`, `m`, `h`.
///
/// A bare `"0"` is accepted as no delay. Values that do not fit in a
/// millisecond count are rejected rather than wrapped.
pub fn parse_duration(text: &str) -> Result<Duration, String> {
    let text = text.trim();
    if text.is_empty() {
        return Err("empty duration string".to_string());
    }
    if text == "0" {
        return Ok(Duration::ZERO);
    }

    let split = text
        .find(|c: char| !c.is_ascii_digit())
        .ok_or_else(|| format!("duration '{text}' is missing a unit (ms, s, m or h)"))?;
    let (digits, unit) = text.split_at(split);
    if digits.is_empty() {
        return Err(format!("duration '{text}' does not start with a number"));
    }

    let unit = unit.trim().to_ascii_lowercase();
    let per_unit = UNITS
        .iter()
        .find(|(name, _)| *name == unit)
        .map(|(_, millis)| *millis)
        .ok_or_else(|| format!("unsupported duration unit '{unit}'; expected ms, s, m or h"))?;

    let out_of_range = || format!("duration '{text}' is out of range");
    let count: u64 = digits.parse().map_err(|_| out_of_range())?;
    let millis = count.checked_mul(per_unit).ok_or_else(out_of_range)?;
    Ok(Duration::from_millis(millis))
}
