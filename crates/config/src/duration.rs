//! Human-friendly duration strings used throughout the config file.

use crate::{Error, Result};

/// Parse a human-friendly duration string into milliseconds.
///
/// Supported suffixes: `ms`, `s` (seconds), `m` (minutes), `h` (hours),
/// `d` (days). Examples: `"500ms"`, `"30s"`, `"5m"`, `"2h"`, `"1d"`.
pub fn parse_duration_ms(input: &str) -> Result<u64> {
    let input = input.trim();
    if input.is_empty() {
        return Err(Error::invalid_duration(input, "empty duration string"));
    }

    let Some(split) = input.find(|c: char| c.is_alphabetic()) else {
        return Err(Error::invalid_duration(
            input,
            "missing unit suffix (ms/s/m/h/d)",
        ));
    };
    let (num_str, suffix) = input.split_at(split);

    let value: u64 = num_str
        .trim()
        .parse()
        .map_err(|_| Error::invalid_duration(input, format!("invalid number {num_str:?}")))?;

    if value == 0 {
        return Err(Error::invalid_duration(input, "duration must be > 0"));
    }

    let unit_ms: u64 = match suffix {
        "ms" => 1,
        "s" => 1_000,
        "m" => 60_000,
        "h" => 3_600_000,
        "d" => 86_400_000,
        _ => {
            return Err(Error::invalid_duration(
                input,
                format!("unknown suffix {suffix:?} (expected ms/s/m/h/d)"),
            ));
        },
    };

    value
        .checked_mul(unit_ms)
        .ok_or_else(|| Error::invalid_duration(input, "duration overflows"))
}
