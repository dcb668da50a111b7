//! Parses and formats the sizes and durations used in the config and the statistics.
use std::fmt::Write;
use std::time::Duration;

use anyhow::Context;

const SIZE_UNITS: [&str; 5] = ["KiB", "MiB", "GiB", "TiB", "PiB"];

/// Formats a size in bytes using the largest binary unit which fits.
///
/// # Examples
///
/// ```
/// assert_eq!(ringcache::fmt::format_size(0), "0 bytes");
/// assert_eq!(ringcache::fmt::format_size(1), "1 byte");
/// assert_eq!(ringcache::fmt::format_size(1023), "1023 bytes");
/// assert_eq!(ringcache::fmt::format_size(8_734), "8.53 KiB");
/// assert_eq!(ringcache::fmt::format_size(87_340), "85.3 KiB");
/// assert_eq!(ringcache::fmt::format_size(873_400), "853 KiB");
/// assert_eq!(ringcache::fmt::format_size(64 * 1024 * 1024), "64.0 MiB");
/// assert_eq!(ringcache::fmt::format_size(8_734_000_000), "8.13 GiB");
/// ```
pub fn format_size(size_in_bytes: usize) -> String {
    match size_in_bytes {
        1 => return "1 byte".to_owned(),
        n if n < 1024 => return format!("{} bytes", n),
        _ => (),
    }

    let mut size = size_in_bytes as f64 / 1024.;
    let mut unit = 0;
    while size >= 1024. && unit < SIZE_UNITS.len() - 1 {
        size /= 1024.;
        unit += 1;
    }

    let precision = match size {
        s if s < 10. => 2,
        s if s < 100. => 1,
        _ => 0,
    };

    format!("{:.*} {}", precision, size, SIZE_UNITS[unit])
}

/// Parses a size like "64m" into a number of bytes.
///
/// The number can be followed by one of the (case insensitive) suffixes **b**, **k**, **m**,
/// **g** or **t** which use binary multiples (1k = 1024).
///
/// # Examples
///
/// ```
/// assert_eq!(ringcache::fmt::parse_size("100").unwrap(), 100);
/// assert_eq!(ringcache::fmt::parse_size("100b").unwrap(), 100);
/// assert_eq!(ringcache::fmt::parse_size("8k").unwrap(), 8192);
/// assert_eq!(ringcache::fmt::parse_size("64 M").unwrap(), 64 * 1024 * 1024);
/// assert_eq!(ringcache::fmt::parse_size("0").unwrap(), 0);
///
/// assert_eq!(ringcache::fmt::parse_size("3 Y").is_err(), true);
/// assert_eq!(ringcache::fmt::parse_size("1.2g").is_err(), true);
/// assert_eq!(ringcache::fmt::parse_size("-1").is_err(), true);
/// ```
pub fn parse_size(value: impl AsRef<str>) -> anyhow::Result<usize> {
    lazy_static::lazy_static! {
        static ref SIZE: regex::Regex =
            regex::Regex::new(r"^\s*(\d+)\s*([bBkKmMgGtT]?)\s*$").unwrap();
    }

    let value = value.as_ref();
    let captures = SIZE.captures(value).ok_or_else(|| {
        anyhow::anyhow!(
            "Cannot parse '{}' as size. Expected a positive number and an optional unit (b, k, m, g, t).",
            value
        )
    })?;

    let number = captures[1]
        .parse::<usize>()
        .with_context(|| format!("Size '{}' is out of range", value))?;
    let shift = match captures[2].to_ascii_lowercase().as_str() {
        "k" => 10,
        "m" => 20,
        "g" => 30,
        "t" => 40,
        _ => 0,
    };

    number
        .checked_mul(1usize << shift)
        .ok_or_else(|| anyhow::anyhow!("Size '{}' is out of range", value))
}

/// Parses a duration like "5s" or "250ms".
///
/// Supported suffixes are **ms**, **s**, **m**, **h** and **d** (case insensitive). A plain number
/// is treated as milliseconds.
///
/// # Examples
///
/// ```
/// # use std::time::Duration;
/// assert_eq!(ringcache::fmt::parse_duration("250").unwrap(), Duration::from_millis(250));
/// assert_eq!(ringcache::fmt::parse_duration("250 ms").unwrap(), Duration::from_millis(250));
/// assert_eq!(ringcache::fmt::parse_duration("5s").unwrap(), Duration::from_secs(5));
/// assert_eq!(ringcache::fmt::parse_duration("2 M").unwrap(), Duration::from_secs(120));
/// assert_eq!(ringcache::fmt::parse_duration("1h").unwrap(), Duration::from_secs(3600));
/// assert_eq!(ringcache::fmt::parse_duration("1d").unwrap(), Duration::from_secs(86400));
///
/// assert_eq!(ringcache::fmt::parse_duration("3 y").is_err(), true);
/// assert_eq!(ringcache::fmt::parse_duration("1.5s").is_err(), true);
/// ```
pub fn parse_duration(value: impl AsRef<str>) -> anyhow::Result<Duration> {
    lazy_static::lazy_static! {
        static ref DURATION: regex::Regex =
            regex::Regex::new(r"(?i)^\s*(\d+)\s*(ms|s|m|h|d)?\s*$").unwrap();
    }

    let value = value.as_ref();
    let captures = DURATION.captures(value).ok_or_else(|| {
        anyhow::anyhow!(
            "Cannot parse '{}' as duration. Expected a positive number and an optional unit (ms, s, m, h, d).",
            value
        )
    })?;

    let number = captures[1]
        .parse::<u64>()
        .with_context(|| format!("Duration '{}' is out of range", value))?;
    let unit = captures
        .get(2)
        .map(|unit| unit.as_str().to_ascii_lowercase())
        .unwrap_or_default();
    let seconds_per_unit = match unit.as_str() {
        "s" => 1,
        "m" => 60,
        "h" => 60 * 60,
        "d" => 24 * 60 * 60,
        _ => return Ok(Duration::from_millis(number)),
    };

    number
        .checked_mul(seconds_per_unit)
        .map(Duration::from_secs)
        .ok_or_else(|| anyhow::anyhow!("Duration '{}' is out of range", value))
}

/// Formats a duration like "1h 2m 5s".
///
/// Components which are zero are omitted. A zero duration is rendered as "0ms".
///
/// # Examples
///
/// ```
/// # use std::time::Duration;
/// assert_eq!(ringcache::fmt::format_duration(Duration::from_millis(0)), "0ms");
/// assert_eq!(ringcache::fmt::format_duration(Duration::from_millis(1013)), "1s 13ms");
/// assert_eq!(ringcache::fmt::format_duration(Duration::from_secs(3600 + 60 * 2 + 5)), "1h 2m 5s");
/// assert_eq!(ringcache::fmt::format_duration(Duration::from_secs(86400 + 59)), "1d 59s");
/// ```
pub fn format_duration(duration: Duration) -> String {
    const UNITS: [(u128, &str); 5] = [
        (24 * 60 * 60 * 1000, "d"),
        (60 * 60 * 1000, "h"),
        (60 * 1000, "m"),
        (1000, "s"),
        (1, "ms"),
    ];

    let mut remaining = duration.as_millis();
    let mut result = String::new();
    for (millis_per_unit, suffix) in UNITS {
        let amount = remaining / millis_per_unit;
        if amount > 0 {
            if !result.is_empty() {
                result.push(' ');
            }
            let _ = write!(result, "{}{}", amount, suffix);
            remaining %= millis_per_unit;
        }
    }

    if result.is_empty() {
        result.push_str("0ms");
    }

    result
}
