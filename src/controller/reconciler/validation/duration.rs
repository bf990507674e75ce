//! # Duration Validation
//!
//! Parses Kubernetes-style duration strings such as `30s`, `5m`, `1h30m`.

use anyhow::Result;
use regex::Regex;
use std::sync::LazyLock;
use std::time::Duration;

static WHOLE: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"^(\d+[smhd])+$").ok());

static SEGMENT: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"(?P<number>\d+)(?P<unit>[smhd])").ok());

/// Parse a duration made of one or more `<number><unit>` segments
/// (units `s`, `m`, `h`, `d`, case-insensitive). Zero durations are rejected.
pub fn parse_kubernetes_duration(duration_str: &str) -> Result<Duration> {
    let trimmed = duration_str.trim();
    if trimmed.is_empty() {
        return Err(anyhow::anyhow!("Duration string cannot be empty"));
    }

    let (Some(whole), Some(segment)) = (WHOLE.as_ref(), SEGMENT.as_ref()) else {
        return Err(anyhow::anyhow!("Failed to compile duration regex"));
    };

    let lower = trimmed.to_lowercase();
    if !whole.is_match(&lower) {
        return Err(anyhow::anyhow!(
            "Invalid duration format '{trimmed}'. Expected <number><unit> segments (e.g., '30s', '5m', '1h30m')"
        ));
    }

    let mut seconds: u64 = 0;
    for captures in segment.captures_iter(&lower) {
        let number: u64 = captures["number"]
            .parse()
            .map_err(|e| anyhow::anyhow!("Invalid duration number in '{trimmed}': {e}"))?;
        let factor = match &captures["unit"] {
            "s" => 1,
            "m" => 60,
            "h" => 3_600,
            _ => 86_400,
        };
        seconds = number
            .checked_mul(factor)
            .and_then(|s| seconds.checked_add(s))
            .ok_or_else(|| anyhow::anyhow!("Duration '{trimmed}' is too large"))?;
    }

    if seconds == 0 {
        return Err(anyhow::anyhow!(
            "Duration must be greater than 0, got '{trimmed}'"
        ));
    }

    Ok(Duration::from_secs(seconds))
}

/// Parse `interval` and enforce a minimum
///
/// # Arguments
/// * `interval` - The duration string to validate
/// * `field_name` - The name of the field being validated (for error messages)
/// * `min_seconds` - Minimum duration in seconds
pub fn validate_duration_interval(
    interval: &str,
    field_name: &str,
    min_seconds: u64,
) -> Result<Duration> {
    let duration = parse_kubernetes_duration(interval)
        .map_err(|e| anyhow::anyhow!("{field_name}: {e}"))?;

    if duration.as_secs() < min_seconds {
        return Err(anyhow::anyhow!(
            "{field_name} '{}' must be at least {min_seconds} seconds (got {} seconds)",
            interval.trim(),
            duration.as_secs()
        ));
    }

    Ok(duration)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_single_units() {
        assert_eq!(parse_kubernetes_duration("30s").unwrap(), Duration::from_secs(30));
        assert_eq!(parse_kubernetes_duration("5m").unwrap(), Duration::from_secs(300));
        assert_eq!(parse_kubernetes_duration("2H").unwrap(), Duration::from_secs(7_200));
        assert_eq!(parse_kubernetes_duration(" 1d ").unwrap(), Duration::from_secs(86_400));
    }

    #[test]
    fn test_compound_durations() {
        assert_eq!(
            parse_kubernetes_duration("1h30m").unwrap(),
            Duration::from_secs(5_400)
        );
        assert_eq!(
            parse_kubernetes_duration("1m30s").unwrap(),
            Duration::from_secs(90)
        );
    }

    #[test]
    fn test_rejects_bad_input() {
        for input in ["", "5", "m", "5x", "1.5h", "-5m", "0s", "5m foo"] {
            assert!(
                parse_kubernetes_duration(input).is_err(),
                "'{input}' should be rejected"
            );
        }
    }

    #[test]
    fn test_minimum_is_enforced() {
        let err = validate_duration_interval("10s", "syncInterval", 30).unwrap_err();
        assert!(err.to_string().contains("at least 30 seconds"));
        assert_eq!(
            validate_duration_interval("1m", "syncInterval", 30).unwrap(),
            Duration::from_secs(60)
        );
    }
}
