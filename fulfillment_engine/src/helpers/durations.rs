use chrono::Duration;
use regex::Regex;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Invalid duration: {0}. Use a number of seconds, or a number followed by s, m, h or d (e.g. 30s, 5m, 72h)")]
pub struct DurationParseError(String);

/// Parses a duration such as `30s`, `5m`, `72h`, `2d` or `90`. A bare number is a number of seconds. Negative values
/// are allowed, since a negative auto-cancel time means "disabled".
pub fn parse_duration(s: &str) -> Result<Duration, DurationParseError> {
    let re = Regex::new(r"^\s*(-?\d+)\s*([smhd]?)\s*$").map_err(|e| DurationParseError(e.to_string()))?;
    let caps = re.captures(s).ok_or_else(|| DurationParseError(s.to_string()))?;
    let value = caps
        .get(1)
        .and_then(|m| m.as_str().parse::<i64>().ok())
        .ok_or_else(|| DurationParseError(s.to_string()))?;
    let unit = caps.get(2).map(|m| m.as_str()).unwrap_or("");
    let duration = match unit {
        "m" => Duration::minutes(value),
        "h" => Duration::hours(value),
        "d" => Duration::days(value),
        _ => Duration::seconds(value),
    };
    Ok(duration)
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn parse_durations() {
        assert_eq!(parse_duration("30s").unwrap(), Duration::seconds(30));
        assert_eq!(parse_duration("45").unwrap(), Duration::seconds(45));
        assert_eq!(parse_duration("5m").unwrap(), Duration::minutes(5));
        assert_eq!(parse_duration(" 72h ").unwrap(), Duration::hours(72));
        assert_eq!(parse_duration("2d").unwrap(), Duration::days(2));
        assert_eq!(parse_duration("-1h").unwrap(), Duration::hours(-1));
        assert!(parse_duration("").is_err());
        assert!(parse_duration("five minutes").is_err());
        assert!(parse_duration("5w").is_err());
    }
}
