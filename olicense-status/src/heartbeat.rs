//! Heartbeat timestamp coercion.

use chrono::{DateTime, NaiveDateTime};
use serde_json::Value;

const NAIVE_FORMATS: &[&str] = &["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S"];

/// Parse a heartbeat given as text: Unix seconds, RFC 3339, or one of the
/// naive `YYYY-MM-DD HH:MM:SS` forms (read as UTC, trailing `Z` allowed).
pub(crate) fn parse_heartbeat(text: &str) -> Result<f64, String> {
    let text = text.trim();

    if let Ok(seconds) = text.parse::<f64>() {
        return if seconds.is_finite() && seconds >= 0.0 {
            Ok(seconds)
        } else {
            Err(text.to_string())
        };
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(text) {
        return Ok(to_seconds(dt.timestamp(), dt.timestamp_subsec_millis()));
    }

    let naive = text.strip_suffix('Z').unwrap_or(text);
    for format in NAIVE_FORMATS {
        if let Ok(dt) = NaiveDateTime::parse_from_str(naive, format) {
            let utc = dt.and_utc();
            return Ok(to_seconds(utc.timestamp(), utc.timestamp_subsec_millis()));
        }
    }

    Err(text.to_string())
}

/// Parse a heartbeat from a JSON value.
pub(crate) fn heartbeat_from_json(value: &Value) -> Result<f64, String> {
    match value {
        Value::Number(n) => match n.as_f64() {
            Some(v) if v.is_finite() && v >= 0.0 => Ok(v),
            _ => Err(n.to_string()),
        },
        Value::String(s) => parse_heartbeat(s),
        other => Err(other.to_string()),
    }
}

fn to_seconds(secs: i64, millis: u32) -> f64 {
    secs as f64 + f64::from(millis) / 1000.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn numeric_seconds() {
        assert_eq!(parse_heartbeat("1700000000"), Ok(1_700_000_000.0));
        assert_eq!(parse_heartbeat("1700000000.5"), Ok(1_700_000_000.5));
        assert!(parse_heartbeat("-5").is_err());
    }

    #[test]
    fn naive_formats_are_utc() {
        assert_eq!(parse_heartbeat("2024-01-02 03:04:05"), Ok(1_704_164_645.0));
        assert_eq!(parse_heartbeat("2024-01-02T03:04:05"), Ok(1_704_164_645.0));
        assert_eq!(parse_heartbeat("2024-01-02T03:04:05Z"), Ok(1_704_164_645.0));
    }

    #[test]
    fn rfc3339_with_offset() {
        assert_eq!(
            parse_heartbeat("2024-01-02T04:04:05+01:00"),
            Ok(1_704_164_645.0)
        );
    }

    #[test]
    fn garbage_is_rejected() {
        assert_eq!(parse_heartbeat("yesterday"), Err("yesterday".to_string()));
    }

    #[test]
    fn json_values() {
        assert_eq!(heartbeat_from_json(&json!(1_700_000_000)), Ok(1_700_000_000.0));
        assert_eq!(
            heartbeat_from_json(&json!("2024-01-02 03:04:05")),
            Ok(1_704_164_645.0)
        );
        assert!(heartbeat_from_json(&json!({})).is_err());
    }
}
