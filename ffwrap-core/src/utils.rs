//! Utility functions for time values and lenient numeric conversion.
//!
//! ffmpeg and ffprobe report numbers as text, often as JSON strings, and use
//! `N/A` for unknown values. The helpers here turn that text into options
//! instead of errors.

use serde_json::Value;

/// Formats seconds as HH:MM:SS (e.g., 3725.0 -> "01:02:05"). Returns "??:??:??" for invalid inputs.
#[must_use]
pub fn format_duration(seconds: f64) -> String {
    if seconds < 0.0 || !seconds.is_finite() {
        return "??:??:??".to_string();
    }

    let total_seconds = seconds as u64;
    let hours = total_seconds / 3600;
    let minutes = (total_seconds % 3600) / 60;
    let secs = total_seconds % 60;
    format!("{hours:02}:{minutes:02}:{secs:02}")
}

/// Parses an ffmpeg time string to seconds. Returns None if invalid.
///
/// Accepts `HH:MM:SS.ms`, `MM:SS.ms` and plain seconds. A leading `-` is
/// honoured, since ffmpeg prints negative times before the first packet.
#[must_use]
pub fn parse_ffmpeg_time(time: &str) -> Option<f64> {
    let time = time.trim();
    let (sign, body) = match time.strip_prefix('-') {
        Some(rest) => (-1.0, rest),
        None => (1.0, time),
    };
    if body.is_empty() {
        return None;
    }

    let mut total = 0.0;
    let parts: Vec<&str> = body.split(':').collect();
    if parts.len() > 3 {
        return None;
    }
    for part in &parts {
        if part.is_empty() || part.starts_with(['+', '-']) {
            return None;
        }
        let value = part.parse::<f64>().ok()?;
        if !value.is_finite() {
            return None;
        }
        total = total * 60.0 + value;
    }
    Some(sign * total)
}

/// Converts a JSON value to `f64`, accepting numbers and numeric strings.
///
/// Empty strings, `N/A` and anything unparsable become `None`.
#[must_use]
pub fn safe_float(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64().filter(|v| v.is_finite()),
        Value::String(s) => {
            let s = s.trim();
            if s.is_empty() || s.eq_ignore_ascii_case("n/a") {
                return None;
            }
            s.parse::<f64>().ok().filter(|v| v.is_finite())
        }
        Value::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
        _ => None,
    }
}

/// Converts a JSON value to `i64`. Fractional values are truncated, so
/// `"25.9"` becomes 25.
#[must_use]
pub fn safe_int(value: &Value) -> Option<i64> {
    if let Value::Number(n) = value {
        if let Some(i) = n.as_i64() {
            return Some(i);
        }
    }
    if let Value::String(s) = value {
        if let Ok(i) = s.trim().parse::<i64>() {
            return Some(i);
        }
    }
    let float = safe_float(value)?;
    if float < i64::MIN as f64 || float > i64::MAX as f64 {
        return None;
    }
    Some(float.trunc() as i64)
}

/// Parses a rational like `30000/1001` (or a plain number) to `f64`.
/// A zero denominator yields `None`.
#[must_use]
pub fn parse_rational(value: &str) -> Option<f64> {
    let value = value.trim();
    match value.split_once('/') {
        Some((num, den)) => {
            let num = num.trim().parse::<f64>().ok()?;
            let den = den.trim().parse::<f64>().ok()?;
            if den == 0.0 {
                None
            } else {
                Some(num / den)
            }
        }
        None => value.parse::<f64>().ok().filter(|v| v.is_finite()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_format_duration() {
        assert_eq!(format_duration(0.0), "00:00:00");
        assert_eq!(format_duration(3725.0), "01:02:05");
        assert_eq!(format_duration(-1.0), "??:??:??");
        assert_eq!(format_duration(f64::NAN), "??:??:??");
    }

    #[test]
    fn test_parse_ffmpeg_time() {
        assert_eq!(parse_ffmpeg_time("00:00:30.00"), Some(30.0));
        assert_eq!(parse_ffmpeg_time("01:02:03.50"), Some(3723.5));
        assert_eq!(parse_ffmpeg_time("02:03.5"), Some(123.5));
        assert_eq!(parse_ffmpeg_time("42.25"), Some(42.25));
        assert_eq!(parse_ffmpeg_time("-00:00:01.00"), Some(-1.0));
        assert_eq!(parse_ffmpeg_time("N/A"), None);
        assert_eq!(parse_ffmpeg_time(""), None);
        assert_eq!(parse_ffmpeg_time("1:2:3:4"), None);
        assert_eq!(parse_ffmpeg_time("00:-1:00"), None);
    }

    #[test]
    fn test_safe_float() {
        assert_eq!(safe_float(&json!("12.345")), Some(12.345));
        assert_eq!(safe_float(&json!(7)), Some(7.0));
        assert_eq!(safe_float(&json!("N/A")), None);
        assert_eq!(safe_float(&json!("")), None);
        assert_eq!(safe_float(&json!("abc")), None);
        assert_eq!(safe_float(&json!(null)), None);
        assert_eq!(safe_float(&json!({"a": 1})), None);
    }

    #[test]
    fn test_safe_int() {
        assert_eq!(safe_int(&json!("48000")), Some(48000));
        assert_eq!(safe_int(&json!(2)), Some(2));
        assert_eq!(safe_int(&json!("25.9")), Some(25));
        assert_eq!(safe_int(&json!(3.7)), Some(3));
        assert_eq!(safe_int(&json!("N/A")), None);
        assert_eq!(safe_int(&json!(null)), None);
    }

    #[test]
    fn test_parse_rational() {
        assert_eq!(parse_rational("25/1"), Some(25.0));
        let ntsc = parse_rational("30000/1001").unwrap();
        assert!((ntsc - 29.97).abs() < 0.01);
        assert_eq!(parse_rational("0/0"), None);
        assert_eq!(parse_rational("24"), Some(24.0));
        assert_eq!(parse_rational("x/1"), None);
    }
}
