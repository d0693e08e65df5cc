//! Schedule string parsing for job ETAs

use chrono::{DateTime, Duration, NaiveDateTime, TimeZone, Utc};

use crate::error::{PostfanError, Result};

const ABSOLUTE_FORMATS: &[&str] = &["%Y-%m-%d %H:%M", "%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M"];

/// Parse a schedule string into a Unix timestamp relative to `now`
///
/// Accepted forms, tried in order:
/// - `now`
/// - durations such as `30m`, `2h`, `1 day` (offset from `now`)
/// - RFC 3339 or `YYYY-MM-DD HH:MM` in UTC
/// - natural language: `tomorrow 3pm`, `next monday 10am`
pub fn parse_eta_at(input: &str, now: DateTime<Utc>) -> Result<i64> {
    let input = input.trim();
    if input.is_empty() {
        return Err(PostfanError::InvalidInput(
            "Schedule string cannot be empty".to_string(),
        ));
    }

    if input.eq_ignore_ascii_case("now") {
        return Ok(now.timestamp());
    }

    if let Some(duration) = parse_duration(input) {
        return Ok((now + duration).timestamp());
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(input) {
        return Ok(dt.timestamp());
    }

    for format in ABSOLUTE_FORMATS {
        if let Ok(naive) = NaiveDateTime::parse_from_str(input, format) {
            return Ok(Utc.from_utc_datetime(&naive).timestamp());
        }
    }

    chrono_english::parse_date_string(input, now, chrono_english::Dialect::Us)
        .map(|dt| dt.timestamp())
        .map_err(|e| {
            PostfanError::InvalidInput(format!("Could not parse schedule '{}': {}", input, e))
        })
}

/// [`parse_eta_at`] against the current time
pub fn parse_eta(input: &str) -> Result<i64> {
    parse_eta_at(input, Utc::now())
}

fn parse_duration(input: &str) -> Option<Duration> {
    let std_duration = humantime::parse_duration(input).ok()?;
    Duration::try_seconds(i64::try_from(std_duration.as_secs()).ok()?)
}

/// Render a Unix timestamp for humans, falling back to the raw number
pub fn format_timestamp(ts: i64) -> String {
    DateTime::from_timestamp(ts, 0)
        .map(|dt| dt.format("%Y-%m-%d %H:%M:%S UTC").to_string())
        .unwrap_or_else(|| ts.to_string())
}
