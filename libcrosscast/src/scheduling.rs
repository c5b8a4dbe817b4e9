//! Human-readable schedule times
//!
//! Accepts, in order of preference:
//! - RFC 3339 timestamps: `2026-11-20T15:00:00Z`
//! - Relative durations: `30m`, `2h`, `1day 3h`
//! - Natural language: `tomorrow 9am`, `next friday 14:00`

use chrono::{DateTime, Duration, Utc};

use crate::{CrosscastError, Result};

/// Resolve a schedule string relative to `now`
///
/// # Errors
///
/// `InvalidInput` when the string matches none of the accepted forms.
pub fn parse_schedule(input: &str, now: DateTime<Utc>) -> Result<DateTime<Utc>> {
    let input = input.trim();
    if input.is_empty() {
        return Err(CrosscastError::InvalidInput(
            "Schedule string cannot be empty".to_string(),
        ));
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(input) {
        return Ok(dt.with_timezone(&Utc));
    }

    if let Some(duration) = parse_duration(input) {
        return Ok(now + duration);
    }

    chrono_english::parse_date_string(input, now, chrono_english::Dialect::Us).map_err(|e| {
        CrosscastError::InvalidInput(format!("Could not parse schedule '{}': {}", input, e))
    })
}

fn parse_duration(input: &str) -> Option<Duration> {
    let std_duration = humantime::parse_duration(input).ok()?;
    Duration::from_std(std_duration).ok()
}

/// Require a schedule time strictly after `now`
pub fn ensure_future(at: DateTime<Utc>, now: DateTime<Utc>) -> Result<()> {
    if at <= now {
        return Err(CrosscastError::InvalidInput(format!(
            "Scheduled time {} is not in the future",
            at.to_rfc3339()
        )));
    }
    Ok(())
}
