//! Clock utilities for adwatchd
//!
//! All watch decisions take an explicit `now`; the service obtains it from
//! [`now()`] so that every time-sensitive rule sees the same clock.
//!
//! # Mock Time for Development
//!
//! In debug builds, the `ADWATCH_MOCK_TIME` environment variable can be set
//! to shift the service clock. This is useful for exercising cooldowns and
//! daily ledger resets without waiting for real time to pass.
//!
//! Format: `YYYY-MM-DD HH:MM:SS` (e.g., `2025-12-25 14:30:00`)
//!
//! Example:
//! ```bash
//! ADWATCH_MOCK_TIME="2025-12-25 23:59:00" adwatchd
//! ```

use chrono::{DateTime, Local, NaiveDateTime, TimeZone, Utc};
use std::sync::OnceLock;
use std::time::Duration;

/// Environment variable name for mock time (debug builds only)
pub const MOCK_TIME_ENV_VAR: &str = "ADWATCH_MOCK_TIME";

/// Format accepted by [`MOCK_TIME_ENV_VAR`]
pub const MOCK_TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Offset between mock time and real time, computed once at first use.
/// Mock time keeps advancing at the real rate.
static MOCK_TIME_OFFSET: OnceLock<Option<chrono::Duration>> = OnceLock::new();

#[allow(clippy::disallowed_methods)] // wraps Local::now()
fn get_mock_time_offset() -> Option<chrono::Duration> {
    *MOCK_TIME_OFFSET.get_or_init(|| {
        #[cfg(debug_assertions)]
        {
            let raw = std::env::var(MOCK_TIME_ENV_VAR).ok()?;
            let Ok(naive) = NaiveDateTime::parse_from_str(&raw, MOCK_TIME_FORMAT) else {
                tracing::warn!(
                    mock_time = %raw,
                    expected_format = MOCK_TIME_FORMAT,
                    "Invalid mock time format"
                );
                return None;
            };
            let Some(mock_dt) = Local.from_local_datetime(&naive).single() else {
                tracing::warn!(mock_time = %raw, "Failed to convert mock time to local timezone");
                return None;
            };

            let offset = mock_dt.signed_duration_since(Local::now());
            tracing::info!(
                mock_time = %raw,
                offset_secs = offset.num_seconds(),
                "Mock time enabled"
            );
            Some(offset)
        }
        #[cfg(not(debug_assertions))]
        {
            None
        }
    })
}

/// Returns whether mock time is currently active.
pub fn is_mock_time_active() -> bool {
    get_mock_time_offset().is_some()
}

/// Current local time, respecting mock time in debug builds.
#[allow(clippy::disallowed_methods)] // the one place allowed to read the system clock
pub fn now() -> DateTime<Local> {
    let real_now = Local::now();

    match get_mock_time_offset() {
        Some(offset) => real_now + offset,
        None => real_now,
    }
}

/// Time left until `until`, or zero if it has passed.
pub fn remaining_until(until: DateTime<Local>, now: DateTime<Local>) -> Duration {
    (until - now).to_std().unwrap_or(Duration::ZERO)
}

/// Convert a std duration to chrono, saturating at chrono's maximum.
pub fn to_chrono(d: Duration) -> chrono::Duration {
    chrono::Duration::from_std(d).unwrap_or(chrono::Duration::MAX)
}

/// `at - d`, clamped to the earliest representable instant.
pub fn saturating_sub(at: DateTime<Local>, d: Duration) -> DateTime<Local> {
    at.checked_sub_signed(to_chrono(d))
        .unwrap_or_else(|| DateTime::<Utc>::MIN_UTC.with_timezone(&Local))
}

/// `at + d`, clamped to the latest representable instant.
pub fn saturating_add(at: DateTime<Local>, d: Duration) -> DateTime<Local> {
    at.checked_add_signed(to_chrono(d))
        .unwrap_or_else(|| DateTime::<Utc>::MAX_UTC.with_timezone(&Local))
}

/// Helper to format durations in human-readable form
pub fn format_duration(d: Duration) -> String {
    let total_secs = d.as_secs();
    let hours = total_secs / 3600;
    let minutes = (total_secs % 3600) / 60;
    let seconds = total_secs % 60;

    if hours > 0 {
        format!("{}h {}m {}s", hours, minutes, seconds)
    } else if minutes > 0 {
        format!("{}m {}s", minutes, seconds)
    } else {
        format!("{}s", seconds)
    }
}

/// Hours and minutes, e.g. `23h 59m`. Used for long waits.
pub fn format_hours_minutes(d: Duration) -> String {
    let total_secs = d.as_secs();
    format!("{}h {}m", total_secs / 3600, (total_secs % 3600) / 60)
}

/// Minutes and seconds, e.g. `12m 5s`. Used for short waits.
pub fn format_minutes_seconds(d: Duration) -> String {
    let total_secs = d.as_secs();
    format!("{}m {}s", total_secs / 60, total_secs % 60)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Datelike;

    #[test]
    fn test_format_duration() {
        assert_eq!(format_duration(Duration::from_secs(30)), "30s");
        assert_eq!(format_duration(Duration::from_secs(90)), "1m 30s");
        assert_eq!(format_duration(Duration::from_secs(3661)), "1h 1m 1s");
    }

    #[test]
    fn test_format_hours_minutes() {
        assert_eq!(format_hours_minutes(Duration::from_secs(86_340)), "23h 59m");
        assert_eq!(format_hours_minutes(Duration::from_secs(59)), "0h 0m");
    }

    #[test]
    fn test_format_minutes_seconds() {
        assert_eq!(format_minutes_seconds(Duration::from_secs(725)), "12m 5s");
        assert_eq!(format_minutes_seconds(Duration::from_secs(1800)), "30m 0s");
    }

    #[test]
    fn test_remaining_until_saturates() {
        let now = Local.with_ymd_and_hms(2025, 12, 25, 14, 30, 0).unwrap();
        let later = now + chrono::Duration::minutes(5);

        assert_eq!(remaining_until(later, now), Duration::from_secs(300));
        assert_eq!(remaining_until(now, later), Duration::ZERO);
    }

    #[test]
    fn test_saturating_shifts_clamp_huge_durations() {
        let now = Local.with_ymd_and_hms(2025, 12, 25, 14, 30, 0).unwrap();
        let huge = Duration::from_secs(u64::MAX);

        assert!(saturating_sub(now, huge) < now);
        assert!(saturating_add(now, huge) > now);
        assert_eq!(
            saturating_sub(now, Duration::from_secs(60)),
            now - chrono::Duration::minutes(1)
        );
        assert!(remaining_until(saturating_add(now, huge), now) > Duration::ZERO);
    }

    #[test]
    fn test_now_returns_time() {
        let t = now();
        assert!(t.year() >= 2020);
        assert!(t.year() <= 2100);
    }

    #[test]
    fn test_parse_mock_time_format() {
        for s in ["2025-12-25 14:30:00", "2025-01-01 00:00:00", "2025-12-31 23:59:59"] {
            assert!(NaiveDateTime::parse_from_str(s, MOCK_TIME_FORMAT).is_ok(), "{s}");
        }

        for s in ["2025-12-25", "2025-12-25T14:30:00", "", "not a date"] {
            assert!(NaiveDateTime::parse_from_str(s, MOCK_TIME_FORMAT).is_err(), "{s}");
        }
    }
}
