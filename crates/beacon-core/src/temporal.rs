//! Relative-time formatting for notification timestamps.

use chrono::{DateTime, Utc};

const MINUTE_MS: i64 = 60 * 1000;
const HOUR_MS: i64 = 60 * MINUTE_MS;
const DAY_MS: i64 = 24 * HOUR_MS;

/// Render `timestamp` relative to `now`.
///
/// | Elapsed          | Output        |
/// |------------------|---------------|
/// | < 1 minute       | `Just now`    |
/// | < 60 minutes     | `{m}m ago`    |
/// | < 24 hours       | `{h}h ago`    |
/// | < 7 days         | `{d}d ago`    |
/// | otherwise        | `M/D/YYYY`    |
///
/// Each bucket uses integer floor division of the elapsed milliseconds.
/// Timestamps in the future (clock skew) render as `Just now`.
pub fn format_relative_time(timestamp: DateTime<Utc>, now: DateTime<Utc>) -> String {
    let elapsed_ms = (now - timestamp).num_milliseconds();

    if elapsed_ms < MINUTE_MS {
        return "Just now".to_string();
    }

    let minutes = elapsed_ms / MINUTE_MS;
    if minutes < 60 {
        return format!("{minutes}m ago");
    }

    let hours = elapsed_ms / HOUR_MS;
    if hours < 24 {
        return format!("{hours}h ago");
    }

    let days = elapsed_ms / DAY_MS;
    if days < 7 {
        return format!("{days}d ago");
    }

    timestamp.format("%-m/%-d/%Y").to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 10, 19, 12, 0, 0).unwrap()
    }

    #[test]
    fn test_just_now() {
        assert_eq!(
            format_relative_time(now() - Duration::seconds(45), now()),
            "Just now"
        );
        assert_eq!(format_relative_time(now(), now()), "Just now");
    }

    #[test]
    fn test_minutes() {
        assert_eq!(
            format_relative_time(now() - Duration::minutes(5), now()),
            "5m ago"
        );
        assert_eq!(
            format_relative_time(now() - Duration::seconds(60), now()),
            "1m ago"
        );
        assert_eq!(
            format_relative_time(now() - Duration::seconds(59 * 60 + 59), now()),
            "59m ago"
        );
    }

    #[test]
    fn test_hours() {
        assert_eq!(
            format_relative_time(now() - Duration::hours(3), now()),
            "3h ago"
        );
        assert_eq!(
            format_relative_time(now() - Duration::minutes(60), now()),
            "1h ago"
        );
        assert_eq!(
            format_relative_time(now() - Duration::minutes(23 * 60 + 59), now()),
            "23h ago"
        );
    }

    #[test]
    fn test_days() {
        assert_eq!(
            format_relative_time(now() - Duration::days(2), now()),
            "2d ago"
        );
        assert_eq!(
            format_relative_time(now() - Duration::hours(24), now()),
            "1d ago"
        );
        assert_eq!(
            format_relative_time(now() - Duration::hours(7 * 24 - 1), now()),
            "6d ago"
        );
    }

    #[test]
    fn test_older_than_a_week_is_a_date() {
        assert_eq!(
            format_relative_time(now() - Duration::days(10), now()),
            "10/9/2026"
        );
        assert_eq!(
            format_relative_time(now() - Duration::days(7), now()),
            "10/12/2026"
        );
    }

    #[test]
    fn test_future_timestamp_is_just_now() {
        assert_eq!(
            format_relative_time(now() + Duration::minutes(10), now()),
            "Just now"
        );
    }
}
