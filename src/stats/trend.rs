use chrono::{DateTime, Utc};
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Trend {
    Up,
    Down,
    Neutral,
}

/// Share of confirmed orders in a window, in percent. An empty window rates 0.
pub fn success_rate(confirmed: u64, total: u64) -> f64 {
    if total == 0 {
        return 0.0;
    }
    confirmed as f64 / total as f64 * 100.0
}

/// Direction of the current window relative to the preceding one of equal
/// length. Equal rates (including two empty windows) are neutral.
pub fn trend_between(current: f64, previous: f64) -> Trend {
    if current > previous {
        Trend::Up
    } else if current < previous {
        Trend::Down
    } else {
        Trend::Neutral
    }
}

/// Percent change between window rates. A move from zero to anything
/// positive reads as +100; zero to zero is no change.
pub fn percent_change(current: f64, previous: f64) -> f64 {
    if previous == 0.0 {
        if current > 0.0 {
            return 100.0;
        }
        return 0.0;
    }
    (current - previous) / previous * 100.0
}

/// Bucketed "N minutes/hours/days ago" label for activity feeds. Entries are
/// ordered by actual elapsed time, never by this string.
pub fn relative_label(then: DateTime<Utc>, now: DateTime<Utc>) -> String {
    let elapsed = now.signed_duration_since(then);
    let seconds = elapsed.num_seconds();

    if seconds < 60 {
        return "just now".to_string();
    }

    let minutes = elapsed.num_minutes();
    if minutes < 60 {
        return if minutes == 1 {
            "1 minute ago".to_string()
        } else {
            format!("{minutes} minutes ago")
        };
    }

    let hours = elapsed.num_hours();
    if hours < 24 {
        return if hours == 1 {
            "1 hour ago".to_string()
        } else {
            format!("{hours} hours ago")
        };
    }

    let days = elapsed.num_days();
    if days == 1 {
        "1 day ago".to_string()
    } else {
        format!("{days} days ago")
    }
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, TimeZone, Utc};

    use super::*;

    #[test]
    fn rate_is_zero_for_empty_window() {
        assert_eq!(success_rate(0, 0), 0.0);
    }

    #[test]
    fn rate_stays_within_bounds() {
        assert_eq!(success_rate(0, 10), 0.0);
        assert_eq!(success_rate(10, 10), 100.0);
        let mid = success_rate(3, 7);
        assert!(mid > 0.0 && mid < 100.0);
    }

    #[test]
    fn rising_window_trends_up_with_full_percent_change() {
        // 8 of 10 now vs 2 of 5 before: 80% vs 40%
        let current = success_rate(8, 10);
        let previous = success_rate(2, 5);
        assert_eq!(current, 80.0);
        assert_eq!(previous, 40.0);
        assert_eq!(trend_between(current, previous), Trend::Up);
        assert_eq!(percent_change(current, previous), 100.0);
    }

    #[test]
    fn two_empty_windows_are_neutral() {
        let current = success_rate(0, 0);
        let previous = success_rate(0, 0);
        assert_eq!(trend_between(current, previous), Trend::Neutral);
        assert_eq!(percent_change(current, previous), 0.0);
    }

    #[test]
    fn recovery_from_empty_previous_window_reads_plus_hundred() {
        assert_eq!(percent_change(60.0, 0.0), 100.0);
        assert_eq!(trend_between(60.0, 0.0), Trend::Up);
    }

    #[test]
    fn falling_rate_trends_down() {
        assert_eq!(trend_between(20.0, 50.0), Trend::Down);
        assert_eq!(percent_change(20.0, 50.0), -60.0);
    }

    #[test]
    fn labels_bucket_by_elapsed_time() {
        let now = Utc.with_ymd_and_hms(2026, 8, 6, 12, 0, 0).unwrap();

        assert_eq!(relative_label(now - Duration::seconds(20), now), "just now");
        assert_eq!(relative_label(now - Duration::minutes(1), now), "1 minute ago");
        assert_eq!(relative_label(now - Duration::minutes(45), now), "45 minutes ago");
        assert_eq!(relative_label(now - Duration::hours(3), now), "3 hours ago");
        assert_eq!(relative_label(now - Duration::days(2), now), "2 days ago");
    }
}
