use chrono::{Local, TimeZone};

const MILLIS_PER_MINUTE: i64 = 60_000;

/// Format an age in milliseconds as a short relative string.
///
/// Rounds to the nearest hour past 1h and the nearest day past 1d.
pub fn format_age(age_millis: i64) -> String {
    let minutes = age_millis / MILLIS_PER_MINUTE;
    if minutes < 1 {
        // Also covers clock skew (negative ages)
        "just now".to_string()
    } else if minutes < 60 {
        format!("{}m ago", minutes)
    } else if minutes < 1440 {
        let hours = minutes / 60;
        if minutes % 60 >= 30 {
            format!("{}h ago", hours + 1)
        } else {
            format!("{}h ago", hours)
        }
    } else {
        let days = minutes / 1440;
        if (minutes % 1440) / 60 >= 12 {
            format!("{}d ago", days + 1)
        } else {
            format!("{}d ago", days)
        }
    }
}

/// Format an epoch-millisecond timestamp in local time, e.g. `18.10.2026 14:05`.
pub fn format_timestamp(millis: i64) -> String {
    match Local.timestamp_millis_opt(millis).single() {
        Some(dt) => dt.format("%d.%m.%Y %H:%M").to_string(),
        None => "unknown".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_age() {
        assert_eq!(format_age(-5_000), "just now");
        assert_eq!(format_age(30_000), "just now");
        assert_eq!(format_age(5 * MILLIS_PER_MINUTE), "5m ago");
        assert_eq!(format_age(89 * MILLIS_PER_MINUTE), "1h ago");
        assert_eq!(format_age(90 * MILLIS_PER_MINUTE), "2h ago");
        assert_eq!(format_age(36 * 60 * MILLIS_PER_MINUTE), "2d ago");
        assert_eq!(format_age(25 * 60 * MILLIS_PER_MINUTE), "1d ago");
    }

    #[test]
    fn test_format_timestamp_shape() {
        let formatted = format_timestamp(1_700_000_000_000);
        assert_eq!(formatted.len(), "14.11.2023 22:13".len());
        assert_eq!(&formatted[2..3], ".");
    }
}
