use chrono::{DateTime, Duration, NaiveDate, SecondsFormat, Utc};

/// Get the last day of a given month.
pub fn last_day_of_month(year: i32, month: u32) -> NaiveDate {
    if month == 12 {
        NaiveDate::from_ymd_opt(year + 1, 1, 1).unwrap() - Duration::days(1)
    } else {
        NaiveDate::from_ymd_opt(year, month + 1, 1).unwrap() - Duration::days(1)
    }
}

pub fn month_label(m: u32) -> &'static str {
    match m {
        1 => "January",
        2 => "February",
        3 => "March",
        4 => "April",
        5 => "May",
        6 => "June",
        7 => "July",
        8 => "August",
        9 => "September",
        10 => "October",
        11 => "November",
        12 => "December",
        _ => "Unknown",
    }
}

/// Short human label used for chart buckets, e.g. `Jan 5`.
pub fn short_label(ts: DateTime<Utc>) -> String {
    ts.format("%b %-d").to_string()
}

/// Midnight UTC at the start of `d`.
pub fn start_of_day(d: NaiveDate) -> DateTime<Utc> {
    d.and_hms_opt(0, 0, 0).unwrap().and_utc()
}

/// Canonical timestamp text stored in indexed columns. Fixed width and
/// always `Z`-suffixed so lexical order matches chronological order.
pub fn to_key(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Secs, true)
}

/// Parse either a full RFC 3339 timestamp or a bare `YYYY-MM-DD` date.
pub fn parse_timestamp(s: &str) -> Option<DateTime<Utc>> {
    let s = s.trim();
    if let Ok(ts) = DateTime::parse_from_rfc3339(s) {
        return Some(ts.with_timezone(&Utc));
    }
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .ok()
        .map(start_of_day)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_last_day_of_month() {
        assert_eq!(
            last_day_of_month(2025, 2),
            NaiveDate::from_ymd_opt(2025, 2, 28).unwrap()
        );
        assert_eq!(
            last_day_of_month(2024, 2),
            NaiveDate::from_ymd_opt(2024, 2, 29).unwrap()
        ); // Leap year
        assert_eq!(
            last_day_of_month(2025, 12),
            NaiveDate::from_ymd_opt(2025, 12, 31).unwrap()
        );
    }

    #[test]
    fn test_short_label() {
        let ts = parse_timestamp("2025-01-05T13:00:00Z").unwrap();
        assert_eq!(short_label(ts), "Jan 5");
    }

    #[test]
    fn test_key_sorts_chronologically() {
        let a = to_key(parse_timestamp("2025-01-05").unwrap());
        let b = to_key(parse_timestamp("2025-01-05T00:00:01+00:00").unwrap());
        assert_eq!(a, "2025-01-05T00:00:00Z");
        assert!(a < b);
    }

    #[test]
    fn test_parse_timestamp_rejects_garbage() {
        assert!(parse_timestamp("yesterday").is_none());
        assert!(parse_timestamp("2025-13-01").is_none());
    }
}
