use std::sync::LazyLock;

use chrono::{DateTime, Datelike, Days, Duration, NaiveDate, Utc, Weekday};
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::date_util::{last_day_of_month, month_label, start_of_day};
use crate::error::{Error, Result};

/// Longest rolling window accepted: one hundred years.
const MAX_ROLLING_DAYS: u32 = 36_500;

static RE_HALF: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^(\d{4})-H([12])$").unwrap());
static RE_QUARTER: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^(\d{4})-Q([1-4])$").unwrap());
static RE_WEEK: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^(\d{4})-W(\d{1,2})$").unwrap());
static RE_MONTH: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^(\d{4})-(\d{2})$").unwrap());

/// A named reporting period.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Period {
    Year(i32),
    Half(i32, u8),
    Quarter(i32, u8),
    Month(i32, u8),
    Week(i32, u8),
    /// Last N days ending on (and including) the given date.
    Rolling(u32, NaiveDate),
}

/// Concrete half-open window `[start, end)` a report covers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportPeriod {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub label: String,
}

impl ReportPeriod {
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>, label: impl Into<String>) -> Self {
        Self {
            start,
            end,
            label: label.into(),
        }
    }

    pub fn contains(&self, ts: DateTime<Utc>) -> bool {
        self.start <= ts && ts < self.end
    }

    pub fn length(&self) -> Duration {
        self.end - self.start
    }

    /// The window of equal length ending where this one starts.
    pub fn preceding(&self) -> ReportPeriod {
        let start = self.start - self.length();
        ReportPeriod {
            start,
            end: self.start,
            label: format!("Prior to {}", self.label),
        }
    }
}

impl Period {
    /// Parse a period string relative to today.
    ///
    /// Supported formats:
    /// - `2025` — year
    /// - `2025-H1` — half
    /// - `2025-Q1` — quarter
    /// - `2025-01` — month
    /// - `2025-W05` — ISO week
    /// - `30d` — rolling last N days
    pub fn parse(s: &str) -> Result<Self> {
        Self::parse_as_of(s, chrono::Local::now().date_naive())
    }

    pub fn parse_as_of(s: &str, today: NaiveDate) -> Result<Self> {
        let s = s.trim();

        if s.ends_with('d') || s.ends_with('D') {
            if let Ok(n) = s[..s.len() - 1].parse::<u32>() {
                if n == 0 {
                    return Err(Error::PeriodParse(format!("empty rolling window: {s}")));
                }
                if n > MAX_ROLLING_DAYS {
                    return Err(Error::PeriodParse(format!(
                        "rolling window {s} is longer than {MAX_ROLLING_DAYS} days"
                    )));
                }
                return Ok(Period::Rolling(n, today));
            }
        }

        if s.len() == 4 {
            if let Ok(year) = s.parse::<i32>() {
                return Ok(Period::Year(year));
            }
        }

        if let Some(caps) = RE_HALF.captures(s) {
            let year: i32 = caps[1].parse().unwrap();
            let half: u8 = caps[2].parse().unwrap();
            return Ok(Period::Half(year, half));
        }

        if let Some(caps) = RE_QUARTER.captures(s) {
            let year: i32 = caps[1].parse().unwrap();
            let q: u8 = caps[2].parse().unwrap();
            return Ok(Period::Quarter(year, q));
        }

        if let Some(caps) = RE_WEEK.captures(s) {
            let year: i32 = caps[1].parse().unwrap();
            let week: u8 = caps[2].parse().unwrap();
            if (1..=53).contains(&week)
                && NaiveDate::from_isoywd_opt(year, week as u32, Weekday::Mon).is_some()
            {
                return Ok(Period::Week(year, week));
            }
        }

        if let Some(caps) = RE_MONTH.captures(s) {
            let year: i32 = caps[1].parse().unwrap();
            let month: u8 = caps[2].parse().unwrap();
            if (1..=12).contains(&month) {
                return Ok(Period::Month(year, month));
            }
        }

        Err(Error::PeriodParse(format!("unrecognized period: {s}")))
    }

    /// Canonical key string.
    pub fn to_key(&self) -> String {
        match self {
            Period::Year(y) => format!("{y}"),
            Period::Half(y, h) => format!("{y}-H{h}"),
            Period::Quarter(y, q) => format!("{y}-Q{q}"),
            Period::Month(y, m) => format!("{y}-{m:02}"),
            Period::Week(y, w) => format!("{y}-W{w:02}"),
            Period::Rolling(n, _) => format!("{n}d"),
        }
    }

    /// Human label, e.g. `Q1 2025` or `March 2025`.
    pub fn label(&self) -> String {
        match self {
            Period::Year(y) => format!("{y}"),
            Period::Half(y, h) => format!("H{h} {y}"),
            Period::Quarter(y, q) => format!("Q{q} {y}"),
            Period::Month(y, m) => format!("{} {y}", month_label(*m as u32)),
            Period::Week(y, w) => format!("Week {w}, {y}"),
            Period::Rolling(n, as_of) => {
                format!("Last {n} days to {}", as_of.format("%b %-d, %Y"))
            }
        }
    }

    /// Inclusive first and last calendar day.
    pub fn date_range(&self) -> (NaiveDate, NaiveDate) {
        match self {
            Period::Year(y) => (
                NaiveDate::from_ymd_opt(*y, 1, 1).unwrap(),
                NaiveDate::from_ymd_opt(*y, 12, 31).unwrap(),
            ),
            Period::Half(y, h) => {
                if *h == 1 {
                    (
                        NaiveDate::from_ymd_opt(*y, 1, 1).unwrap(),
                        NaiveDate::from_ymd_opt(*y, 6, 30).unwrap(),
                    )
                } else {
                    (
                        NaiveDate::from_ymd_opt(*y, 7, 1).unwrap(),
                        NaiveDate::from_ymd_opt(*y, 12, 31).unwrap(),
                    )
                }
            }
            Period::Quarter(y, q) => {
                let start_month = (*q as u32 - 1) * 3 + 1;
                let end_month = *q as u32 * 3;
                (
                    NaiveDate::from_ymd_opt(*y, start_month, 1).unwrap(),
                    last_day_of_month(*y, end_month),
                )
            }
            Period::Month(y, m) => (
                NaiveDate::from_ymd_opt(*y, *m as u32, 1).unwrap(),
                last_day_of_month(*y, *m as u32),
            ),
            Period::Week(y, w) => {
                let start = NaiveDate::from_isoywd_opt(*y, *w as u32, Weekday::Mon).unwrap();
                (start, start + Duration::days(6))
            }
            Period::Rolling(n, as_of) => (days_before(*as_of, n.saturating_sub(1)), *as_of),
        }
    }

    /// Half-open UTC window for composing a report.
    pub fn report_period(&self) -> ReportPeriod {
        let (first, last) = self.date_range();
        ReportPeriod {
            start: start_of_day(first),
            end: start_of_day(last + Duration::days(1)),
            label: self.label(),
        }
    }

    /// The previous period of the same type.
    pub fn previous(&self) -> Self {
        match self {
            Period::Year(y) => Period::Year(y - 1),
            Period::Half(y, h) => {
                if *h == 1 {
                    Period::Half(y - 1, 2)
                } else {
                    Period::Half(*y, 1)
                }
            }
            Period::Quarter(y, q) => {
                if *q == 1 {
                    Period::Quarter(y - 1, 4)
                } else {
                    Period::Quarter(*y, q - 1)
                }
            }
            Period::Month(y, m) => {
                if *m == 1 {
                    Period::Month(y - 1, 12)
                } else {
                    Period::Month(*y, m - 1)
                }
            }
            Period::Week(..) => {
                let (start, _) = self.date_range();
                let prior = (start - Duration::weeks(1)).iso_week();
                Period::Week(prior.year(), prior.week() as u8)
            }
            Period::Rolling(n, as_of) => Period::Rolling(*n, days_before(*as_of, *n)),
        }
    }

    /// `count` consecutive periods ending with this one, oldest first.
    pub fn trailing(&self, count: usize) -> Vec<Period> {
        let mut out = Vec::with_capacity(count);
        let mut p = self.clone();
        for _ in 0..count {
            out.push(p.clone());
            p = p.previous();
        }
        out.reverse();
        out
    }
}

/// `date - n` days, clamped to the earliest representable date.
fn days_before(date: NaiveDate, n: u32) -> NaiveDate {
    date.checked_sub_days(Days::new(n as u64)).unwrap_or(NaiveDate::MIN)
}

impl std::fmt::Display for Period {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.to_key())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    #[test]
    fn test_parse_named_periods() {
        let today = d(2025, 6, 15);
        assert_eq!(Period::parse_as_of("2025", today).unwrap(), Period::Year(2025));
        assert_eq!(Period::parse_as_of("2025-H2", today).unwrap(), Period::Half(2025, 2));
        assert_eq!(Period::parse_as_of("2025-Q1", today).unwrap(), Period::Quarter(2025, 1));
        assert_eq!(Period::parse_as_of("2025-03", today).unwrap(), Period::Month(2025, 3));
        assert_eq!(Period::parse_as_of("2025-W05", today).unwrap(), Period::Week(2025, 5));
        assert_eq!(
            Period::parse_as_of("30d", today).unwrap(),
            Period::Rolling(30, today)
        );
    }

    #[test]
    fn test_parse_invalid() {
        let today = d(2025, 6, 15);
        assert!(Period::parse_as_of("garbage", today).is_err());
        assert!(Period::parse_as_of("2025-Q5", today).is_err());
        assert!(Period::parse_as_of("2025-13", today).is_err());
        assert!(Period::parse_as_of("0d", today).is_err());
    }

    #[test]
    fn test_rolling_window_is_bounded() {
        let today = d(2025, 6, 15);
        let err = Period::parse_as_of("4000000000d", today).unwrap_err();
        assert!(matches!(err, Error::PeriodParse(_)));

        let longest = Period::parse_as_of("36500d", today).unwrap();
        let rp = longest.report_period();
        assert_eq!(rp.length(), Duration::days(36_500));
        assert_eq!(longest.trailing(3).len(), 3);

        // Constructed directly, an oversized window clamps instead of panicking.
        let (start, _) = Period::Rolling(u32::MAX, today).date_range();
        assert_eq!(start, NaiveDate::MIN);
    }

    #[test]
    fn test_report_period_is_half_open() {
        let rp = Period::Month(2025, 2).report_period();
        assert_eq!(rp.start, start_of_day(d(2025, 2, 1)));
        assert_eq!(rp.end, start_of_day(d(2025, 3, 1)));
        assert_eq!(rp.label, "February 2025");
        assert!(rp.contains(start_of_day(d(2025, 2, 28))));
        assert!(!rp.contains(rp.end));
    }

    #[test]
    fn test_preceding_window() {
        let rp = Period::Rolling(7, d(2025, 1, 14)).report_period();
        let prior = rp.preceding();
        assert_eq!(prior.end, rp.start);
        assert_eq!(prior.length(), rp.length());
    }

    #[test]
    fn test_previous() {
        assert_eq!(Period::Quarter(2025, 1).previous(), Period::Quarter(2024, 4));
        assert_eq!(Period::Half(2025, 1).previous(), Period::Half(2024, 2));
        assert_eq!(Period::Month(2025, 1).previous(), Period::Month(2024, 12));
        assert_eq!(Period::Week(2025, 1).previous(), Period::Week(2024, 52));
        assert_eq!(Period::Week(2021, 1).previous(), Period::Week(2020, 53));
    }

    #[test]
    fn test_trailing_is_oldest_first() {
        let ps = Period::Quarter(2025, 2).trailing(3);
        assert_eq!(
            ps,
            vec![
                Period::Quarter(2024, 4),
                Period::Quarter(2025, 1),
                Period::Quarter(2025, 2)
            ]
        );
    }
}
