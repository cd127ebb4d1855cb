use chrono::{DateTime, Duration, Utc};

use crate::date_util::short_label;
use crate::error::{Error, Result};

/// Dashboard timeframe presets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Timeframe {
    SevenDays,
    ThirtyDays,
    NinetyDays,
    OneYear,
}

impl Timeframe {
    pub fn parse(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "7d" => Ok(Timeframe::SevenDays),
            "30d" => Ok(Timeframe::ThirtyDays),
            "90d" => Ok(Timeframe::NinetyDays),
            "1y" | "365d" => Ok(Timeframe::OneYear),
            other => Err(Error::PeriodParse(format!(
                "unknown timeframe: {other} (expected 7d, 30d, 90d or 1y)"
            ))),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Timeframe::SevenDays => "7d",
            Timeframe::ThirtyDays => "30d",
            Timeframe::NinetyDays => "90d",
            Timeframe::OneYear => "1y",
        }
    }

    /// `(period_length_days, period_count)` used for chart buckets.
    ///
    /// This is a fixed policy table, not derived from `span_days`: the
    /// 30d preset covers 35 days and the 1y preset 360.
    pub fn bucket_spec(&self) -> (i64, usize) {
        match self {
            Timeframe::SevenDays => (1, 7),
            Timeframe::ThirtyDays => (7, 5),
            Timeframe::NinetyDays => (7, 13),
            Timeframe::OneYear => (30, 12),
        }
    }

    /// Length of the current/previous comparison windows.
    pub fn span_days(&self) -> i64 {
        match self {
            Timeframe::SevenDays => 7,
            Timeframe::ThirtyDays => 30,
            Timeframe::NinetyDays => 90,
            Timeframe::OneYear => 365,
        }
    }
}

/// One time bucket `[start, end)` and the records that fall in it.
#[derive(Debug, Clone)]
pub struct Bucket<T> {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub label: String,
    pub items: Vec<T>,
}

impl<T> Bucket<T> {
    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

/// Split the range ending at `range_end` into `period_count` buckets of
/// `period_length_days` each, walking backward, and assign every record to
/// the bucket whose half-open window holds `time_of(record)`. Buckets come
/// back oldest first; records outside the covered range are ignored.
pub fn bucket<'a, T, F>(
    records: &'a [T],
    time_of: F,
    range_end: DateTime<Utc>,
    period_length_days: i64,
    period_count: usize,
) -> Vec<Bucket<&'a T>>
where
    F: Fn(&T) -> DateTime<Utc>,
{
    let step = Duration::days(period_length_days);
    let mut buckets: Vec<Bucket<&T>> = (0..period_count)
        .rev()
        .map(|i| {
            let end = range_end - step * i as i32;
            let start = end - step;
            Bucket {
                start,
                end,
                label: short_label(start),
                items: Vec::new(),
            }
        })
        .collect();

    let (Some(first), Some(last)) = (buckets.first(), buckets.last()) else {
        return buckets;
    };
    let (range_start, range_end) = (first.start, last.end);

    for record in records {
        let ts = time_of(record);
        if ts < range_start || ts >= range_end {
            continue;
        }
        let idx = ((ts - range_start).num_seconds() / step.num_seconds()) as usize;
        // Guard against rounding at the upper edge.
        let idx = idx.min(buckets.len() - 1);
        buckets[idx].items.push(record);
    }
    buckets
}

/// Bucket records using a timeframe preset.
pub fn bucket_timeframe<'a, T, F>(
    records: &'a [T],
    time_of: F,
    range_end: DateTime<Utc>,
    timeframe: Timeframe,
) -> Vec<Bucket<&'a T>>
where
    F: Fn(&T) -> DateTime<Utc>,
{
    let (days, count) = timeframe.bucket_spec();
    bucket(records, time_of, range_end, days, count)
}
