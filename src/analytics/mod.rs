pub mod bucket;
pub mod calculator;
pub mod charts;
pub mod types;

pub use bucket::{bucket, Bucket, Timeframe};
pub use calculator::{compute_metric, compute_metrics, MetricWindows, RecordSet};
pub use charts::{
    build_dashboard_charts, build_distribution_chart, build_time_series_chart, ChartMeta,
};
pub use types::*;

use chrono::{DateTime, Utc};

/// Metrics and charts for a dashboard timeframe ending at `as_of`.
///
/// `records` must hold everything created before `as_of`; the windows are
/// sliced here.
pub fn snapshot(
    records: &RecordSet,
    timeframe: Timeframe,
    as_of: DateTime<Utc>,
) -> AnalyticsSnapshot {
    let windows = MetricWindows::split(records, as_of, timeframe.span_days());
    log::debug!(
        "analytics {}: {} current updates, {} previous updates",
        timeframe.as_str(),
        windows.current.updates.len(),
        windows.previous.updates.len()
    );
    AnalyticsSnapshot {
        timeframe: timeframe.as_str().to_string(),
        generated_at: as_of,
        metrics: compute_metrics(&windows),
        charts: build_dashboard_charts(&windows.all_current, timeframe, as_of),
    }
}
