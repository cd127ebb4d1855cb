use std::collections::HashMap;

use chrono::{DateTime, Utc};

use super::bucket::{bucket_timeframe, Bucket, Timeframe};
use super::calculator::{completed_sum, impact_growth, RecordSet};
use super::types::{AnalyticsChart, ChartDataPoint, ChartType, MetricCategory};

/// Descriptive fields shared by every chart builder.
#[derive(Debug, Clone)]
pub struct ChartMeta {
    pub id: String,
    pub title: String,
    pub chart_type: ChartType,
    pub metrics: Vec<String>,
    pub timeframe: String,
    pub category: MetricCategory,
    /// Timestamp stamped on points that have no time of their own.
    pub as_of: DateTime<Utc>,
}

/// One point per bucket, oldest first. `value_fn` sees the whole bucket so
/// cumulative series can look at its bounds as well as its items.
pub fn build_time_series_chart<T, F>(
    buckets: &[Bucket<T>],
    value_fn: F,
    meta: ChartMeta,
) -> AnalyticsChart
where
    F: Fn(&Bucket<T>) -> f64,
{
    let data = buckets
        .iter()
        .map(|b| ChartDataPoint {
            label: b.label.clone(),
            value: value_fn(b),
            timestamp: b.start,
            metadata: Some(serde_json::json!({ "count": b.items.len() })),
        })
        .collect();

    AnalyticsChart {
        id: meta.id,
        title: meta.title,
        chart_type: meta.chart_type,
        data,
        metrics: meta.metrics,
        timeframe: meta.timeframe,
        category: meta.category,
    }
}

/// Share of records per group as whole percentages, groups in first-seen
/// order. Each share is rounded on its own, so the total may drift from
/// 100 by up to one point per group.
pub fn build_distribution_chart<T, F>(records: &[T], group_by: F, meta: ChartMeta) -> AnalyticsChart
where
    F: Fn(&T) -> String,
{
    let mut order: Vec<String> = Vec::new();
    let mut counts: HashMap<String, usize> = HashMap::new();
    for r in records {
        let key = group_by(r);
        let n = counts.entry(key.clone()).or_insert(0);
        if *n == 0 {
            order.push(key);
        }
        *n += 1;
    }

    let total = records.len();
    let data = order
        .into_iter()
        .map(|label| {
            let count = counts[&label];
            let pct = (count as f64 / total as f64 * 100.0).round();
            ChartDataPoint {
                label,
                value: pct,
                timestamp: meta.as_of,
                metadata: Some(serde_json::json!({ "count": count })),
            }
        })
        .collect();

    AnalyticsChart {
        id: meta.id,
        title: meta.title,
        chart_type: meta.chart_type,
        data,
        metrics: meta.metrics,
        timeframe: meta.timeframe,
        category: meta.category,
    }
}

/// The standard dashboard chart set for a timeframe ending at `range_end`.
pub fn build_dashboard_charts(
    records: &RecordSet,
    timeframe: Timeframe,
    range_end: DateTime<Utc>,
) -> Vec<AnalyticsChart> {
    let meta = |id: &str, title: &str, chart_type, metric: &str, category| ChartMeta {
        id: id.to_string(),
        title: title.to_string(),
        chart_type,
        metrics: vec![metric.to_string()],
        timeframe: timeframe.as_str().to_string(),
        category,
        as_of: range_end,
    };

    let update_buckets = bucket_timeframe(&records.updates, |u| u.created_at, range_end, timeframe);
    let carbon = build_time_series_chart(
        &update_buckets,
        |b| impact_growth(&records.updates, b.start, b.end).carbon_impact,
        meta(
            "carbon_over_time",
            "Carbon Impact Over Time",
            ChartType::Area,
            "carbon_offset",
            MetricCategory::Environmental,
        ),
    );

    let tx_buckets =
        bucket_timeframe(&records.transactions, |t| t.created_at, range_end, timeframe);
    let revenue = build_time_series_chart(
        &tx_buckets,
        |b| completed_sum(b.items.iter().copied(), |t| t.amount),
        meta(
            "revenue_over_time",
            "Revenue Over Time",
            ChartType::Bar,
            "revenue",
            MetricCategory::Financial,
        ),
    );

    let user_buckets = bucket_timeframe(&records.users, |u| u.created_at, range_end, timeframe);
    let users = build_time_series_chart(
        &user_buckets,
        |b| b.len() as f64,
        meta(
            "user_growth",
            "New Users",
            ChartType::Line,
            "new_users",
            MetricCategory::User,
        ),
    );

    let by_type = build_distribution_chart(
        &records.projects,
        |p| p.project_type.clone(),
        meta(
            "projects_by_type",
            "Projects by Type",
            ChartType::Pie,
            "total_projects",
            MetricCategory::Platform,
        ),
    );

    vec![carbon, revenue, users, by_type]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analytics::bucket::bucket;
    use crate::date_util::parse_timestamp;
    use crate::records::{ImpactValues, ProgressUpdate};

    fn ts(s: &str) -> DateTime<Utc> {
        parse_timestamp(s).unwrap()
    }

    fn meta(chart_type: ChartType) -> ChartMeta {
        ChartMeta {
            id: "c".into(),
            title: "Chart".into(),
            chart_type,
            metrics: vec![],
            timeframe: "7d".into(),
            category: MetricCategory::Platform,
            as_of: ts("2025-01-08"),
        }
    }

    #[test]
    fn test_time_series_is_time_ascending() {
        let records = vec![
            ts("2025-01-07T10:00:00Z"),
            ts("2025-01-02T10:00:00Z"),
            ts("2025-01-07T11:00:00Z"),
        ];
        let buckets = bucket(&records, |t| *t, ts("2025-01-08"), 1, 7);
        let chart = build_time_series_chart(&buckets, |b| b.len() as f64, meta(ChartType::Line));
        assert_eq!(chart.data.len(), 7);
        for pair in chart.data.windows(2) {
            assert!(pair[0].timestamp < pair[1].timestamp);
        }
        assert_eq!(chart.data[1].value, 1.0);
        assert_eq!(chart.data[6].value, 2.0);
    }

    #[test]
    fn test_distribution_keeps_insertion_order() {
        let records = vec!["solar", "forest", "solar", "waste"];
        let chart = build_distribution_chart(&records, |r| r.to_string(), meta(ChartType::Pie));
        let labels: Vec<&str> = chart.data.iter().map(|d| d.label.as_str()).collect();
        assert_eq!(labels, vec!["solar", "forest", "waste"]);
        assert_eq!(chart.data[0].value, 50.0);
        assert_eq!(chart.data[1].value, 25.0);
    }

    #[test]
    fn test_distribution_sum_within_rounding_tolerance() {
        let records = vec!["a", "b", "c"];
        let chart = build_distribution_chart(&records, |r| r.to_string(), meta(ChartType::Pie));
        let sum: f64 = chart.data.iter().map(|d| d.value).sum();
        // 33 + 33 + 33: rounding drift is not corrected.
        assert_eq!(sum, 99.0);
        let n = chart.data.len() as f64;
        assert!((sum - 100.0).abs() <= n - 1.0);

        let records: Vec<String> = (0..7).map(|i| format!("g{}", i % 6)).collect();
        let chart = build_distribution_chart(&records, |r| r.clone(), meta(ChartType::Pie));
        let sum: f64 = chart.data.iter().map(|d| d.value).sum();
        let n = chart.data.len() as f64;
        assert!((sum - 100.0).abs() <= n - 1.0, "sum {sum} for {n} buckets");
    }

    #[test]
    fn test_distribution_of_nothing_is_empty() {
        let records: Vec<&str> = vec![];
        let chart = build_distribution_chart(&records, |r| r.to_string(), meta(ChartType::Pie));
        assert!(chart.data.is_empty());
    }

    #[test]
    fn test_dashboard_chart_set() {
        let charts =
            build_dashboard_charts(&RecordSet::default(), Timeframe::NinetyDays, ts("2025-04-01"));
        let ids: Vec<&str> = charts.iter().map(|c| c.id.as_str()).collect();
        assert_eq!(
            ids,
            vec!["carbon_over_time", "revenue_over_time", "user_growth", "projects_by_type"]
        );
        assert_eq!(charts[0].data.len(), 13);
        assert!(charts.iter().all(|c| c.timeframe == "90d"));
    }

    #[test]
    fn test_carbon_chart_with_one_update_per_bucket() {
        let update = |id: &str, at: &str, carbon: f64| ProgressUpdate {
            id: id.into(),
            project_id: "p1".into(),
            reported_by: "u1".into(),
            title: id.into(),
            description: String::new(),
            progress_percentage: 0.0,
            impact: ImpactValues {
                carbon_impact: carbon,
                ..Default::default()
            },
            photos: vec![],
            created_at: ts(at),
        };
        let records = RecordSet {
            updates: vec![
                update("u0", "2024-12-30T12:00:00Z", 5.0),
                update("u1", "2025-01-03T12:00:00Z", 10.0),
                update("u2", "2025-01-05T12:00:00Z", 25.0),
            ],
            ..Default::default()
        };
        let charts = build_dashboard_charts(&records, Timeframe::SevenDays, ts("2025-01-08"));
        let carbon: Vec<f64> = charts[0].data.iter().map(|d| d.value).collect();
        // Buckets start 01-01; u1 grows from the pre-range baseline of 5.
        assert_eq!(carbon, vec![0.0, 0.0, 5.0, 0.0, 15.0, 0.0, 0.0]);
    }
}
