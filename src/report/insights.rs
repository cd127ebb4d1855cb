use serde::{Deserialize, Serialize};

use super::types::{ChronologicalUpdates, MetricTrend, TrendDirection};
use crate::error::Advisory;
use crate::query::period::ReportPeriod;
use crate::records::ImpactValues;

pub const PROGRESS: &str = "progress";
pub const CARBON_IMPACT: &str = "carbon_impact";

/// How much a project moved during one period.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PeriodMetrics {
    pub period: ReportPeriod,
    /// Percentage points of completion gained.
    pub progress_delta: f64,
    /// Growth of each cumulative impact value.
    pub impact_delta: ImpactValues,
    pub update_count: usize,
}

impl PeriodMetrics {
    /// `(metric, delta)` pairs in a fixed order.
    fn deltas(&self) -> Vec<(&'static str, f64)> {
        let mut out = vec![(PROGRESS, self.progress_delta)];
        out.extend(self.impact_delta.entries());
        out
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Comparison {
    pub trends: Vec<MetricTrend>,
    pub insights: Vec<String>,
    pub advisories: Vec<Advisory>,
}

/// Measure each window against the last update before it.
///
/// The baseline is the latest update created before the window starts (or
/// zero), so a window holding a single update still shows its growth.
pub fn period_metrics(
    updates: &ChronologicalUpdates,
    windows: &[ReportPeriod],
) -> Vec<PeriodMetrics> {
    windows
        .iter()
        .map(|window| {
            let baseline = updates.latest_before(window.start);
            let closing = updates.latest_before(window.end);
            let (progress_delta, impact_delta) = match (baseline, closing) {
                (Some(b), Some(c)) => (
                    c.progress_percentage - b.progress_percentage,
                    c.impact.minus(&b.impact),
                ),
                (None, Some(c)) => (c.progress_percentage, c.impact),
                _ => (0.0, ImpactValues::default()),
            };
            PeriodMetrics {
                period: window.clone(),
                progress_delta,
                impact_delta,
                update_count: updates.within(window.start, window.end).len(),
            }
        })
        .collect()
}

/// Compare the last two periods metric by metric.
///
/// Fewer than two periods yields an empty comparison. A metric whose prior
/// delta is zero has no defined percent change and is reported as stable
/// at 0% with a `ComputationDegenerate` advisory.
pub fn compare(periods: &[PeriodMetrics]) -> Comparison {
    let [.., prior, latest] = periods else {
        return Comparison::default();
    };

    let mut comparison = Comparison::default();
    let pairs = latest.deltas().into_iter().zip(prior.deltas());
    for ((metric, latest_delta), (_, prior_delta)) in pairs {
        let trend = if prior_delta == 0.0 || !prior_delta.is_finite() || !latest_delta.is_finite() {
            comparison.advisories.push(Advisory::ComputationDegenerate {
                metric: metric.to_string(),
            });
            MetricTrend {
                metric: metric.to_string(),
                direction: TrendDirection::Stable,
                change_percent: 0.0,
                latest_delta,
                prior_delta,
            }
        } else {
            let direction = if latest_delta > prior_delta {
                TrendDirection::Increasing
            } else {
                TrendDirection::Decreasing
            };
            MetricTrend {
                metric: metric.to_string(),
                direction,
                change_percent: (latest_delta - prior_delta) / prior_delta * 100.0,
                latest_delta,
                prior_delta,
            }
        };
        comparison.trends.push(trend);
    }

    for trend in &comparison.trends {
        if trend.direction != TrendDirection::Increasing {
            continue;
        }
        match trend.metric.as_str() {
            PROGRESS => comparison.insights.push(format!(
                "Progress velocity increased by {:.1}% compared with {}",
                trend.change_percent, prior.period.label
            )),
            CARBON_IMPACT => comparison.insights.push(format!(
                "Carbon impact grew {:.1}% faster than in {}",
                trend.change_percent, prior.period.label
            )),
            _ => {}
        }
    }

    comparison
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::date_util::parse_timestamp;
    use crate::records::ProgressUpdate;

    fn window(start: &str, end: &str, label: &str) -> ReportPeriod {
        ReportPeriod::new(parse_timestamp(start).unwrap(), parse_timestamp(end).unwrap(), label)
    }

    fn metrics(label: &str, progress: f64, carbon: f64) -> PeriodMetrics {
        PeriodMetrics {
            period: window("2025-01-01", "2025-02-01", label),
            progress_delta: progress,
            impact_delta: ImpactValues {
                carbon_impact: carbon,
                trees_planted: 10.0,
                energy_generated: 5.0,
                waste_processed: 1.0,
                area_restored: 2.0,
            },
            update_count: 1,
        }
    }

    fn trend<'a>(c: &'a Comparison, metric: &str) -> &'a MetricTrend {
        c.trends.iter().find(|t| t.metric == metric).unwrap()
    }

    #[test]
    fn test_fewer_than_two_periods_is_empty() {
        assert_eq!(compare(&[]), Comparison::default());
        assert_eq!(compare(&[metrics("Jan", 5.0, 1.0)]), Comparison::default());
    }

    #[test]
    fn test_trend_direction_and_percent() {
        let c = compare(&[metrics("Jan", 10.0, 4.0), metrics("Feb", 15.0, 2.0)]);
        let progress = trend(&c, PROGRESS);
        assert_eq!(progress.direction, TrendDirection::Increasing);
        assert_eq!(progress.change_percent, 50.0);
        let carbon = trend(&c, CARBON_IMPACT);
        assert_eq!(carbon.direction, TrendDirection::Decreasing);
        assert_eq!(carbon.change_percent, -50.0);
        // Equal deltas are not an increase.
        assert_eq!(trend(&c, "trees_planted").direction, TrendDirection::Decreasing);
        assert!(c.advisories.is_empty());
    }

    #[test]
    fn test_only_favourable_trends_produce_insights() {
        let c = compare(&[metrics("Jan", 10.0, 4.0), metrics("Feb", 15.0, 2.0)]);
        assert_eq!(c.insights.len(), 1);
        assert!(c.insights[0].starts_with("Progress velocity increased by 50.0%"));

        let c = compare(&[metrics("Jan", 10.0, 4.0), metrics("Feb", 12.0, 8.0)]);
        assert_eq!(c.insights.len(), 2);
        assert!(c.insights[1].contains("Carbon impact"));

        let c = compare(&[metrics("Jan", 10.0, 4.0), metrics("Feb", 5.0, 1.0)]);
        assert!(c.insights.is_empty());
    }

    #[test]
    fn test_zero_prior_delta_is_stable_with_advisory() {
        let c = compare(&[metrics("Jan", 0.0, 4.0), metrics("Feb", 7.0, 4.0)]);
        let progress = trend(&c, PROGRESS);
        assert_eq!(progress.direction, TrendDirection::Stable);
        assert_eq!(progress.change_percent, 0.0);
        assert!(c.advisories.contains(&Advisory::ComputationDegenerate {
            metric: PROGRESS.into()
        }));
        assert!(c.trends.iter().all(|t| t.change_percent.is_finite()));
    }

    #[test]
    fn test_only_last_two_periods_are_compared() {
        let c = compare(&[
            metrics("Dec", 100.0, 100.0),
            metrics("Jan", 10.0, 4.0),
            metrics("Feb", 15.0, 2.0),
        ]);
        assert_eq!(trend(&c, PROGRESS).prior_delta, 10.0);
    }

    #[test]
    fn test_period_metrics_uses_prior_baseline() {
        let update = |id: &str, at: &str, progress: f64, carbon: f64| ProgressUpdate {
            id: id.into(),
            project_id: "p1".into(),
            reported_by: "u1".into(),
            title: id.into(),
            description: String::new(),
            progress_percentage: progress,
            impact: ImpactValues {
                carbon_impact: carbon,
                ..Default::default()
            },
            photos: vec![],
            created_at: parse_timestamp(at).unwrap(),
        };
        let updates = ChronologicalUpdates::new(vec![
            update("u3", "2025-02-20", 45.0, 30.0),
            update("u1", "2025-01-05", 10.0, 5.0),
            update("u2", "2025-01-25", 20.0, 12.0),
        ]);
        let windows = vec![
            window("2025-01-01", "2025-02-01", "January 2025"),
            window("2025-02-01", "2025-03-01", "February 2025"),
            window("2025-03-01", "2025-04-01", "March 2025"),
        ];
        let pm = period_metrics(&updates, &windows);

        assert_eq!(pm[0].progress_delta, 20.0);
        assert_eq!(pm[0].impact_delta.carbon_impact, 12.0);
        assert_eq!(pm[0].update_count, 2);
        assert_eq!(pm[1].progress_delta, 25.0);
        assert_eq!(pm[1].impact_delta.carbon_impact, 18.0);
        assert_eq!(pm[2].progress_delta, 0.0);
        assert_eq!(pm[2].update_count, 0);

        let c = compare(&pm[..2]);
        assert_eq!(trend(&c, PROGRESS).direction, TrendDirection::Increasing);
    }
}
