use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::error::Advisory;
use crate::query::period::ReportPeriod;
use crate::records::{Impact, ImpactValues, MilestoneStatus, ProgressUpdate, Severity};

/// Progress updates sorted oldest first.
///
/// The constructor sorts, so "earliest" and "latest" can be read by
/// position and windows sliced by binary search.
#[derive(Debug, Clone, Default)]
pub struct ChronologicalUpdates(Vec<ProgressUpdate>);

impl ChronologicalUpdates {
    pub fn new(mut updates: Vec<ProgressUpdate>) -> Self {
        updates.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Self(updates)
    }

    pub fn as_slice(&self) -> &[ProgressUpdate] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Updates created in `[start, end)`.
    pub fn within(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> &[ProgressUpdate] {
        let lo = self.0.partition_point(|u| u.created_at < start);
        let hi = self.0.partition_point(|u| u.created_at < end);
        &self.0[lo..hi.max(lo)]
    }

    /// The most recent update created before `end`.
    pub fn latest_before(&self, end: DateTime<Utc>) -> Option<&ProgressUpdate> {
        let hi = self.0.partition_point(|u| u.created_at < end);
        hi.checked_sub(1).map(|i| &self.0[i])
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReportStatus {
    Draft,
    Final,
    Approved,
    Archived,
}

impl ReportStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReportStatus::Draft => "draft",
            ReportStatus::Final => "final",
            ReportStatus::Approved => "approved",
            ReportStatus::Archived => "archived",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimelineHealth {
    OnTrack,
    Delayed,
    Ahead,
    Critical,
}

impl TimelineHealth {
    pub fn as_str(&self) -> &'static str {
        match self {
            TimelineHealth::OnTrack => "on_track",
            TimelineHealth::Delayed => "delayed",
            TimelineHealth::Ahead => "ahead",
            TimelineHealth::Critical => "critical",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimelineItem {
    pub id: String,
    pub title: String,
    pub description: String,
    pub planned_date: NaiveDate,
    pub actual_date: Option<NaiveDate>,
    pub status: MilestoneStatus,
    pub dependencies: Vec<String>,
    pub impact: Impact,
    pub delay_reason: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimelineData {
    pub project_start_date: Option<NaiveDate>,
    pub expected_completion_date: Option<NaiveDate>,
    pub current_phase: String,
    pub phases_completed: usize,
    pub total_phases: usize,
    /// Every milestone, ordered by planned date.
    pub items: Vec<TimelineItem>,
    pub critical_path: Vec<TimelineItem>,
    /// Pending and not yet due, soonest first.
    pub upcoming_milestones: Vec<TimelineItem>,
    pub delayed_items: Vec<TimelineItem>,
    pub health: TimelineHealth,
    pub last_update_at: Option<DateTime<Utc>>,
}

impl TimelineData {
    /// Neutral timeline for a project without milestones.
    pub fn empty() -> Self {
        TimelineData {
            project_start_date: None,
            expected_completion_date: None,
            current_phase: "Unknown".to_string(),
            phases_completed: 0,
            total_phases: 0,
            items: Vec::new(),
            critical_path: Vec::new(),
            upcoming_milestones: Vec::new(),
            delayed_items: Vec::new(),
            health: TimelineHealth::OnTrack,
            last_update_at: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectSummary {
    pub project_name: String,
    pub project_type: String,
    pub location: Option<String>,
    /// Latest reported completion percentage at or before the period end.
    pub overall_progress: f64,
    pub updates_in_period: usize,
    pub milestones_completed: usize,
    pub milestones_total: usize,
    pub timeline_health: TimelineHealth,
    pub highlights: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrendDirection {
    Increasing,
    Decreasing,
    Stable,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricTrend {
    pub metric: String,
    pub direction: TrendDirection,
    /// Signed change of the latest delta against the prior one, in percent.
    pub change_percent: f64,
    pub latest_delta: f64,
    pub prior_delta: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnvironmentalMetrics {
    /// Growth within the period (latest minus earliest update).
    pub period: ImpactValues,
    /// Latest cumulative values.
    pub cumulative: ImpactValues,
    pub targets: ImpactValues,
    /// `cumulative - targets`, signed.
    pub variance: ImpactValues,
    pub trends: Vec<MetricTrend>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MilestoneProgress {
    pub milestone_id: String,
    pub title: String,
    pub status: MilestoneStatus,
    pub planned_date: NaiveDate,
    pub actual_date: Option<NaiveDate>,
    pub progress_percent: f64,
    /// Days late (positive) or early (negative); `None` while still on time.
    pub schedule_variance_days: Option<i64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChallengeCategory {
    Technical,
    Environmental,
    Financial,
    Regulatory,
    Community,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Challenge {
    pub id: String,
    pub title: String,
    pub description: String,
    pub category: ChallengeCategory,
    pub severity: Severity,
    pub is_resolved: bool,
    pub resolution: Option<String>,
    pub reported_at: DateTime<Utc>,
    pub resolved_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Achievement {
    pub id: String,
    pub title: String,
    pub description: String,
    pub achieved_on: Option<NaiveDate>,
    pub milestone_id: String,
    pub impact: Impact,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FinancialSummary {
    pub total_revenue: f64,
    pub period_revenue: f64,
    pub credits_sold: f64,
    pub period_credits_sold: f64,
    pub average_credit_price: f64,
    pub transactions_in_period: usize,
    pub pending_transactions: usize,
    pub budget: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportPhoto {
    pub id: String,
    pub url: String,
    pub thumbnail_url: String,
    pub caption: Option<String>,
    pub update_id: String,
    pub taken_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SectionVariant {
    /// Condition held (or there was none).
    Full,
    /// Required section whose condition failed.
    Fallback,
}

/// A template section bound to report data.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComposedSection {
    pub id: String,
    pub title: String,
    pub kind: String,
    pub order: i32,
    pub variant: SectionVariant,
    pub body: Option<String>,
    pub data: serde_json::Value,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectProgressReport {
    pub id: String,
    pub project_id: String,
    pub title: String,
    pub report_period: ReportPeriod,
    pub summary: ProjectSummary,
    pub timeline: TimelineData,
    pub metrics: EnvironmentalMetrics,
    pub milestones: Vec<MilestoneProgress>,
    pub challenges: Vec<Challenge>,
    pub achievements: Vec<Achievement>,
    pub financials: FinancialSummary,
    pub photos: Vec<ReportPhoto>,
    pub recommendations: Vec<String>,
    pub next_period_plan: Vec<String>,
    pub generated_at: DateTime<Utc>,
    pub generated_by: String,
    pub status: ReportStatus,
    pub expires_at: DateTime<Utc>,
    pub template_id: Option<String>,
    pub sections: Vec<ComposedSection>,
    pub advisories: Vec<Advisory>,
}

impl ProjectProgressReport {
    /// Past its TTL; must be regenerated rather than served.
    pub fn is_stale(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }
}

/// A report read back from storage, flagged when it has outlived its TTL.
#[derive(Debug, Clone, Serialize)]
pub struct StoredReport {
    pub is_stale: bool,
    #[serde(flatten)]
    pub report: ProjectProgressReport,
}

impl StoredReport {
    pub fn at(report: ProjectProgressReport, now: DateTime<Utc>) -> Self {
        Self {
            is_stale: report.is_stale(now),
            report,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::date_util::parse_timestamp;

    fn update(id: &str, at: &str) -> ProgressUpdate {
        ProgressUpdate {
            id: id.into(),
            project_id: "p1".into(),
            reported_by: "u1".into(),
            title: id.into(),
            description: String::new(),
            progress_percentage: 0.0,
            impact: ImpactValues::default(),
            photos: vec![],
            created_at: parse_timestamp(at).unwrap(),
        }
    }

    #[test]
    fn test_chronological_updates_sorts_and_slices() {
        let updates = ChronologicalUpdates::new(vec![
            update("c", "2025-03-01"),
            update("a", "2025-01-01"),
            update("b", "2025-02-01"),
        ]);
        let ids: Vec<&str> = updates.as_slice().iter().map(|u| u.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b", "c"]);

        let window = updates.within(
            parse_timestamp("2025-02-01").unwrap(),
            parse_timestamp("2025-03-01").unwrap(),
        );
        assert_eq!(window.len(), 1);
        assert_eq!(window[0].id, "b");

        assert_eq!(
            updates.latest_before(parse_timestamp("2025-03-01").unwrap()).unwrap().id,
            "b"
        );
        assert!(updates.latest_before(parse_timestamp("2024-12-31").unwrap()).is_none());
    }
}
