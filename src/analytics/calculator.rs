use std::collections::BTreeMap;

use chrono::{DateTime, Duration, Utc};

use super::types::{AnalyticsMetric, ChangeType, MetricCategory, MetricFormat, MetricMeta};
use crate::records::{ImpactValues, ProgressUpdate, Project, Transaction, TransactionStatus, User};

/// Changes within this many percent either way count as stable.
const STABLE_BAND_PCT: f64 = 1.0;

/// Records of every kind the dashboard metrics read.
#[derive(Debug, Clone, Default)]
pub struct RecordSet {
    pub projects: Vec<Project>,
    pub updates: Vec<ProgressUpdate>,
    pub transactions: Vec<Transaction>,
    pub users: Vec<User>,
}

impl RecordSet {
    /// Records created in `[start, end)`.
    pub fn within(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> RecordSet {
        let keep = |ts: DateTime<Utc>| start <= ts && ts < end;
        RecordSet {
            projects: self.projects.iter().filter(|p| keep(p.created_at)).cloned().collect(),
            updates: self.updates.iter().filter(|u| keep(u.created_at)).cloned().collect(),
            transactions: self
                .transactions
                .iter()
                .filter(|t| keep(t.created_at))
                .cloned()
                .collect(),
            users: self.users.iter().filter(|u| keep(u.created_at)).cloned().collect(),
        }
    }

    /// Records created before `end`.
    pub fn before(&self, end: DateTime<Utc>) -> RecordSet {
        self.within(DateTime::<Utc>::MIN_UTC, end)
    }
}

/// The four windows a metrics computation compares.
#[derive(Debug, Clone, Default)]
pub struct MetricWindows {
    /// Start of the current window; also the end of the previous one.
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub previous_start: DateTime<Utc>,
    /// Records created in the current window.
    pub current: RecordSet,
    /// Records created in the window of equal length before it.
    pub previous: RecordSet,
    /// Everything created up to the end of the current window.
    pub all_current: RecordSet,
    /// Everything created up to the end of the previous window.
    pub all_previous: RecordSet,
}

impl MetricWindows {
    /// Slice `all` into the four windows for a span ending at `end`.
    pub fn split(all: &RecordSet, end: DateTime<Utc>, span_days: i64) -> Self {
        let span = Duration::days(span_days);
        let start = end - span;
        let previous_start = start - span;
        MetricWindows {
            start,
            end,
            previous_start,
            current: all.within(start, end),
            previous: all.within(previous_start, start),
            all_current: all.before(end),
            all_previous: all.before(start),
        }
    }
}

pub const TOTAL_PROJECTS: MetricMeta = MetricMeta {
    id: "total_projects",
    name: "Total Projects",
    unit: "projects",
    format: MetricFormat::Number,
    category: MetricCategory::Platform,
    description: "Projects registered on the platform",
};

pub const NEW_PROJECTS: MetricMeta = MetricMeta {
    id: "new_projects",
    name: "New Projects",
    unit: "projects",
    format: MetricFormat::Number,
    category: MetricCategory::Platform,
    description: "Projects registered during the period",
};

pub const PROGRESS_UPDATES: MetricMeta = MetricMeta {
    id: "progress_updates",
    name: "Progress Updates",
    unit: "updates",
    format: MetricFormat::Number,
    category: MetricCategory::Platform,
    description: "Progress updates submitted during the period",
};

pub const REVENUE: MetricMeta = MetricMeta {
    id: "revenue",
    name: "Revenue",
    unit: "USD",
    format: MetricFormat::Currency,
    category: MetricCategory::Financial,
    description: "Value of completed credit purchases",
};

pub const CREDITS_SOLD: MetricMeta = MetricMeta {
    id: "credits_sold",
    name: "Credits Sold",
    unit: "credits",
    format: MetricFormat::Number,
    category: MetricCategory::Financial,
    description: "Credits transferred in completed purchases",
};

pub const CARBON_OFFSET: MetricMeta = MetricMeta {
    id: "carbon_offset",
    name: "Carbon Offset",
    unit: "tCO2e",
    format: MetricFormat::Number,
    category: MetricCategory::Environmental,
    description: "Carbon impact reported across all projects",
};

pub const TREES_PLANTED: MetricMeta = MetricMeta {
    id: "trees_planted",
    name: "Trees Planted",
    unit: "trees",
    format: MetricFormat::Number,
    category: MetricCategory::Environmental,
    description: "Trees planted across all projects",
};

pub const ENERGY_GENERATED: MetricMeta = MetricMeta {
    id: "energy_generated",
    name: "Energy Generated",
    unit: "kWh",
    format: MetricFormat::Number,
    category: MetricCategory::Environmental,
    description: "Renewable energy generated across all projects",
};

pub const NEW_USERS: MetricMeta = MetricMeta {
    id: "new_users",
    name: "New Users",
    unit: "users",
    format: MetricFormat::Number,
    category: MetricCategory::User,
    description: "Accounts created during the period",
};

pub const TOTAL_USERS: MetricMeta = MetricMeta {
    id: "total_users",
    name: "Total Users",
    unit: "users",
    format: MetricFormat::Number,
    category: MetricCategory::User,
    description: "Registered accounts",
};

/// Compare `value` with `previous`. Pure and total: non-finite inputs are
/// treated as zero, and a zero previous value never divides.
pub fn compute_metric(value: f64, previous: f64, meta: &MetricMeta) -> AnalyticsMetric {
    let value = if value.is_finite() { value } else { 0.0 };
    let previous = if previous.is_finite() { previous } else { 0.0 };

    let (change, change_type) = if previous == 0.0 {
        if value > 0.0 {
            (100.0, ChangeType::Increase)
        } else {
            (0.0, ChangeType::Stable)
        }
    } else {
        let raw = (value - previous) / previous.abs() * 100.0;
        let change_type = if raw.abs() <= STABLE_BAND_PCT {
            ChangeType::Stable
        } else if raw > 0.0 {
            ChangeType::Increase
        } else {
            ChangeType::Decrease
        };
        (raw.abs(), change_type)
    };

    AnalyticsMetric {
        id: meta.id.to_string(),
        name: meta.name.to_string(),
        value,
        previous_value: previous,
        change,
        change_type,
        unit: meta.unit.to_string(),
        format: meta.format,
        category: meta.category,
        description: meta.description.to_string(),
    }
}

/// Compute the full dashboard metric catalogue from pre-fetched windows.
pub fn compute_metrics(windows: &MetricWindows) -> Vec<AnalyticsMetric> {
    let cur = &windows.current;
    let prev = &windows.previous;

    let cur_impact = impact_growth(&windows.all_current.updates, windows.start, windows.end);
    let prev_impact = impact_growth(
        &windows.all_previous.updates,
        windows.previous_start,
        windows.start,
    );

    vec![
        compute_metric(
            windows.all_current.projects.len() as f64,
            windows.all_previous.projects.len() as f64,
            &TOTAL_PROJECTS,
        ),
        compute_metric(cur.projects.len() as f64, prev.projects.len() as f64, &NEW_PROJECTS),
        compute_metric(cur.updates.len() as f64, prev.updates.len() as f64, &PROGRESS_UPDATES),
        compute_metric(
            completed_sum(&cur.transactions, |t| t.amount),
            completed_sum(&prev.transactions, |t| t.amount),
            &REVENUE,
        ),
        compute_metric(
            completed_sum(&cur.transactions, |t| t.credits),
            completed_sum(&prev.transactions, |t| t.credits),
            &CREDITS_SOLD,
        ),
        compute_metric(cur_impact.carbon_impact, prev_impact.carbon_impact, &CARBON_OFFSET),
        compute_metric(cur_impact.trees_planted, prev_impact.trees_planted, &TREES_PLANTED),
        compute_metric(
            cur_impact.energy_generated,
            prev_impact.energy_generated,
            &ENERGY_GENERATED,
        ),
        compute_metric(cur.users.len() as f64, prev.users.len() as f64, &NEW_USERS),
        compute_metric(
            windows.all_current.users.len() as f64,
            windows.all_previous.users.len() as f64,
            &TOTAL_USERS,
        ),
    ]
}

/// Sum a field over completed transactions.
pub fn completed_sum<'a, I, F>(transactions: I, field: F) -> f64
where
    I: IntoIterator<Item = &'a Transaction>,
    F: Fn(&Transaction) -> f64,
{
    transactions
        .into_iter()
        .filter(|t| t.status == TransactionStatus::Completed)
        .map(|t| field(t))
        .sum()
}

/// Impact reported during `[start, end)`, summed across projects.
///
/// Updates carry cumulative values, so each project contributes its last
/// update before `end` minus its last update before `start` (zero when it
/// had none). A single update inside the window still counts in full.
pub fn impact_growth<'a, I>(updates: I, start: DateTime<Utc>, end: DateTime<Utc>) -> ImpactValues
where
    I: IntoIterator<Item = &'a ProgressUpdate>,
{
    let mut by_project: BTreeMap<&str, (Option<&ProgressUpdate>, Option<&ProgressUpdate>)> =
        BTreeMap::new();
    for u in updates.into_iter().filter(|u| u.created_at < end) {
        let (baseline, closing) = by_project.entry(u.project_id.as_str()).or_default();
        if u.created_at < start && baseline.is_none_or(|b| u.created_at >= b.created_at) {
            *baseline = Some(u);
        }
        if closing.is_none_or(|c| u.created_at >= c.created_at) {
            *closing = Some(u);
        }
    }
    by_project
        .values()
        .fold(ImpactValues::default(), |acc, (baseline, closing)| {
            let before = baseline.map(|u| u.impact).unwrap_or_default();
            let after = closing.map(|u| u.impact).unwrap_or_default();
            acc.plus(&after.minus(&before))
        })
}
