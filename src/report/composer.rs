use chrono::{DateTime, Duration, NaiveDate, Utc};
use serde_json::{json, Value};

use super::insights::{compare, period_metrics};
use super::timeline::synthesize_timeline;
use super::types::*;
use crate::error::{Advisory, Result};
use crate::query::period::ReportPeriod;
use crate::records::{
    Alert, ImpactValues, Milestone, MilestoneStatus, Project, ProgressUpdate, Transaction,
    TransactionStatus,
};
use crate::template::render::{compose_sections, resolve_variables, Variables};
use crate::template::types::ReportTemplate;
use crate::template::validate::validate;

/// Alert type that surfaces as a report challenge.
const QUALITY_CONCERN: &str = "quality_concern";
/// Below this overall progress the report suggests more resources.
const LOW_PROGRESS_PCT: f64 = 50.0;
const PLAN_ITEMS: usize = 3;

/// Everything fetched for one project, up to the end of the period.
#[derive(Debug, Clone)]
pub struct ReportInputs {
    pub project: Project,
    pub updates: ChronologicalUpdates,
    pub milestones: Vec<Milestone>,
    pub alerts: Vec<Alert>,
    pub transactions: Vec<Transaction>,
}

#[derive(Debug, Clone)]
pub struct ComposeOptions {
    pub generated_by: String,
    /// Generation time; also "today" for schedule checks.
    pub as_of: DateTime<Utc>,
    pub ttl: Duration,
    pub template: Option<ReportTemplate>,
    pub variables: Variables,
}

/// Assemble a final report for `inputs.project` over `period`.
///
/// Sparse data never fails composition: missing milestones or zero-change
/// trends are recorded as advisories and neutral values are used. Only an
/// invalid template or invalid template variables abort.
pub fn compose_report(
    inputs: &ReportInputs,
    period: &ReportPeriod,
    options: &ComposeOptions,
) -> Result<ProjectProgressReport> {
    if let Some(template) = &options.template {
        validate(template).into_result()?;
    }

    let project = &inputs.project;
    let today = options.as_of.date_naive();
    let period_updates = inputs.updates.within(period.start, period.end);
    let mut advisories: Vec<Advisory> = Vec::new();

    log::debug!(
        "composing report for {} over {}: {} updates in period, {} milestones",
        project.id,
        period.label,
        period_updates.len(),
        inputs.milestones.len()
    );

    let timeline = match synthesize_timeline(
        &project.id,
        &inputs.milestones,
        inputs.updates.as_slice(),
        today,
    ) {
        Ok(t) => t,
        Err(advisory) => {
            log::warn!("{advisory}");
            advisories.push(advisory);
            TimelineData::empty()
        }
    };

    let windows = [period.preceding(), period.clone()];
    let comparison = compare(&period_metrics(&inputs.updates, &windows));
    for advisory in &comparison.advisories {
        log::warn!("{advisory}");
    }
    advisories.extend(comparison.advisories);

    let metrics = environmental_metrics(
        project,
        &inputs.updates,
        period_updates,
        period,
        comparison.trends,
    );
    let challenges = challenges(&inputs.alerts);
    let achievements = achievements(&inputs.milestones);
    let overall_progress = inputs
        .updates
        .latest_before(period.end)
        .map(|u| u.progress_percentage)
        .unwrap_or(0.0);

    let summary = ProjectSummary {
        project_name: project.name.clone(),
        project_type: project.project_type.clone(),
        location: project.location.clone(),
        overall_progress,
        updates_in_period: period_updates.len(),
        milestones_completed: achievements.len(),
        milestones_total: inputs.milestones.len(),
        timeline_health: timeline.health,
        highlights: highlights(&metrics.period, &inputs.milestones, period),
    };

    let recommendations = recommendations(overall_progress, &challenges, &timeline);
    let next_period_plan = next_period_plan(&inputs.milestones, today);

    let mut report = ProjectProgressReport {
        id: uuid::Uuid::new_v4().to_string(),
        project_id: project.id.clone(),
        title: format!("{} Progress Report: {}", project.name, period.label),
        report_period: period.clone(),
        summary,
        timeline,
        metrics,
        milestones: inputs.milestones.iter().map(|m| milestone_progress(m, today)).collect(),
        challenges,
        achievements,
        financials: financials(project, &inputs.transactions, period),
        photos: photos(period_updates),
        recommendations,
        next_period_plan,
        generated_at: options.as_of,
        generated_by: options.generated_by.clone(),
        status: ReportStatus::Final,
        expires_at: options.as_of + options.ttl,
        template_id: options.template.as_ref().map(|t| t.id.clone()),
        sections: Vec::new(),
        advisories,
    };

    if let Some(template) = &options.template {
        let builtins = builtin_variables(&report);
        let variables = resolve_variables(template, &options.variables, &builtins)?;
        let mut context = serde_json::to_value(&report)?;
        context["variables"] = json!(variables);
        report.sections = compose_sections(template, &context, &variables);
    }

    Ok(report)
}

/// Values every template can reference without declaring them.
fn builtin_variables(report: &ProjectProgressReport) -> Variables {
    let mut vars = Variables::new();
    vars.insert("project_name".into(), json!(report.summary.project_name));
    vars.insert("project_type".into(), json!(report.summary.project_type));
    vars.insert("period_label".into(), json!(report.report_period.label));
    vars.insert(
        "period_start".into(),
        json!(report.report_period.start.format("%Y-%m-%d").to_string()),
    );
    vars.insert(
        "period_end".into(),
        json!(report.report_period.end.format("%Y-%m-%d").to_string()),
    );
    vars.insert("generated_by".into(), json!(report.generated_by));
    vars.insert("overall_progress".into(), json!(report.summary.overall_progress));
    vars.insert("timeline_health".into(), json!(report.timeline.health.as_str()));
    if let Some(location) = &report.summary.location {
        vars.insert("location".into(), Value::String(location.clone()));
    }
    vars
}

fn environmental_metrics(
    project: &Project,
    updates: &ChronologicalUpdates,
    period_updates: &[ProgressUpdate],
    period: &ReportPeriod,
    trends: Vec<MetricTrend>,
) -> EnvironmentalMetrics {
    let growth = match (period_updates.first(), period_updates.last()) {
        (Some(earliest), Some(latest)) => latest.impact.minus(&earliest.impact),
        _ => ImpactValues::default(),
    };
    let cumulative = updates
        .latest_before(period.end)
        .map(|u| u.impact)
        .unwrap_or_default();
    EnvironmentalMetrics {
        period: growth,
        cumulative,
        targets: project.targets,
        variance: cumulative.minus(&project.targets),
        trends,
    }
}

/// Alerts do not carry a challenge category, so every challenge is
/// reported as technical.
fn challenges(alerts: &[Alert]) -> Vec<Challenge> {
    alerts
        .iter()
        .filter(|a| a.alert_type == QUALITY_CONCERN)
        .map(|a| Challenge {
            id: a.id.clone(),
            title: a.title.clone(),
            description: a.message.clone(),
            category: ChallengeCategory::Technical,
            severity: a.severity,
            is_resolved: a.is_resolved,
            resolution: a.resolution_notes.clone(),
            reported_at: a.created_at,
            resolved_at: a.resolved_at,
        })
        .collect()
}

fn achievements(milestones: &[Milestone]) -> Vec<Achievement> {
    milestones
        .iter()
        .filter(|m| m.status == MilestoneStatus::Completed)
        .map(|m| Achievement {
            id: format!("achievement-{}", m.id),
            title: m.title.clone(),
            description: m.description.clone(),
            achieved_on: m.actual_date,
            milestone_id: m.id.clone(),
            impact: m.impact,
        })
        .collect()
}

fn milestone_progress(m: &Milestone, today: NaiveDate) -> MilestoneProgress {
    let progress_percent = match m.status {
        MilestoneStatus::Completed => 100.0,
        MilestoneStatus::InProgress => 50.0,
        _ => 0.0,
    };
    let schedule_variance_days = match m.actual_date {
        Some(actual) => Some((actual - m.planned_date).num_days()),
        None if m.status != MilestoneStatus::Completed
            && m.status != MilestoneStatus::Cancelled
            && today > m.planned_date =>
        {
            Some((today - m.planned_date).num_days())
        }
        None => None,
    };
    MilestoneProgress {
        milestone_id: m.id.clone(),
        title: m.title.clone(),
        status: m.status,
        planned_date: m.planned_date,
        actual_date: m.actual_date,
        progress_percent,
        schedule_variance_days,
    }
}

fn photos(period_updates: &[ProgressUpdate]) -> Vec<ReportPhoto> {
    period_updates
        .iter()
        .flat_map(|u| {
            u.photos.iter().enumerate().map(move |(i, p)| ReportPhoto {
                id: format!("{}-photo-{}", u.id, i + 1),
                url: p.url.clone(),
                thumbnail_url: p.thumbnail_url.clone().unwrap_or_else(|| p.url.clone()),
                caption: p.caption.clone(),
                update_id: u.id.clone(),
                taken_at: u.created_at,
            })
        })
        .collect()
}

fn financials(
    project: &Project,
    transactions: &[Transaction],
    period: &ReportPeriod,
) -> FinancialSummary {
    let completed: Vec<&Transaction> = transactions
        .iter()
        .filter(|t| t.project_id == project.id && t.created_at < period.end)
        .filter(|t| t.status == TransactionStatus::Completed)
        .collect();
    let in_period: Vec<&Transaction> = completed
        .iter()
        .copied()
        .filter(|t| period.contains(t.created_at))
        .collect();

    let total_revenue: f64 = completed.iter().map(|t| t.amount).sum();
    let credits_sold: f64 = completed.iter().map(|t| t.credits).sum();
    let average_credit_price = if credits_sold > 0.0 {
        total_revenue / credits_sold
    } else {
        project.price_per_credit
    };

    FinancialSummary {
        total_revenue,
        period_revenue: in_period.iter().map(|t| t.amount).sum(),
        credits_sold,
        period_credits_sold: in_period.iter().map(|t| t.credits).sum(),
        average_credit_price,
        transactions_in_period: in_period.len(),
        pending_transactions: transactions
            .iter()
            .filter(|t| t.project_id == project.id && t.status == TransactionStatus::Pending)
            .count(),
        budget: project.budget,
    }
}

fn highlights(
    growth: &ImpactValues,
    milestones: &[Milestone],
    period: &ReportPeriod,
) -> Vec<String> {
    let mut out: Vec<String> = milestones
        .iter()
        .filter(|m| m.status == MilestoneStatus::Completed)
        .filter(|m| {
            m.actual_date
                .is_some_and(|d| period.contains(crate::date_util::start_of_day(d)))
        })
        .map(|m| format!("Completed {}", m.title))
        .collect();
    if growth.carbon_impact > 0.0 {
        out.push(format!("{:.1} tCO2e of carbon impact added", growth.carbon_impact));
    }
    if growth.trees_planted > 0.0 {
        out.push(format!("{:.0} trees planted", growth.trees_planted));
    }
    if growth.energy_generated > 0.0 {
        out.push(format!("{:.0} kWh of clean energy generated", growth.energy_generated));
    }
    out
}

/// Independent rules; every one that applies fires.
fn recommendations(
    overall_progress: f64,
    challenges: &[Challenge],
    timeline: &TimelineData,
) -> Vec<String> {
    let mut out = Vec::new();
    if overall_progress < LOW_PROGRESS_PCT {
        out.push(
            "Consider allocating additional resources to accelerate project progress".to_string(),
        );
    }
    if !challenges.is_empty() {
        out.push(format!(
            "Address the {} reported challenge(s) to keep delivery on schedule",
            challenges.len()
        ));
    }
    if !timeline.delayed_items.is_empty() {
        out.push(
            "Review and revise the project timeline to account for delayed milestones".to_string(),
        );
    }
    out
}

/// The next pending milestones after `today`, soonest first.
fn next_period_plan(milestones: &[Milestone], today: NaiveDate) -> Vec<String> {
    let mut upcoming: Vec<&Milestone> = milestones
        .iter()
        .filter(|m| m.status == MilestoneStatus::Pending && m.planned_date > today)
        .collect();
    upcoming.sort_by_key(|m| m.planned_date);
    upcoming
        .into_iter()
        .take(PLAN_ITEMS)
        .map(|m| format!("Complete {} by {}", m.title, m.planned_date.format("%Y-%m-%d")))
        .collect()
}
