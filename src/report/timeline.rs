use chrono::NaiveDate;

use super::types::{TimelineData, TimelineHealth, TimelineItem};
use crate::error::Advisory;
use crate::records::{Impact, Milestone, MilestoneStatus, ProgressUpdate};

/// Share of delayed phases above which the timeline is critical.
const CRITICAL_DELAYED_SHARE: f64 = 0.30;
/// Share of completed phases above which the timeline is ahead.
const AHEAD_COMPLETED_SHARE: f64 = 0.80;

/// Derive the timeline of a project from its milestones.
///
/// Fails closed: with no milestones there is nothing to derive dates or
/// health from, and the caller records `MissingTimelineData` and falls back
/// to [`TimelineData::empty`].
pub fn synthesize_timeline(
    project_id: &str,
    milestones: &[Milestone],
    updates: &[ProgressUpdate],
    today: NaiveDate,
) -> Result<TimelineData, Advisory> {
    if milestones.is_empty() {
        return Err(Advisory::MissingTimelineData {
            project_id: project_id.to_string(),
        });
    }

    let mut items: Vec<TimelineItem> = milestones.iter().map(to_item).collect();
    items.sort_by(|a, b| a.planned_date.cmp(&b.planned_date).then_with(|| a.id.cmp(&b.id)));

    let with_status = |status: MilestoneStatus| -> Vec<TimelineItem> {
        items.iter().filter(|i| i.status == status).cloned().collect()
    };

    let phases_completed = items
        .iter()
        .filter(|i| i.status == MilestoneStatus::Completed)
        .count();
    let current_phase = items
        .iter()
        .find(|i| i.status == MilestoneStatus::InProgress)
        .map(|i| i.title.clone())
        .unwrap_or_else(|| "Unknown".to_string());
    let critical_path = items
        .iter()
        .filter(|i| i.impact == Impact::Critical)
        .cloned()
        .collect();
    let upcoming_milestones = items
        .iter()
        .filter(|i| i.status == MilestoneStatus::Pending && i.planned_date > today)
        .cloned()
        .collect();
    let delayed_items = with_status(MilestoneStatus::Delayed);

    let health = timeline_health(delayed_items.len(), phases_completed, items.len());

    Ok(TimelineData {
        project_start_date: items.first().map(|i| i.planned_date),
        expected_completion_date: items.last().map(|i| i.planned_date),
        current_phase,
        phases_completed,
        total_phases: items.len(),
        critical_path,
        upcoming_milestones,
        delayed_items,
        health,
        last_update_at: updates.iter().map(|u| u.created_at).max(),
        items,
    })
}

/// First matching rule wins: critical, delayed, ahead, on track.
pub fn timeline_health(delayed: usize, completed: usize, total: usize) -> TimelineHealth {
    if total == 0 {
        return TimelineHealth::OnTrack;
    }
    let total = total as f64;
    if delayed as f64 / total > CRITICAL_DELAYED_SHARE {
        TimelineHealth::Critical
    } else if delayed > 0 {
        TimelineHealth::Delayed
    } else if completed as f64 / total > AHEAD_COMPLETED_SHARE {
        TimelineHealth::Ahead
    } else {
        TimelineHealth::OnTrack
    }
}

fn to_item(m: &Milestone) -> TimelineItem {
    TimelineItem {
        id: m.id.clone(),
        title: m.title.clone(),
        description: m.description.clone(),
        planned_date: m.planned_date,
        actual_date: m.actual_date,
        status: m.status,
        dependencies: m.dependencies.clone(),
        impact: m.impact,
        delay_reason: m.delay_reason.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn day(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    fn milestone(id: &str, planned: &str, status: MilestoneStatus, impact: Impact) -> Milestone {
        Milestone {
            id: id.into(),
            project_id: "p1".into(),
            title: format!("Phase {id}"),
            description: String::new(),
            planned_date: day(planned),
            actual_date: None,
            status,
            impact,
            dependencies: vec![],
            delay_reason: None,
        }
    }

    fn set(statuses: &[(MilestoneStatus, usize)]) -> Vec<Milestone> {
        let mut out = Vec::new();
        for (status, n) in statuses {
            for _ in 0..*n {
                let i = out.len();
                out.push(milestone(
                    &format!("m{i}"),
                    &format!("2025-{:02}-01", i % 12 + 1),
                    *status,
                    Impact::Medium,
                ));
            }
        }
        out
    }

    fn health_of(milestones: &[Milestone]) -> TimelineHealth {
        synthesize_timeline("p1", milestones, &[], day("2025-06-15"))
            .unwrap()
            .health
    }

    #[test]
    fn test_health_rules() {
        use MilestoneStatus::*;
        assert_eq!(health_of(&set(&[(Delayed, 4), (Pending, 6)])), TimelineHealth::Critical);
        assert_eq!(health_of(&set(&[(Delayed, 1), (Pending, 9)])), TimelineHealth::Delayed);
        assert_eq!(health_of(&set(&[(Completed, 9), (Pending, 1)])), TimelineHealth::Ahead);
        assert_eq!(health_of(&set(&[(Completed, 5), (Pending, 5)])), TimelineHealth::OnTrack);
    }

    #[test]
    fn test_exactly_thirty_percent_delayed_is_not_critical() {
        use MilestoneStatus::*;
        assert_eq!(health_of(&set(&[(Delayed, 3), (Completed, 7)])), TimelineHealth::Delayed);
        // Delay outranks completion.
        assert_eq!(health_of(&set(&[(Delayed, 1), (Completed, 9)])), TimelineHealth::Delayed);
    }

    #[test]
    fn test_empty_milestones_fail_closed() {
        let err = synthesize_timeline("p9", &[], &[], day("2025-01-01")).unwrap_err();
        assert_eq!(
            err,
            Advisory::MissingTimelineData {
                project_id: "p9".into()
            }
        );
    }

    #[test]
    fn test_derived_sets() {
        let milestones = vec![
            milestone("late", "2025-03-01", MilestoneStatus::Delayed, Impact::Critical),
            milestone("done", "2025-01-10", MilestoneStatus::Completed, Impact::Low),
            milestone("now", "2025-05-01", MilestoneStatus::InProgress, Impact::High),
            milestone("next2", "2025-09-01", MilestoneStatus::Pending, Impact::Critical),
            milestone("next1", "2025-07-01", MilestoneStatus::Pending, Impact::Medium),
            milestone("overdue", "2025-06-01", MilestoneStatus::Pending, Impact::Medium),
        ];
        let t = synthesize_timeline("p1", &milestones, &[], day("2025-06-15")).unwrap();

        assert_eq!(t.phases_completed, 1);
        assert_eq!(t.total_phases, 6);
        assert_eq!(t.current_phase, "Phase now");
        assert_eq!(t.project_start_date, Some(day("2025-01-10")));
        assert_eq!(t.expected_completion_date, Some(day("2025-09-01")));

        let ids = |items: &[TimelineItem]| items.iter().map(|i| i.id.clone()).collect::<Vec<_>>();
        assert_eq!(ids(&t.critical_path), vec!["late", "next2"]);
        assert_eq!(ids(&t.upcoming_milestones), vec!["next1", "next2"]);
        assert_eq!(ids(&t.delayed_items), vec!["late"]);
        assert_eq!(t.items.first().unwrap().id, "done");
        assert_eq!(t.health, TimelineHealth::Delayed);
    }

    #[test]
    fn test_no_in_progress_phase_is_unknown() {
        let milestones = set(&[(MilestoneStatus::Pending, 2)]);
        let t = synthesize_timeline("p1", &milestones, &[], day("2024-01-01")).unwrap();
        assert_eq!(t.current_phase, "Unknown");
        assert!(t.last_update_at.is_none());
    }
}
