pub mod analytics;
pub mod date_util;
pub mod error;
pub mod query;
pub mod records;
pub mod report;
pub mod storage;
pub mod template;

pub use analytics::{AnalyticsSnapshot, Timeframe};
pub use error::{Advisory, Error, Result};
pub use query::period::{Period, ReportPeriod};
pub use records::{Alert, Caller, Milestone, Project, ProgressUpdate, Role, Transaction, User};
pub use report::{Comparison, ProjectProgressReport, StoredReport};
pub use storage::repository::ReportRow;
pub use storage::Database;
pub use template::{ReportTemplate, TemplateRegistry, Variables};

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use analytics::RecordSet;
use report::{
    compare, compose_report, period_metrics, ChronologicalUpdates, ComposeOptions, ReportInputs,
};
use storage::repository;

pub const REPORT_TTL_DAYS_KEY: &str = "report_ttl_days";
pub const DEFAULT_TEMPLATE_KEY: &str = "default_template";
const DEFAULT_REPORT_TTL_DAYS: i64 = 7;

/// Runtime settings read from `app_config`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineSettings {
    /// Days until a generated report is considered stale.
    pub report_ttl_days: i64,
    /// Template applied when a request names none.
    pub default_template: Option<String>,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            report_ttl_days: DEFAULT_REPORT_TTL_DAYS,
            default_template: None,
        }
    }
}

impl EngineSettings {
    /// Build settings from stored config pairs. Unknown keys are ignored.
    pub fn from_config(pairs: &[(String, String)]) -> Result<Self> {
        let mut settings = Self::default();
        for (key, value) in pairs {
            settings.apply(key, value)?;
        }
        Ok(settings)
    }

    fn apply(&mut self, key: &str, value: &str) -> Result<()> {
        match key {
            REPORT_TTL_DAYS_KEY => {
                let days: i64 = value
                    .trim()
                    .parse()
                    .map_err(|_| {
                        Error::Config(format!(
                            "{REPORT_TTL_DAYS_KEY} must be a whole number, got '{value}'"
                        ))
                    })?;
                if days <= 0 {
                    return Err(Error::Config(format!(
                        "{REPORT_TTL_DAYS_KEY} must be positive, got {days}"
                    )));
                }
                self.report_ttl_days = days;
            }
            DEFAULT_TEMPLATE_KEY => {
                let id = value.trim();
                self.default_template = (!id.is_empty()).then(|| id.to_string());
            }
            _ => {}
        }
        Ok(())
    }
}

/// Records to load into the store, as read from an import file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RecordBundle {
    pub users: Vec<User>,
    pub projects: Vec<Project>,
    pub progress_updates: Vec<ProgressUpdate>,
    pub milestones: Vec<Milestone>,
    pub alerts: Vec<Alert>,
    pub transactions: Vec<Transaction>,
}

impl RecordBundle {
    pub fn len(&self) -> usize {
        self.users.len()
            + self.projects.len()
            + self.progress_updates.len()
            + self.milestones.len()
            + self.alerts.len()
            + self.transactions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// A request to generate one project report.
#[derive(Debug, Clone)]
pub struct ReportRequest {
    pub project_id: String,
    pub period: ReportPeriod,
    pub template_id: Option<String>,
    pub variables: Variables,
}

impl ReportRequest {
    pub fn new(project_id: impl Into<String>, period: ReportPeriod) -> Self {
        Self {
            project_id: project_id.into(),
            period,
            template_id: None,
            variables: Variables::new(),
        }
    }
}

/// Main entry point: reads records from the store, runs the aggregation
/// components and persists what they produce.
pub struct ReportEngine {
    db: Database,
    templates: TemplateRegistry,
}

impl ReportEngine {
    /// Wrap an open database and make sure the system templates exist.
    pub async fn new(db: Database) -> Result<Self> {
        let templates = TemplateRegistry::new(db.clone());
        templates.ensure_defaults().await?;
        Ok(Self { db, templates })
    }

    pub async fn open() -> Result<Self> {
        Self::new(Database::open().await?).await
    }

    pub async fn open_at(path: impl AsRef<std::path::Path>) -> Result<Self> {
        Self::new(Database::open_at(path).await?).await
    }

    pub async fn open_memory() -> Result<Self> {
        Self::new(Database::open_memory().await?).await
    }

    /// Access the database (for direct queries in the CLI).
    pub fn db(&self) -> &Database {
        &self.db
    }

    pub fn templates(&self) -> &TemplateRegistry {
        &self.templates
    }

    // ── Identity ───────────────────────────────────────────────────

    /// Resolve a stored user into a caller identity.
    pub async fn caller(&self, user_id: &str) -> Result<Caller> {
        let user = self
            .db
            .reader()
            .call({
                let user_id = user_id.to_string();
                move |conn| repository::get_user(conn, &user_id)
            })
            .await?;
        user.map(|u| Caller::from(&u))
            .ok_or_else(|| Error::NotFound(format!("user {user_id}")))
    }

    /// Fails with `NotFound` for an unknown project and `Forbidden` when
    /// the caller has no relationship with it.
    async fn authorize_project(&self, caller: &Caller, project_id: &str) -> Result<Project> {
        let (project, allowed) = self
            .db
            .reader()
            .call({
                let project_id = project_id.to_string();
                let user_id = caller.user_id.clone();
                move |conn| {
                    let project = repository::get_project(conn, &project_id)?;
                    let allowed = repository::has_project_access(conn, &project_id, &user_id)?;
                    Ok::<_, rusqlite::Error>((project, allowed))
                }
            })
            .await?;

        let project = project.ok_or_else(|| Error::NotFound(format!("project {project_id}")))?;
        if !(allowed || caller.role.is_elevated()) {
            return Err(Error::Forbidden(format!(
                "user {} has no access to project {project_id}",
                caller.user_id
            )));
        }
        Ok(project)
    }

    // ── Reports ────────────────────────────────────────────────────

    pub async fn generate_report(
        &self,
        caller: &Caller,
        request: ReportRequest,
    ) -> Result<ProjectProgressReport> {
        self.generate_report_at(caller, request, Utc::now()).await
    }

    /// Compose and store a report as of `as_of`. Each call produces a new
    /// report with its own id.
    pub async fn generate_report_at(
        &self,
        caller: &Caller,
        request: ReportRequest,
        as_of: DateTime<Utc>,
    ) -> Result<ProjectProgressReport> {
        let project = self.authorize_project(caller, &request.project_id).await?;
        let settings = self.settings().await?;

        let template = match request.template_id.or(settings.default_template) {
            Some(id) => {
                let template = self.templates.get(&id).await?;
                if !crate::template::registry::can_view(&template, caller) {
                    return Err(Error::Forbidden(format!(
                        "template {id} is not shared with {}",
                        caller.user_id
                    )));
                }
                Some(template)
            }
            None => None,
        };

        let period = request.period;
        let end = period.end;
        let (updates, milestones, alerts, transactions) = self
            .db
            .reader()
            .call({
                let project_id = project.id.clone();
                move |conn| {
                    Ok::<_, rusqlite::Error>((
                        repository::list_progress_updates(conn, Some(&project_id), end)?,
                        repository::list_milestones(conn, &project_id)?,
                        repository::list_alerts(conn, &project_id, end)?,
                        repository::list_transactions(conn, Some(&project_id), end)?,
                    ))
                }
            })
            .await?;

        let inputs = ReportInputs {
            project,
            updates: ChronologicalUpdates::new(updates),
            milestones,
            alerts,
            transactions,
        };
        let options = ComposeOptions {
            generated_by: caller.user_id.clone(),
            as_of,
            ttl: Duration::days(settings.report_ttl_days),
            template,
            variables: request.variables,
        };
        let report = compose_report(&inputs, &period, &options)?;

        self.db
            .writer()
            .call({
                let report = report.clone();
                move |conn| repository::insert_report(conn, &report)
            })
            .await?;
        log::info!(
            "stored report {} for project {} ({})",
            report.id,
            report.project_id,
            period.label
        );

        if let Some(template_id) = &report.template_id {
            self.templates.record_usage(template_id).await?;
        }
        Ok(report)
    }

    /// A stored report, flagged stale once it is past its TTL at `now`.
    pub async fn report(&self, id: &str, now: DateTime<Utc>) -> Result<StoredReport> {
        let report = self
            .db
            .reader()
            .call({
                let id = id.to_string();
                move |conn| repository::get_report(conn, &id)
            })
            .await?
            .ok_or_else(|| Error::NotFound(format!("report {id}")))?;
        if report.is_stale(now) {
            log::debug!("report {id} expired at {}", report.expires_at);
        }
        Ok(StoredReport::at(report, now))
    }

    pub async fn list_reports(&self, project_id: Option<&str>) -> Result<Vec<ReportRow>> {
        self.db
            .reader()
            .call({
                let project_id = project_id.map(|s| s.to_string());
                move |conn| repository::list_reports(conn, project_id.as_deref())
            })
            .await
            .map_err(|e| Error::Database(e.to_string()))
    }

    // ── Analytics ──────────────────────────────────────────────────

    /// Platform dashboard metrics and charts for the timeframe ending at `as_of`.
    pub async fn analytics(
        &self,
        timeframe: Timeframe,
        as_of: DateTime<Utc>,
    ) -> Result<AnalyticsSnapshot> {
        let records = self
            .db
            .reader()
            .call(move |conn| {
                Ok::<_, rusqlite::Error>(RecordSet {
                    projects: repository::list_projects(conn, as_of)?,
                    updates: repository::list_progress_updates(conn, None, as_of)?,
                    transactions: repository::list_transactions(conn, None, as_of)?,
                    users: repository::list_users(conn, as_of)?,
                })
            })
            .await?;
        Ok(analytics::snapshot(&records, timeframe, as_of))
    }

    /// Compare the last two of `periods` (oldest first) for one project.
    pub async fn compare_periods(
        &self,
        caller: &Caller,
        project_id: &str,
        periods: &[ReportPeriod],
    ) -> Result<Comparison> {
        self.authorize_project(caller, project_id).await?;
        let Some(end) = periods.iter().map(|p| p.end).max() else {
            return Ok(Comparison::default());
        };

        let updates = self
            .db
            .reader()
            .call({
                let project_id = project_id.to_string();
                move |conn| repository::list_progress_updates(conn, Some(&project_id), end)
            })
            .await?;

        let comparison = compare(&period_metrics(&ChronologicalUpdates::new(updates), periods));
        for advisory in &comparison.advisories {
            log::warn!("{advisory}");
        }
        Ok(comparison)
    }

    // ── Import ─────────────────────────────────────────────────────

    /// Upsert every record in the bundle in one transaction. Returns the
    /// number of records written.
    pub async fn import(&self, bundle: RecordBundle) -> Result<usize> {
        let total = bundle.len();
        self.db
            .writer()
            .call(move |conn| {
                let tx = conn.transaction()?;
                for user in &bundle.users {
                    repository::upsert_user(&tx, user)?;
                }
                for project in &bundle.projects {
                    repository::upsert_project(&tx, project)?;
                }
                for update in &bundle.progress_updates {
                    repository::upsert_progress_update(&tx, update)?;
                }
                for milestone in &bundle.milestones {
                    repository::upsert_milestone(&tx, milestone)?;
                }
                for alert in &bundle.alerts {
                    repository::upsert_alert(&tx, alert)?;
                }
                for transaction in &bundle.transactions {
                    repository::upsert_transaction(&tx, transaction)?;
                }
                tx.commit()?;
                Ok::<(), rusqlite::Error>(())
            })
            .await?;
        log::info!("imported {total} record(s)");
        Ok(total)
    }

    // ── Status ─────────────────────────────────────────────────────

    pub async fn status(&self) -> Result<Vec<(&'static str, i64)>> {
        self.db
            .reader()
            .call(|conn| repository::record_counts(conn))
            .await
            .map_err(|e| Error::Database(e.to_string()))
    }

    // ── Config commands ────────────────────────────────────────────

    pub async fn settings(&self) -> Result<EngineSettings> {
        EngineSettings::from_config(&self.config_list().await?)
    }

    pub async fn config_get(&self, key: &str) -> Result<Option<String>> {
        self.db
            .reader()
            .call({
                let key = key.to_string();
                move |conn| repository::get_config(conn, &key)
            })
            .await
            .map_err(|e| Error::Database(e.to_string()))
    }

    /// Store a setting. Known keys are checked before they are written.
    pub async fn config_set(&self, key: &str, value: &str) -> Result<()> {
        EngineSettings::default().apply(key, value)?;
        self.db
            .writer()
            .call({
                let key = key.to_string();
                let value = value.to_string();
                move |conn| repository::set_config(conn, &key, &value)
            })
            .await
            .map_err(|e| Error::Database(e.to_string()))
    }

    pub async fn config_list(&self) -> Result<Vec<(String, String)>> {
        self.db
            .reader()
            .call(|conn| repository::list_config(conn))
            .await
            .map_err(|e| Error::Database(e.to_string()))
    }
}
