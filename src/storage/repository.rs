use chrono::{DateTime, Utc};
use rusqlite::{params, params_from_iter, Connection, OptionalExtension};
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::date_util::to_key;
use crate::records::{
    Alert, Milestone, ProgressUpdate, Project, Transaction, TransactionStatus, User,
};
use crate::report::types::ProjectProgressReport;
use crate::template::types::ReportTemplate;

// ── Users ──────────────────────────────────────────────────────────

pub fn upsert_user(conn: &Connection, user: &User) -> Result<(), rusqlite::Error> {
    conn.execute(
        "INSERT OR REPLACE INTO users (id, role, created_at, body) VALUES (?1, ?2, ?3, ?4)",
        params![user.id, user.role.as_str(), to_key(user.created_at), to_body(user)?],
    )?;
    Ok(())
}

pub fn get_user(conn: &Connection, id: &str) -> Result<Option<User>, rusqlite::Error> {
    get_body(conn, "SELECT body FROM users WHERE id = ?1", id)
}

pub fn list_users(conn: &Connection, before: DateTime<Utc>) -> Result<Vec<User>, rusqlite::Error> {
    query_bodies(
        conn,
        "SELECT body FROM users WHERE created_at < ?1 ORDER BY created_at, id",
        params![to_key(before)],
    )
}

// ── Projects ───────────────────────────────────────────────────────

pub fn upsert_project(conn: &Connection, project: &Project) -> Result<(), rusqlite::Error> {
    conn.execute(
        "INSERT OR REPLACE INTO projects (id, created_by, project_type, created_at, body)
         VALUES (?1, ?2, ?3, ?4, ?5)",
        params![
            project.id,
            project.created_by,
            project.project_type,
            to_key(project.created_at),
            to_body(project)?,
        ],
    )?;
    Ok(())
}

pub fn get_project(conn: &Connection, id: &str) -> Result<Option<Project>, rusqlite::Error> {
    get_body(conn, "SELECT body FROM projects WHERE id = ?1", id)
}

pub fn list_projects(
    conn: &Connection,
    before: DateTime<Utc>,
) -> Result<Vec<Project>, rusqlite::Error> {
    query_bodies(
        conn,
        "SELECT body FROM projects WHERE created_at < ?1 ORDER BY created_at, id",
        params![to_key(before)],
    )
}

/// True iff the user created the project, completed a credit purchase for
/// it, or holds an elevated role.
pub fn has_project_access(
    conn: &Connection,
    project_id: &str,
    user_id: &str,
) -> Result<bool, rusqlite::Error> {
    conn.query_row(
        "SELECT
            EXISTS (SELECT 1 FROM projects WHERE id = ?1 AND created_by = ?2)
            OR EXISTS (SELECT 1 FROM transactions
                       WHERE project_id = ?1 AND buyer_id = ?2 AND status = ?3)
            OR EXISTS (SELECT 1 FROM users WHERE id = ?2 AND role IN ('admin', 'verifier'))",
        params![project_id, user_id, TransactionStatus::Completed.as_str()],
        |row| row.get(0),
    )
}

// ── Progress Updates ───────────────────────────────────────────────

pub fn upsert_progress_update(
    conn: &Connection,
    update: &ProgressUpdate,
) -> Result<(), rusqlite::Error> {
    conn.execute(
        "INSERT OR REPLACE INTO progress_updates (id, project_id, created_at, body)
         VALUES (?1, ?2, ?3, ?4)",
        params![update.id, update.project_id, to_key(update.created_at), to_body(update)?],
    )?;
    Ok(())
}

/// Updates created before `before`, oldest first. `None` means every project.
pub fn list_progress_updates(
    conn: &Connection,
    project_id: Option<&str>,
    before: DateTime<Utc>,
) -> Result<Vec<ProgressUpdate>, rusqlite::Error> {
    query_bodies(
        conn,
        "SELECT body FROM progress_updates
         WHERE (?1 IS NULL OR project_id = ?1) AND created_at < ?2
         ORDER BY created_at, id",
        params![project_id, to_key(before)],
    )
}

// ── Milestones ─────────────────────────────────────────────────────

pub fn upsert_milestone(conn: &Connection, milestone: &Milestone) -> Result<(), rusqlite::Error> {
    conn.execute(
        "INSERT OR REPLACE INTO milestones (id, project_id, planned_date, status, body)
         VALUES (?1, ?2, ?3, ?4, ?5)",
        params![
            milestone.id,
            milestone.project_id,
            milestone.planned_date.format("%Y-%m-%d").to_string(),
            milestone.status.as_str(),
            to_body(milestone)?,
        ],
    )?;
    Ok(())
}

pub fn list_milestones(
    conn: &Connection,
    project_id: &str,
) -> Result<Vec<Milestone>, rusqlite::Error> {
    query_bodies(
        conn,
        "SELECT body FROM milestones WHERE project_id = ?1 ORDER BY planned_date, id",
        params![project_id],
    )
}

// ── Alerts ─────────────────────────────────────────────────────────

pub fn upsert_alert(conn: &Connection, alert: &Alert) -> Result<(), rusqlite::Error> {
    conn.execute(
        "INSERT OR REPLACE INTO alerts (id, project_id, alert_type, created_at, body)
         VALUES (?1, ?2, ?3, ?4, ?5)",
        params![
            alert.id,
            alert.project_id,
            alert.alert_type,
            to_key(alert.created_at),
            to_body(alert)?,
        ],
    )?;
    Ok(())
}

pub fn list_alerts(
    conn: &Connection,
    project_id: &str,
    before: DateTime<Utc>,
) -> Result<Vec<Alert>, rusqlite::Error> {
    query_bodies(
        conn,
        "SELECT body FROM alerts WHERE project_id = ?1 AND created_at < ?2 ORDER BY created_at, id",
        params![project_id, to_key(before)],
    )
}

// ── Transactions ───────────────────────────────────────────────────

pub fn upsert_transaction(conn: &Connection, tx: &Transaction) -> Result<(), rusqlite::Error> {
    conn.execute(
        "INSERT OR REPLACE INTO transactions (id, project_id, buyer_id, status, created_at, body)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        params![
            tx.id,
            tx.project_id,
            tx.buyer_id,
            tx.status.as_str(),
            to_key(tx.created_at),
            to_body(tx)?,
        ],
    )?;
    Ok(())
}

pub fn list_transactions(
    conn: &Connection,
    project_id: Option<&str>,
    before: DateTime<Utc>,
) -> Result<Vec<Transaction>, rusqlite::Error> {
    query_bodies(
        conn,
        "SELECT body FROM transactions
         WHERE (?1 IS NULL OR project_id = ?1) AND created_at < ?2
         ORDER BY created_at, id",
        params![project_id, to_key(before)],
    )
}

// ── Reports ────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct ReportRow {
    pub id: String,
    pub project_id: String,
    pub template_id: Option<String>,
    pub status: String,
    pub generated_at: String,
    pub expires_at: String,
}

/// Reports are written once; a regenerated report gets a new row.
pub fn insert_report(
    conn: &Connection,
    report: &ProjectProgressReport,
) -> Result<(), rusqlite::Error> {
    conn.execute(
        "INSERT INTO reports (id, project_id, template_id, status, generated_at, expires_at, body)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        params![
            report.id,
            report.project_id,
            report.template_id,
            report.status.as_str(),
            to_key(report.generated_at),
            to_key(report.expires_at),
            to_body(report)?,
        ],
    )?;
    Ok(())
}

pub fn get_report(
    conn: &Connection,
    id: &str,
) -> Result<Option<ProjectProgressReport>, rusqlite::Error> {
    get_body(conn, "SELECT body FROM reports WHERE id = ?1", id)
}

/// Newest first.
pub fn list_reports(
    conn: &Connection,
    project_id: Option<&str>,
) -> Result<Vec<ReportRow>, rusqlite::Error> {
    let mut stmt = conn.prepare(
        "SELECT id, project_id, template_id, status, generated_at, expires_at
         FROM reports WHERE (?1 IS NULL OR project_id = ?1)
         ORDER BY generated_at DESC, id",
    )?;
    let rows = stmt.query_map(params![project_id], |row| {
        Ok(ReportRow {
            id: row.get(0)?,
            project_id: row.get(1)?,
            template_id: row.get(2)?,
            status: row.get(3)?,
            generated_at: row.get(4)?,
            expires_at: row.get(5)?,
        })
    })?;
    rows.collect()
}

// ── Templates ──────────────────────────────────────────────────────

pub fn insert_template(
    conn: &Connection,
    template: &ReportTemplate,
) -> Result<(), rusqlite::Error> {
    conn.execute(
        "INSERT INTO report_templates (
            id, name, template_type, author, is_public, is_editable, version, updated_at, body
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
        params_from_iter(template_params(template)?),
    )?;
    Ok(())
}

/// Insert unless a template with the same id exists. Returns whether a row
/// was written.
pub fn insert_template_if_absent(
    conn: &Connection,
    template: &ReportTemplate,
) -> Result<bool, rusqlite::Error> {
    let count = conn.execute(
        "INSERT OR IGNORE INTO report_templates (
            id, name, template_type, author, is_public, is_editable, version, updated_at, body
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
        params_from_iter(template_params(template)?),
    )?;
    Ok(count > 0)
}

pub fn get_template(
    conn: &Connection,
    id: &str,
) -> Result<Option<ReportTemplate>, rusqlite::Error> {
    get_body(conn, "SELECT body FROM report_templates WHERE id = ?1", id)
}

pub fn list_templates(conn: &Connection) -> Result<Vec<ReportTemplate>, rusqlite::Error> {
    query_bodies(conn, "SELECT body FROM report_templates ORDER BY name, id", [])
}

/// Replace the stored document in one statement. Returns false if absent.
pub fn update_template(
    conn: &Connection,
    template: &ReportTemplate,
) -> Result<bool, rusqlite::Error> {
    let count = conn.execute(
        "UPDATE report_templates SET
            name = ?2, template_type = ?3, author = ?4, is_public = ?5, is_editable = ?6,
            version = ?7, updated_at = ?8, body = ?9
         WHERE id = ?1",
        params_from_iter(template_params(template)?),
    )?;
    Ok(count > 0)
}

pub fn delete_template(conn: &Connection, id: &str) -> Result<bool, rusqlite::Error> {
    let count = conn.execute("DELETE FROM report_templates WHERE id = ?1", params![id])?;
    Ok(count > 0)
}

/// Bump the usage counter inside the stored document.
pub fn record_template_usage(
    conn: &Connection,
    id: &str,
    at: DateTime<Utc>,
) -> Result<bool, rusqlite::Error> {
    let count = conn.execute(
        "UPDATE report_templates SET body = json_set(
            body,
            '$.metadata.usage.times_used',
            COALESCE(json_extract(body, '$.metadata.usage.times_used'), 0) + 1,
            '$.metadata.usage.last_used_at',
            ?2
         )
         WHERE id = ?1",
        params![id, to_key(at)],
    )?;
    Ok(count > 0)
}

fn template_params(t: &ReportTemplate) -> Result<[Box<dyn rusqlite::ToSql>; 9], rusqlite::Error> {
    let p = &t.metadata.permissions;
    Ok([
        Box::new(t.id.clone()),
        Box::new(t.name.clone()),
        Box::new(t.template_type.map(|tt| tt.as_str())),
        Box::new(t.metadata.author.clone()),
        Box::new(p.public),
        Box::new(p.editable),
        Box::new(t.metadata.version.clone()),
        Box::new(to_key(t.metadata.updated_at)),
        Box::new(to_body(t)?),
    ])
}

// ── Config ─────────────────────────────────────────────────────────

pub fn get_config(conn: &Connection, key: &str) -> Result<Option<String>, rusqlite::Error> {
    conn.query_row(
        "SELECT value FROM app_config WHERE key = ?1",
        params![key],
        |row| row.get(0),
    )
    .optional()
}

pub fn set_config(conn: &Connection, key: &str, value: &str) -> Result<(), rusqlite::Error> {
    conn.execute(
        "INSERT OR REPLACE INTO app_config (key, value, updated_at)
         VALUES (?1, ?2, datetime('now'))",
        params![key, value],
    )?;
    Ok(())
}

pub fn list_config(conn: &Connection) -> Result<Vec<(String, String)>, rusqlite::Error> {
    let mut stmt = conn.prepare("SELECT key, value FROM app_config ORDER BY key")?;
    let rows = stmt.query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?;
    rows.collect()
}

// ── Status ─────────────────────────────────────────────────────────

/// Row count per stored collection.
pub fn record_counts(conn: &Connection) -> Result<Vec<(&'static str, i64)>, rusqlite::Error> {
    const TABLES: [&str; 8] = [
        "users",
        "projects",
        "progress_updates",
        "milestones",
        "alerts",
        "transactions",
        "reports",
        "report_templates",
    ];
    TABLES
        .iter()
        .map(|table| {
            let n: i64 =
                conn.query_row(&format!("SELECT COUNT(*) FROM {table}"), [], |row| row.get(0))?;
            Ok((*table, n))
        })
        .collect()
}

// ── Helpers ────────────────────────────────────────────────────────

fn to_body<T: Serialize>(value: &T) -> Result<String, rusqlite::Error> {
    serde_json::to_string(value).map_err(|e| rusqlite::Error::ToSqlConversionFailure(Box::new(e)))
}

fn from_body<T: DeserializeOwned>(body: &str) -> Result<T, rusqlite::Error> {
    serde_json::from_str(body).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(0, rusqlite::types::Type::Text, Box::new(e))
    })
}

fn get_body<T: DeserializeOwned>(
    conn: &Connection,
    sql: &str,
    id: &str,
) -> Result<Option<T>, rusqlite::Error> {
    let body: Option<String> = conn.query_row(sql, params![id], |row| row.get(0)).optional()?;
    body.as_deref().map(from_body).transpose()
}

fn query_bodies<T: DeserializeOwned, P: rusqlite::Params>(
    conn: &Connection,
    sql: &str,
    params: P,
) -> Result<Vec<T>, rusqlite::Error> {
    let mut stmt = conn.prepare(sql)?;
    let rows = stmt.query_map(params, |row| row.get::<_, String>(0))?;
    rows.map(|body| from_body(&body?)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::date_util::parse_timestamp;
    use crate::records::{ImpactValues, ProjectStatus, Role};
    use crate::storage::Database;
    use crate::template::defaults::{default_templates, PROJECT_PROGRESS_ID};

    fn ts(s: &str) -> DateTime<Utc> {
        parse_timestamp(s).unwrap()
    }

    fn user(id: &str, role: Role) -> User {
        User {
            id: id.into(),
            name: id.into(),
            email: None,
            role,
            created_at: ts("2025-01-01"),
        }
    }

    fn project(id: &str, creator: &str) -> Project {
        Project {
            id: id.into(),
            name: format!("Project {id}"),
            description: String::new(),
            project_type: "reforestation".into(),
            location: Some("Kenya".into()),
            status: ProjectStatus::Active,
            created_by: creator.into(),
            created_at: ts("2025-01-02"),
            targets: ImpactValues::default(),
            budget: Some(10_000.0),
            credits_available: 500.0,
            price_per_credit: 12.5,
        }
    }

    fn tx(id: &str, buyer: &str, status: TransactionStatus) -> Transaction {
        Transaction {
            id: id.into(),
            project_id: "p1".into(),
            buyer_id: buyer.into(),
            credits: 10.0,
            amount: 125.0,
            status,
            created_at: ts("2025-02-01"),
        }
    }

    #[tokio::test]
    async fn test_config_round_trip() {
        let db = Database::open_memory().await.unwrap();

        db.writer()
            .call(|conn| {
                set_config(conn, "report_ttl_days", "14")?;
                let val = get_config(conn, "report_ttl_days")?;
                assert_eq!(val, Some("14".to_string()));

                let missing = get_config(conn, "nonexistent")?;
                assert_eq!(missing, None);
                Ok::<(), rusqlite::Error>(())
            })
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_project_round_trip() {
        let db = Database::open_memory().await.unwrap();

        db.writer()
            .call(|conn| {
                upsert_project(conn, &project("p1", "c1"))?;
                let mut renamed = project("p1", "c1");
                renamed.name = "Renamed".into();
                upsert_project(conn, &renamed)?;

                let loaded = get_project(conn, "p1")?.unwrap();
                assert_eq!(loaded.name, "Renamed");
                assert_eq!(loaded.budget, Some(10_000.0));
                assert!(get_project(conn, "nope")?.is_none());
                assert_eq!(list_projects(conn, ts("2025-01-03"))?.len(), 1);
                assert!(list_projects(conn, ts("2025-01-02"))?.is_empty());
                Ok::<(), rusqlite::Error>(())
            })
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_has_project_access() {
        let db = Database::open_memory().await.unwrap();

        db.writer()
            .call(|conn| {
                upsert_project(conn, &project("p1", "creator"))?;
                upsert_user(conn, &user("admin", Role::Admin))?;
                upsert_user(conn, &user("verifier", Role::Verifier))?;
                upsert_user(conn, &user("buyer", Role::Buyer))?;
                upsert_user(conn, &user("pending_buyer", Role::Buyer))?;
                upsert_user(conn, &user("stranger", Role::Creator))?;
                upsert_transaction(conn, &tx("t1", "buyer", TransactionStatus::Completed))?;
                upsert_transaction(conn, &tx("t2", "pending_buyer", TransactionStatus::Pending))?;

                assert!(has_project_access(conn, "p1", "creator")?);
                assert!(has_project_access(conn, "p1", "admin")?);
                assert!(has_project_access(conn, "p1", "verifier")?);
                assert!(has_project_access(conn, "p1", "buyer")?);
                assert!(!has_project_access(conn, "p1", "pending_buyer")?);
                assert!(!has_project_access(conn, "p1", "stranger")?);
                assert!(!has_project_access(conn, "p1", "unknown")?);
                Ok::<(), rusqlite::Error>(())
            })
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_list_updates_filters_project_and_time() {
        let db = Database::open_memory().await.unwrap();

        db.writer()
            .call(|conn| {
                let update = |id: &str, project: &str, at: &str| ProgressUpdate {
                    id: id.into(),
                    project_id: project.into(),
                    reported_by: "c1".into(),
                    title: id.into(),
                    description: String::new(),
                    progress_percentage: 10.0,
                    impact: ImpactValues::default(),
                    photos: vec![],
                    created_at: ts(at),
                };
                upsert_progress_update(conn, &update("u2", "p1", "2025-02-01T12:00:00Z"))?;
                upsert_progress_update(conn, &update("u1", "p1", "2025-01-15"))?;
                upsert_progress_update(conn, &update("u3", "p2", "2025-01-20"))?;
                upsert_progress_update(conn, &update("u4", "p1", "2025-03-01"))?;

                let p1 = list_progress_updates(conn, Some("p1"), ts("2025-03-01"))?;
                let ids: Vec<&str> = p1.iter().map(|u| u.id.as_str()).collect();
                assert_eq!(ids, vec!["u1", "u2"]);

                let all = list_progress_updates(conn, None, ts("2025-12-31"))?;
                assert_eq!(all.len(), 4);
                Ok::<(), rusqlite::Error>(())
            })
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_template_crud() {
        let db = Database::open_memory().await.unwrap();

        db.writer()
            .call(|conn| {
                let mut defaults = default_templates(ts("2025-01-01"));
                for t in &defaults {
                    assert!(insert_template_if_absent(conn, t)?);
                }
                for t in &defaults {
                    assert!(!insert_template_if_absent(conn, t)?);
                }
                assert_eq!(list_templates(conn)?.len(), defaults.len());

                let t = &mut defaults[0];
                t.name = "Renamed".into();
                assert!(update_template(conn, t)?);
                assert_eq!(get_template(conn, &t.id)?.unwrap().name, "Renamed");

                assert!(record_template_usage(conn, PROJECT_PROGRESS_ID, ts("2025-02-01"))?);
                assert!(record_template_usage(conn, PROJECT_PROGRESS_ID, ts("2025-02-02"))?);
                let used = get_template(conn, PROJECT_PROGRESS_ID)?.unwrap();
                assert_eq!(used.metadata.usage.times_used, 2);
                assert_eq!(used.metadata.usage.last_used_at, Some(ts("2025-02-02")));

                assert!(delete_template(conn, PROJECT_PROGRESS_ID)?);
                assert!(!delete_template(conn, PROJECT_PROGRESS_ID)?);
                assert!(get_template(conn, PROJECT_PROGRESS_ID)?.is_none());
                Ok::<(), rusqlite::Error>(())
            })
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_record_counts() {
        let db = Database::open_memory().await.unwrap();

        let counts = db
            .writer()
            .call(|conn| {
                upsert_user(conn, &user("u1", Role::Buyer))?;
                record_counts(conn)
            })
            .await
            .unwrap();
        assert!(counts.contains(&("users", 1)));
        assert!(counts.contains(&("reports", 0)));
    }
}
