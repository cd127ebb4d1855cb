use chrono::Utc;

use super::defaults::{default_templates, SYSTEM_AUTHOR};
use super::types::{ReportTemplate, TemplatePermissions, UsageStats};
use super::validate::validate;
use crate::error::{Error, Result};
use crate::records::Caller;
use crate::storage::repository;
use crate::storage::Database;

const INITIAL_VERSION: &str = "1.0.0";

/// Versioned template store with ownership rules.
///
/// Read-check-write sequences run inside one writer call, so concurrent
/// edits are applied one after another and each sees the last version.
#[derive(Clone)]
pub struct TemplateRegistry {
    db: Database,
}

impl TemplateRegistry {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Seed the system templates. Ids are stable, so running this again
    /// leaves existing rows alone. Returns how many were inserted.
    pub async fn ensure_defaults(&self) -> Result<usize> {
        let defaults = default_templates(Utc::now());
        let inserted = self
            .db
            .writer()
            .call(move |conn| {
                let mut n = 0;
                for t in &defaults {
                    if repository::insert_template_if_absent(conn, t)? {
                        n += 1;
                    }
                }
                Ok::<usize, rusqlite::Error>(n)
            })
            .await?;
        if inserted > 0 {
            log::warn!("seeded {inserted} default report template(s)");
        }
        Ok(inserted)
    }

    /// Store a new template authored by `caller`.
    pub async fn create(
        &self,
        caller: &Caller,
        mut template: ReportTemplate,
    ) -> Result<ReportTemplate> {
        if caller.user_id == SYSTEM_AUTHOR {
            return Err(Error::Forbidden(format!(
                "user id '{SYSTEM_AUTHOR}' is reserved for built-in templates"
            )));
        }
        validate(&template).into_result()?;

        let now = Utc::now();
        if template.id.trim().is_empty() {
            template.id = uuid::Uuid::new_v4().to_string();
        }
        if parse_version(&template.metadata.version).is_none() {
            template.metadata.version = INITIAL_VERSION.to_string();
        }
        template.metadata.author = caller.user_id.clone();
        template.metadata.created_at = now;
        template.metadata.updated_at = now;
        template.metadata.usage = UsageStats::default();

        let stored = template.clone();
        self.db
            .writer()
            .call(move |conn| repository::insert_template(conn, &stored))
            .await?;
        log::info!("created template {} ({})", template.id, template.name);
        Ok(template)
    }

    pub async fn get(&self, id: &str) -> Result<ReportTemplate> {
        let key = id.to_string();
        self.db
            .reader()
            .call(move |conn| repository::get_template(conn, &key))
            .await?
            .ok_or_else(|| Error::NotFound(format!("template {id}")))
    }

    /// Templates the caller may see: public ones, their own, and those
    /// shared with them by user or role.
    pub async fn list(&self, caller: &Caller) -> Result<Vec<ReportTemplate>> {
        let all = self
            .db
            .reader()
            .call(|conn| repository::list_templates(conn))
            .await?;
        Ok(all.into_iter().filter(|t| can_view(t, caller)).collect())
    }

    /// Replace a template's content. Identity, authorship, creation time and
    /// usage are kept; the patch version is bumped. Only the author or a
    /// listed user may change who else can see or edit it.
    pub async fn update(
        &self,
        caller: &Caller,
        id: &str,
        changes: ReportTemplate,
    ) -> Result<ReportTemplate> {
        validate(&changes).into_result()?;

        let key = id.to_string();
        let caller = caller.clone();
        let updated = self
            .db
            .writer()
            .call(move |conn| {
                let tx = conn.transaction()?;
                let Some(existing) = repository::get_template(&tx, &key)? else {
                    return Ok(Err(Error::NotFound(format!("template {key}"))));
                };
                let updated = match apply_update(&existing, &caller, changes) {
                    Ok(t) => t,
                    Err(e) => return Ok(Err(e)),
                };
                repository::update_template(&tx, &updated)?;
                tx.commit()?;
                Ok::<_, rusqlite::Error>(Ok(updated))
            })
            .await??;
        log::info!("updated template {} to {}", updated.id, updated.metadata.version);
        Ok(updated)
    }

    pub async fn delete(&self, caller: &Caller, id: &str) -> Result<()> {
        let key = id.to_string();
        let caller = caller.clone();
        self.db
            .writer()
            .call(move |conn| {
                let tx = conn.transaction()?;
                let Some(existing) = repository::get_template(&tx, &key)? else {
                    return Ok(Err(Error::NotFound(format!("template {key}"))));
                };
                if let Err(e) = check_edit(&existing, &caller) {
                    return Ok(Err(e));
                }
                repository::delete_template(&tx, &key)?;
                tx.commit()?;
                Ok::<_, rusqlite::Error>(Ok(()))
            })
            .await??;
        log::info!("deleted template {id}");
        Ok(())
    }

    /// Copy a template into a new, private, editable one owned by `caller`.
    /// The only way to derive from a system template.
    pub async fn clone_template(
        &self,
        caller: &Caller,
        id: &str,
        name: Option<String>,
    ) -> Result<ReportTemplate> {
        let source = self.get(id).await?;
        if !can_view(&source, caller) {
            return Err(Error::Forbidden(format!(
                "template {id} is not shared with {}",
                caller.user_id
            )));
        }

        let mut copy = source.clone();
        copy.id = String::new();
        copy.name = name.unwrap_or_else(|| format!("{} (copy)", source.name));
        copy.metadata.version = INITIAL_VERSION.to_string();
        copy.metadata.permissions = TemplatePermissions {
            roles: vec![],
            users: vec![],
            public: false,
            editable: true,
        };
        copy.metadata.tags.retain(|t| t != "default");
        self.create(caller, copy).await
    }

    /// Count one use of a template for a generated report.
    pub async fn record_usage(&self, id: &str) -> Result<()> {
        let key = id.to_string();
        let found = self
            .db
            .writer()
            .call(move |conn| repository::record_template_usage(conn, &key, Utc::now()))
            .await?;
        if !found {
            return Err(Error::NotFound(format!("template {id}")));
        }
        Ok(())
    }
}

pub(crate) fn can_view(template: &ReportTemplate, caller: &Caller) -> bool {
    let p = &template.metadata.permissions;
    p.public
        || template.metadata.author == caller.user_id
        || p.users.contains(&caller.user_id)
        || p.roles.contains(&caller.role)
}

/// The stored form of `changes` applied over `existing` by `caller`.
fn apply_update(
    existing: &ReportTemplate,
    caller: &Caller,
    changes: ReportTemplate,
) -> Result<ReportTemplate> {
    check_edit(existing, caller)?;
    if changes.metadata.permissions != existing.metadata.permissions
        && !can_manage(existing, caller)
    {
        return Err(Error::Forbidden(format!(
            "only the author or a listed user may change who can use template {}",
            existing.id
        )));
    }

    let mut updated = changes;
    updated.id = existing.id.clone();
    updated.metadata.version = bump_patch(&existing.metadata.version)?;
    updated.metadata.author = existing.metadata.author.clone();
    updated.metadata.created_at = existing.metadata.created_at;
    updated.metadata.updated_at = Utc::now();
    updated.metadata.usage = existing.metadata.usage.clone();
    Ok(updated)
}

/// Author or a user named in the template's permissions.
fn can_manage(template: &ReportTemplate, caller: &Caller) -> bool {
    template.metadata.author == caller.user_id
        || template.metadata.permissions.users.contains(&caller.user_id)
}

/// System templates are immutable. Otherwise the author, a listed user, a
/// listed role, or anyone when `editable` is set.
fn check_edit(template: &ReportTemplate, caller: &Caller) -> Result<()> {
    if template.is_system() {
        return Err(Error::Forbidden(format!(
            "template {} is a system template; clone it to make changes",
            template.id
        )));
    }
    let p = &template.metadata.permissions;
    let allowed = p.editable
        || template.metadata.author == caller.user_id
        || p.users.contains(&caller.user_id)
        || p.roles.contains(&caller.role);
    if allowed {
        Ok(())
    } else {
        Err(Error::Forbidden(format!(
            "{} may not modify template {}",
            caller.user_id, template.id
        )))
    }
}

fn parse_version(version: &str) -> Option<(u64, u64, u64)> {
    let mut parts = version.trim().split('.').map(|p| p.parse::<u64>().ok());
    match (parts.next(), parts.next(), parts.next(), parts.next()) {
        (Some(Some(major)), Some(Some(minor)), Some(Some(patch)), None) => {
            Some((major, minor, patch))
        }
        _ => None,
    }
}

/// `major.minor.patch` -> `major.minor.(patch+1)`.
pub fn bump_patch(version: &str) -> Result<String> {
    let (major, minor, patch) = parse_version(version).ok_or_else(|| {
        Error::Validation(vec![format!(
            "Template version '{version}' is not major.minor.patch"
        )])
    })?;
    Ok(format!("{major}.{minor}.{}", patch + 1))
}
