use std::fmt;

use serde::Serialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("Database error: {0}")]
    Database(String),

    #[error("Migration error: {0}")]
    Migration(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid period format: {0}")]
    PeriodParse(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    /// Field-level messages, one per problem found.
    #[error("Validation failed: {}", .0.join("; "))]
    Validation(Vec<String>),
}

impl Error {
    /// Field-level messages when this is a validation failure.
    pub fn validation_messages(&self) -> &[String] {
        match self {
            Error::Validation(messages) => messages,
            _ => &[],
        }
    }
}

impl From<rusqlite::Error> for Error {
    fn from(e: rusqlite::Error) -> Self {
        Error::Database(e.to_string())
    }
}

impl From<rusqlite_migration::Error> for Error {
    fn from(e: rusqlite_migration::Error) -> Self {
        Error::Migration(e.to_string())
    }
}

impl<E: fmt::Display> From<tokio_rusqlite::Error<E>> for Error {
    fn from(e: tokio_rusqlite::Error<E>) -> Self {
        Error::Database(e.to_string())
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Serialization(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, Error>;

/// Non-fatal conditions met while composing output. They are recorded
/// alongside the result and the operation completes with neutral values.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, serde::Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Advisory {
    /// The project has no milestones, so no timeline could be derived.
    MissingTimelineData { project_id: String },
    /// A ratio had a zero denominator and was reported as stable / 0%.
    ComputationDegenerate { metric: String },
}

impl fmt::Display for Advisory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Advisory::MissingTimelineData { project_id } => {
                write!(f, "no milestones recorded for project {project_id}")
            }
            Advisory::ComputationDegenerate { metric } => {
                write!(f, "prior-period delta for {metric} is zero; trend reported as stable")
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validation_display_lists_every_message() {
        let err = Error::Validation(vec![
            "Template name is required".to_string(),
            "Template must have at least one section".to_string(),
        ]);
        let text = err.to_string();
        assert!(text.contains("Template name is required"));
        assert!(text.contains("at least one section"));
        assert_eq!(err.validation_messages().len(), 2);
    }

    #[test]
    fn test_non_validation_has_no_messages() {
        assert!(Error::NotFound("project p1".into())
            .validation_messages()
            .is_empty());
    }

    #[test]
    fn test_advisory_serializes_with_kind_tag() {
        let a = Advisory::ComputationDegenerate {
            metric: "carbon_impact".into(),
        };
        let v = serde_json::to_value(&a).unwrap();
        assert_eq!(v["kind"], "computation_degenerate");
        assert_eq!(v["metric"], "carbon_impact");
    }
}
