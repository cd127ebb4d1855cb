//! Operational records read from the record store.
//!
//! These are inputs only: the engine never mutates them. Timestamps are
//! UTC; milestone dates are calendar dates.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// The five environmental quantities tracked per project. On a progress
/// update they are cumulative-to-date values; on a project they are targets.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ImpactValues {
    /// Tonnes of CO2e offset.
    pub carbon_impact: f64,
    pub trees_planted: f64,
    /// kWh.
    pub energy_generated: f64,
    /// Tonnes.
    pub waste_processed: f64,
    /// Hectares.
    pub area_restored: f64,
}

impl ImpactValues {
    /// Component-wise `self - other`.
    pub fn minus(&self, other: &ImpactValues) -> ImpactValues {
        ImpactValues {
            carbon_impact: self.carbon_impact - other.carbon_impact,
            trees_planted: self.trees_planted - other.trees_planted,
            energy_generated: self.energy_generated - other.energy_generated,
            waste_processed: self.waste_processed - other.waste_processed,
            area_restored: self.area_restored - other.area_restored,
        }
    }

    pub fn plus(&self, other: &ImpactValues) -> ImpactValues {
        ImpactValues {
            carbon_impact: self.carbon_impact + other.carbon_impact,
            trees_planted: self.trees_planted + other.trees_planted,
            energy_generated: self.energy_generated + other.energy_generated,
            waste_processed: self.waste_processed + other.waste_processed,
            area_restored: self.area_restored + other.area_restored,
        }
    }

    /// `(name, value)` pairs in a fixed order.
    pub fn entries(&self) -> [(&'static str, f64); 5] {
        [
            ("carbon_impact", self.carbon_impact),
            ("trees_planted", self.trees_planted),
            ("energy_generated", self.energy_generated),
            ("waste_processed", self.waste_processed),
            ("area_restored", self.area_restored),
        ]
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProjectStatus {
    Draft,
    Active,
    Completed,
    Suspended,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Project {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    /// e.g. `reforestation`, `solar`, `waste_management`.
    pub project_type: String,
    #[serde(default)]
    pub location: Option<String>,
    pub status: ProjectStatus,
    pub created_by: String,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub targets: ImpactValues,
    #[serde(default)]
    pub budget: Option<f64>,
    #[serde(default)]
    pub credits_available: f64,
    #[serde(default)]
    pub price_per_credit: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UpdatePhoto {
    pub url: String,
    #[serde(default)]
    pub thumbnail_url: Option<String>,
    #[serde(default)]
    pub caption: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProgressUpdate {
    pub id: String,
    pub project_id: String,
    pub reported_by: String,
    pub title: String,
    #[serde(default)]
    pub description: String,
    pub progress_percentage: f64,
    /// Cumulative values as of this update.
    #[serde(default)]
    pub impact: ImpactValues,
    #[serde(default)]
    pub photos: Vec<UpdatePhoto>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MilestoneStatus {
    Completed,
    InProgress,
    Delayed,
    Pending,
    Cancelled,
}

impl MilestoneStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            MilestoneStatus::Completed => "completed",
            MilestoneStatus::InProgress => "in_progress",
            MilestoneStatus::Delayed => "delayed",
            MilestoneStatus::Pending => "pending",
            MilestoneStatus::Cancelled => "cancelled",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Impact {
    Low,
    Medium,
    High,
    Critical,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Milestone {
    pub id: String,
    pub project_id: String,
    pub title: String,
    #[serde(default)]
    pub description: String,
    pub planned_date: NaiveDate,
    #[serde(default)]
    pub actual_date: Option<NaiveDate>,
    pub status: MilestoneStatus,
    pub impact: Impact,
    #[serde(default)]
    pub dependencies: Vec<String>,
    #[serde(default)]
    pub delay_reason: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Alert {
    pub id: String,
    pub project_id: String,
    /// e.g. `quality_concern`, `delay`, `fraud_suspected`.
    pub alert_type: String,
    pub severity: Severity,
    pub title: String,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub is_resolved: bool,
    #[serde(default)]
    pub resolution_notes: Option<String>,
    #[serde(default)]
    pub resolved_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionStatus {
    Pending,
    Completed,
    Failed,
    Refunded,
}

impl TransactionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionStatus::Pending => "pending",
            TransactionStatus::Completed => "completed",
            TransactionStatus::Failed => "failed",
            TransactionStatus::Refunded => "refunded",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Transaction {
    pub id: String,
    pub project_id: String,
    pub buyer_id: String,
    pub credits: f64,
    /// Currency amount paid.
    pub amount: f64,
    pub status: TransactionStatus,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Admin,
    Verifier,
    Creator,
    Buyer,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Admin => "admin",
            Role::Verifier => "verifier",
            Role::Creator => "creator",
            Role::Buyer => "buyer",
        }
    }

    /// Roles that see every project regardless of ownership.
    pub fn is_elevated(&self) -> bool {
        matches!(self, Role::Admin | Role::Verifier)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub email: Option<String>,
    pub role: Role,
    pub created_at: DateTime<Utc>,
}

/// Identity of whoever is asking, as supplied by the host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Caller {
    pub user_id: String,
    pub role: Role,
}

impl Caller {
    pub fn new(user_id: impl Into<String>, role: Role) -> Self {
        Self {
            user_id: user_id.into(),
            role,
        }
    }
}

impl From<&User> for Caller {
    fn from(u: &User) -> Self {
        Caller::new(u.id.clone(), u.role)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_impact_minus() {
        let a = ImpactValues {
            carbon_impact: 10.0,
            trees_planted: 500.0,
            ..Default::default()
        };
        let b = ImpactValues {
            carbon_impact: 4.0,
            trees_planted: 100.0,
            ..Default::default()
        };
        let d = a.minus(&b);
        assert_eq!(d.carbon_impact, 6.0);
        assert_eq!(d.trees_planted, 400.0);
        assert_eq!(d.area_restored, 0.0);
    }

    #[test]
    fn test_elevated_roles() {
        assert!(Role::Admin.is_elevated());
        assert!(Role::Verifier.is_elevated());
        assert!(!Role::Buyer.is_elevated());
    }

    #[test]
    fn test_milestone_deserializes_snake_case() {
        let m: Milestone = serde_json::from_str(
            r#"{"id":"m1","project_id":"p1","title":"Planting","planned_date":"2025-03-01",
                "status":"in_progress","impact":"critical"}"#,
        )
        .unwrap();
        assert_eq!(m.status, MilestoneStatus::InProgress);
        assert_eq!(m.impact, Impact::Critical);
        assert!(m.dependencies.is_empty());
    }
}
