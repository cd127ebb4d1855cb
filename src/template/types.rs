use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::defaults::SYSTEM_AUTHOR;
use crate::analytics::ChartType;
use crate::records::Role;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TemplateType {
    ProjectProgress,
    BuyerImpact,
    PortfolioOverview,
    AnalyticsDashboard,
    Compliance,
    Custom,
}

impl TemplateType {
    pub fn as_str(&self) -> &'static str {
        match self {
            TemplateType::ProjectProgress => "project_progress",
            TemplateType::BuyerImpact => "buyer_impact",
            TemplateType::PortfolioOverview => "portfolio_overview",
            TemplateType::AnalyticsDashboard => "analytics_dashboard",
            TemplateType::Compliance => "compliance",
            TemplateType::Custom => "custom",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TemplateFormat {
    Pdf,
    Html,
    Csv,
    Xlsx,
}

/// What a section shows. Data-bound kinds read the matching part of the
/// composed report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SectionContent {
    Summary,
    Timeline,
    Metrics {
        /// Restrict to these metric names; empty means all.
        #[serde(default)]
        include: Vec<String>,
    },
    Milestones,
    Challenges,
    Achievements,
    Financials,
    Photos {
        #[serde(default)]
        limit: Option<usize>,
    },
    Recommendations,
    Chart {
        chart_type: ChartType,
        /// Dotted path into the report data.
        source: String,
    },
    Table {
        source: String,
        #[serde(default)]
        columns: Vec<String>,
    },
    Text {
        body: String,
    },
}

impl SectionContent {
    pub fn kind(&self) -> &'static str {
        match self {
            SectionContent::Summary => "summary",
            SectionContent::Timeline => "timeline",
            SectionContent::Metrics { .. } => "metrics",
            SectionContent::Milestones => "milestones",
            SectionContent::Challenges => "challenges",
            SectionContent::Achievements => "achievements",
            SectionContent::Financials => "financials",
            SectionContent::Photos { .. } => "photos",
            SectionContent::Recommendations => "recommendations",
            SectionContent::Chart { .. } => "chart",
            SectionContent::Table { .. } => "table",
            SectionContent::Text { .. } => "text",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConditionOperator {
    Equals,
    NotEquals,
    GreaterThan,
    LessThan,
    Contains,
    Exists,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConditionalLogic {
    /// Dotted path into the report data, e.g. `summary.overall_progress`.
    pub field: String,
    pub operator: ConditionOperator,
    #[serde(default)]
    pub value: Value,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawSection")]
pub struct ReportSection {
    pub id: String,
    pub name: String,
    /// `None` when the section has no `type`; `validate` reports it.
    #[serde(flatten)]
    pub content: Option<SectionContent>,
    pub order: Option<i32>,
    pub required: bool,
    /// Supports `{{variable}}` placeholders.
    pub description: Option<String>,
    pub condition: Option<ConditionalLogic>,
    /// Shown instead of the data when a required section's condition fails.
    pub fallback_text: Option<String>,
}

/// Wire form of a section. The `type` tag and its fields stay untyped until
/// we know the tag is there.
#[derive(Deserialize)]
struct RawSection {
    #[serde(default)]
    id: String,
    #[serde(default)]
    name: String,
    #[serde(default)]
    order: Option<i32>,
    #[serde(default)]
    required: bool,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    condition: Option<ConditionalLogic>,
    #[serde(default)]
    fallback_text: Option<String>,
    #[serde(flatten)]
    content: Map<String, Value>,
}

impl TryFrom<RawSection> for ReportSection {
    type Error = serde_json::Error;

    fn try_from(raw: RawSection) -> Result<Self, Self::Error> {
        let content = match raw.content.get("type") {
            None | Some(Value::Null) => None,
            Some(_) => Some(serde_json::from_value(Value::Object(raw.content))?),
        };
        Ok(ReportSection {
            id: raw.id,
            name: raw.name,
            content,
            order: raw.order,
            required: raw.required,
            description: raw.description,
            condition: raw.condition,
            fallback_text: raw.fallback_text,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VariableType {
    String,
    Number,
    Boolean,
    Date,
    Select,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VariableValidation {
    /// Regex a string value must match.
    #[serde(default)]
    pub pattern: Option<String>,
    #[serde(default)]
    pub min: Option<f64>,
    #[serde(default)]
    pub max: Option<f64>,
    /// Allowed values for `select` variables.
    #[serde(default)]
    pub options: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TemplateVariable {
    #[serde(default)]
    pub key: String,
    #[serde(default)]
    pub name: String,
    #[serde(rename = "type", default)]
    pub var_type: Option<VariableType>,
    #[serde(default)]
    pub required: bool,
    #[serde(default)]
    pub default_value: Option<Value>,
    #[serde(default)]
    pub validation: Option<VariableValidation>,
    #[serde(default)]
    pub description: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TemplateStyling {
    pub primary_color: String,
    pub secondary_color: String,
    pub font_family: String,
    #[serde(default)]
    pub logo_url: Option<String>,
    #[serde(default)]
    pub page_size: Option<String>,
}

impl Default for TemplateStyling {
    fn default() -> Self {
        TemplateStyling {
            primary_color: "#2E7D32".to_string(),
            secondary_color: "#81C784".to_string(),
            font_family: "Inter".to_string(),
            logo_url: None,
            page_size: Some("A4".to_string()),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TemplatePermissions {
    #[serde(default)]
    pub roles: Vec<Role>,
    #[serde(default)]
    pub users: Vec<String>,
    #[serde(default)]
    pub public: bool,
    #[serde(default)]
    pub editable: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UsageStats {
    pub times_used: u64,
    pub last_used_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TemplateMetadata {
    /// `major.minor.patch`.
    pub version: String,
    pub author: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub permissions: TemplatePermissions,
    #[serde(default)]
    pub usage: UsageStats,
    #[serde(default)]
    pub tags: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportTemplate {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub template_type: Option<TemplateType>,
    #[serde(default)]
    pub format: Option<TemplateFormat>,
    #[serde(default)]
    pub sections: Vec<ReportSection>,
    #[serde(default)]
    pub variables: Vec<TemplateVariable>,
    #[serde(default)]
    pub styling: TemplateStyling,
    /// Filled in by the registry on create when absent.
    #[serde(default)]
    pub metadata: TemplateMetadata,
}

impl ReportTemplate {
    /// Seeded by the registry itself. No caller can author one.
    pub fn is_system(&self) -> bool {
        self.metadata.author == SYSTEM_AUTHOR
    }
}
