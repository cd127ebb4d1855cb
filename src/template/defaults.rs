use chrono::{DateTime, Utc};
use serde_json::json;

use super::types::{
    ConditionOperator, ConditionalLogic, ReportSection, ReportTemplate, SectionContent,
    TemplateFormat, TemplateMetadata, TemplatePermissions, TemplateStyling, TemplateType,
    TemplateVariable, UsageStats, VariableType, VariableValidation,
};
use crate::analytics::ChartType;

pub const PROJECT_PROGRESS_ID: &str = "default-project-progress";
pub const BUYER_IMPACT_ID: &str = "default-buyer-impact";
pub const COMPLIANCE_ID: &str = "default-compliance";

pub const SYSTEM_AUTHOR: &str = "system";

/// The system templates seeded into every store.
pub fn default_templates(now: DateTime<Utc>) -> Vec<ReportTemplate> {
    vec![project_progress(now), buyer_impact(now), compliance(now)]
}

fn system_metadata(now: DateTime<Utc>, tags: &[&str]) -> TemplateMetadata {
    TemplateMetadata {
        version: "1.0.0".to_string(),
        author: SYSTEM_AUTHOR.to_string(),
        created_at: now,
        updated_at: now,
        permissions: TemplatePermissions {
            roles: vec![],
            users: vec![],
            public: true,
            editable: false,
        },
        usage: UsageStats::default(),
        tags: tags.iter().map(|t| t.to_string()).collect(),
    }
}

fn section(
    id: &str,
    name: &str,
    order: i32,
    required: bool,
    content: SectionContent,
) -> ReportSection {
    ReportSection {
        id: id.to_string(),
        name: name.to_string(),
        content: Some(content),
        order: Some(order),
        required,
        description: None,
        condition: None,
        fallback_text: None,
    }
}

fn non_empty(field: &str) -> Option<ConditionalLogic> {
    Some(ConditionalLogic {
        field: field.to_string(),
        operator: ConditionOperator::GreaterThan,
        value: json!(0),
    })
}

fn variable(
    key: &str,
    name: &str,
    var_type: VariableType,
    default: serde_json::Value,
) -> TemplateVariable {
    TemplateVariable {
        key: key.to_string(),
        name: name.to_string(),
        var_type: Some(var_type),
        required: false,
        default_value: Some(default),
        validation: None,
        description: None,
    }
}

fn project_progress(now: DateTime<Utc>) -> ReportTemplate {
    let mut intro = section(
        "intro",
        "Introduction",
        0,
        true,
        SectionContent::Text {
            body: concat!(
                "Progress report for {{project_name}} covering {{period_label}}, ",
                "prepared for {{audience}}."
            )
            .to_string(),
        },
    );
    intro.description = Some("Opening statement".to_string());

    let mut challenges = section("challenges", "Challenges", 5, false, SectionContent::Challenges);
    challenges.condition = non_empty("challenges");

    let mut financials =
        section("financials", "Financial Summary", 7, false, SectionContent::Financials);
    financials.condition = Some(ConditionalLogic {
        field: "variables.include_financials".to_string(),
        operator: ConditionOperator::Equals,
        value: json!(true),
    });

    let mut photos = section(
        "photos",
        "Field Photos",
        8,
        false,
        SectionContent::Photos { limit: Some(12) },
    );
    photos.condition = non_empty("photos");

    ReportTemplate {
        id: PROJECT_PROGRESS_ID.to_string(),
        name: "Project Progress Report".to_string(),
        description: "Periodic progress report for project stakeholders".to_string(),
        template_type: Some(TemplateType::ProjectProgress),
        format: Some(TemplateFormat::Pdf),
        sections: vec![
            intro,
            section("summary", "Executive Summary", 1, true, SectionContent::Summary),
            section("timeline", "Timeline", 2, true, SectionContent::Timeline),
            section(
                "metrics",
                "Environmental Impact",
                3,
                true,
                SectionContent::Metrics { include: vec![] },
            ),
            section("milestones", "Milestones", 4, true, SectionContent::Milestones),
            challenges,
            section("achievements", "Achievements", 6, false, SectionContent::Achievements),
            financials,
            photos,
            section(
                "recommendations",
                "Recommendations",
                9,
                true,
                SectionContent::Recommendations,
            ),
        ],
        variables: vec![
            variable("audience", "Audience", VariableType::String, json!("project stakeholders")),
            variable(
                "include_financials",
                "Include financials",
                VariableType::Boolean,
                json!(true),
            ),
        ],
        styling: TemplateStyling::default(),
        metadata: system_metadata(now, &["progress", "default"]),
    }
}

fn buyer_impact(now: DateTime<Utc>) -> ReportTemplate {
    let mut photos = section(
        "photos",
        "From the Field",
        3,
        false,
        SectionContent::Photos { limit: Some(6) },
    );
    photos.condition = non_empty("photos");

    ReportTemplate {
        id: BUYER_IMPACT_ID.to_string(),
        name: "Buyer Impact Report".to_string(),
        description: "What a credit purchase achieved, for buyers".to_string(),
        template_type: Some(TemplateType::BuyerImpact),
        format: Some(TemplateFormat::Html),
        sections: vec![
            section(
                "thanks",
                "Thank You",
                0,
                true,
                SectionContent::Text {
                    body: "Thank you, {{buyer_name}}, for supporting {{project_name}}.".to_string(),
                },
            ),
            section(
                "impact",
                "Your Impact",
                1,
                true,
                SectionContent::Metrics {
                    include: vec!["carbon_impact".to_string(), "trees_planted".to_string()],
                },
            ),
            section(
                "carbon_trend",
                "Carbon Impact",
                2,
                false,
                SectionContent::Chart {
                    chart_type: ChartType::Area,
                    source: "metrics.cumulative.carbon_impact".to_string(),
                },
            ),
            photos,
        ],
        variables: vec![variable(
            "buyer_name",
            "Buyer name",
            VariableType::String,
            json!("valued partner"),
        )],
        styling: TemplateStyling::default(),
        metadata: system_metadata(now, &["buyer", "default"]),
    }
}

fn compliance(now: DateTime<Utc>) -> ReportTemplate {
    let mut challenges =
        section("quality", "Quality Concerns", 3, true, SectionContent::Challenges);
    challenges.condition = non_empty("challenges");
    challenges.fallback_text =
        Some("No quality concerns were raised during {{period_label}}.".to_string());

    let mut reference = section(
        "reference",
        "Audit Reference",
        0,
        false,
        SectionContent::Text {
            body: "Audit {{audit_reference}} under the {{registry}} standard.".to_string(),
        },
    );
    reference.condition = Some(ConditionalLogic {
        field: "variables.audit_reference".to_string(),
        operator: ConditionOperator::Exists,
        value: json!(true),
    });

    ReportTemplate {
        id: COMPLIANCE_ID.to_string(),
        name: "Compliance Report".to_string(),
        description: "Verification-oriented record of schedule and quality".to_string(),
        template_type: Some(TemplateType::Compliance),
        format: Some(TemplateFormat::Pdf),
        sections: vec![
            reference,
            section("summary", "Summary", 1, true, SectionContent::Summary),
            section(
                "milestones",
                "Milestone Schedule",
                2,
                true,
                SectionContent::Table {
                    source: "milestones".to_string(),
                    columns: vec![
                        "title".to_string(),
                        "status".to_string(),
                        "planned_date".to_string(),
                        "schedule_variance_days".to_string(),
                    ],
                },
            ),
            challenges,
        ],
        variables: vec![
            TemplateVariable {
                key: "registry".to_string(),
                name: "Registry standard".to_string(),
                var_type: Some(VariableType::Select),
                required: true,
                default_value: Some(json!("Verra")),
                validation: Some(VariableValidation {
                    options: vec![
                        "Verra".to_string(),
                        "Gold Standard".to_string(),
                        "Plan Vivo".to_string(),
                    ],
                    ..Default::default()
                }),
                description: None,
            },
            TemplateVariable {
                key: "audit_reference".to_string(),
                name: "Audit reference".to_string(),
                var_type: Some(VariableType::String),
                required: false,
                default_value: None,
                validation: Some(VariableValidation {
                    pattern: Some(r"^[A-Z]{2,5}-\d{3,}$".to_string()),
                    ..Default::default()
                }),
                description: Some("e.g. VCS-1234".to_string()),
            },
        ],
        styling: TemplateStyling::default(),
        metadata: system_metadata(now, &["compliance", "default"]),
    }
}
