use serde::Serialize;

use super::types::ReportTemplate;
use crate::error::{Error, Result};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ValidationResult {
    pub is_valid: bool,
    pub errors: Vec<String>,
}

impl ValidationResult {
    pub fn into_result(self) -> Result<()> {
        if self.is_valid {
            Ok(())
        } else {
            Err(Error::Validation(self.errors))
        }
    }
}

/// Structural check of a template. Pure: no I/O, input untouched.
///
/// Section ids are not checked for uniqueness.
pub fn validate(template: &ReportTemplate) -> ValidationResult {
    let mut errors = Vec::new();

    if template.name.trim().is_empty() {
        errors.push("Template name is required".to_string());
    }
    if template.template_type.is_none() {
        errors.push("Template type is required".to_string());
    }
    if template.format.is_none() {
        errors.push("Template format is required".to_string());
    }

    if template.sections.is_empty() {
        errors.push("Template must have at least one section".to_string());
    }
    for (i, section) in template.sections.iter().enumerate() {
        let label = section_label(i, &section.id);
        if section.id.trim().is_empty() {
            errors.push(format!("{label}: id is required"));
        }
        if section.name.trim().is_empty() {
            errors.push(format!("{label}: name is required"));
        }
        if section.content.is_none() {
            errors.push(format!("{label}: type is required"));
        }
        if section.order.is_none() {
            errors.push(format!("{label}: order is required"));
        }
    }

    for (i, variable) in template.variables.iter().enumerate() {
        let label = if variable.key.trim().is_empty() {
            format!("Variable {}", i + 1)
        } else {
            format!("Variable '{}'", variable.key)
        };
        if variable.key.trim().is_empty() {
            errors.push(format!("{label}: key is required"));
        }
        if variable.name.trim().is_empty() {
            errors.push(format!("{label}: name is required"));
        }
        if variable.var_type.is_none() {
            errors.push(format!("{label}: type is required"));
        }
    }

    ValidationResult {
        is_valid: errors.is_empty(),
        errors,
    }
}

fn section_label(index: usize, id: &str) -> String {
    if id.trim().is_empty() {
        format!("Section {}", index + 1)
    } else {
        format!("Section '{id}'")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::template::defaults::default_templates;
    use crate::template::types::{ReportSection, SectionContent, TemplateVariable};

    fn sample() -> ReportTemplate {
        default_templates(chrono::Utc::now()).remove(0)
    }

    #[test]
    fn test_default_templates_are_valid() {
        for t in default_templates(chrono::Utc::now()) {
            let result = validate(&t);
            assert!(result.is_valid, "{}: {:?}", t.id, result.errors);
        }
    }

    #[test]
    fn test_missing_sections_mentions_at_least_one_section() {
        let mut t = sample();
        t.sections.clear();
        let result = validate(&t);
        assert!(!result.is_valid);
        assert!(result.errors.iter().any(|e| e.contains("at least one section")));
    }

    #[test]
    fn test_duplicate_section_ids_are_accepted() {
        // Known gap: uniqueness of section ids is not enforced.
        let mut t = sample();
        let mut dup = t.sections[0].clone();
        dup.order = Some(99);
        t.sections.push(dup);
        assert_eq!(t.sections[0].id, t.sections.last().unwrap().id);
        assert!(validate(&t).is_valid);
    }

    #[test]
    fn test_validate_is_idempotent() {
        let mut t = sample();
        t.name.clear();
        t.format = None;
        let before = t.clone();
        let first = validate(&t);
        let second = validate(&t);
        assert_eq!(first, second);
        assert_eq!(t, before);
        assert_eq!(first.errors.len(), 2);
    }

    #[test]
    fn test_collects_field_level_errors() {
        let mut t = sample();
        t.template_type = None;
        t.sections = vec![ReportSection {
            id: String::new(),
            name: String::new(),
            content: Some(SectionContent::Summary),
            order: None,
            required: false,
            description: None,
            condition: None,
            fallback_text: None,
        }];
        t.variables = vec![TemplateVariable {
            key: "audience".into(),
            name: String::new(),
            var_type: None,
            required: false,
            default_value: None,
            validation: None,
            description: None,
        }];
        let err = validate(&t).into_result().unwrap_err();
        let messages = err.validation_messages();
        assert!(messages.contains(&"Template type is required".to_string()));
        assert!(messages.contains(&"Section 1: id is required".to_string()));
        assert!(messages.contains(&"Section 1: order is required".to_string()));
        assert!(messages.contains(&"Variable 'audience': type is required".to_string()));
        assert_eq!(messages.len(), 6);
    }

    #[test]
    fn test_template_json_without_sections_parses_then_fails() {
        let raw = serde_json::json!({
            "name": "Bare",
            "template_type": "custom",
            "format": "html",
            "metadata": {
                "version": "1.0.0",
                "author": "u1",
                "created_at": "2025-01-01T00:00:00Z",
                "updated_at": "2025-01-01T00:00:00Z"
            }
        });
        let t: ReportTemplate = serde_json::from_value(raw).unwrap();
        let result = validate(&t);
        assert_eq!(result.errors, vec!["Template must have at least one section".to_string()]);
    }

    #[test]
    fn test_section_without_type_is_reported_not_rejected() {
        let raw = serde_json::json!({
            "name": "Loose",
            "template_type": "custom",
            "format": "html",
            "sections": [
                { "id": "s1", "name": "S", "order": 1 },
                { "id": "s2", "name": "T", "order": 2, "type": "text", "body": "hi" }
            ]
        });
        let t: ReportTemplate = serde_json::from_value(raw).unwrap();
        assert!(t.sections[0].content.is_none());
        assert_eq!(t.sections[1].content, Some(SectionContent::Text { body: "hi".into() }));
        assert_eq!(validate(&t).errors, vec!["Section 's1': type is required".to_string()]);
    }

    #[test]
    fn test_unknown_section_type_still_fails_to_parse() {
        let raw = serde_json::json!({
            "name": "Odd",
            "sections": [{ "id": "s1", "name": "S", "order": 1, "type": "hologram" }]
        });
        assert!(serde_json::from_value::<ReportTemplate>(raw).is_err());
    }
}
