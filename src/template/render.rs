use std::collections::BTreeMap;
use std::sync::LazyLock;

use chrono::NaiveDate;
use regex::Regex;
use serde_json::{json, Map, Value};

use super::types::{
    ConditionOperator, ConditionalLogic, ReportSection, ReportTemplate, SectionContent,
    VariableType,
};
use crate::error::{Error, Result};
use crate::report::types::{ComposedSection, SectionVariant};

static RE_PLACEHOLDER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\{\{\s*([A-Za-z0-9_.]+)\s*\}\}").unwrap());

pub type Variables = BTreeMap<String, Value>;

const DEFAULT_FALLBACK: &str = "Not applicable for this period.";

// ── Conditions ─────────────────────────────────────────────────────

/// Look up a dotted path. Array segments may be numeric indexes. `null`
/// counts as absent.
pub fn lookup<'a>(context: &'a Value, path: &str) -> Option<&'a Value> {
    let mut current = context;
    for segment in path.split('.').filter(|s| !s.is_empty()) {
        current = match current {
            Value::Object(map) => map.get(segment)?,
            Value::Array(items) => items.get(segment.parse::<usize>().ok()?)?,
            _ => return None,
        };
    }
    (!current.is_null()).then_some(current)
}

/// Numbers as-is, numeric strings parsed, arrays by length.
fn as_number(v: &Value) -> Option<f64> {
    match v {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        Value::Array(items) => Some(items.len() as f64),
        _ => None,
    }
}

fn loosely_equal(a: &Value, b: &Value) -> bool {
    if a == b {
        return true;
    }
    match (a, b) {
        (Value::Array(_), _) | (_, Value::Array(_)) => false,
        _ => matches!((as_number(a), as_number(b)), (Some(x), Some(y)) if x == y),
    }
}

/// Evaluate a condition against report data. Total: a missing field makes
/// every operator false except `not_equals` (true) and `exists` (true when
/// the expected value is `false`).
pub fn evaluate(condition: &ConditionalLogic, context: &Value) -> bool {
    let expected = &condition.value;
    let Some(actual) = lookup(context, &condition.field) else {
        return match condition.operator {
            ConditionOperator::NotEquals => true,
            ConditionOperator::Exists => expected == &Value::Bool(false),
            _ => false,
        };
    };

    match condition.operator {
        ConditionOperator::Equals => loosely_equal(actual, expected),
        ConditionOperator::NotEquals => !loosely_equal(actual, expected),
        ConditionOperator::GreaterThan => {
            matches!((as_number(actual), as_number(expected)), (Some(a), Some(b)) if a > b)
        }
        ConditionOperator::LessThan => {
            matches!((as_number(actual), as_number(expected)), (Some(a), Some(b)) if a < b)
        }
        ConditionOperator::Contains => match (actual, expected) {
            (Value::String(haystack), Value::String(needle)) => haystack.contains(needle.as_str()),
            (Value::Array(items), needle) => items.iter().any(|item| loosely_equal(item, needle)),
            (Value::Object(map), Value::String(key)) => map.contains_key(key),
            _ => false,
        },
        ConditionOperator::Exists => expected.as_bool().unwrap_or(true),
    }
}

// ── Variables ──────────────────────────────────────────────────────

/// Merge builtins, supplied values and declared defaults, then check every
/// declared variable. All problems are reported together.
///
/// String input is coerced for number, boolean and date variables so values
/// from a command line can be passed through unchanged.
pub fn resolve_variables(
    template: &ReportTemplate,
    supplied: &Variables,
    builtins: &Variables,
) -> Result<Variables> {
    let mut resolved = builtins.clone();
    resolved.extend(supplied.iter().map(|(k, v)| (k.clone(), v.clone())));

    let mut errors = Vec::new();
    for var in &template.variables {
        let key = var.key.as_str();
        let raw = supplied
            .get(key)
            .filter(|v| !v.is_null())
            .or(var.default_value.as_ref())
            .or_else(|| builtins.get(key));
        let Some(raw) = raw else {
            if var.required {
                errors.push(format!("Variable '{key}' is required"));
            }
            continue;
        };

        let value = match coerce(raw, var.var_type) {
            Ok(v) => v,
            Err(expected) => {
                errors.push(format!("Variable '{key}' must be {expected}"));
                continue;
            }
        };

        if let Some(rules) = &var.validation {
            if let (Some(pattern), Value::String(s)) = (&rules.pattern, &value) {
                match Regex::new(pattern) {
                    Ok(re) if !re.is_match(s) => {
                        errors.push(format!("Variable '{key}' does not match pattern {pattern}"))
                    }
                    Ok(_) => {}
                    Err(e) => errors.push(format!("Variable '{key}' has an invalid pattern: {e}")),
                }
            }
            if let Some(n) = value.as_f64() {
                if let Some(min) = rules.min.filter(|min| n < *min) {
                    errors.push(format!("Variable '{key}' must be at least {min}"));
                }
                if let Some(max) = rules.max.filter(|max| n > *max) {
                    errors.push(format!("Variable '{key}' must be at most {max}"));
                }
            }
            if !rules.options.is_empty() {
                let chosen = value.as_str().unwrap_or_default();
                if !rules.options.iter().any(|o| o == chosen) {
                    errors.push(format!(
                        "Variable '{key}' must be one of: {}",
                        rules.options.join(", ")
                    ));
                }
            }
        }

        resolved.insert(key.to_string(), value);
    }

    if errors.is_empty() {
        Ok(resolved)
    } else {
        Err(Error::Validation(errors))
    }
}

/// Convert to the declared type, or name what was expected.
fn coerce(raw: &Value, var_type: Option<VariableType>) -> std::result::Result<Value, &'static str> {
    match var_type {
        None => Ok(raw.clone()),
        Some(VariableType::String) | Some(VariableType::Select) => match raw {
            Value::String(_) => Ok(raw.clone()),
            _ => Err("a string"),
        },
        Some(VariableType::Number) => match raw {
            Value::Number(_) => Ok(raw.clone()),
            Value::String(s) => s
                .trim()
                .parse::<f64>()
                .ok()
                .filter(|n| n.is_finite())
                .map(|n| json!(n))
                .ok_or("a number"),
            _ => Err("a number"),
        },
        Some(VariableType::Boolean) => match raw {
            Value::Bool(_) => Ok(raw.clone()),
            Value::String(s) => match s.trim().to_lowercase().as_str() {
                "true" | "yes" | "1" => Ok(Value::Bool(true)),
                "false" | "no" | "0" => Ok(Value::Bool(false)),
                _ => Err("true or false"),
            },
            _ => Err("true or false"),
        },
        Some(VariableType::Date) => match raw {
            Value::String(s) if NaiveDate::parse_from_str(s.trim(), "%Y-%m-%d").is_ok() => {
                Ok(Value::String(s.trim().to_string()))
            }
            _ => Err("a date (YYYY-MM-DD)"),
        },
    }
}

/// Replace `{{key}}` placeholders. Unknown keys are left in place.
pub fn substitute(text: &str, variables: &Variables) -> String {
    RE_PLACEHOLDER
        .replace_all(text, |caps: &regex::Captures| match variables.get(&caps[1]) {
            Some(Value::String(s)) => s.clone(),
            Some(Value::Null) => String::new(),
            Some(other) => other.to_string(),
            None => caps[0].to_string(),
        })
        .into_owned()
}

// ── Sections ───────────────────────────────────────────────────────

/// Bind template sections to report data, in `order`.
///
/// An optional section whose condition is false is dropped; a required one
/// is kept with the fallback variant and no data.
/// Sections without a type never pass `validate` and are skipped.
pub fn compose_sections(
    template: &ReportTemplate,
    context: &Value,
    variables: &Variables,
) -> Vec<ComposedSection> {
    let mut sections: Vec<&ReportSection> = template.sections.iter().collect();
    sections.sort_by_key(|s| s.order.unwrap_or(i32::MAX));

    sections
        .into_iter()
        .filter_map(|section| {
            let Some(content) = &section.content else {
                log::warn!("skipping section {}: no type", section.id);
                return None;
            };
            let holds = section
                .condition
                .as_ref()
                .map_or(true, |c| evaluate(c, context));
            if !holds && !section.required {
                log::debug!("dropping section {}: condition not met", section.id);
                return None;
            }

            let (variant, body, data) = if holds {
                let body = match content {
                    SectionContent::Text { body } => Some(substitute(body, variables)),
                    _ => section.description.as_deref().map(|d| substitute(d, variables)),
                };
                (SectionVariant::Full, body, section_data(content, context))
            } else {
                let text = section.fallback_text.as_deref().unwrap_or(DEFAULT_FALLBACK);
                (SectionVariant::Fallback, Some(substitute(text, variables)), Value::Null)
            };

            Some(ComposedSection {
                id: section.id.clone(),
                title: section.name.clone(),
                kind: content.kind().to_string(),
                order: section.order.unwrap_or_default(),
                variant,
                body,
                data,
            })
        })
        .collect()
}

fn section_data(content: &SectionContent, context: &Value) -> Value {
    let part = |key: &str| lookup(context, key).cloned().unwrap_or(Value::Null);
    match content {
        SectionContent::Summary => part("summary"),
        SectionContent::Timeline => part("timeline"),
        SectionContent::Milestones => part("milestones"),
        SectionContent::Challenges => part("challenges"),
        SectionContent::Achievements => part("achievements"),
        SectionContent::Financials => part("financials"),
        SectionContent::Recommendations => json!({
            "recommendations": part("recommendations"),
            "next_period_plan": part("next_period_plan"),
        }),
        SectionContent::Metrics { include } => filter_metrics(part("metrics"), include),
        SectionContent::Photos { limit } => match (part("photos"), limit) {
            (Value::Array(mut photos), Some(n)) => {
                photos.truncate(*n);
                Value::Array(photos)
            }
            (photos, _) => photos,
        },
        SectionContent::Chart { chart_type, source } => json!({
            "chart_type": chart_type,
            "source": source,
            "value": part(source.as_str()),
        }),
        SectionContent::Table { source, columns } => {
            let rows = match part(source.as_str()) {
                Value::Array(rows) if !columns.is_empty() => rows
                    .into_iter()
                    .map(|row| {
                        let projected: Map<String, Value> = columns
                            .iter()
                            .map(|c| (c.clone(), lookup(&row, c).cloned().unwrap_or(Value::Null)))
                            .collect();
                        Value::Object(projected)
                    })
                    .collect(),
                other => other,
            };
            json!({ "columns": columns, "rows": rows })
        }
        SectionContent::Text { .. } => Value::Null,
    }
}

/// Keep only the named impact values and their trends.
fn filter_metrics(mut metrics: Value, include: &[String]) -> Value {
    if include.is_empty() {
        return metrics;
    }
    let keep = |name: &str| include.iter().any(|i| i == name);
    if let Value::Object(map) = &mut metrics {
        for (key, part) in map.iter_mut() {
            match (key.as_str(), part) {
                ("trends", Value::Array(trends)) => trends.retain(|t| {
                    t.get("metric").and_then(Value::as_str).is_some_and(keep)
                }),
                (_, Value::Object(values)) => values.retain(|name, _| keep(name.as_str())),
                _ => {}
            }
        }
    }
    metrics
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::template::defaults::{default_templates, COMPLIANCE_ID, PROJECT_PROGRESS_ID};

    fn cond(field: &str, operator: ConditionOperator, value: Value) -> ConditionalLogic {
        ConditionalLogic {
            field: field.into(),
            operator,
            value,
        }
    }

    fn template(id: &str) -> ReportTemplate {
        default_templates(chrono::Utc::now())
            .into_iter()
            .find(|t| t.id == id)
            .unwrap()
    }

    fn context() -> Value {
        json!({
            "summary": { "overall_progress": 42.5, "project_name": "Mangrove" },
            "challenges": [],
            "photos": [{"url": "a"}, {"url": "b"}, {"url": "c"}],
            "tags": ["coastal", "blue-carbon"],
            "status": "final",
            "variables": { "include_financials": false },
        })
    }

    #[test]
    fn test_evaluate_operators() {
        use ConditionOperator::*;
        let ctx = context();
        assert!(evaluate(&cond("status", Equals, json!("final")), &ctx));
        assert!(evaluate(&cond("summary.overall_progress", GreaterThan, json!(40)), &ctx));
        assert!(evaluate(&cond("summary.overall_progress", LessThan, json!("50")), &ctx));
        assert!(evaluate(&cond("photos", GreaterThan, json!(2)), &ctx));
        assert!(!evaluate(&cond("challenges", GreaterThan, json!(0)), &ctx));
        assert!(evaluate(&cond("tags", Contains, json!("coastal")), &ctx));
        assert!(evaluate(&cond("summary.project_name", Contains, json!("grove")), &ctx));
        assert!(evaluate(&cond("photos.1.url", Equals, json!("b")), &ctx));
        assert!(evaluate(&cond("variables.include_financials", NotEquals, json!(true)), &ctx));
    }

    #[test]
    fn test_missing_field_is_false_except_not_equals_and_exists_false() {
        use ConditionOperator::*;
        let ctx = context();
        for op in [Equals, GreaterThan, LessThan, Contains] {
            assert!(!evaluate(&cond("nope.deeper", op, json!(1)), &ctx), "{op:?}");
        }
        assert!(evaluate(&cond("nope", NotEquals, json!(1)), &ctx));
        assert!(!evaluate(&cond("nope", Exists, json!(true)), &ctx));
        assert!(evaluate(&cond("nope", Exists, json!(false)), &ctx));
        assert!(evaluate(&cond("status", Exists, Value::Null), &ctx));
    }

    #[test]
    fn test_substitute_placeholders() {
        let mut vars = Variables::new();
        vars.insert("project_name".into(), json!("Mangrove"));
        vars.insert("count".into(), json!(3));
        assert_eq!(
            substitute("{{project_name}} has {{ count }} photos, {{unknown}}", &vars),
            "Mangrove has 3 photos, {{unknown}}"
        );
    }

    #[test]
    fn test_resolve_variables_defaults_and_coercion() {
        let t = template(PROJECT_PROGRESS_ID);
        let mut supplied = Variables::new();
        supplied.insert("include_financials".into(), json!("false"));
        let mut builtins = Variables::new();
        builtins.insert("project_name".into(), json!("Mangrove"));

        let vars = resolve_variables(&t, &supplied, &builtins).unwrap();
        assert_eq!(vars["include_financials"], json!(false));
        assert_eq!(vars["audience"], json!("project stakeholders"));
        assert_eq!(vars["project_name"], json!("Mangrove"));
    }

    #[test]
    fn test_resolve_variables_collects_every_failure() {
        let t = template(COMPLIANCE_ID);
        let mut supplied = Variables::new();
        supplied.insert("registry".into(), json!("Unknown Registry"));
        supplied.insert("audit_reference".into(), json!("not-a-ref"));
        let err = resolve_variables(&t, &supplied, &Variables::new()).unwrap_err();
        let messages = err.validation_messages();
        assert_eq!(messages.len(), 2);
        assert!(messages[0].contains("must be one of"));
        assert!(messages[1].contains("does not match pattern"));
    }

    #[test]
    fn test_required_variable_without_value() {
        let mut t = template(COMPLIANCE_ID);
        t.variables[0].default_value = None;
        let err = resolve_variables(&t, &Variables::new(), &Variables::new()).unwrap_err();
        assert_eq!(err.validation_messages(), ["Variable 'registry' is required".to_string()]);
    }

    #[test]
    fn test_compose_sections_drops_optional_and_keeps_required() {
        let t = template(COMPLIANCE_ID);
        let vars = resolve_variables(&t, &Variables::new(), &{
            let mut b = Variables::new();
            b.insert("period_label".into(), json!("Q1 2025"));
            b
        })
        .unwrap();
        let mut ctx = context();
        ctx["variables"] = json!(vars);
        ctx["milestones"] = json!([{ "title": "Survey", "status": "completed", "extra": 1 }]);

        let sections = compose_sections(&t, &ctx, &vars);
        let ids: Vec<&str> = sections.iter().map(|s| s.id.as_str()).collect();
        // No audit reference supplied: the optional reference section is dropped.
        assert_eq!(ids, vec!["summary", "milestones", "quality"]);

        let quality = &sections[2];
        assert_eq!(quality.variant, SectionVariant::Fallback);
        assert_eq!(
            quality.body.as_deref(),
            Some("No quality concerns were raised during Q1 2025.")
        );
        assert_eq!(quality.data, Value::Null);

        let table = &sections[1].data;
        assert_eq!(table["rows"][0]["title"], json!("Survey"));
        assert!(table["rows"][0].get("extra").is_none());
    }

    #[test]
    fn test_compose_sections_in_order_with_limits() {
        let t = template(PROJECT_PROGRESS_ID);
        let mut builtins = Variables::new();
        builtins.insert("project_name".into(), json!("Mangrove"));
        builtins.insert("period_label".into(), json!("Q1 2025"));
        let vars = resolve_variables(&t, &Variables::new(), &builtins).unwrap();
        let mut ctx = context();
        ctx["variables"] = json!(vars);

        let sections = compose_sections(&t, &ctx, &vars);
        for pair in sections.windows(2) {
            assert!(pair[0].order <= pair[1].order);
        }
        assert_eq!(
            sections[0].body.as_deref(),
            Some("Progress report for Mangrove covering Q1 2025, prepared for project stakeholders.")
        );
        assert!(sections.iter().any(|s| s.id == "photos"));
        // Financials are included by default.
        assert!(sections.iter().any(|s| s.id == "financials"));
        assert!(!sections.iter().any(|s| s.id == "challenges"));
    }

    #[test]
    fn test_filter_metrics() {
        let metrics = json!({
            "period": { "carbon_impact": 1.0, "trees_planted": 2.0 },
            "trends": [{ "metric": "carbon_impact" }, { "metric": "progress" }],
        });
        let filtered = filter_metrics(metrics, &["carbon_impact".to_string()]);
        assert_eq!(filtered["period"], json!({ "carbon_impact": 1.0 }));
        assert_eq!(filtered["trends"].as_array().unwrap().len(), 1);
    }

    #[test]
    fn test_compose_sections_skips_untyped_section() {
        let mut t = template(PROJECT_PROGRESS_ID);
        t.sections.truncate(1);
        let mut untyped = t.sections[0].clone();
        untyped.id = "loose".into();
        untyped.content = None;
        t.sections.push(untyped);

        let sections = compose_sections(&t, &context(), &Variables::new());
        let ids: Vec<&str> = sections.iter().map(|s| s.id.as_str()).collect();
        assert_eq!(ids, vec![t.sections[0].id.as_str()]);
    }
}
