use handlebars::Handlebars;
use serde_json::{Map, Value, json};
use thiserror::Error;

use crate::render::value_to_display;
use crate::spec::ScoreResponse;

const REPORT_TEMPLATE: &str = "\
Result for {{questionnaire_id}}
{{#if total}}Total score: {{total}}{{#if range}} (range {{range}}){{/if}}
{{/if}}{{#each details}}  {{this.key}}: {{this.value}}
{{/each}}{{#if errors}}Errors:
{{#each errors}}  - {{this}}
{{/each}}{{/if}}{{#if warnings}}Warnings:
{{#each warnings}}  - {{this}}
{{/each}}{{/if}}";

#[derive(Debug, Error)]
pub enum ReportError {
    #[error("report template is invalid: {0}")]
    Template(#[from] Box<handlebars::TemplateError>),
    #[error("failed to render report: {0}")]
    Render(#[from] Box<handlebars::RenderError>),
}

/// Plain-text summary of a scoring response.
pub fn render_report(response: &ScoreResponse) -> Result<String, ReportError> {
    let mut registry = Handlebars::new();
    registry.register_escape_fn(handlebars::no_escape);
    registry
        .register_template_string("report", REPORT_TEMPLATE)
        .map_err(Box::new)?;

    let score = &response.score_data;
    let range = score.range.as_ref().and_then(range_to_display);

    let mut details = Vec::new();
    flatten_fields("", &score.fields, &mut details);

    let (errors, warnings) = match &response.validation {
        Some(report) => (report.errors.clone(), report.warnings.clone()),
        None => (Vec::new(), Vec::new()),
    };

    let data = json!({
        "questionnaire_id": response.questionnaire_id,
        "total": score.total_score.map(format_number),
        "range": range,
        "details": details
            .into_iter()
            .map(|(key, value)| json!({ "key": key, "value": value }))
            .collect::<Vec<_>>(),
        "errors": errors,
        "warnings": warnings,
    });

    registry.render("report", &data).map_err(|err| Box::new(err).into())
}

/// Nested score fields as `dotted.key` / display value pairs.
fn flatten_fields(prefix: &str, fields: &Map<String, Value>, out: &mut Vec<(String, String)>) {
    for (key, value) in fields {
        let path = if prefix.is_empty() {
            key.clone()
        } else {
            format!("{prefix}.{key}")
        };
        match value {
            Value::Object(nested) => flatten_fields(&path, nested, out),
            Value::Null => {}
            Value::Number(number) => {
                let shown = number
                    .as_f64()
                    .map(format_number)
                    .unwrap_or_else(|| number.to_string());
                out.push((path, shown));
            }
            other => out.push((path, value_to_display(other))),
        }
    }
}

/// `[0, 27]` and `"0-27"` both read as `0-27`.
fn range_to_display(range: &Value) -> Option<String> {
    match range {
        Value::Null => None,
        Value::Array(bounds) => Some(
            bounds
                .iter()
                .map(|bound| match bound.as_f64() {
                    Some(number) => format_number(number),
                    None => value_to_display(bound),
                })
                .collect::<Vec<_>>()
                .join("-"),
        ),
        other => Some(value_to_display(other)),
    }
}

fn format_number(value: f64) -> String {
    if value.fract() == 0.0 && value.abs() < 1e15 {
        format!("{}", value as i64)
    } else {
        format!("{value}")
    }
}
