use regex::Regex;
use serde_json::Value;
use thiserror::Error;

use crate::answers::AnswerSet;
use crate::context::Context;
use crate::logic::strict_equals;
use crate::spec::{DemographicField, QuestionSpec, QuestionType, QuestionnaireDefinition};
use crate::visibility::{Resolution, resolve_questions};

/// Why a single answer was refused.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum AnswerError {
    #[error("answer to '{question_id}' must be a number or a string")]
    NotScalar { question_id: String },
    #[error("answer to '{question_id}' must be {expected}")]
    TypeMismatch {
        question_id: String,
        expected: &'static str,
    },
    #[error("answer to '{question_id}' is below the minimum of {min}")]
    BelowMinimum { question_id: String, min: f64 },
    #[error("answer to '{question_id}' is above the maximum of {max}")]
    AboveMaximum { question_id: String, max: f64 },
    #[error("answer to '{question_id}' does not match the expected format")]
    PatternMismatch { question_id: String },
    #[error("answer to '{question_id}' is not one of the offered options")]
    UnknownOption { question_id: String },
    #[error("answer to '{question_id}' is not an allowed value")]
    NotAllowed { question_id: String },
}

impl AnswerError {
    pub fn code(&self) -> &'static str {
        match self {
            AnswerError::NotScalar { .. } => "not_scalar",
            AnswerError::TypeMismatch { .. } => "type_mismatch",
            AnswerError::BelowMinimum { .. } => "min",
            AnswerError::AboveMaximum { .. } => "max",
            AnswerError::PatternMismatch { .. } => "pattern_mismatch",
            AnswerError::UnknownOption { .. } => "unknown_option",
            AnswerError::NotAllowed { .. } => "not_allowed",
        }
    }
}

/// Local gating failure raised before anything is sent for scoring.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GateFailure {
    #[error("Required information missing: {}", .0.join(", "))]
    MissingDemographics(Vec<String>),
    #[error("Please answer all required questions. Missing: {}", .0.join(", "))]
    MissingAnswers(Vec<String>),
}

/// Checks a single answer against the question's type and constraints.
pub fn check_answer(question: &QuestionSpec, value: &Value) -> Result<(), AnswerError> {
    let question_id = || question.id.clone();

    if !matches!(value, Value::String(_) | Value::Number(_)) {
        return Err(AnswerError::NotScalar {
            question_id: question_id(),
        });
    }

    match question.kind {
        QuestionType::Integer if !is_integral(value) => {
            return Err(AnswerError::TypeMismatch {
                question_id: question_id(),
                expected: "a whole number",
            });
        }
        QuestionType::Scale if !value.is_number() => {
            return Err(AnswerError::TypeMismatch {
                question_id: question_id(),
                expected: "a number",
            });
        }
        QuestionType::String | QuestionType::Time if !value.is_string() => {
            return Err(AnswerError::TypeMismatch {
                question_id: question_id(),
                expected: "text",
            });
        }
        QuestionType::SingleChoice
            if !question.options.is_empty()
                && !question
                    .options
                    .iter()
                    .any(|option| strict_equals(&option.code, value)) =>
        {
            return Err(AnswerError::UnknownOption {
                question_id: question_id(),
            });
        }
        _ => {}
    }

    if let Some(number) = value.as_f64() {
        let (min, max) = numeric_bounds(question);
        if let Some(min) = min
            && number < min
        {
            return Err(AnswerError::BelowMinimum {
                question_id: question_id(),
                min,
            });
        }
        if let Some(max) = max
            && number > max
        {
            return Err(AnswerError::AboveMaximum {
                question_id: question_id(),
                max,
            });
        }
    }

    if let Some(pattern) = &question.constraints.pattern
        && let Some(text) = value.as_str()
        && let Ok(regex) = Regex::new(&format!("^(?:{pattern})$"))
        && !regex.is_match(text)
    {
        return Err(AnswerError::PatternMismatch {
            question_id: question_id(),
        });
    }

    if let Some(allowed) = &question.constraints.allowed_values
        && !allowed.is_empty()
        && !allowed.iter().any(|candidate| strict_equals(candidate, value))
    {
        return Err(AnswerError::NotAllowed {
            question_id: question_id(),
        });
    }

    Ok(())
}

fn is_integral(value: &Value) -> bool {
    value.is_i64() || value.is_u64() || value.as_f64().is_some_and(|n| n.fract() == 0.0)
}

/// Range from `constraints`, falling back to a `scale` block for sliders.
fn numeric_bounds(question: &QuestionSpec) -> (Option<f64>, Option<f64>) {
    let scale = question.extensions.get("scale");
    let bound = |key: &str| scale.and_then(|scale| scale.get(key)).and_then(Value::as_f64);
    (
        question.constraints.min_value.or_else(|| bound("min_value")),
        question.constraints.max_value.or_else(|| bound("max_value")),
    )
}

/// Required demographic fields with no usable value.
pub fn missing_demographics<'a>(
    fields: &'a [DemographicField],
    demographics: &Context,
) -> Vec<&'a DemographicField> {
    fields
        .iter()
        .filter(|field| field.required)
        .filter(|field| match demographics.get(&field.id) {
            None | Some(Value::Null) => true,
            Some(Value::String(text)) => text.is_empty(),
            Some(_) => false,
        })
        .collect()
}

/// Effectively required visible questions with no answer, in display order.
pub fn missing_answers(resolution: &Resolution, answers: &AnswerSet) -> Vec<String> {
    resolution
        .required_ids()
        .filter(|id| !answers.contains(id))
        .map(str::to_string)
        .collect()
}

/// Local checks run before submission, in order: required demographics, then
/// required visible questions resolved against the current demographics.
/// Returns the resolution used so callers can send only visible answers.
pub fn gate(
    definition: &QuestionnaireDefinition,
    demographics: &Context,
    answers: &AnswerSet,
) -> Result<Resolution, GateFailure> {
    let missing_fields = missing_demographics(definition.demographic_fields(), demographics);
    if !missing_fields.is_empty() {
        return Err(GateFailure::MissingDemographics(
            missing_fields
                .iter()
                .map(|field| field.label.clone())
                .collect(),
        ));
    }

    let resolution = resolve_questions(&definition.questions, demographics);
    let missing = missing_answers(&resolution, answers);
    if !missing.is_empty() {
        return Err(GateFailure::MissingAnswers(missing));
    }
    Ok(resolution)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn question(raw: Value) -> QuestionSpec {
        serde_json::from_value(raw).expect("question")
    }

    #[test]
    fn integer_answers_respect_range() {
        let q = question(json!({
            "id": "age",
            "text": "Age",
            "type": "integer",
            "constraints": { "min_value": 0, "max_value": 120 }
        }));
        assert!(check_answer(&q, &json!(42)).is_ok());
        assert_eq!(check_answer(&q, &json!(4.5)).unwrap_err().code(), "type_mismatch");
        assert_eq!(check_answer(&q, &json!("42")).unwrap_err().code(), "type_mismatch");
        assert_eq!(check_answer(&q, &json!(-1)).unwrap_err().code(), "min");
        assert_eq!(check_answer(&q, &json!(121)).unwrap_err().code(), "max");
    }

    #[test]
    fn scale_bounds_come_from_scale_block() {
        let q = question(json!({
            "id": "pain",
            "text": "Pain",
            "type": "scale",
            "scale": { "min_value": 0, "max_value": 10, "step": 1 }
        }));
        assert!(check_answer(&q, &json!(7)).is_ok());
        assert_eq!(check_answer(&q, &json!(11)).unwrap_err().code(), "max");
    }

    #[test]
    fn string_pattern_must_cover_whole_value() {
        let q = question(json!({
            "id": "bedtime",
            "text": "Bedtime",
            "type": "string",
            "constraints": { "pattern": "[0-2][0-9]:[0-5][0-9]" }
        }));
        assert!(check_answer(&q, &json!("23:15")).is_ok());
        assert_eq!(
            check_answer(&q, &json!("at 23:15")).unwrap_err().code(),
            "pattern_mismatch"
        );
    }

    #[test]
    fn single_choice_requires_known_code() {
        let q = question(json!({
            "id": "q1",
            "text": "Mood",
            "type": "single_choice",
            "options": [
                { "code": 0, "label": "Never" },
                { "code": 1, "label": "Sometimes" }
            ]
        }));
        assert!(check_answer(&q, &json!(1)).is_ok());
        assert_eq!(check_answer(&q, &json!("1")).unwrap_err().code(), "unknown_option");
        assert_eq!(check_answer(&q, &json!([1])).unwrap_err().code(), "not_scalar");
        assert_eq!(check_answer(&q, &Value::Null).unwrap_err().code(), "not_scalar");
    }

    #[test]
    fn allowed_values_apply_to_any_type() {
        let q = question(json!({
            "id": "q1",
            "text": "Code",
            "type": "frequency",
            "constraints": { "allowed_values": ["a", "b"] }
        }));
        assert!(check_answer(&q, &json!("a")).is_ok());
        assert_eq!(check_answer(&q, &json!("c")).unwrap_err().code(), "not_allowed");
    }

    #[test]
    fn empty_demographic_counts_as_missing() {
        let fields: Vec<DemographicField> = serde_json::from_value(json!([
            { "id": "gender", "label": "Sexe", "required": true },
            { "id": "site", "label": "Site", "required": false }
        ]))
        .expect("fields");
        let ctx = Context::from_value(&json!({ "gender": "" }));
        let missing = missing_demographics(&fields, &ctx);
        assert_eq!(missing.len(), 1);
        assert_eq!(missing[0].id, "gender");
        assert_eq!(missing[0].required_message(), "Sexe is required");

        let ctx = Context::from_value(&json!({ "gender": "F" }));
        assert!(missing_demographics(&fields, &ctx).is_empty());
    }
}
