use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::logic::Rule;

/// Input kind of a question. Unknown tags are kept verbatim so the rendering
/// layer can decide what to do with them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum QuestionType {
    Integer,
    Scale,
    String,
    Time,
    SingleChoice,
    Other(String),
}

impl QuestionType {
    pub fn as_str(&self) -> &str {
        match self {
            QuestionType::Integer => "integer",
            QuestionType::Scale => "scale",
            QuestionType::String => "string",
            QuestionType::Time => "time",
            QuestionType::SingleChoice => "single_choice",
            QuestionType::Other(tag) => tag,
        }
    }
}

impl From<String> for QuestionType {
    fn from(tag: String) -> Self {
        match tag.as_str() {
            "integer" => QuestionType::Integer,
            "scale" => QuestionType::Scale,
            "string" => QuestionType::String,
            "time" => QuestionType::Time,
            "single_choice" => QuestionType::SingleChoice,
            _ => QuestionType::Other(tag),
        }
    }
}

impl From<QuestionType> for String {
    fn from(kind: QuestionType) -> Self {
        match kind {
            QuestionType::Other(tag) => tag,
            known => known.as_str().to_string(),
        }
    }
}

/// One selectable answer. `code` is what gets stored as the answer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct QuestionOption {
    pub code: Value,
    pub label: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub score: Option<f64>,
    #[serde(flatten, default, skip_serializing_if = "Map::is_empty")]
    pub extensions: Map<String, Value>,
}

/// Type-specific limits attached to a question.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Constraints {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_value: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_value: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pattern: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub allowed_values: Option<Vec<Value>>,
    #[serde(flatten, default, skip_serializing_if = "Map::is_empty")]
    pub extensions: Map<String, Value>,
}

/// Question definition. The engine reads the typed fields; everything else
/// lands in `extensions` and is passed through untouched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct QuestionSpec {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub section_id: Option<String>,
    pub text: String,
    #[serde(rename = "type")]
    #[schemars(with = "String")]
    pub kind: QuestionType,
    #[serde(default)]
    pub required: bool,
    #[serde(default)]
    pub options: Vec<QuestionOption>,
    #[serde(default)]
    pub constraints: Constraints,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub help: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[schemars(with = "Option<Value>")]
    pub display_if: Option<Rule>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[schemars(with = "Option<Value>")]
    pub required_if: Option<Rule>,
    #[serde(flatten, default, skip_serializing_if = "Map::is_empty")]
    pub extensions: Map<String, Value>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn unknown_question_type_round_trips() {
        let question: QuestionSpec = serde_json::from_value(json!({
            "id": "q1",
            "text": "Frequency",
            "type": "frequency",
            "required": true
        }))
        .expect("question");
        assert_eq!(question.kind, QuestionType::Other("frequency".into()));
        assert_eq!(serde_json::to_value(&question).expect("json")["type"], "frequency");
    }

    #[test]
    fn rules_and_extensions_survive_round_trip() {
        let raw = json!({
            "id": "q20",
            "section_id": "s1",
            "text": "Irregular periods",
            "type": "single_choice",
            "required": false,
            "options": [{ "code": 0, "label": "No", "score": 0.5 }],
            "constraints": { "allowed_values": [0, 1] },
            "display_if": { "==": [{ "var": "gender" }, "F"] },
            "required_if": { "==": [{ "var": "gender" }, "F"] },
            "gender_specific": "F"
        });
        let question: QuestionSpec = serde_json::from_value(raw.clone()).expect("question");
        assert_eq!(question.kind, QuestionType::SingleChoice);
        assert!(question.display_if.is_some());
        assert_eq!(question.extensions["gender_specific"], "F");
        assert_eq!(serde_json::to_value(&question).expect("json"), raw);
    }
}
