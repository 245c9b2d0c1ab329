use std::collections::BTreeMap;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Body of the validate and submit endpoints.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct AnswersRequest {
    pub answers: BTreeMap<String, Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub demographics: Option<BTreeMap<String, Value>>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ValidationReport {
    pub valid: bool,
    #[serde(default)]
    pub errors: Vec<String>,
    #[serde(default)]
    pub warnings: Vec<String>,
}

/// Scoring payload. Only `total_score` and `range` are known; the rest is
/// instrument specific and kept as-is. Scorers report `range` either as
/// `[min, max]` or as text such as `"0-50"`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ScoreData {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_score: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub range: Option<Value>,
    #[serde(flatten, default)]
    pub fields: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ScoreResponse {
    pub questionnaire_id: String,
    #[serde(default)]
    pub score_data: ScoreData,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub validation: Option<ValidationReport>,
}

impl ScoreResponse {
    /// Informational caveats attached by the scoring service.
    pub fn warnings(&self) -> &[String] {
        self.validation
            .as_ref()
            .map(|validation| validation.warnings.as_slice())
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn score_data_accepts_text_range() {
        let response: ScoreResponse = serde_json::from_value(json!({
            "questionnaire_id": "AQ",
            "score_data": {
                "total_score": 12,
                "range": "0-50",
                "interpretation": "Score normal",
                "valid": true,
                "errors": []
            }
        }))
        .expect("text range decodes");

        assert_eq!(response.score_data.total_score, Some(12.0));
        assert_eq!(response.score_data.range, Some(json!("0-50")));
        assert_eq!(
            response.score_data.fields["interpretation"],
            json!("Score normal")
        );
    }
}
