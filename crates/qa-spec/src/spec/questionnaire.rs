use std::fmt;
use std::str::FromStr;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

use crate::spec::question::QuestionSpec;
use crate::spec::respondent::RespondentSchema;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SpecError {
    #[error("invalid category '{0}': expected 'auto' or 'hetero'")]
    InvalidCategory(String),
}

/// Instrument family served under `/api/{category}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    /// Self-report questionnaires filled in by the patient.
    Auto,
    /// Clinician-rated instruments.
    Hetero,
}

impl Category {
    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Auto => "auto",
            Category::Hetero => "hetero",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Category {
    type Err = SpecError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "auto" => Ok(Category::Auto),
            "hetero" => Ok(Category::Hetero),
            other => Err(SpecError::InvalidCategory(other.to_string())),
        }
    }
}

/// Entry returned by the questionnaire listing endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct QuestionnaireSummary {
    pub id: String,
    pub name: String,
    pub abbreviation: String,
    pub language: String,
    pub category: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct QuestionnaireMetadata {
    pub id: String,
    pub name: String,
    pub abbreviation: String,
    pub language: String,
    #[serde(default)]
    pub version: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reference_period: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_questions: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scoring_range: Option<Vec<f64>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sources: Option<Vec<String>>,
    #[serde(flatten, default, skip_serializing_if = "Map::is_empty")]
    pub extensions: Map<String, Value>,
}

/// Ordered group of questions. `question_ids` order is display order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Section {
    pub id: String,
    pub label: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub question_ids: Vec<String>,
    #[serde(flatten, default, skip_serializing_if = "Map::is_empty")]
    pub extensions: Map<String, Value>,
}

/// Full questionnaire structure as served by the definition endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct QuestionnaireDefinition {
    pub metadata: QuestionnaireMetadata,
    #[serde(default)]
    pub sections: Vec<Section>,
    #[serde(default)]
    pub questions: Vec<QuestionSpec>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub respondent: Option<RespondentSchema>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub logic: Option<Value>,
}

impl QuestionnaireDefinition {
    pub fn question(&self, id: &str) -> Option<&QuestionSpec> {
        self.questions.iter().find(|question| question.id == id)
    }

    pub fn demographic_fields(&self) -> &[crate::spec::respondent::DemographicField] {
        self.respondent
            .as_ref()
            .map(|respondent| respondent.fields.as_slice())
            .unwrap_or_default()
    }

    /// Questions listed by a section, in the section's order. Ids with no
    /// matching question are skipped.
    pub fn section_questions<'a>(
        &'a self,
        section: &'a Section,
    ) -> impl Iterator<Item = &'a QuestionSpec> + 'a {
        section
            .question_ids
            .iter()
            .filter_map(move |id| self.question(id))
    }
}
