use serde::Serialize;
use serde_json::{Map, Value, json};

use crate::{
    answers::AnswerSet,
    context::Context,
    progress::{Progress, next_question},
    spec::{Constraints, QuestionOption, QuestionSpec, QuestionnaireDefinition},
    visibility::{Resolution, resolve_questions, visible_in_section, visible_unsectioned},
};

/// Status labels returned by the renderers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenderStatus {
    /// Required visible questions are still unanswered.
    NeedInput,
    /// Every required visible question is answered.
    Complete,
}

impl RenderStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RenderStatus::NeedInput => "need_input",
            RenderStatus::Complete => "complete",
        }
    }
}

/// A visible question as handed to the rendering layer. `required` is the
/// effective flag, already resolved.
#[derive(Debug, Clone, Serialize)]
pub struct RenderQuestion {
    pub id: String,
    pub text: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub help: Option<String>,
    #[serde(rename = "type")]
    pub kind: String,
    pub required: bool,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub options: Vec<QuestionOption>,
    pub constraints: Constraints,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_value: Option<Value>,
    #[serde(flatten)]
    pub extensions: Map<String, Value>,
}

#[derive(Debug, Clone, Serialize)]
pub struct RenderSection {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub label: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub description: String,
    pub questions: Vec<RenderQuestion>,
}

#[derive(Debug, Clone, Serialize)]
pub struct RenderField {
    pub id: String,
    pub label: String,
    pub required: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub purpose: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub options: Vec<QuestionOption>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_value: Option<Value>,
}

/// Everything a renderer needs for one screen of the questionnaire.
#[derive(Debug, Clone)]
pub struct RenderPayload {
    pub questionnaire_id: String,
    pub title: String,
    pub abbreviation: String,
    pub description: Option<String>,
    pub status: RenderStatus,
    pub next_question_id: Option<String>,
    pub progress: Progress,
    pub submit_enabled: bool,
    pub fields: Vec<RenderField>,
    pub sections: Vec<RenderSection>,
}

impl RenderPayload {
    pub fn visible_count(&self) -> usize {
        self.sections
            .iter()
            .map(|section| section.questions.len())
            .sum()
    }

    pub fn question(&self, id: &str) -> Option<&RenderQuestion> {
        self.sections
            .iter()
            .flat_map(|section| section.questions.iter())
            .find(|question| question.id == id)
    }
}

/// Build the renderer payload from the definition, demographics and answers.
pub fn build_render_payload(
    definition: &QuestionnaireDefinition,
    demographics: &Context,
    answers: &AnswerSet,
) -> RenderPayload {
    let resolution = resolve_questions(&definition.questions, demographics);
    build_with_resolution(definition, &resolution, demographics, answers)
}

pub(crate) fn build_with_resolution(
    definition: &QuestionnaireDefinition,
    resolution: &Resolution,
    demographics: &Context,
    answers: &AnswerSet,
) -> RenderPayload {
    let progress = Progress::compute(resolution, answers);
    let next_question_id = next_question(resolution, answers).map(str::to_string);

    let render_question = |question: &QuestionSpec| RenderQuestion {
        id: question.id.clone(),
        text: question.text.clone(),
        help: question.help.clone(),
        kind: question.kind.as_str().to_string(),
        required: resolution.is_required(&question.id),
        options: question.options.clone(),
        constraints: question.constraints.clone(),
        current_value: answers.get(&question.id).cloned(),
        extensions: question.extensions.clone(),
    };

    let mut sections = definition
        .sections
        .iter()
        .filter_map(|section| {
            let questions = visible_in_section(definition, resolution, section);
            if questions.is_empty() {
                return None;
            }
            Some(RenderSection {
                id: Some(section.id.clone()),
                label: section.label.clone(),
                description: section.description.clone(),
                questions: questions.into_iter().map(render_question).collect(),
            })
        })
        .collect::<Vec<_>>();

    let loose = visible_unsectioned(definition, resolution);
    if !loose.is_empty() {
        sections.push(RenderSection {
            id: None,
            label: String::new(),
            description: String::new(),
            questions: loose.into_iter().map(render_question).collect(),
        });
    }

    let fields = definition
        .demographic_fields()
        .iter()
        .map(|field| RenderField {
            id: field.id.clone(),
            label: field.label.clone(),
            required: field.required,
            purpose: field.purpose.clone(),
            options: field.options.clone(),
            current_value: demographics.get(&field.id).cloned(),
        })
        .collect();

    let status = if next_question_id.is_some() {
        RenderStatus::NeedInput
    } else {
        RenderStatus::Complete
    };

    RenderPayload {
        questionnaire_id: definition.metadata.id.clone(),
        title: definition.metadata.name.clone(),
        abbreviation: definition.metadata.abbreviation.clone(),
        description: definition.metadata.description.clone(),
        status,
        next_question_id,
        progress,
        submit_enabled: progress.is_complete(),
        fields,
        sections,
    }
}

/// Render the payload as a structured JSON-friendly value.
pub fn render_json_ui(payload: &RenderPayload) -> Value {
    json!({
        "questionnaire_id": payload.questionnaire_id,
        "title": payload.title,
        "abbreviation": payload.abbreviation,
        "description": payload.description,
        "status": payload.status.as_str(),
        "next_question_id": payload.next_question_id,
        "progress": {
            "answered": payload.progress.answered,
            "total": payload.progress.total,
            "percent": payload.progress.percent(),
        },
        "submit_enabled": payload.submit_enabled,
        "demographics": payload.fields,
        "sections": payload.sections,
    })
}

/// Render the payload as human-friendly text.
pub fn render_text(payload: &RenderPayload) -> String {
    let mut lines = Vec::new();
    lines.push(format!(
        "Questionnaire: {} ({})",
        payload.title, payload.abbreviation
    ));
    lines.push(format!(
        "Status: {} ({}/{} required answered)",
        payload.status.as_str(),
        payload.progress.answered,
        payload.progress.total
    ));
    if let Some(description) = &payload.description {
        lines.push(format!("About: {}", description));
    }

    if !payload.fields.is_empty() {
        lines.push("Respondent:".to_string());
        for field in &payload.fields {
            let mut entry = format!(" - {} ({})", field.id, field.label);
            if field.required {
                entry.push_str(" [required]");
            }
            if let Some(value) = &field.current_value {
                entry.push_str(&format!(" = {}", value_to_display(value)));
            }
            lines.push(entry);
        }
    }

    for section in &payload.sections {
        if section.label.is_empty() {
            lines.push("Other questions:".to_string());
        } else {
            lines.push(format!("{}:", section.label));
        }
        for question in &section.questions {
            let mut entry = format!(" - {} {}", question.id, question.text);
            if question.required {
                entry.push_str(" [required]");
            }
            if let Some(value) = &question.current_value {
                entry.push_str(&format!(" = {}", value_to_display(value)));
            }
            lines.push(entry);
        }
    }

    match &payload.next_question_id {
        Some(next) => lines.push(format!("Next question: {}", next)),
        None => lines.push("All required questions are answered.".to_string()),
    }
    lines.push(if payload.submit_enabled {
        "Submission: enabled".to_string()
    } else {
        format!(
            "Submission: answer {} more required question(s)",
            payload.progress.remaining()
        )
    });

    lines.join("\n")
}

pub(crate) fn value_to_display(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        Value::Bool(flag) => flag.to_string(),
        Value::Number(num) => num.to_string(),
        other => other.to_string(),
    }
}
