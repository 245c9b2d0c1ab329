use std::collections::BTreeMap;
use std::fmt;

use clinq_client::{QuestionnaireService, TransportError};
use clinq_spec::logic::strict_equals;
use clinq_spec::spec::{
    AnswersRequest, Category, QuestionnaireDefinition, ScoreResponse,
};
use clinq_spec::{
    AnswerSet, Context, Progress, RenderPayload, Resolution, build_render_payload, check_answer,
    gate, resolve_questions,
};
use serde::Serialize;
use serde_json::Value;

use crate::error::SessionError;

/// Where the workflow is. `Completed` holds a score; `Failed` holds a
/// [`Failure`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Loading,
    Ready,
    Submitting,
    Completed,
    Failed,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Phase::Loading => "loading",
            Phase::Ready => "ready",
            Phase::Submitting => "submitting",
            Phase::Completed => "completed",
            Phase::Failed => "failed",
        };
        f.write_str(label)
    }
}

/// Terminal failure recorded by the workflow.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Failure {
    /// The definition could not be fetched. The session cannot recover.
    Load(String),
    /// Scoring failed after the transport gave up. Restart is allowed.
    Submit(String),
}

impl Failure {
    pub fn message(&self) -> &str {
        match self {
            Failure::Load(message) | Failure::Submit(message) => message,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SessionOptions {
    /// Ask the service to validate answers before submitting them.
    pub prevalidate: bool,
}

/// One respondent working through one questionnaire.
///
/// All state changes go through the transition methods; the visible
/// question set is recomputed whenever demographics change.
#[derive(Debug, Clone)]
pub struct Session {
    category: Category,
    questionnaire_id: String,
    options: SessionOptions,
    phase: Phase,
    definition: Option<QuestionnaireDefinition>,
    demographics: Context,
    answers: AnswerSet,
    resolution: Resolution,
    errors: Vec<String>,
    result: Option<ScoreResponse>,
    failure: Option<Failure>,
}

impl Session {
    pub fn new(category: Category, questionnaire_id: impl Into<String>) -> Self {
        Self::with_options(category, questionnaire_id, SessionOptions::default())
    }

    pub fn with_options(
        category: Category,
        questionnaire_id: impl Into<String>,
        options: SessionOptions,
    ) -> Self {
        Self {
            category,
            questionnaire_id: questionnaire_id.into(),
            options,
            phase: Phase::Loading,
            definition: None,
            demographics: Context::new(),
            answers: AnswerSet::new(),
            resolution: Resolution::default(),
            errors: Vec::new(),
            result: None,
            failure: None,
        }
    }

    pub fn category(&self) -> Category {
        self.category
    }

    pub fn questionnaire_id(&self) -> &str {
        &self.questionnaire_id
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn definition(&self) -> Option<&QuestionnaireDefinition> {
        self.definition.as_ref()
    }

    pub fn demographics(&self) -> &Context {
        &self.demographics
    }

    pub fn answers(&self) -> &AnswerSet {
        &self.answers
    }

    pub fn resolution(&self) -> &Resolution {
        &self.resolution
    }

    /// Advisory errors from the last gating attempt or failure.
    pub fn errors(&self) -> &[String] {
        &self.errors
    }

    pub fn result(&self) -> Option<&ScoreResponse> {
        self.result.as_ref()
    }

    pub fn warnings(&self) -> &[String] {
        self.result
            .as_ref()
            .map(ScoreResponse::warnings)
            .unwrap_or_default()
    }

    pub fn failure(&self) -> Option<&Failure> {
        self.failure.as_ref()
    }

    /// Accepts a fetched definition (or the fetch failure) and leaves
    /// `Loading`.
    pub fn finish_load(
        &mut self,
        outcome: Result<QuestionnaireDefinition, TransportError>,
    ) -> Result<(), SessionError> {
        self.expect_phase("load", Phase::Loading)?;
        match outcome {
            Ok(definition) => {
                tracing::debug!(
                    questionnaire = %self.questionnaire_id,
                    questions = definition.questions.len(),
                    "questionnaire loaded"
                );
                self.resolution = resolve_questions(&definition.questions, &self.demographics);
                self.definition = Some(definition);
                self.transition(Phase::Ready);
            }
            Err(err) => {
                let message = err.to_string();
                tracing::warn!(
                    questionnaire = %self.questionnaire_id,
                    error = %message,
                    "questionnaire failed to load"
                );
                self.errors = vec![message.clone()];
                self.failure = Some(Failure::Load(message));
                self.transition(Phase::Failed);
            }
        }
        Ok(())
    }

    /// Fetches the definition through `service`.
    pub async fn load<S>(&mut self, service: &S) -> Result<(), SessionError>
    where
        S: QuestionnaireService + ?Sized,
    {
        self.expect_phase("load", Phase::Loading)?;
        let outcome = service
            .get_questionnaire(self.category, &self.questionnaire_id)
            .await;
        self.finish_load(outcome)
    }

    /// Records a demographic value. Null or an empty string clears it.
    pub fn set_demographic(&mut self, field_id: &str, value: Value) -> Result<(), SessionError> {
        self.expect_phase("edit demographics", Phase::Ready)?;
        let definition = self.loaded()?;
        let field = definition
            .demographic_fields()
            .iter()
            .find(|field| field.id == field_id)
            .ok_or_else(|| SessionError::UnknownField(field_id.to_string()))?;

        let cleared = match &value {
            Value::Null => true,
            Value::String(text) => text.is_empty(),
            _ => false,
        };
        if !cleared
            && !field.options.is_empty()
            && !field
                .options
                .iter()
                .any(|option| strict_equals(&option.code, &value))
        {
            return Err(SessionError::InvalidDemographic {
                field: field_id.to_string(),
                value,
            });
        }

        if cleared {
            self.demographics.remove(field_id);
        } else {
            self.demographics.insert(field_id, value);
        }
        self.resolution = resolve_questions(&self.loaded()?.questions, &self.demographics);
        self.errors.clear();
        tracing::debug!(
            field = field_id,
            visible = self.resolution.len(),
            "demographics changed"
        );
        Ok(())
    }

    /// Records an answer after checking it against the question's type and
    /// constraints.
    pub fn answer(&mut self, question_id: &str, value: Value) -> Result<(), SessionError> {
        self.expect_phase("answer", Phase::Ready)?;
        let question = self
            .loaded()?
            .question(question_id)
            .ok_or_else(|| SessionError::UnknownQuestion(question_id.to_string()))?;
        check_answer(question, &value)?;
        self.answers.insert(question_id, value);
        self.errors.clear();
        Ok(())
    }

    pub fn progress(&self) -> Progress {
        Progress::compute(&self.resolution, &self.answers)
    }

    pub fn submit_enabled(&self) -> bool {
        self.phase == Phase::Ready && self.progress().is_complete()
    }

    pub fn render(&self) -> Option<RenderPayload> {
        let definition = self.definition.as_ref()?;
        let mut payload = build_render_payload(definition, &self.demographics, &self.answers);
        payload.submit_enabled = self.submit_enabled();
        Some(payload)
    }

    /// Runs local gating and, when it passes, moves to `Submitting` and
    /// returns the request to send. `None` means nothing should be sent:
    /// either a submission is already in flight, or gating failed and
    /// [`Session::errors`] says why.
    pub fn begin_submit(&mut self) -> Result<Option<AnswersRequest>, SessionError> {
        if self.phase == Phase::Submitting {
            return Ok(None);
        }
        self.expect_phase("submit", Phase::Ready)?;
        let definition = self.loaded()?;

        let resolution = match gate(definition, &self.demographics, &self.answers) {
            Ok(resolution) => resolution,
            Err(failure) => {
                tracing::debug!(reason = %failure, "submission blocked locally");
                self.errors = vec![failure.to_string()];
                return Ok(None);
            }
        };

        let demographics = (!self.demographics.is_empty()).then(|| {
            self.demographics
                .as_map()
                .iter()
                .map(|(key, value)| (key.clone(), value.clone()))
                .collect::<BTreeMap<_, _>>()
        });
        let request = AnswersRequest {
            answers: self.answers.visible(&resolution),
            demographics,
        };
        self.resolution = resolution;
        self.errors.clear();
        self.transition(Phase::Submitting);
        Ok(Some(request))
    }

    /// Stores the scoring outcome of the in-flight submission.
    pub fn finish_submit(
        &mut self,
        outcome: Result<ScoreResponse, TransportError>,
    ) -> Result<(), SessionError> {
        self.expect_phase("finish a submission", Phase::Submitting)?;
        match outcome {
            Ok(response) => {
                for warning in response.warnings() {
                    tracing::info!(
                        questionnaire = %self.questionnaire_id,
                        warning = %warning,
                        "scoring warning"
                    );
                }
                self.result = Some(response);
                self.errors.clear();
                self.transition(Phase::Completed);
            }
            Err(err) => {
                let message = err.to_string();
                self.errors = vec![message.clone()];
                self.failure = Some(Failure::Submit(message));
                self.transition(Phase::Failed);
            }
        }
        Ok(())
    }

    /// Gates, optionally pre-validates, then submits through `service`.
    /// Returns the phase reached.
    pub async fn submit<S>(&mut self, service: &S) -> Result<Phase, SessionError>
    where
        S: QuestionnaireService + ?Sized,
    {
        let Some(request) = self.begin_submit()? else {
            return Ok(self.phase);
        };

        if self.options.prevalidate {
            let check = AnswersRequest {
                answers: request.answers.clone(),
                demographics: None,
            };
            match service
                .validate_answers(self.category, &self.questionnaire_id, &check)
                .await
            {
                Ok(report) if !report.valid => {
                    self.errors = if report.errors.is_empty() {
                        vec!["The scoring service rejected the answers.".to_string()]
                    } else {
                        report.errors
                    };
                    self.transition(Phase::Ready);
                    return Ok(self.phase);
                }
                Ok(_) => {}
                Err(err) => {
                    self.finish_submit(Err(err))?;
                    return Ok(self.phase);
                }
            }
        }

        let outcome = service
            .submit_answers(self.category, &self.questionnaire_id, &request)
            .await;
        self.finish_submit(outcome)?;
        Ok(self.phase)
    }

    /// Back to `Ready` with no answers, result or errors. Demographics are
    /// kept.
    pub fn restart(&mut self) -> Result<(), SessionError> {
        match (&self.phase, &self.failure) {
            (Phase::Failed, Some(Failure::Load(_))) => return Err(SessionError::LoadFailed),
            (Phase::Completed | Phase::Failed, _) => {}
            (phase, _) => {
                return Err(SessionError::InvalidPhase {
                    action: "restart",
                    phase: *phase,
                });
            }
        }
        self.answers.clear();
        self.result = None;
        self.failure = None;
        self.errors.clear();
        self.transition(Phase::Ready);
        Ok(())
    }

    fn loaded(&self) -> Result<&QuestionnaireDefinition, SessionError> {
        self.definition.as_ref().ok_or(SessionError::InvalidPhase {
            action: "use the questionnaire",
            phase: self.phase,
        })
    }

    fn expect_phase(&self, action: &'static str, expected: Phase) -> Result<(), SessionError> {
        if self.phase == expected {
            return Ok(());
        }
        if matches!(self.failure, Some(Failure::Load(_))) {
            return Err(SessionError::LoadFailed);
        }
        Err(SessionError::InvalidPhase {
            action,
            phase: self.phase,
        })
    }

    fn transition(&mut self, next: Phase) {
        tracing::debug!(
            questionnaire = %self.questionnaire_id,
            from = %self.phase,
            to = %next,
            "session transition"
        );
        self.phase = next;
    }
}
