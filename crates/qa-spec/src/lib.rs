#![allow(missing_docs)]

pub mod answers;
pub mod context;
pub mod logic;
pub mod progress;
pub mod render;
pub mod report;
pub mod spec;
pub mod validate;
pub mod visibility;

pub use answers::AnswerSet;
pub use context::Context;
pub use logic::{Operator, Outcome, Rule, evaluate, strict_equals};
pub use progress::{Progress, next_question};
pub use render::{
    RenderField, RenderPayload, RenderQuestion, RenderSection, RenderStatus, build_render_payload,
    render_json_ui, render_text,
};
pub use report::{ReportError, render_report};
pub use spec::{
    AnswersRequest, Category, DemographicField, QuestionSpec, QuestionType,
    QuestionnaireDefinition, QuestionnaireSummary, ScoreResponse,
};
pub use validate::{AnswerError, GateFailure, check_answer, gate, missing_answers};
pub use visibility::{Resolution, is_required, is_visible, resolve_fields, resolve_questions};
