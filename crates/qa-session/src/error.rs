use clinq_spec::AnswerError;
use serde_json::Value;
use thiserror::Error;

use crate::session::Phase;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum SessionError {
    #[error("cannot {action} while the session is {phase}")]
    InvalidPhase { action: &'static str, phase: Phase },
    #[error("questionnaire failed to load; start a new session instead")]
    LoadFailed,
    #[error("questionnaire has no question '{0}'")]
    UnknownQuestion(String),
    #[error("questionnaire has no demographic field '{0}'")]
    UnknownField(String),
    #[error("'{value}' is not an option of demographic field '{field}'")]
    InvalidDemographic { field: String, value: Value },
    #[error(transparent)]
    InvalidAnswer(#[from] AnswerError),
}
