pub mod question;
pub mod questionnaire;
pub mod respondent;
pub mod submission;

pub use question::{Constraints, QuestionOption, QuestionSpec, QuestionType};
pub use questionnaire::{
    Category, QuestionnaireDefinition, QuestionnaireMetadata, QuestionnaireSummary, Section,
    SpecError,
};
pub use respondent::{DemographicField, FieldValidation, RespondentSchema};
pub use submission::{AnswersRequest, ScoreData, ScoreResponse, ValidationReport};
