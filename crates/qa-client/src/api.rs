use async_trait::async_trait;
use clinq_spec::spec::{
    AnswersRequest, Category, QuestionnaireDefinition, QuestionnaireSummary, ScoreResponse,
    ValidationReport,
};
use reqwest::Method;
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::config::ClientConfig;
use crate::error::TransportError;
use crate::transport::{Exchange, ReqwestExchange, Transport};

/// The four calls the submission workflow needs from the scoring service.
#[async_trait]
pub trait QuestionnaireService: Send + Sync {
    async fn list_questionnaires(
        &self,
        category: Category,
    ) -> Result<Vec<QuestionnaireSummary>, TransportError>;

    async fn get_questionnaire(
        &self,
        category: Category,
        id: &str,
    ) -> Result<QuestionnaireDefinition, TransportError>;

    async fn validate_answers(
        &self,
        category: Category,
        id: &str,
        request: &AnswersRequest,
    ) -> Result<ValidationReport, TransportError>;

    async fn submit_answers(
        &self,
        category: Category,
        id: &str,
        request: &AnswersRequest,
    ) -> Result<ScoreResponse, TransportError>;
}

/// Typed client for the `/api/{category}/questionnaires` endpoints.
pub struct ScoringClient<E = ReqwestExchange> {
    transport: Transport<E>,
}

impl ScoringClient<ReqwestExchange> {
    pub fn from_config(config: &ClientConfig) -> Result<Self, TransportError> {
        Ok(Self {
            transport: Transport::from_config(config)?,
        })
    }
}

impl<E: Exchange> ScoringClient<E> {
    pub fn with_exchange(exchange: E, config: &ClientConfig) -> Result<Self, TransportError> {
        Ok(Self {
            transport: Transport::new(exchange, config)?,
        })
    }

    pub fn transport(&self) -> &Transport<E> {
        &self.transport
    }

    async fn fetch<T: DeserializeOwned>(
        &self,
        method: Method,
        segments: &[&str],
        body: Option<&Value>,
    ) -> Result<T, TransportError> {
        let value = self.transport.request(method, segments, body).await?;
        serde_json::from_value(value).map_err(|err| TransportError::Malformed(err.to_string()))
    }
}

#[async_trait]
impl<E: Exchange> QuestionnaireService for ScoringClient<E> {
    async fn list_questionnaires(
        &self,
        category: Category,
    ) -> Result<Vec<QuestionnaireSummary>, TransportError> {
        self.fetch(
            Method::GET,
            &["api", category.as_str(), "questionnaires"],
            None,
        )
        .await
    }

    async fn get_questionnaire(
        &self,
        category: Category,
        id: &str,
    ) -> Result<QuestionnaireDefinition, TransportError> {
        self.fetch(
            Method::GET,
            &["api", category.as_str(), "questionnaires", id],
            None,
        )
        .await
    }

    async fn validate_answers(
        &self,
        category: Category,
        id: &str,
        request: &AnswersRequest,
    ) -> Result<ValidationReport, TransportError> {
        let body = encode(request)?;
        self.fetch(
            Method::POST,
            &["api", category.as_str(), "questionnaires", id, "validate"],
            Some(&body),
        )
        .await
    }

    async fn submit_answers(
        &self,
        category: Category,
        id: &str,
        request: &AnswersRequest,
    ) -> Result<ScoreResponse, TransportError> {
        let body = encode(request)?;
        tracing::info!(
            category = %category,
            questionnaire = id,
            answers = request.answers.len(),
            with_demographics = request.demographics.is_some(),
            "submitting answers for scoring"
        );
        self.fetch(
            Method::POST,
            &["api", category.as_str(), "questionnaires", id, "submit"],
            Some(&body),
        )
        .await
    }
}

fn encode(request: &AnswersRequest) -> Result<Value, TransportError> {
    serde_json::to_value(request).map_err(|err| TransportError::Malformed(err.to_string()))
}
