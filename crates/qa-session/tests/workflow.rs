use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use serde_json::{Value, json};

use clinq_client::{QuestionnaireService, TransportError};
use clinq_session::{Failure, Phase, Session, SessionError, SessionOptions};
use clinq_spec::spec::{
    AnswersRequest, Category, QuestionnaireDefinition, QuestionnaireSummary, ScoreResponse,
    ValidationReport,
};

const DEFINITION: &str = include_str!("fixtures/prise_m.json");

/// In-memory scoring service that records what it was sent.
struct FakeService {
    definition: Result<QuestionnaireDefinition, TransportError>,
    submit_error: Option<TransportError>,
    report: ValidationReport,
    loads: AtomicUsize,
    validations: AtomicUsize,
    submissions: AtomicUsize,
    last_request: Mutex<Option<AnswersRequest>>,
}

impl FakeService {
    fn new() -> Self {
        Self {
            definition: Ok(serde_json::from_str(DEFINITION).expect("fixture")),
            submit_error: None,
            report: ValidationReport {
                valid: true,
                ..ValidationReport::default()
            },
            loads: AtomicUsize::new(0),
            validations: AtomicUsize::new(0),
            submissions: AtomicUsize::new(0),
            last_request: Mutex::new(None),
        }
    }

    fn network_calls(&self) -> usize {
        self.validations.load(Ordering::SeqCst) + self.submissions.load(Ordering::SeqCst)
    }

    fn last_request(&self) -> AnswersRequest {
        self.last_request
            .lock()
            .unwrap()
            .clone()
            .expect("a request was sent")
    }
}

#[async_trait]
impl QuestionnaireService for FakeService {
    async fn list_questionnaires(
        &self,
        _category: Category,
    ) -> Result<Vec<QuestionnaireSummary>, TransportError> {
        Ok(Vec::new())
    }

    async fn get_questionnaire(
        &self,
        _category: Category,
        _id: &str,
    ) -> Result<QuestionnaireDefinition, TransportError> {
        self.loads.fetch_add(1, Ordering::SeqCst);
        self.definition.clone()
    }

    async fn validate_answers(
        &self,
        _category: Category,
        _id: &str,
        _request: &AnswersRequest,
    ) -> Result<ValidationReport, TransportError> {
        self.validations.fetch_add(1, Ordering::SeqCst);
        Ok(self.report.clone())
    }

    async fn submit_answers(
        &self,
        _category: Category,
        id: &str,
        request: &AnswersRequest,
    ) -> Result<ScoreResponse, TransportError> {
        self.submissions.fetch_add(1, Ordering::SeqCst);
        *self.last_request.lock().unwrap() = Some(request.clone());
        if let Some(err) = &self.submit_error {
            return Err(err.clone());
        }
        let total: f64 = request.answers.values().filter_map(Value::as_f64).sum();
        Ok(serde_json::from_value(json!({
            "questionnaire_id": id,
            "score_data": { "total_score": total, "range": [0, 6] },
            "validation": { "valid": true, "errors": [], "warnings": ["gender-specific item excluded"] }
        }))
        .expect("score response"))
    }
}

async fn ready_session(service: &FakeService) -> Session {
    let mut session = Session::new(Category::Auto, "PRISE-M.fr");
    session.load(service).await.expect("load");
    assert_eq!(session.phase(), Phase::Ready);
    session
}

#[tokio::test]
async fn incomplete_demographics_never_reach_the_network() {
    let service = FakeService::new();
    let mut session = ready_session(&service).await;
    session.answer("q17", json!(1)).expect("answer");
    session.answer("q23", json!(0)).expect("answer");

    let phase = session.submit(&service).await.expect("submit");
    assert_eq!(phase, Phase::Ready);
    assert_eq!(session.errors(), ["Required information missing: Sexe"]);
    assert_eq!(service.network_calls(), 0);
}

#[tokio::test]
async fn two_of_three_answered_blocks_then_third_enables_submission() {
    let service = FakeService::new();
    let mut session = ready_session(&service).await;
    session.set_demographic("gender", json!("F")).expect("gender");

    session.answer("q17", json!(1)).expect("answer");
    session.answer("q20", json!(2)).expect("answer");
    let progress = session.progress();
    assert_eq!((progress.answered, progress.total), (2, 3));
    assert!(!session.submit_enabled());
    assert!(!session.render().expect("payload").submit_enabled);

    let phase = session.submit(&service).await.expect("submit");
    assert_eq!(phase, Phase::Ready);
    assert_eq!(
        session.errors(),
        ["Please answer all required questions. Missing: q23"]
    );
    assert_eq!(service.network_calls(), 0);

    session.answer("q23", json!(0)).expect("answer");
    assert!(session.errors().is_empty());
    assert!(session.submit_enabled());

    let phase = session.submit(&service).await.expect("submit");
    assert_eq!(phase, Phase::Completed);
    assert_eq!(service.submissions.load(Ordering::SeqCst), 1);
    let result = session.result().expect("result");
    assert_eq!(result.score_data.total_score, Some(3.0));
    assert_eq!(session.warnings(), ["gender-specific item excluded"]);
    assert_eq!(session.answers().len(), 3);
}

#[tokio::test]
async fn hidden_answers_are_not_sent() {
    let service = FakeService::new();
    let mut session = ready_session(&service).await;
    session.set_demographic("gender", json!("F")).expect("gender");
    session.answer("q20", json!(1)).expect("answer");
    session.set_demographic("gender", json!("M")).expect("gender");
    for (id, value) in [("q17", 0), ("q23", 1), ("q25", 2)] {
        session.answer(id, json!(value)).expect("answer");
    }

    assert_eq!(session.submit(&service).await.expect("submit"), Phase::Completed);
    let sent = service.last_request();
    assert_eq!(sent.answers.keys().collect::<Vec<_>>(), ["q17", "q23", "q25"]);
    assert_eq!(
        sent.demographics.expect("demographics")["gender"],
        json!("M")
    );
    assert!(session.answers().contains("q20"));
}

#[tokio::test]
async fn restart_clears_answers_but_keeps_demographics() {
    let service = FakeService::new();
    let mut session = ready_session(&service).await;
    session.set_demographic("gender", json!("X")).expect("gender");
    session.answer("q17", json!(2)).expect("answer");
    session.answer("q23", json!(2)).expect("answer");
    assert_eq!(session.submit(&service).await.expect("submit"), Phase::Completed);

    session.restart().expect("restart");
    assert_eq!(session.phase(), Phase::Ready);
    assert!(session.answers().is_empty());
    assert!(session.result().is_none());
    assert_eq!(session.progress().answered, 0);
    assert_eq!(session.progress().percent(), 0.0);
    assert_eq!(session.demographics().get("gender"), Some(&json!("X")));
}

#[tokio::test]
async fn submit_failure_is_a_single_error_and_restartable() {
    let mut service = FakeService::new();
    service.submit_error = Some(TransportError::Server {
        status: 503,
        message: "HTTP error 503".into(),
    });
    let mut session = ready_session(&service).await;
    session.set_demographic("gender", json!("X")).expect("gender");
    session.answer("q17", json!(0)).expect("answer");
    session.answer("q23", json!(0)).expect("answer");

    assert_eq!(session.submit(&service).await.expect("submit"), Phase::Failed);
    assert_eq!(session.errors(), ["HTTP error 503"]);
    assert_eq!(
        session.failure(),
        Some(&Failure::Submit("HTTP error 503".into()))
    );

    session.restart().expect("restart");
    assert_eq!(session.phase(), Phase::Ready);
    assert!(session.errors().is_empty());
}

#[tokio::test]
async fn load_failure_is_terminal() {
    let mut service = FakeService::new();
    service.definition = Err(TransportError::Client {
        status: 404,
        message: "Questionnaire not found".into(),
    });
    let mut session = Session::new(Category::Auto, "missing");
    session.load(&service).await.expect("load records failure");

    assert_eq!(session.phase(), Phase::Failed);
    assert_eq!(session.errors(), ["Questionnaire not found"]);
    assert_eq!(session.restart(), Err(SessionError::LoadFailed));
    assert_eq!(
        session.answer("q17", json!(0)),
        Err(SessionError::LoadFailed)
    );
    assert_eq!(service.loads.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn prevalidation_rejection_returns_to_ready() {
    let mut service = FakeService::new();
    service.report = ValidationReport {
        valid: false,
        errors: vec!["q17: value out of range".into()],
        warnings: Vec::new(),
    };
    let mut session =
        Session::with_options(Category::Auto, "PRISE-M.fr", SessionOptions { prevalidate: true });
    session.load(&service).await.expect("load");
    session.set_demographic("gender", json!("X")).expect("gender");
    session.answer("q17", json!(0)).expect("answer");
    session.answer("q23", json!(0)).expect("answer");

    assert_eq!(session.submit(&service).await.expect("submit"), Phase::Ready);
    assert_eq!(session.errors(), ["q17: value out of range"]);
    assert_eq!(service.validations.load(Ordering::SeqCst), 1);
    assert_eq!(service.submissions.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn second_begin_while_submitting_is_a_no_op() {
    let service = FakeService::new();
    let mut session = ready_session(&service).await;
    session.set_demographic("gender", json!("X")).expect("gender");
    session.answer("q17", json!(0)).expect("answer");
    session.answer("q23", json!(1)).expect("answer");

    let request = session.begin_submit().expect("begin").expect("request");
    assert_eq!(session.phase(), Phase::Submitting);
    assert_eq!(session.begin_submit(), Ok(None));
    assert!(matches!(
        session.answer("q17", json!(1)),
        Err(SessionError::InvalidPhase { phase: Phase::Submitting, .. })
    ));

    let outcome = service
        .submit_answers(Category::Auto, "PRISE-M.fr", &request)
        .await;
    session.finish_submit(outcome).expect("finish");
    assert_eq!(session.phase(), Phase::Completed);
}

#[tokio::test]
async fn edits_are_checked_against_the_definition() {
    let service = FakeService::new();
    let mut session = ready_session(&service).await;

    assert_eq!(
        session.answer("q99", json!(1)),
        Err(SessionError::UnknownQuestion("q99".into()))
    );
    assert!(matches!(
        session.answer("q17", json!(7)),
        Err(SessionError::InvalidAnswer(_))
    ));
    assert!(matches!(
        session.set_demographic("gender", json!("Z")),
        Err(SessionError::InvalidDemographic { .. })
    ));
    assert_eq!(
        session.set_demographic("age", json!(40)),
        Err(SessionError::UnknownField("age".into()))
    );

    session.set_demographic("gender", json!("F")).expect("gender");
    assert!(session.resolution().is_visible("q20"));
    session.set_demographic("gender", json!("")).expect("clear");
    assert!(!session.resolution().is_visible("q20"));
    assert!(session.demographics().is_empty());
}
