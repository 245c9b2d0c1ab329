use serde_json::json;

use clinq_spec::{
    AnswerSet, Context, GateFailure, QuestionnaireDefinition, check_answer, gate,
};

fn definition() -> QuestionnaireDefinition {
    serde_json::from_str(include_str!("fixtures/prise_m.json")).expect("deserialize")
}

fn answers(pairs: &[(&str, i64)]) -> AnswerSet {
    pairs
        .iter()
        .map(|(id, value)| (id.to_string(), json!(value)))
        .collect()
}

#[test]
fn gate_checks_demographics_first() {
    let definition = definition();
    let err = gate(&definition, &Context::new(), &AnswerSet::new()).unwrap_err();
    assert_eq!(err, GateFailure::MissingDemographics(vec!["Sexe".into()]));
    assert_eq!(err.to_string(), "Required information missing: Sexe");
}

#[test]
fn gate_lists_missing_visible_questions() {
    let definition = definition();
    let ctx = Context::from_value(&json!({ "gender": "F" }));
    let err = gate(&definition, &ctx, &answers(&[("q17", 0), ("q25", 1)])).unwrap_err();
    assert_eq!(
        err,
        GateFailure::MissingAnswers(vec!["q20".into(), "q23".into()])
    );
    assert_eq!(
        err.to_string(),
        "Please answer all required questions. Missing: q20, q23"
    );
}

#[test]
fn gate_ignores_hidden_required_questions() {
    let definition = definition();
    let ctx = Context::from_value(&json!({ "gender": "X" }));
    let resolution =
        gate(&definition, &ctx, &answers(&[("q17", 0), ("q23", 2)])).expect("gate passes");
    assert!(!resolution.is_visible("q20"));
    assert!(!resolution.is_visible("q25"));
}

#[test]
fn visible_answers_drop_hidden_questions() {
    let definition = definition();
    let ctx = Context::from_value(&json!({ "gender": "M" }));
    let set = answers(&[("q17", 0), ("q20", 2), ("q23", 1), ("q25", 1)]);
    let resolution = gate(&definition, &ctx, &set).expect("gate passes");

    let sent = set.visible(&resolution);
    assert_eq!(sent.keys().collect::<Vec<_>>(), vec!["q17", "q23", "q25"]);
    assert_eq!(set.len(), 4);
}

#[test]
fn fixture_answers_respect_allowed_codes() {
    let definition = definition();
    let question = definition.question("q17").expect("q17");
    assert!(check_answer(question, &json!(2)).is_ok());
    assert_eq!(
        check_answer(question, &json!(3)).unwrap_err().code(),
        "unknown_option"
    );
}
