//! Spawns the `clinq` binary and checks exit codes and output.

use std::path::{Path, PathBuf};

use assert_cmd::Command;
use assert_cmd::cargo::cargo_bin_cmd;
use assert_fs::prelude::*;
use axum::extract::Path as UrlPath;
use axum::routing::{get, post};
use axum::{Json, Router};
use predicates::prelude::*;
use serde_json::{Value, json};

fn workspace_root() -> PathBuf {
    let manifest_dir = Path::new(env!("CARGO_MANIFEST_DIR"));
    manifest_dir
        .parent()
        .and_then(|p| p.parent())
        .expect("workspace root")
        .to_path_buf()
}

fn fixture() -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR")).join("tests/fixtures/prise_m.json")
}

fn clinq() -> Command {
    let mut cmd = cargo_bin_cmd!("clinq");
    cmd.current_dir(workspace_root())
        .env_remove("CLINQ_API_URL")
        .env_remove("CLINQ_MAX_ATTEMPTS")
        .env_remove("CLINQ_RETRY_DELAY_MS")
        .env_remove("RUST_LOG");
    cmd
}

#[test]
fn help_describes_the_runner() {
    clinq()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("Clinical questionnaire runner"))
        .stdout(predicate::str::contains("check"));
}

#[test]
fn check_reports_missing_required_answer() {
    let temp = assert_fs::TempDir::new().expect("temp dir");
    let answers = temp.child("answers.json");
    answers.write_str(r#"{ "q17": 1, "q20": 2 }"#).expect("answers");
    let demographics = temp.child("demographics.json");
    demographics
        .write_str(r#"{ "gender": "F" }"#)
        .expect("demographics");

    clinq()
        .arg("check")
        .arg("--definition")
        .arg(fixture())
        .arg("--answers")
        .arg(answers.path())
        .arg("--demographics")
        .arg(demographics.path())
        .assert()
        .failure()
        .stdout(predicate::str::contains("Progress: 2/3 (67%)"))
        .stdout(predicate::str::contains("Missing answers: q23"));
}

#[test]
fn check_passes_when_everything_visible_is_answered() {
    let temp = assert_fs::TempDir::new().expect("temp dir");
    let answers = temp.child("answers.json");
    answers
        .write_str(r#"{ "q17": 1, "q20": 2, "q23": 0 }"#)
        .expect("answers");
    let demographics = temp.child("demographics.json");
    demographics
        .write_str(r#"{ "gender": "F" }"#)
        .expect("demographics");

    clinq()
        .arg("check")
        .arg("--definition")
        .arg(fixture())
        .arg("--answers")
        .arg(answers.path())
        .arg("--demographics")
        .arg(demographics.path())
        .assert()
        .success()
        .stdout(predicate::str::contains("Progress: 3/3 (100%)"))
        .stdout(predicate::str::contains("Ready to submit."));
}

#[test]
fn check_json_flags_missing_demographics_and_bad_values() {
    let temp = assert_fs::TempDir::new().expect("temp dir");
    let answers = temp.child("answers.json");
    answers
        .write_str(r#"{ "q17": 5, "q99": 1 }"#)
        .expect("answers");

    let output = clinq()
        .arg("check")
        .arg("--definition")
        .arg(fixture())
        .arg("--answers")
        .arg(answers.path())
        .args(["--format", "json"])
        .assert()
        .failure()
        .get_output()
        .stdout
        .clone();
    let report: Value = serde_json::from_slice(&output).expect("json report");
    assert_eq!(report["ready"], json!(false));
    assert_eq!(report["missing_demographics"], json!(["Sexe"]));
    assert_eq!(report["invalid_answers"][0]["id"], json!("q17"));
    assert_eq!(report["unknown_answers"], json!(["q99"]));
    assert_eq!(report["visible"], json!(["q17", "q23"]));
}

#[test]
fn eval_prints_rule_value() {
    clinq()
        .args(["eval", r#"{"==": [{"var": "gender"}, "F"]}"#])
        .args(["--context", r#"{"gender": "F"}"#])
        .assert()
        .success()
        .stdout("true\n");

    clinq()
        .args(["eval", r#"{"var": "age"}"#])
        .assert()
        .success()
        .stdout("undefined\n");
}

#[test]
fn eval_json_reports_truthiness() {
    clinq()
        .args(["eval", r#"{"==": [{"var": "gender"}, "F"]}"#])
        .args(["--format", "json"])
        .assert()
        .success()
        .stdout(predicate::str::contains(r#""truthy":false"#))
        .stdout(predicate::str::contains(r#""defined":true"#));
}

#[test]
fn eval_rejects_non_json_rule() {
    clinq()
        .args(["eval", "gender == F"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("rule is not valid JSON"));
}

#[test]
fn schema_describes_definitions() {
    clinq()
        .arg("schema")
        .assert()
        .success()
        .stdout(predicate::str::contains("QuestionnaireDefinition"))
        .stdout(predicate::str::contains("display_if"));
}

#[test]
fn list_reports_unreachable_service() {
    clinq()
        .args(["list", "auto"])
        .args(["--api-url", "http://127.0.0.1:9"])
        .args(["--max-attempts", "1"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Failed to fetch"));
}

#[test]
fn unknown_category_is_rejected() {
    clinq()
        .args(["list", "other"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("expected 'auto' or 'hetero'"));
}

async fn definition() -> Json<Value> {
    let body = std::fs::read_to_string(fixture()).expect("fixture");
    Json(serde_json::from_str(&body).expect("fixture json"))
}

async fn submit(UrlPath(id): UrlPath<String>, Json(request): Json<Value>) -> Json<Value> {
    let answers = request["answers"].as_object().cloned().unwrap_or_default();
    let total: f64 = answers.values().filter_map(Value::as_f64).sum();
    Json(json!({
        "questionnaire_id": id,
        "score_data": { "total_score": total, "range": [0, 6] },
        "validation": { "valid": true, "errors": [], "warnings": [] }
    }))
}

#[tokio::test(flavor = "multi_thread")]
async fn run_walks_through_visible_questions_and_prints_score() {
    let app = Router::new()
        .route("/api/auto/questionnaires/{id}", get(definition))
        .route("/api/auto/questionnaires/{id}/submit", post(submit));
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind");
    let addr = listener.local_addr().expect("addr");
    tokio::spawn(async move {
        axum::serve(listener, app).await.expect("serve");
    });

    let assert = tokio::task::spawn_blocking(move || {
        clinq()
            .args(["run", "auto", "PRISE-M.fr"])
            .args(["--api-url", &format!("http://{addr}")])
            .write_stdin("F\n1\n2\n0\n")
            .assert()
    })
    .await
    .expect("join");

    assert
        .success()
        .stdout(predicate::str::contains("Questionnaire: PRISE-M"))
        .stdout(predicate::str::contains("Règles irrégulières"))
        .stdout(predicate::str::contains("Troubles de l'érection").not())
        .stdout(predicate::str::contains("Total score: 3 (range 0-6)"));
}
