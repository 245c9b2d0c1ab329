use clinq_spec::spec::{DemographicField, QuestionOption};
use clinq_spec::{Progress, RenderPayload, RenderQuestion, RenderStatus};
use serde_json::{Number, Value};

/// Controls which bits of state the wizard prints.
#[derive(Copy, Clone, Eq, PartialEq)]
pub enum Verbosity {
    /// Clean output: question prompts only.
    Clean,
    /// Verbose output: status, visible questions, help text.
    Verbose,
}

impl Verbosity {
    pub fn from_verbose(verbose: bool) -> Self {
        if verbose {
            Verbosity::Verbose
        } else {
            Verbosity::Clean
        }
    }

    pub fn is_verbose(&self) -> bool {
        matches!(self, Verbosity::Verbose)
    }
}

/// Prints prompts and outcomes for the interactive `run` command.
pub struct WizardPresenter {
    verbosity: Verbosity,
    header_printed: bool,
}

impl WizardPresenter {
    pub fn new(verbosity: Verbosity) -> Self {
        Self {
            verbosity,
            header_printed: false,
        }
    }

    pub fn show_header(&mut self, payload: &RenderPayload) {
        if self.header_printed {
            return;
        }
        println!("Questionnaire: {} ({})", payload.title, payload.abbreviation);
        if self.verbosity.is_verbose()
            && let Some(description) = &payload.description
        {
            println!("About: {}", description);
        }
        self.header_printed = true;
    }

    pub fn show_status(&self, payload: &RenderPayload) {
        if self.verbosity.is_verbose() {
            println!(
                "Status: {} ({}/{})",
                payload.status.as_str(),
                payload.progress.answered,
                payload.progress.total
            );
            self.print_visible_questions(payload);
        } else if payload.status == RenderStatus::NeedInput && payload.visible_count() == 0 {
            println!("No visible questions are available; check the respondent information.");
        }
    }

    fn print_visible_questions(&self, payload: &RenderPayload) {
        println!("Visible questions:");
        for question in payload
            .sections
            .iter()
            .flat_map(|section| section.questions.iter())
        {
            let mut entry = format!(" - {} ({})", question.id, question.text);
            if question.required {
                entry.push_str(" [required]");
            }
            println!("{}", entry);
        }
    }

    pub fn show_section(&self, label: &str) {
        if !label.is_empty() {
            println!();
            println!("{}", label);
        }
    }

    pub fn show_prompt(&self, prompt: &PromptContext) {
        let mut line = if prompt.total > 0 {
            format!("{}/{} {}", prompt.index, prompt.total, prompt.title)
        } else {
            prompt.title.clone()
        };
        if prompt.required {
            line.push_str(" *");
        }
        if let Some(hint) = &prompt.hint {
            line.push(' ');
            line.push_str(hint);
        }
        println!("{}", line);
        if let Some(help) = &prompt.help {
            println!("{}", help);
        }
        if self.verbosity.is_verbose() && !prompt.choices.is_empty() {
            println!("Choices: {}", prompt.choices.join(", "));
        }
    }

    pub fn show_parse_error(&self, error: &AnswerParseError) {
        eprintln!("Invalid answer: {}", error.user_message);
        if let Some(debug) = &error.debug_message {
            eprintln!("  Expected: {}", debug);
        }
    }

    pub fn show_errors(&self, errors: &[String]) {
        for error in errors {
            eprintln!(" - {}", error);
        }
    }

    pub fn show_completion(&self, report: &str) {
        println!();
        println!("Done ✅");
        println!("{}", report.trim_end());
    }
}

/// Context used to format a single prompt.
pub struct PromptContext {
    pub index: usize,
    pub total: usize,
    pub title: String,
    pub help: Option<String>,
    pub required: bool,
    pub hint: Option<String>,
    pub choices: Vec<String>,
}

impl PromptContext {
    pub fn for_question(question: &RenderQuestion, progress: &Progress) -> Self {
        let kind = QuestionKind::from_label(&question.kind);
        let choices = describe_options(&question.options);
        let bounds = (
            question
                .constraints
                .min_value
                .or_else(|| scale_bound(question, "min_value")),
            question
                .constraints
                .max_value
                .or_else(|| scale_bound(question, "max_value")),
        );
        Self {
            index: (progress.answered + 1).min(progress.total.max(1)),
            total: progress.total,
            title: question.text.clone(),
            help: question.help.clone(),
            required: question.required,
            hint: kind.hint(&choices, bounds),
            choices,
        }
    }

    pub fn for_field(field: &DemographicField) -> Self {
        let choices = describe_options(&field.options);
        Self {
            index: 0,
            total: 0,
            title: field.label.clone(),
            help: field.purpose.clone(),
            required: field.required,
            hint: QuestionKind::Choice.hint(&choices, (None, None)),
            choices,
        }
    }
}

fn scale_bound(question: &RenderQuestion, key: &str) -> Option<f64> {
    question
        .extensions
        .get("scale")
        .and_then(|scale| scale.get(key))
        .and_then(Value::as_f64)
}

fn describe_options(options: &[QuestionOption]) -> Vec<String> {
    options
        .iter()
        .map(|option| format!("{}={}", code_label(&option.code), option.label))
        .collect()
}

fn code_label(code: &Value) -> String {
    match code {
        Value::String(text) => text.clone(),
        other => other.to_string(),
    }
}

/// Input kinds the wizard knows how to parse.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum QuestionKind {
    Integer,
    Scale,
    Text,
    Time,
    Choice,
    Unknown,
}

impl QuestionKind {
    pub fn from_label(label: &str) -> Self {
        match label {
            "integer" => QuestionKind::Integer,
            "scale" => QuestionKind::Scale,
            "string" => QuestionKind::Text,
            "time" => QuestionKind::Time,
            "single_choice" => QuestionKind::Choice,
            _ => QuestionKind::Unknown,
        }
    }

    fn hint(&self, choices: &[String], bounds: (Option<f64>, Option<f64>)) -> Option<String> {
        let range = match bounds {
            (Some(min), Some(max)) => Some(format!("{}-{}", min, max)),
            (Some(min), None) => Some(format!(">= {}", min)),
            (None, Some(max)) => Some(format!("<= {}", max)),
            (None, None) => None,
        };
        match self {
            QuestionKind::Integer => Some(match range {
                Some(range) => format!("(whole number, {})", range),
                None => "(whole number)".to_string(),
            }),
            QuestionKind::Scale => {
                Some(format!("({})", range.unwrap_or_else(|| "number".into())))
            }
            QuestionKind::Time => Some("(HH:MM)".to_string()),
            QuestionKind::Choice if !choices.is_empty() => {
                Some(format!("({})", choices.join(" / ")))
            }
            _ => None,
        }
    }
}

/// Error produced when parsing answers typed by the user.
#[derive(Debug)]
pub struct AnswerParseError {
    pub user_message: String,
    pub debug_message: Option<String>,
}

impl AnswerParseError {
    pub fn new(user_message: impl Into<String>, debug_message: Option<String>) -> Self {
        Self {
            user_message: user_message.into(),
            debug_message,
        }
    }
}

/// Turns raw input into an answer value. `Ok(None)` means the respondent
/// skipped an optional item.
pub fn parse_answer(
    kind: QuestionKind,
    options: &[QuestionOption],
    required: bool,
    raw: &str,
) -> Result<Option<Value>, AnswerParseError> {
    let raw = raw.trim();
    if raw.is_empty() {
        if required {
            return Err(AnswerParseError::new("This question requires an answer.", None));
        }
        return Ok(None);
    }

    let value = match kind {
        QuestionKind::Integer => parse_integer(raw)?,
        QuestionKind::Scale => parse_number(raw)?,
        QuestionKind::Choice => parse_choice(options, raw)?,
        QuestionKind::Text | QuestionKind::Time => Value::String(raw.to_string()),
        QuestionKind::Unknown => {
            parse_number(raw).unwrap_or_else(|_| Value::String(raw.to_string()))
        }
    };
    Ok(Some(value))
}

fn parse_integer(raw: &str) -> Result<Value, AnswerParseError> {
    raw.parse::<i64>()
        .map(Number::from)
        .map(Value::Number)
        .map_err(|_| {
            AnswerParseError::new(
                "Please enter a whole number.",
                Some("expected integer".to_string()),
            )
        })
}

fn parse_number(raw: &str) -> Result<Value, AnswerParseError> {
    if let Ok(whole) = raw.parse::<i64>() {
        return Ok(Value::Number(Number::from(whole)));
    }
    raw.parse::<f64>()
        .map_err(|_| {
            AnswerParseError::new(
                "Please enter a number.",
                Some("expected number".to_string()),
            )
        })
        .and_then(|value| {
            Number::from_f64(value).map(Value::Number).ok_or_else(|| {
                AnswerParseError::new(
                    "Please enter a finite number.",
                    Some("number must be finite".to_string()),
                )
            })
        })
}

/// Matches the input against option codes, case-insensitively for text codes.
fn parse_choice(options: &[QuestionOption], raw: &str) -> Result<Value, AnswerParseError> {
    if options.is_empty() {
        return Ok(parse_number(raw).unwrap_or_else(|_| Value::String(raw.to_string())));
    }
    options
        .iter()
        .find(|option| code_label(&option.code).eq_ignore_ascii_case(raw))
        .map(|option| option.code.clone())
        .ok_or_else(|| {
            let allowed = options
                .iter()
                .map(|option| code_label(&option.code))
                .collect::<Vec<_>>();
            AnswerParseError::new(
                format!("Choose one of: {}.", allowed.join(", ")),
                Some(format!("allowed codes: {}", allowed.join(", "))),
            )
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn options() -> Vec<QuestionOption> {
        serde_json::from_value(json!([
            { "code": 0, "label": "Absent" },
            { "code": 1, "label": "Tolérable" },
            { "code": 2, "label": "Pénible" }
        ]))
        .expect("options")
    }

    #[test]
    fn choice_input_maps_to_option_code() {
        let value = parse_answer(QuestionKind::Choice, &options(), true, " 2 ").expect("parse");
        assert_eq!(value, Some(json!(2)));

        let err = parse_answer(QuestionKind::Choice, &options(), true, "3").unwrap_err();
        assert_eq!(err.user_message, "Choose one of: 0, 1, 2.");
    }

    #[test]
    fn text_codes_ignore_case() {
        let options: Vec<QuestionOption> = serde_json::from_value(json!([
            { "code": "F", "label": "Femme" },
            { "code": "M", "label": "Homme" }
        ]))
        .expect("options");
        let value = parse_answer(QuestionKind::Choice, &options, true, "f").expect("parse");
        assert_eq!(value, Some(json!("F")));
    }

    #[test]
    fn blank_input_skips_only_optional_items() {
        assert!(parse_answer(QuestionKind::Text, &[], true, "").is_err());
        assert_eq!(parse_answer(QuestionKind::Text, &[], false, "  ").expect("skip"), None);
    }

    #[test]
    fn numbers_parse_by_kind() {
        assert_eq!(
            parse_answer(QuestionKind::Integer, &[], true, "7").expect("int"),
            Some(json!(7))
        );
        assert!(parse_answer(QuestionKind::Integer, &[], true, "7.5").is_err());
        assert_eq!(
            parse_answer(QuestionKind::Scale, &[], true, "7.5").expect("scale"),
            Some(json!(7.5))
        );
        assert_eq!(
            parse_answer(QuestionKind::Time, &[], true, "22:30").expect("time"),
            Some(json!("22:30"))
        );
    }

    #[test]
    fn hints_describe_expected_input() {
        let choices = describe_options(&options());
        assert_eq!(
            QuestionKind::Choice.hint(&choices, (None, None)).as_deref(),
            Some("(0=Absent / 1=Tolérable / 2=Pénible)")
        );
        assert_eq!(
            QuestionKind::Integer.hint(&[], (Some(0.0), Some(24.0))).as_deref(),
            Some("(whole number, 0-24)")
        );
    }
}
