mod wizard;

use clap::{Args, Parser, Subcommand, ValueEnum};
use clinq_client::{ClientConfig, QuestionnaireService, ScoringClient};
use clinq_session::{Phase, Session, SessionOptions};
use clinq_spec::spec::{Category, QuestionnaireDefinition};
use clinq_spec::validate::missing_demographics;
use clinq_spec::{
    AnswerSet, Context, Progress, RenderQuestion, build_render_payload, check_answer, evaluate,
    missing_answers, render_json_ui, render_report, render_text, resolve_questions,
};
use serde_json::{Map, Value, json};
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};
use wizard::{
    AnswerParseError, PromptContext, QuestionKind, Verbosity, WizardPresenter, parse_answer,
};

type CliResult<T> = Result<T, Box<dyn std::error::Error>>;

#[derive(Parser)]
#[command(
    author,
    version,
    about = "Clinical questionnaire runner",
    long_about = "Fetches questionnaires from the scoring service, walks a respondent through the visible questions, and submits the answers for scoring"
)]
struct Cli {
    #[command(flatten)]
    connection: ConnectionArgs,
    /// Log debug output to stderr (overrides RUST_LOG).
    #[arg(long, global = true)]
    verbose: bool,
    #[command(subcommand)]
    command: Command,
}

/// Overrides for the scoring service connection. Flags win over
/// `CLINQ_*` environment variables, which win over defaults.
#[derive(Args)]
struct ConnectionArgs {
    /// Base URL of the scoring service.
    #[arg(long, global = true, value_name = "URL")]
    api_url: Option<String>,
    /// Attempts per request before giving up on server or network failures.
    #[arg(long, global = true, value_name = "N")]
    max_attempts: Option<u32>,
    /// Base backoff; attempt n waits n times this long.
    #[arg(long, global = true, value_name = "MS")]
    retry_delay_ms: Option<u64>,
}

#[derive(Copy, Clone, Debug, ValueEnum)]
enum OutputFormat {
    Text,
    Json,
}

#[derive(Subcommand)]
enum Command {
    /// List the questionnaires of a category (auto or hetero).
    List {
        category: Category,
        #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
        format: OutputFormat,
    },
    /// Show the visible structure of a questionnaire.
    Show {
        category: Category,
        id: String,
        /// JSON object of demographic values used for branching.
        #[arg(long, value_name = "FILE")]
        demographics: Option<PathBuf>,
        /// JSON object of answers keyed by question id.
        #[arg(long, value_name = "FILE")]
        answers: Option<PathBuf>,
        #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
        format: OutputFormat,
    },
    /// Answer a questionnaire interactively and submit it for scoring.
    Run {
        category: Category,
        id: String,
        /// Prefilled demographic values.
        #[arg(long, value_name = "FILE")]
        demographics: Option<PathBuf>,
        /// Prefilled answers.
        #[arg(long, value_name = "FILE")]
        answers: Option<PathBuf>,
        /// Ask the service to validate answers before submitting.
        #[arg(long)]
        prevalidate: bool,
        /// Print the raw scoring response as JSON instead of the report.
        #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
        format: OutputFormat,
    },
    /// Check answers against a local definition without contacting the service.
    Check {
        /// Questionnaire definition JSON.
        #[arg(long, value_name = "FILE")]
        definition: PathBuf,
        #[arg(long, value_name = "FILE")]
        answers: Option<PathBuf>,
        #[arg(long, value_name = "FILE")]
        demographics: Option<PathBuf>,
        #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
        format: OutputFormat,
    },
    /// Evaluate a branching rule against a context.
    Eval {
        /// Rule as JSON, e.g. '{"==": [{"var": "gender"}, "F"]}'.
        rule: String,
        /// Context as a JSON object.
        #[arg(long, value_name = "JSON", conflicts_with = "context_file")]
        context: Option<String>,
        /// Context read from a JSON file.
        #[arg(long, value_name = "FILE")]
        context_file: Option<PathBuf>,
        #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
        format: OutputFormat,
    },
    /// Print the JSON Schema of questionnaire definitions.
    Schema,
}

#[tokio::main]
async fn main() -> CliResult<ExitCode> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match cli.command {
        Command::List { category, format } => {
            run_list(&cli.connection, category, format).await?;
            Ok(ExitCode::SUCCESS)
        }
        Command::Show {
            category,
            id,
            demographics,
            answers,
            format,
        } => {
            run_show(&cli.connection, category, &id, demographics, answers, format).await?;
            Ok(ExitCode::SUCCESS)
        }
        Command::Run {
            category,
            id,
            demographics,
            answers,
            prevalidate,
            format,
        } => {
            let options = SessionOptions { prevalidate };
            let prefill = Prefill::load(demographics.as_deref(), answers.as_deref())?;
            run_wizard(&cli.connection, category, id, options, prefill, cli.verbose, format).await
        }
        Command::Check {
            definition,
            answers,
            demographics,
            format,
        } => run_check(&definition, answers.as_deref(), demographics.as_deref(), format),
        Command::Eval {
            rule,
            context,
            context_file,
            format,
        } => {
            run_eval(&rule, context.as_deref(), context_file.as_deref(), format)?;
            Ok(ExitCode::SUCCESS)
        }
        Command::Schema => {
            let schema = schemars::schema_for!(QuestionnaireDefinition);
            println!("{}", serde_json::to_string_pretty(&schema)?);
            Ok(ExitCode::SUCCESS)
        }
    }
}

fn init_tracing(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    };
    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(io::stderr))
        .init();
}

fn client_config(args: &ConnectionArgs) -> CliResult<ClientConfig> {
    let mut config = ClientConfig::from_env()?;
    if let Some(url) = &args.api_url {
        config = config.with_base_url(url.clone());
    }
    if let Some(attempts) = args.max_attempts {
        config = config.with_max_attempts(attempts);
    }
    if let Some(delay) = args.retry_delay_ms {
        config = config.with_base_delay_ms(delay);
    }
    tracing::debug!(
        base_url = %config.base_url,
        max_attempts = config.max_attempts,
        base_delay_ms = config.base_delay_ms,
        "client configuration"
    );
    Ok(config)
}

fn client(args: &ConnectionArgs) -> CliResult<ScoringClient> {
    Ok(ScoringClient::from_config(&client_config(args)?)?)
}

async fn run_list(
    connection: &ConnectionArgs,
    category: Category,
    format: OutputFormat,
) -> CliResult<()> {
    let questionnaires = client(connection)?.list_questionnaires(category).await?;
    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&questionnaires)?),
        OutputFormat::Text => {
            if questionnaires.is_empty() {
                println!("No {} questionnaires available.", category);
            }
            for questionnaire in &questionnaires {
                println!(
                    "{}\t{}\t{}",
                    questionnaire.id, questionnaire.abbreviation, questionnaire.name
                );
            }
        }
    }
    Ok(())
}

async fn run_show(
    connection: &ConnectionArgs,
    category: Category,
    id: &str,
    demographics: Option<PathBuf>,
    answers: Option<PathBuf>,
    format: OutputFormat,
) -> CliResult<()> {
    let prefill = Prefill::load(demographics.as_deref(), answers.as_deref())?;
    let definition = client(connection)?.get_questionnaire(category, id).await?;
    let payload = build_render_payload(&definition, &prefill.demographics, &prefill.answers);
    match format {
        OutputFormat::Json => println!(
            "{}",
            serde_json::to_string_pretty(&render_json_ui(&payload))?
        ),
        OutputFormat::Text => println!("{}", render_text(&payload)),
    }
    Ok(())
}

/// Demographics and answers supplied up front from files.
struct Prefill {
    demographics: Context,
    answers: AnswerSet,
}

impl Prefill {
    fn load(demographics: Option<&Path>, answers: Option<&Path>) -> CliResult<Self> {
        let demographics = match demographics {
            Some(path) => Context::from_map(read_json_object(path)?),
            None => Context::new(),
        };
        let answers = match answers {
            Some(path) => read_json_object(path)?.into_iter().collect(),
            None => AnswerSet::new(),
        };
        Ok(Self {
            demographics,
            answers,
        })
    }
}

fn read_json_object(path: &Path) -> CliResult<Map<String, Value>> {
    let contents = fs::read_to_string(path)
        .map_err(|err| format!("failed to read {}: {}", path.display(), err))?;
    match serde_json::from_str::<Value>(&contents)? {
        Value::Object(map) => Ok(map),
        _ => Err(format!("{} must contain a JSON object", path.display()).into()),
    }
}

async fn run_wizard(
    connection: &ConnectionArgs,
    category: Category,
    id: String,
    options: SessionOptions,
    prefill: Prefill,
    verbose: bool,
    format: OutputFormat,
) -> CliResult<ExitCode> {
    let client = client(connection)?;
    let mut session = Session::with_options(category, id, options);
    session.load(&client).await?;
    if session.phase() == Phase::Failed {
        return Err(session.errors().join("; ").into());
    }

    for (field, value) in prefill.demographics.as_map() {
        session.set_demographic(field, value.clone())?;
    }
    for (question, value) in prefill.answers.iter() {
        session.answer(question, value.clone())?;
    }

    let mut presenter = WizardPresenter::new(Verbosity::from_verbose(verbose));
    collect_demographics(&mut session, &mut presenter)?;

    let Some(payload) = session.render() else {
        return Err("questionnaire is not loaded".into());
    };
    presenter.show_header(&payload);
    presenter.show_status(&payload);

    for section in &payload.sections {
        let pending = section
            .questions
            .iter()
            .filter(|question| question.current_value.is_none())
            .collect::<Vec<_>>();
        if pending.is_empty() {
            continue;
        }
        presenter.show_section(&section.label);
        for question in pending {
            ask_question(&mut session, &presenter, question)?;
        }
    }

    match session.submit(&client).await? {
        Phase::Completed => {}
        Phase::Ready => {
            eprintln!("Submission blocked:");
            presenter.show_errors(session.errors());
            return Ok(ExitCode::FAILURE);
        }
        _ => {
            eprintln!("Submission failed:");
            presenter.show_errors(session.errors());
            return Ok(ExitCode::FAILURE);
        }
    }

    let Some(result) = session.result() else {
        return Err("scoring service returned no result".into());
    };
    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(result)?),
        OutputFormat::Text => presenter.show_completion(&render_report(result)?),
    }
    Ok(ExitCode::SUCCESS)
}

fn collect_demographics(session: &mut Session, presenter: &mut WizardPresenter) -> CliResult<()> {
    let fields = session
        .definition()
        .map(|definition| definition.demographic_fields().to_vec())
        .unwrap_or_default();
    if fields.is_empty() {
        return Ok(());
    }
    if let Some(payload) = session.render() {
        presenter.show_header(&payload);
    }

    let pending = fields
        .into_iter()
        .filter(|field| session.demographics().get(&field.id).is_none())
        .collect::<Vec<_>>();
    for field in &pending {
        let prompt = PromptContext::for_field(field);
        loop {
            let raw = read_answer(presenter, &prompt)?;
            match parse_answer(QuestionKind::Choice, &field.options, field.required, &raw) {
                Ok(None) => break,
                Ok(Some(value)) => match session.set_demographic(&field.id, value) {
                    Ok(()) => break,
                    Err(err) => eprintln!("Invalid answer: {}", err),
                },
                Err(err) => {
                    if err.debug_message.is_none() && field.required {
                        eprintln!("{}", field.required_message());
                    } else {
                        presenter.show_parse_error(&err);
                    }
                }
            }
        }
    }
    Ok(())
}

fn ask_question(
    session: &mut Session,
    presenter: &WizardPresenter,
    question: &RenderQuestion,
) -> CliResult<()> {
    let kind = QuestionKind::from_label(&question.kind);
    loop {
        let prompt = PromptContext::for_question(question, &session.progress());
        let raw = read_answer(presenter, &prompt)?;
        let value = match parse_answer(kind, &question.options, question.required, &raw) {
            Ok(Some(value)) => value,
            Ok(None) => return Ok(()),
            Err(err) => {
                presenter.show_parse_error(&err);
                continue;
            }
        };
        match session.answer(&question.id, value) {
            Ok(()) => return Ok(()),
            Err(err) => presenter.show_parse_error(&AnswerParseError::new(err.to_string(), None)),
        }
    }
}

fn read_answer(presenter: &WizardPresenter, prompt: &PromptContext) -> CliResult<String> {
    presenter.show_prompt(prompt);
    print!("> ");
    io::stdout().flush()?;
    let mut input = String::new();
    if io::stdin().read_line(&mut input)? == 0 {
        return Err("input ended before the questionnaire was complete".into());
    }
    let trimmed = input.trim();
    if trimmed.eq_ignore_ascii_case("exit") {
        return Err("wizard aborted by user".into());
    }
    Ok(trimmed.to_string())
}

fn run_check(
    definition_path: &Path,
    answers_path: Option<&Path>,
    demographics_path: Option<&Path>,
    format: OutputFormat,
) -> CliResult<ExitCode> {
    let contents = fs::read_to_string(definition_path)
        .map_err(|err| format!("failed to read {}: {}", definition_path.display(), err))?;
    let definition: QuestionnaireDefinition = serde_json::from_str(&contents)?;
    let prefill = Prefill::load(demographics_path, answers_path)?;

    let missing_fields =
        missing_demographics(definition.demographic_fields(), &prefill.demographics)
            .into_iter()
            .map(|field| field.label.clone())
            .collect::<Vec<_>>();
    let resolution = resolve_questions(&definition.questions, &prefill.demographics);
    let missing = missing_answers(&resolution, &prefill.answers);
    let progress = Progress::compute(&resolution, &prefill.answers);

    let mut invalid = Vec::new();
    let mut unknown = Vec::new();
    for (id, value) in prefill.answers.iter() {
        match definition.question(id) {
            Some(question) => {
                if let Err(err) = check_answer(question, value) {
                    invalid.push((id.clone(), err));
                }
            }
            None => unknown.push(id.clone()),
        }
    }

    let ready = missing_fields.is_empty() && missing.is_empty() && invalid.is_empty();

    match format {
        OutputFormat::Json => {
            let report = json!({
                "ready": ready,
                "progress": {
                    "answered": progress.answered,
                    "total": progress.total,
                    "percent": progress.percent(),
                },
                "visible": resolution.visible_ids().collect::<Vec<_>>(),
                "missing_demographics": missing_fields,
                "missing_answers": missing,
                "invalid_answers": invalid
                    .iter()
                    .map(|(id, err)| {
                        json!({ "id": id, "code": err.code(), "message": err.to_string() })
                    })
                    .collect::<Vec<_>>(),
                "unknown_answers": unknown,
            });
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        OutputFormat::Text => {
            println!(
                "Progress: {}/{} ({:.0}%)",
                progress.answered,
                progress.total,
                progress.percent()
            );
            if !missing_fields.is_empty() {
                println!("Required information missing: {}", missing_fields.join(", "));
            }
            if !missing.is_empty() {
                println!("Missing answers: {}", missing.join(", "));
            }
            for (_, err) in &invalid {
                println!("Invalid answer: {}", err);
            }
            if !unknown.is_empty() {
                println!("Ignored unknown questions: {}", unknown.join(", "));
            }
            if ready {
                println!("Ready to submit.");
            }
        }
    }

    Ok(if ready {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

fn run_eval(
    rule: &str,
    context: Option<&str>,
    context_file: Option<&Path>,
    format: OutputFormat,
) -> CliResult<()> {
    let rule: Value =
        serde_json::from_str(rule).map_err(|err| format!("rule is not valid JSON: {}", err))?;
    let context = match (context, context_file) {
        (Some(raw), _) => match serde_json::from_str::<Value>(raw)
            .map_err(|err| format!("context is not valid JSON: {}", err))?
        {
            Value::Object(map) => Context::from_map(map),
            _ => return Err("context must be a JSON object".into()),
        },
        (None, Some(path)) => Context::from_map(read_json_object(path)?),
        (None, None) => Context::new(),
    };

    let outcome = evaluate(&rule, &context);
    match format {
        OutputFormat::Json => {
            let report = json!({
                "defined": !outcome.is_undefined(),
                "value": outcome.as_value(),
                "truthy": outcome.is_truthy(),
            });
            println!("{}", serde_json::to_string(&report)?);
        }
        OutputFormat::Text => match outcome.as_value() {
            Some(value) => println!("{}", value),
            None => println!("undefined"),
        },
    }
    Ok(())
}
