use std::fs;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::{Args, Parser, Subcommand};
use serde_json::{Value, json};
use signup::harness::{ClickStep, MenuSimulator};
use signup::{
    Notice, Notifier, RuleClassifier, SignupConfig, SignupFields, SignupOutcome, SignupValidator, UrlCheckError,
    UrlReport, ValidationError, check_url,
};
use tracing_subscriber::EnvFilter;


#[derive(Debug, thiserror::Error)]
enum CliError {
    #[error("failed to read config {}: {source}", path.display())]
    ReadConfig {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error(transparent)]
    Config(#[from] signup::ConfigError),
    #[error("invalid url rules {}: {source}", path.display())]
    InvalidRules {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("failed to encode output: {0}")]
    Json(#[from] serde_json::Error),
}

#[derive(Parser, Debug)]
#[command(name = "signup-cli", about = "Signup form and side menu harness")]
struct Cli {
    /// JSON file with validator options.
    #[arg(long, env = "SIGNUP_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Submit the signup form once.
    Validate(ValidateArgs),
    /// Replay clicks against the side menu.
    Menu(MenuArgs),
    /// Check whether a URL looks like a phishing site.
    CheckUrl(CheckUrlArgs),
}

#[derive(Args, Debug)]
struct ValidateArgs {
    #[arg(long, default_value = "")]
    fname: String,

    #[arg(long, default_value = "")]
    uname: String,

    #[arg(long, default_value = "")]
    pass: String,

    #[arg(long, default_value = "")]
    cpass: String,

    /// Strip surrounding whitespace before validating.
    #[arg(long, env = "SIGNUP_TRIM")]
    trim: bool,

    /// Print the outcome as a JSON object.
    #[arg(long)]
    json: bool,
}

#[derive(Args, Debug)]
struct MenuArgs {
    /// Clicks to apply in order: toggle, inside, outside.
    #[arg(required = true, num_args = 1..)]
    steps: Vec<ClickStep>,
}

#[derive(Args, Debug)]
struct CheckUrlArgs {
    /// URL to check; `http://` is assumed when no scheme is given.
    url: String,

    /// JSON file overriding the rule classifier weights.
    #[arg(long, env = "SIGNUP_URL_RULES")]
    rules: Option<PathBuf>,

    /// Print the report as a JSON object.
    #[arg(long)]
    json: bool,
}

/// Prints notices in place of the page's alert dialogs.
struct ConsoleNotifier {
    quiet: bool,
}

impl Notifier for ConsoleNotifier {
    fn notify(&mut self, notice: Notice) {
        if !self.quiet {
            println!("{notice}");
        }
    }
}

fn main() -> Result<ExitCode, CliError> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = load_config(cli.config.as_deref())?;

    match cli.command {
        Command::Validate(args) => run_validate(config, args),
        Command::Menu(args) => {
            for line in menu_report(&args.steps) {
                println!("{line}");
            }
            Ok(ExitCode::SUCCESS)
        }
        Command::CheckUrl(args) => run_check_url(args),
    }
}

fn load_config(path: Option<&Path>) -> Result<SignupConfig, CliError> {
    let Some(path) = path else {
        return Ok(SignupConfig::default());
    };
    let raw = fs::read_to_string(path).map_err(|source| CliError::ReadConfig {
        path: path.to_owned(),
        source,
    })?;
    let config = SignupConfig::from_json(&raw)?;
    tracing::debug!(path = %path.display(), ?config, "loaded signup config");
    Ok(config)
}

fn run_validate(mut config: SignupConfig, args: ValidateArgs) -> Result<ExitCode, CliError> {
    if args.trim {
        config.trim_whitespace = true;
    }

    let fields = SignupFields::new(args.fname, args.uname, args.pass, args.cpass);
    let mut notifier = ConsoleNotifier { quiet: args.json };
    let outcome = SignupValidator::new(config).handle_signup(&fields, &mut notifier);

    if args.json {
        println!("{}", serde_json::to_string_pretty(&outcome_json(outcome))?);
    }

    Ok(if outcome.is_registered() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

fn outcome_json(outcome: SignupOutcome) -> Value {
    let notice = outcome.notice();
    let field = match outcome {
        SignupOutcome::Rejected(ValidationError::MissingField(field)) => Some(field.element_id()),
        _ => None,
    };
    json!({
        "outcome": notice,
        "message": notice.message(),
        "field": field,
    })
}

fn menu_report(steps: &[ClickStep]) -> Vec<String> {
    let mut sim = MenuSimulator::new();
    steps
        .iter()
        .map(|step| {
            let shown = sim.click(*step);
            format!("step={step} shown={shown} listeners={}", sim.listener_count())
        })
        .collect()
}

fn load_rules(path: Option<&Path>) -> Result<RuleClassifier, CliError> {
    let Some(path) = path else {
        return Ok(RuleClassifier::default());
    };
    let raw = fs::read_to_string(path).map_err(|source| CliError::ReadConfig {
        path: path.to_owned(),
        source,
    })?;
    serde_json::from_str(&raw).map_err(|source| CliError::InvalidRules {
        path: path.to_owned(),
        source,
    })
}

fn run_check_url(args: CheckUrlArgs) -> Result<ExitCode, CliError> {
    let classifier = load_rules(args.rules.as_deref())?;
    let result = check_url(&args.url, &classifier);
    println!("{}", render_url_check(&result, args.json)?);

    Ok(match result {
        Ok(report) if report.verdict == signup::Verdict::Legitimate => ExitCode::SUCCESS,
        _ => ExitCode::FAILURE,
    })
}

fn render_url_check(result: &Result<UrlReport, UrlCheckError>, as_json: bool) -> Result<String, CliError> {
    match (result, as_json) {
        (Ok(report), true) => Ok(serde_json::to_string_pretty(report)?),
        (Err(err), true) => Ok(serde_json::to_string_pretty(&json!({ "error": err.to_string() }))?),
        (Ok(report), false) => {
            let mut out = format!("{}\n{}", report.url, report.label);
            if let Some(confidence) = report.confidence {
                out.push_str(&format!("\nConfidence: {confidence}%"));
            }
            Ok(out)
        }
        (Err(err), false) => Ok(err.to_string()),
    }
}
