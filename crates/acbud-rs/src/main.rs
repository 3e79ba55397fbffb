//! Terminal accountability buddy.
//!
//! Seeds a journey from the goal, outcome and obstacles (asking for any that
//! are missing), then runs an interactive conversation where every turn is
//! compressed before the reply is generated.
//!
//! Reads the API key from the `OPENROUTER_KEY` environment variable.
//!
//! # Examples
//!
//! ```sh
//! acbud --goal "Run a 5K" --outcome "Feel strong" --obstacles "No time"
//!
//! # Cheaper compression model, debug logging on stderr
//! acbud --compression-model anthropic/claude-3-haiku -v
//!
//! # Only compress once the context passes 4000 characters
//! acbud --min-compression-chars 4000
//! ```
//!
//! Inside the session:
//!
//! ```text
//! /context                     compact context sent to the model
//! /transcript                  full uncompressed transcript
//! /stats                       sizes and compression ratio
//! /update <field> <value>      change goal, outcome, obstacles, plans or name
//! /record <low|moderate|high> <obstacle> => <plan>
//! /help
//! /quit
//! ```

use std::io::{self, Write};
use std::process;
use std::time::Duration;

use acbud_rs::api::RetryConfig;
use acbud_rs::context::TextSize;
use acbud_rs::context::compression::CompressionConfig;
use acbud_rs::prelude::*;
use acbud_rs::{DEFAULT_MODEL, agent::config::DEFAULT_MAX_TOKENS};
use clap::Parser;
use tokio::io::{AsyncBufReadExt, BufReader, Lines, Stdin};
use tracing_subscriber::EnvFilter;

/// Interactive accountability buddy backed by OpenRouter.
///
/// Reads the API key from the OPENROUTER_KEY environment variable.
#[derive(Parser)]
#[command(name = "acbud")]
struct Cli {
    // ── Journey ────────────────────────────────────────────────
    /// Your goal or wish
    #[arg(long)]
    goal: Option<String>,

    /// Desired outcome, visualization or motivation
    #[arg(long)]
    outcome: Option<String>,

    /// Obstacles in the way
    #[arg(long)]
    obstacles: Option<String>,

    /// Your name, used in greetings
    #[arg(long)]
    name: Option<String>,

    /// Approved plan step (repeatable)
    #[arg(long = "plan")]
    plans: Vec<String>,

    // ── Model selection ────────────────────────────────────────
    /// Model for seed and reply generation
    #[arg(long, default_value = DEFAULT_MODEL)]
    model: String,

    /// Model for the compression pass (defaults to --model)
    #[arg(long)]
    compression_model: Option<String>,

    // ── Sampling ───────────────────────────────────────────────
    /// Maximum tokens per reply
    #[arg(long, default_value_t = DEFAULT_MAX_TOKENS)]
    max_tokens: u32,

    /// Maximum tokens for the compressed context
    #[arg(long, default_value_t = 2048)]
    compression_max_tokens: u32,

    /// Sampling temperature (0.0 = deterministic)
    #[arg(long, default_value_t = 0.0)]
    temperature: f32,

    // ── Transport ──────────────────────────────────────────────
    /// Timeout for one model call, in seconds
    #[arg(long, default_value_t = 60)]
    timeout_secs: u64,

    /// Retries for transient failures (429, 5xx, timeouts)
    #[arg(long, default_value_t = 0)]
    retries: u32,

    // ── Compression ────────────────────────────────────────────
    /// Skip the compression call below this many characters (0 = always)
    #[arg(long, default_value_t = 0)]
    min_compression_chars: usize,

    // ── Output ─────────────────────────────────────────────────
    /// Debug logging on stderr
    #[arg(short, long)]
    verbose: bool,
}

const HELP: &str = "\
Commands:
  /context                                  show the compact context
  /transcript                               show the full transcript
  /stats                                    show sizes and compression ratio
  /update <field> <value>                   change goal, outcome, obstacles, plans or name
  /record <low|moderate|high> <obstacle> => <plan>
                                            record how well a plan worked
  /help                                     show this help
  /quit                                     leave the session
Anything else is sent to your buddy.";

const RETRY_PROMPT: &str = "Press enter to retry, /quit to leave: ";

// ── Commands ───────────────────────────────────────────────────────

#[derive(Debug, PartialEq)]
enum Command {
    Say(String),
    Context,
    Transcript,
    Stats,
    Help,
    Update {
        field: ContextField,
        value: String,
    },
    Record {
        effectiveness: Effectiveness,
        obstacle: String,
        plan: String,
    },
    Quit,
}

fn parse_command(line: &str) -> Result<Command, String> {
    let line = line.trim();
    if !line.starts_with('/') {
        return Ok(Command::Say(line.to_string()));
    }
    let (name, rest) = line.split_once(' ').unwrap_or((line, ""));
    let rest = rest.trim();

    match name {
        "/context" => Ok(Command::Context),
        "/transcript" => Ok(Command::Transcript),
        "/stats" => Ok(Command::Stats),
        "/help" => Ok(Command::Help),
        "/quit" | "/exit" => Ok(Command::Quit),
        "/update" => {
            let (field, value) = rest
                .split_once(' ')
                .ok_or("usage: /update <field> <value>")?;
            Ok(Command::Update {
                field: field.parse()?,
                value: value.trim().to_string(),
            })
        }
        "/record" => {
            let usage = "usage: /record <low|moderate|high> <obstacle> => <plan>";
            let (level, rest) = rest.split_once(' ').ok_or(usage)?;
            let (obstacle, plan) = rest.split_once("=>").ok_or(usage)?;
            Ok(Command::Record {
                effectiveness: level.parse()?,
                obstacle: obstacle.trim().to_string(),
                plan: plan.trim().to_string(),
            })
        }
        other => Err(format!("unknown command '{other}' (try /help)")),
    }
}

// ── Helpers ────────────────────────────────────────────────────────

fn init_tracing(verbose: bool) {
    let level = if verbose {
        tracing::Level::DEBUG
    } else {
        tracing::Level::WARN
    };
    tracing_subscriber::fmt()
        .with_writer(io::stderr)
        .with_env_filter(EnvFilter::from_default_env().add_directive(level.into()))
        .init();
}

async fn read_line(
    lines: &mut Lines<BufReader<Stdin>>,
    prompt: &str,
) -> Result<Option<String>, String> {
    print!("{prompt}");
    io::stdout()
        .flush()
        .map_err(|e| format!("failed to flush stdout: {e}"))?;
    lines
        .next_line()
        .await
        .map_err(|e| format!("failed to read stdin: {e}"))
}

/// Anything but `/quit`, `/exit` or closed stdin retries the journey start.
fn wants_retry(answer: Option<&str>) -> bool {
    answer.is_some_and(|a| !matches!(a.trim(), "/quit" | "/exit"))
}

fn stats_report(state: &ConversationState) -> String {
    let context = TextSize::of(state.context());
    let transcript = TextSize::of(state.transcript());
    let ratio = if transcript.chars == 0 {
        0.0
    } else {
        100.0 * context.chars as f64 / transcript.chars as f64
    };
    let history = state.journey().map_or(0, |j| j.history.len());
    let effective = state
        .journey()
        .map_or(0, |j| j.history.effective_plans().count());
    format!(
        "turn:        {}\ncontext:     {}\ntranscript:  {}\ncontext is {ratio:.0}% of the transcript\npending:     {} amendment(s)\nhistory:     {history} entr{}, {effective} rated high",
        state.turn(),
        context.to_log_string(),
        transcript.to_log_string(),
        state.pending_amendments().len(),
        if history == 1 { "y" } else { "ies" },
    )
}

fn build_config(cli: &Cli) -> BuddyConfig {
    BuddyConfig::new(&cli.model)
        .with_max_tokens(cli.max_tokens)
        .with_temperature(cli.temperature)
        .with_compression(CompressionConfig {
            model: cli.compression_model.clone(),
            max_tokens: cli.compression_max_tokens,
            temperature: cli.temperature,
            min_input_chars: cli.min_compression_chars,
        })
}

fn initial_variables(cli: &Cli) -> ContextVariables {
    let mut vars = ContextVariables::new(
        cli.goal.clone().unwrap_or_default(),
        cli.outcome.clone().unwrap_or_default(),
        cli.obstacles.clone().unwrap_or_default(),
    )
    .with_plans(cli.plans.clone());
    if let Some(name) = &cli.name {
        vars = vars.with_name(name);
    }
    vars
}

// ── Session ────────────────────────────────────────────────────────

async fn run(cli: Cli) -> Result<(), String> {
    let api_key = std::env::var("OPENROUTER_KEY")
        .map_err(|_| "Set OPENROUTER_KEY env var to your OpenRouter API key")?;
    let options = ClientOptions {
        timeout: Duration::from_secs(cli.timeout_secs),
        retry: RetryConfig::with_retries(cli.retries),
        ..Default::default()
    };
    let client = OpenRouterClient::with_options(api_key, options).map_err(|e| e.to_string())?;
    let controller =
        TurnController::new(&client, build_config(&cli)).with_event_handler(&LoggingHandler);

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut vars = initial_variables(&cli);

    // Seed, asking for whatever is missing until the journey starts.
    let mut state = loop {
        let outcome = controller
            .start_journey(&ConversationState::default(), vars.clone())
            .await;
        match outcome.reply {
            Reply::Assistant { text } => {
                println!("\n{text}\n");
                break outcome.state;
            }
            Reply::MissingInfo { fields, .. } => {
                for field in fields {
                    let prompt = format!("Please enter {}: ", field.describe());
                    let answer = read_line(&mut lines, &prompt)
                        .await?
                        .ok_or("stdin closed before the journey started")?;
                    vars.apply(field, &answer);
                }
            }
            Reply::Notice { text } | Reply::Error { text } => {
                eprintln!("{text}\n");
                let answer = read_line(&mut lines, RETRY_PROMPT).await?;
                if !wants_retry(answer.as_deref()) {
                    return Ok(());
                }
            }
        }
    };

    while let Some(line) = read_line(&mut lines, "> ").await? {
        if line.trim().is_empty() {
            continue;
        }
        let command = match parse_command(&line) {
            Ok(c) => c,
            Err(e) => {
                eprintln!("{e}");
                continue;
            }
        };

        let outcome = match command {
            Command::Say(message) => controller.submit_turn(&state, &message).await,
            Command::Update { field, value } => controller.update_context(&state, field, &value),
            Command::Record {
                effectiveness,
                obstacle,
                plan,
            } => controller.record_outcome(&state, &obstacle, &plan, effectiveness),
            Command::Context => {
                println!("{}\n", state.context());
                continue;
            }
            Command::Transcript => {
                println!("{}\n", state.transcript());
                continue;
            }
            Command::Stats => {
                println!("{}\n", stats_report(&state));
                continue;
            }
            Command::Help => {
                println!("{HELP}\n");
                continue;
            }
            Command::Quit => break,
        };

        match &outcome.reply {
            Reply::Error { text } => eprintln!("{text}\n"),
            reply => println!("\n{}\n", reply.text()),
        }
        state = outcome.state;
    }

    Ok(())
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    if let Err(e) = run(cli).await {
        eprintln!("Error: {e}");
        process::exit(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_text_is_a_message() {
        assert_eq!(
            parse_command("  I ran twice this week "),
            Ok(Command::Say("I ran twice this week".into()))
        );
    }

    #[test]
    fn simple_commands() {
        assert_eq!(parse_command("/context"), Ok(Command::Context));
        assert_eq!(parse_command("/transcript"), Ok(Command::Transcript));
        assert_eq!(parse_command("/stats"), Ok(Command::Stats));
        assert_eq!(parse_command("/quit"), Ok(Command::Quit));
        assert!(parse_command("/dance").is_err());
    }

    #[test]
    fn update_command() {
        assert_eq!(
            parse_command("/update goal Run a 10K"),
            Ok(Command::Update {
                field: ContextField::Goal,
                value: "Run a 10K".into(),
            })
        );
        assert!(parse_command("/update goal").is_err());
        assert!(parse_command("/update mood happy").is_err());
    }

    #[test]
    fn record_command() {
        assert_eq!(
            parse_command("/record moderate late-night cravings => drink herbal tea"),
            Ok(Command::Record {
                effectiveness: Effectiveness::Moderate,
                obstacle: "late-night cravings".into(),
                plan: "drink herbal tea".into(),
            })
        );
        assert!(parse_command("/record high no arrow here").is_err());
        assert!(parse_command("/record great a => b").is_err());
    }

    #[test]
    fn stats_for_fresh_state() {
        let report = stats_report(&ConversationState::default());
        assert!(report.contains("turn:        0"));
        assert!(report.contains("context is 0% of the transcript"));
        assert!(report.contains("history:     0 entries, 0 rated high"));
    }

    #[test]
    fn failed_start_retries_until_quit() {
        assert!(wants_retry(Some("")));
        assert!(wants_retry(Some("again")));
        assert!(!wants_retry(Some(" /quit ")));
        assert!(!wants_retry(Some("/exit")));
        assert!(!wants_retry(None));
    }

    #[test]
    fn cli_maps_onto_config() {
        let cli = Cli::parse_from([
            "acbud",
            "--goal",
            "Run",
            "--plan",
            "Walk",
            "--plan",
            "Stretch",
            "--min-compression-chars",
            "500",
            "--compression-model",
            "small",
        ]);
        let config = build_config(&cli);
        assert_eq!(config.compression.min_input_chars, 500);
        assert_eq!(config.compression.model.as_deref(), Some("small"));
        assert_eq!(config.max_tokens, DEFAULT_MAX_TOKENS);

        let vars = initial_variables(&cli);
        assert_eq!(vars.plans, vec!["Walk", "Stretch"]);
        assert_eq!(vars.missing_fields().len(), 2);
    }
}
