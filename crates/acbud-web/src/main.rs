//! HTTP accountability buddy server.
//!
//! # Usage
//!
//! ```bash
//! OPENROUTER_KEY=sk-... cargo run -p acbud-web
//! OPENROUTER_KEY=sk-... cargo run -p acbud-web -- --port 8080 --min-compression-chars 4000
//! ```
//!
//! Then drive a conversation with curl:
//!
//! ```bash
//! ID=$(curl -s -X POST localhost:3001/api/sessions | jq -r .session_id)
//! curl -s localhost:3001/api/sessions/$ID/journey \
//!   -H 'content-type: application/json' \
//!   -d '{"goal":"Run a 5K","outcome":"Feel strong","obstacles":"No time"}'
//! curl -s localhost:3001/api/sessions/$ID/turns \
//!   -H 'content-type: application/json' -d '{"message":"I ran twice this week"}'
//! ```

use std::process;
use std::sync::Arc;
use std::time::Duration;

use acbud_rs::DEFAULT_MODEL;
use acbud_rs::agent::config::DEFAULT_MAX_TOKENS;
use acbud_rs::api::RetryConfig;
use acbud_rs::prelude::*;
use acbud_web::{WebConfig, spawn_web};
use clap::Parser;
use tracing_subscriber::EnvFilter;

/// Accountability buddy JSON API.
#[derive(Parser)]
#[command(about = "Accountability buddy conversations over HTTP")]
struct Args {
    /// Model for seed and reply generation.
    #[arg(long, default_value = DEFAULT_MODEL)]
    model: String,

    /// Model for the compression pass (defaults to --model).
    #[arg(long)]
    compression_model: Option<String>,

    /// Maximum tokens per reply.
    #[arg(long, default_value_t = DEFAULT_MAX_TOKENS)]
    max_tokens: u32,

    /// Skip the compression call below this many characters (0 = always).
    #[arg(long, default_value_t = 0)]
    min_compression_chars: usize,

    /// Timeout for one model call, in seconds.
    #[arg(long, default_value_t = 60)]
    timeout_secs: u64,

    /// Retries for transient model failures.
    #[arg(long, default_value_t = 0)]
    retries: u32,

    /// Port for the API server.
    #[arg(long, default_value_t = 3001)]
    port: u16,

    /// Disable permissive CORS headers.
    #[arg(long)]
    no_cors: bool,

    /// Debug logging on stderr.
    #[arg(short, long)]
    verbose: bool,
}

/// Stderr log level: warnings by default, debug with `--verbose`.
fn log_level(verbose: bool) -> tracing::Level {
    if verbose {
        tracing::Level::DEBUG
    } else {
        tracing::Level::WARN
    }
}

async fn run(args: Args) -> Result<(), String> {
    let api_key = std::env::var("OPENROUTER_KEY")
        .map_err(|_| "Set OPENROUTER_KEY env var to your OpenRouter API key")?;
    let options = ClientOptions {
        timeout: Duration::from_secs(args.timeout_secs),
        retry: RetryConfig::with_retries(args.retries),
        ..Default::default()
    };
    let client = OpenRouterClient::with_options(api_key, options).map_err(|e| e.to_string())?;

    let mut buddy = BuddyConfig::new(&args.model)
        .with_max_tokens(args.max_tokens)
        .with_min_compression_chars(args.min_compression_chars);
    if let Some(model) = &args.compression_model {
        buddy = buddy.with_compression_model(model);
    }

    let web_config = WebConfig {
        bind_addr: ([127, 0, 0, 1], args.port).into(),
        cors: !args.no_cors,
    };
    let (addr, _store) = spawn_web(Arc::new(client), buddy, web_config)
        .await
        .map_err(|e| format!("failed to bind port {}: {e}", args.port))?;
    println!("API: http://{addr}/api/sessions");

    tokio::signal::ctrl_c()
        .await
        .map_err(|e| format!("failed to listen for ctrl-c: {e}"))?;
    println!("Shutting down.");
    Ok(())
}

#[tokio::main]
async fn main() {
    let args = Args::parse();
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            EnvFilter::from_default_env().add_directive(log_level(args.verbose).into()),
        )
        .init();

    if let Err(e) = run(args).await {
        eprintln!("Error: {e}");
        process::exit(1);
    }
}
