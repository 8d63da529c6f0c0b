//! agent-relay entry point.
//!
//! Startup sequence:
//!   1. Load .env (if present)
//!   2. Parse CLI flags
//!   3. Load config, init logger
//!   4. Build the agent backend and wrap it in an adapter
//!   5. Either probe the agent and exit, or run the comms channels until
//!      Ctrl-C

use std::process;
use std::sync::Arc;
use std::time::Duration;

use agent_relay::adapter::{AgentAdapter, probe};
use agent_relay::agent::{Agent, backends};
use agent_relay::error::AppError;
use agent_relay::{config, logger, subsystems};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

const DEFAULT_PROBE_TEXT: &str = "hello";

// ── CLI arg parsing ────────────────────────────────────────────────────────

#[derive(Debug, Default, PartialEq)]
struct Args {
    interactive: bool,
    config_path: Option<String>,
    verbosity: u8,
    probe: Option<String>,
}

fn parse_args(args: impl IntoIterator<Item = String>) -> Result<Args, String> {
    let mut parsed = Args::default();
    let mut iter = args.into_iter().peekable();

    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "-i" | "--interactive" => parsed.interactive = true,
            "-f" | "--config" => {
                parsed.config_path = Some(iter.next().ok_or("-f requires a path")?);
            }
            "--probe" => {
                let text = match iter.peek() {
                    Some(next) if !next.starts_with('-') => iter.next(),
                    _ => None,
                };
                parsed.probe = Some(text.unwrap_or_else(|| DEFAULT_PROBE_TEXT.to_string()));
            }
            flag if flag.len() > 1 && flag.starts_with('-') && flag[1..].chars().all(|c| c == 'v') => {
                parsed.verbosity = parsed.verbosity.saturating_add((flag.len() - 1) as u8);
            }
            other => return Err(format!("unknown argument: {other}")),
        }
    }

    Ok(parsed)
}

fn print_help() {
    eprintln!("usage: agent-relay [-i] [-f <config>] [-v...] [--probe [TEXT]]");
    eprintln!();
    eprintln!("flags:");
    eprintln!("  -i, --interactive     enable the console channel");
    eprintln!("  -f, --config <path>   config file (default: {})", config::DEFAULT_CONFIG_PATH);
    eprintln!("  -v                    log verbosity: -v warn, -vv info, -vvv debug, -vvvv trace");
    eprintln!("  --probe [TEXT]        call every public agent method with TEXT and exit");
    eprintln!("  -h, --help            print this help");
    eprintln!();
    eprintln!("environment:");
    eprintln!("  TELEGRAM_TOKEN        bot token, required when Telegram is enabled");
    eprintln!("  LLM_API_KEY           API key for the openai backend");
    eprintln!("  RELAY_LOG_LEVEL       overrides [bot] log_level");
}

// ── main ───────────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        eprintln!("error: {e}");
        process::exit(1);
    }
}

async fn run() -> Result<(), AppError> {
    // Optional file.
    let _ = dotenvy::dotenv();

    let raw: Vec<String> = std::env::args().skip(1).collect();
    if raw.iter().any(|a| a == "-h" || a == "--help") {
        print_help();
        return Ok(());
    }
    let args = parse_args(raw).map_err(|e| {
        print_help();
        AppError::Config(e)
    })?;

    let mut config = config::load(args.config_path.as_deref())?;
    if args.interactive {
        config.comms.pty.enabled = true;
    }

    logger::init(logger::level_for_verbosity(args.verbosity), &config.log_level)?;

    info!(
        bot_name = %config.bot_name,
        backend = %config.agent.backend,
        timeout_seconds = config.agent.timeout_seconds,
        "config loaded"
    );

    let backend = backends::build(&config.agent, config.llm_api_key.clone())?;
    let timeout = Duration::from_secs(config.agent.timeout_seconds);

    if let Some(text) = args.probe {
        return run_probe(&backend, &text, timeout).await;
    }

    let adapter = Arc::new(AgentAdapter::new(Arc::new(backend), timeout));
    info!(agent = adapter.agent().name(), plan = %adapter.plan(), "agent ready");

    let shutdown = CancellationToken::new();
    let handle = subsystems::comms::start(&config, adapter, shutdown.clone())?;

    let signal_token = shutdown.clone();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => info!("ctrl-c received, shutting down"),
            Err(e) => warn!("failed to listen for ctrl-c: {e}"),
        }
        signal_token.cancel();
    });

    let result = handle.join().await;
    info!("agent-relay stopped");
    result
}

async fn run_probe(agent: &dyn Agent, text: &str, timeout: Duration) -> Result<(), AppError> {
    println!("probing agent '{}' with {text:?}", agent.name());
    let reports = probe(agent, text, timeout).await;
    if reports.is_empty() {
        println!("  (no public methods)");
    }
    for report in reports {
        match report.result {
            Ok(reply) => println!("  {:<12} ok    {reply:?}", report.method),
            Err(e) => println!("  {:<12} error {e}", report.method),
        }
    }
    Ok(())
}
