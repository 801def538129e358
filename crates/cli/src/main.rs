//! inkloop: the main entry point.
//!
//! Usage:
//! - `inkloop "Edit my novel for pacing"`: run a new task
//! - `inkloop`: ask for the task interactively
//! - `inkloop --recover output/novel/.context_summary_20250107_143022.md`:
//!   resume from a checkpoint

use clap::Parser;
use inkloop_agent::AgentLoop;
use inkloop_config::AppConfig;
use inkloop_core::event::EventBus;
use inkloop_core::tool::ToolContext;
use inkloop_providers::OpenAiCompatProvider;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

mod console;
mod prompt;
mod session;

use session::TaskInput;

#[derive(Parser)]
#[command(
    name = "inkloop",
    about = "inkloop: a long-running writing and editing agent",
    version
)]
struct Cli {
    /// The editing task; asked for interactively when omitted
    prompt: Option<String>,

    /// Resume from a checkpoint file
    #[arg(short, long, value_name = "FILE", conflicts_with = "prompt")]
    recover: Option<PathBuf>,

    /// Override the iteration ceiling
    #[arg(long, env = "INKLOOP_MAX_ITERATIONS")]
    max_iterations: Option<u32>,

    /// Folder that holds project folders and checkpoints
    #[arg(long, value_name = "DIR")]
    output_dir: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    // Initialize tracing
    let filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter)),
        )
        .with_target(false)
        .init();

    match run(cli).await {
        Ok(code) => ExitCode::from(code),
        Err(e) => {
            eprintln!("Error: {e}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<u8, Box<dyn std::error::Error>> {
    let mut config = AppConfig::load()?;
    if let Some(max) = cli.max_iterations {
        config.agent.max_iterations = max.max(1);
    }
    if let Some(dir) = cli.output_dir {
        config.output_dir = dir;
    }
    let api_key = config.require_api_key()?.to_string();

    let system_prompt = prompt::EDITOR_SYSTEM_PROMPT;
    let conversation = match (&cli.recover, cli.prompt) {
        (Some(path), _) => {
            let conversation = session::recover(system_prompt, path).await?;
            println!("🔄 Recovery mode: continuing from {}\n", path.display());
            conversation
        }
        (None, Some(task)) if !task.trim().is_empty() => {
            session::new_task(system_prompt, task.trim())
        }
        (None, Some(_)) => {
            eprintln!("Error: Empty prompt. Please provide an editing request.");
            return Ok(1);
        }
        (None, None) => {
            let mut stdin = std::io::stdin().lock();
            match session::read_task(&mut stdin, &mut std::io::stdout())? {
                TaskInput::Task(task) => session::new_task(system_prompt, &task),
                TaskInput::Quit => {
                    println!("Goodbye!");
                    return Ok(0);
                }
                TaskInput::Empty => {
                    eprintln!("Error: Empty prompt. Please provide an editing request.");
                    return Ok(1);
                }
            }
        }
    };

    let provider = Arc::new(OpenAiCompatProvider::for_base_url(&config.base_url, api_key));
    let tools = Arc::new(inkloop_tools::default_registry());
    let ctx = Arc::new(ToolContext::new(&config.output_dir));

    let cancel = CancellationToken::new();
    let on_interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted, writing checkpoint before exit");
            on_interrupt.cancel();
        }
    });

    info!(
        model = %config.model,
        base_url = %config.base_url,
        max_iterations = config.agent.max_iterations,
        token_limit = config.agent.token_limit,
        trigger = config.agent.compression_trigger(),
        "Starting inkloop"
    );

    let agent = AgentLoop::new(provider, &config.model, tools, ctx)
        .with_settings(config.agent.clone())
        .with_temperature(config.temperature)
        .with_max_tokens(config.max_tokens)
        .with_event_bus(Arc::new(EventBus::default()))
        .with_observer(Arc::new(console::ConsoleObserver::new()))
        .with_cancellation(cancel);

    let report = agent.run(conversation).await;

    println!("\n{}", "=".repeat(60));
    println!(
        "Run {} after {} iterations",
        report.reason, report.iterations
    );
    if let Some(path) = &report.checkpoint {
        println!("Checkpoint: {}", path.display());
        println!("Resume with: inkloop --recover {}", path.display());
    }
    println!("{}", "=".repeat(60));

    Ok(u8::try_from(report.reason.exit_code()).unwrap_or(1))
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn recover_conflicts_with_prompt() {
        let result = Cli::try_parse_from(["inkloop", "edit", "--recover", "x.md"]);
        assert!(result.is_err());
    }

    #[test]
    fn parses_prompt_and_overrides() {
        let cli = Cli::try_parse_from([
            "inkloop",
            "Edit my novel",
            "--max-iterations",
            "5",
            "--output-dir",
            "books",
        ])
        .unwrap();
        assert_eq!(cli.prompt.as_deref(), Some("Edit my novel"));
        assert_eq!(cli.max_iterations, Some(5));
        assert_eq!(cli.output_dir, Some(PathBuf::from("books")));
    }
}
