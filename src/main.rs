//! Cradle: self-modifying agent daemon.
//! Main entry point for the binary.

use clap::{Parser, Subcommand};
use cradle::chat::telegram::TelegramTransport;
use cradle::chat::ChatTransport;
use cradle::config::{Config, ProviderConfig};
use cradle::evolver::Evolver;
use cradle::heartbeat::Heartbeat;
use cradle::llm::gemini::GeminiProvider;
use cradle::llm::groq::GroqProvider;
use cradle::llm::minimax::MiniMaxProvider;
use cradle::llm::openai::OpenAIProvider;
use cradle::llm::openrouter::OpenRouterProvider;
use cradle::llm::router::LLMRouter;
use cradle::llm::LLMProvider;
use cradle::memory::{HttpMemoryPort, MemoryPort, NullMemoryPort};
use cradle::repo::RepoClient;
use cradle::sandbox::SandboxDriver;
use cradle::task::TaskEngine;
use cradle::telemetry::init_telemetry_with_level;
use std::sync::Arc;
use std::time::Duration;

#[derive(Parser)]
#[command(name = "cradle", about = "Self-modifying agent daemon")]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Run the heartbeat loop forever (default).
    Run,
    /// Queue a single task and run it to completion, then exit.
    Task {
        /// The task text.
        text: String,
    },
}

fn build_provider(config: ProviderConfig) -> (ProviderConfig, Box<dyn LLMProvider>) {
    let provider: Box<dyn LLMProvider> = match config.name.as_str() {
        "gemini" => Box::new(GeminiProvider::new(config.clone())),
        "minimax" => Box::new(MiniMaxProvider::new(config.clone())),
        "groq" => Box::new(GroqProvider::new(config.clone())),
        "openrouter" => Box::new(OpenRouterProvider::new(config.clone())),
        _ => Box::new(OpenAIProvider::new(config.clone())),
    };
    (config, provider)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let loaded = Config::from_env();
    let config = loaded.config;

    let _guard = init_telemetry_with_level(&config.log_level, &config.log_dir);

    let version = env!("CARGO_PKG_VERSION");
    let commit = env!("GIT_COMMIT_HASH");
    let timestamp = env!("BUILD_TIMESTAMP");
    tracing::info!("cradle v{version} ({commit} - {timestamp})");

    for warning in &loaded.warnings {
        tracing::warn!("{warning}");
    }

    std::fs::create_dir_all(&config.data_dir).ok();

    let entries: Vec<_> = loaded.providers.into_iter().map(build_provider).collect();
    let router = Arc::new(LLMRouter::new(entries));

    let sandbox = Arc::new(SandboxDriver::new(config.data_dir.clone()));

    let memory: Arc<dyn MemoryPort> = match (&config.memory_api_key, &config.memory_identifier, &config.memory_playbook_id)
    {
        (Some(key), Some(identifier), Some(playbook_id)) => Arc::new(HttpMemoryPort::new(
            "https://agentplaybooks.ai/api",
            key.clone(),
            identifier.clone(),
            playbook_id.clone(),
        )),
        _ => {
            tracing::warn!("memory service not fully configured, using no-op memory port");
            Arc::new(NullMemoryPort)
        }
    };

    let engine = TaskEngine::new(Arc::clone(&router), Arc::clone(&sandbox), Arc::clone(&memory));

    match cli.command.unwrap_or(Command::Run) {
        Command::Task { text } => run_one_shot(engine, text).await,
        Command::Run => run_daemon(engine, router, sandbox, memory, config).await,
    }
}

async fn run_one_shot(mut engine: TaskEngine, text: String) -> anyhow::Result<()> {
    engine.add_task(truncate(&text, 60), text, None, cradle::task::TaskSource::User);
    loop {
        let Some(outcome) = engine.process_next().await else { break };
        if outcome.task.status.is_terminal() {
            match outcome.task.result {
                Some(result) => println!("{result}"),
                None => eprintln!("task failed: {}", outcome.task.error.unwrap_or_default()),
            }
            break;
        }
    }
    Ok(())
}

async fn run_daemon(
    engine: TaskEngine,
    router: Arc<LLMRouter>,
    sandbox: Arc<SandboxDriver>,
    memory: Arc<dyn MemoryPort>,
    config: Config,
) -> anyhow::Result<()> {
    let repo_credentials = match (&config.repo_token, &config.repo_org, &config.repo_name) {
        (Some(token), Some(org), Some(name)) => Some((token.clone(), org.clone(), name.clone())),
        _ => None,
    };

    let repo = repo_credentials
        .clone()
        .map(|(token, org, name)| RepoClient::new(token, org, name));

    let evolver = repo_credentials.map(|(token, org, name)| {
        Evolver::new(
            Arc::clone(&router),
            Arc::clone(&sandbox),
            RepoClient::new(token, org, name),
            Arc::clone(&memory),
            std::env::current_dir().unwrap_or_default(),
        )
    });

    let chat: Option<Box<dyn ChatTransport>> = config
        .chat_token
        .clone()
        .map(|token| Box::new(TelegramTransport::new(token, config.chat_allowed_handle.clone())) as Box<dyn ChatTransport>);

    let mut heartbeat = Heartbeat::new(
        engine,
        evolver,
        repo,
        chat,
        memory,
        config.data_dir.clone(),
        Duration::from_secs(config.heartbeat_interval_secs),
    );

    let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);

    tokio::spawn(async move {
        wait_for_shutdown_signal().await;
        tracing::info!("shutdown signal received");
        let _ = shutdown_tx.send(true);
    });

    if let cradle::heartbeat::TickResult::Restart = heartbeat.run_until_restart(shutdown_rx).await {
        tracing::info!("heartbeat requested a supervised restart (exit 42)");
        std::process::exit(cradle::evolver::RESTART_EXIT_CODE);
    }
    Ok(())
}

#[cfg(unix)]
async fn wait_for_shutdown_signal() {
    use tokio::signal::unix::{signal, SignalKind};
    let mut sigterm = signal(SignalKind::terminate()).expect("failed to register SIGTERM handler");
    tokio::select! {
        _ = tokio::signal::ctrl_c() => {}
        _ = sigterm.recv() => {}
    }
}

#[cfg(not(unix))]
async fn wait_for_shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
}

fn truncate(s: &str, max: usize) -> String {
    if s.len() <= max {
        s.to_string()
    } else {
        format!("{}...", &s[..max])
    }
}
