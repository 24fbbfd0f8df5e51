//! oreo - terminal chat for Ollama-compatible inference servers

mod commands;
mod config;

use std::io::{self, Write};
use std::time::Duration;

use clap::Parser;
use futures::StreamExt;
use oreo_client::{
    ChatReply, ChatSession, ClientConfig, TransferOutcome, TransferProgress,
};
use serde_json::Value;
use tracing_subscriber::EnvFilter;

use commands::{ChatSettings, CommandResult, clamp_temperature};

/// oreo - chat with a local model server
#[derive(Parser, Debug)]
#[command(name = "oreo")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Model to chat with (default: deepseek-r1:14b)
    #[arg(short, long)]
    model: Option<String>,

    /// Server address (default: http://localhost:11434)
    #[arg(short, long)]
    url: Option<String>,

    /// Seconds to wait for a slow model
    #[arg(short, long)]
    timeout: Option<u64>,

    /// System prompt
    #[arg(short, long)]
    system: Option<String>,

    /// Sampling temperature, clamped to 0.1 - 2.0
    #[arg(long)]
    temperature: Option<f64>,

    /// Maximum tokens per reply
    #[arg(long)]
    max_tokens: Option<u32>,

    /// Extra model option, e.g. --option top_k=20 (repeatable)
    #[arg(short = 'o', long = "option", value_parser = parse_option)]
    options: Vec<(String, Value)>,

    /// Run in non-interactive mode with a single prompt
    #[arg(short = 'c', long)]
    command: Option<String>,

    /// Wait for the whole reply instead of streaming it
    #[arg(long)]
    no_stream: bool,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,

    /// Initialize config file
    #[arg(long)]
    init_config: bool,

    /// List installed models and exit
    #[arg(long)]
    list_models: bool,

    /// Download a model and exit
    #[arg(long, value_name = "MODEL")]
    pull: Option<String>,

    /// Remove an installed model and exit
    #[arg(long, value_name = "MODEL")]
    delete: Option<String>,
}

/// Parse `key=value`; the value is read as JSON when possible
fn parse_option(s: &str) -> Result<(String, Value), String> {
    let (key, value) = s
        .split_once('=')
        .ok_or_else(|| format!("expected key=value, got '{}'", s))?;
    let key = key.trim();
    if key.is_empty() {
        return Err(format!("missing option name in '{}'", s));
    }
    let value = serde_json::from_str(value.trim())
        .unwrap_or_else(|_| Value::String(value.trim().to_string()));
    Ok((key.to_string(), value))
}

fn init_tracing(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("oreo=debug,oreo_client=debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    init_tracing(args.verbose);

    // Initialize config and exit
    if args.init_config {
        match config::Config::init() {
            Ok(path) => {
                println!("Config file created at: {}", path.display());
                println!("\nExample config:\n{}", config::example_config());
            }
            Err(e) => {
                eprintln!("Error creating config: {}", e);
                std::process::exit(1);
            }
        }
        return Ok(());
    }

    let cfg = config::Config::load();

    // Merge config with CLI args (CLI takes precedence)
    let mut client_config = ClientConfig::default();
    if let Some(url) = args.url.or(cfg.base_url) {
        client_config = client_config.with_base_url(url);
    }
    if let Some(model) = args.model.or(cfg.model) {
        client_config = client_config.with_model(model);
    }
    if let Some(secs) = args.timeout.or(cfg.timeout_secs) {
        client_config = client_config.with_read_timeout(Duration::from_secs(secs));
    }
    if let Some(prompt) = args.system.or(cfg.system_prompt) {
        client_config = client_config.with_system_prompt(prompt);
    }

    let defaults = ChatSettings::default();
    let mut settings = ChatSettings {
        temperature: clamp_temperature(
            args.temperature.or(cfg.temperature).unwrap_or(defaults.temperature),
        ),
        max_tokens: args.max_tokens.or(cfg.max_tokens).unwrap_or(defaults.max_tokens),
        stream: !args.no_stream && cfg.stream.unwrap_or(defaults.stream),
        extra: args.options.into_iter().collect(),
    };

    let mut session = ChatSession::new(client_config)?;
    tracing::debug!(
        base_url = %session.config().base_url,
        model = %session.model(),
        "session ready"
    );

    // One-shot model management
    if args.list_models {
        list_models(&session).await;
        return Ok(());
    }
    if let Some(name) = args.pull {
        pull_model(&session, &name).await;
        return Ok(());
    }
    if let Some(name) = args.delete {
        delete_model(&session, &name).await;
        return Ok(());
    }

    // Non-interactive mode
    if let Some(command) = args.command {
        if !ask(&session, &command, &settings).await {
            std::process::exit(1);
        }
        return Ok(());
    }

    run_interactive(&mut session, &mut settings).await
}

/// Send one prompt and print the reply. Returns false on failure.
async fn ask(session: &ChatSession, prompt: &str, settings: &ChatSettings) -> bool {
    let reply = match session.send(prompt, settings.stream, &settings.options()).await {
        Ok(reply) => reply,
        Err(e) => {
            eprintln!("Error: {} ({})", e, e.summary());
            return false;
        }
    };

    match reply {
        ChatReply::Buffered(response) => {
            let text = response
                .message
                .map(|m| session.reasoning_filter().filter(&m.content))
                .unwrap_or_default();
            println!("{}", text.trim());
            true
        }
        ChatReply::Streamed(mut deltas) => {
            let mut stdout = io::stdout();
            let mut ok = true;
            while let Some(delta) = deltas.next().await {
                match delta {
                    Ok(text) => {
                        print!("{}", text);
                        let _ = stdout.flush();
                    }
                    Err(e) => {
                        eprintln!("\nError: {} ({})", e, e.summary());
                        ok = false;
                        break;
                    }
                }
            }
            println!();
            ok
        }
    }
}

async fn list_models(session: &ChatSession) {
    match session.list_models().await {
        Ok(models) => println!("{}", commands::format_models(session.model(), &models)),
        Err(e) => eprintln!("Error: {} ({})", e, e.summary()),
    }
}

async fn delete_model(session: &ChatSession, name: &str) {
    match session.delete_model(name).await {
        Ok(()) => println!("Deleted {}", name),
        Err(e) => eprintln!("Error: {} ({})", e, e.summary()),
    }
}

/// Pull a model in the background, rendering progress until it ends.
/// Ctrl-C cancels the download.
async fn pull_model(session: &ChatSession, name: &str) {
    let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel::<TransferProgress>();
    let handle = session.transfers().start(name, tx);

    loop {
        tokio::select! {
            progress = rx.recv() => match progress {
                Some(progress) => render_progress(&progress),
                None => break,
            },
            _ = tokio::signal::ctrl_c() => {
                handle.cancel();
                break;
            }
        }
    }

    match handle.join().await {
        TransferOutcome::Completed => println!("\nPulled {}", name),
        TransferOutcome::Failed(message) => eprintln!("\nPull failed: {}", message),
        TransferOutcome::Cancelled => println!("\nPull of {} cancelled", name),
    }
}

fn render_progress(progress: &TransferProgress) {
    if progress.error.is_some() {
        return;
    }
    // The overall percentage holds at its high-water mark across layers,
    // so show the current layer while one is downloading
    if progress.total > 0 {
        print!(
            "\r{:<40} {:>5.1}% ({:.1}/{:.1} MiB)",
            progress.status,
            progress.layer_percentage(),
            progress.completed as f64 / 1024.0 / 1024.0,
            progress.total as f64 / 1024.0 / 1024.0,
        );
    } else {
        print!("\r{:<40} {:>5.1}%{:20}", progress.status, progress.percentage, "");
    }
    let _ = io::stdout().flush();
}

async fn run_interactive(session: &mut ChatSession, settings: &mut ChatSettings) -> anyhow::Result<()> {
    // Show minimal startup info (only if TTY)
    if std::io::IsTerminal::is_terminal(&std::io::stderr()) {
        eprintln!("oreo ({} @ {})", session.model(), session.config().base_url);
        eprintln!("Type /help for commands.");
        eprintln!();
    }

    loop {
        print!("> ");
        io::stdout().flush()?;

        let mut input = String::new();
        if io::stdin().read_line(&mut input)? == 0 {
            // EOF
            break;
        }

        let input = input.trim();
        if input.is_empty() {
            continue;
        }

        let Some(result) = commands::execute_command(input, settings) else {
            ask(session, input, settings).await;
            println!();
            continue;
        };

        match result {
            CommandResult::Clear => match session.clear_history() {
                Ok(()) => println!("Cleared conversation."),
                Err(e) => eprintln!("Error: {}", e),
            },
            CommandResult::History(last_n) => {
                println!("{}", commands::format_history(&session.history(last_n)));
            }
            CommandResult::ListModels => list_models(session).await,
            CommandResult::ChangeModel(model) => {
                session.set_model(model);
                println!("Switched to: {}", session.model());
            }
            CommandResult::Pull(name) => pull_model(session, &name).await,
            CommandResult::Delete(name) => delete_model(session, &name).await,
            CommandResult::SetTemperature(value) => {
                settings.temperature = value;
                println!("Temperature set to {:.1}", value);
            }
            CommandResult::SetStream(stream) => {
                settings.stream = stream;
                println!("Streaming {}", if stream { "on" } else { "off" });
            }
            CommandResult::Message(msg) => println!("{}", msg),
            CommandResult::Exit => break,
            CommandResult::Unknown(cmd) => {
                println!("Unknown command: /{}", cmd);
                println!("Type /help for available commands.");
            }
        }
    }

    Ok(())
}
