//! tern - streaming chat client

mod commands;
mod config;
mod ui;

use clap::Parser;
use std::sync::Arc;
use tern_chat::{ChatEvent, ChatSession, Error, HttpTransport, Phase, SessionConfig};
use tern_wire::ChatClient;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::broadcast::error::RecvError;
use tracing_subscriber::EnvFilter;

use commands::Command;

const DEFAULT_BASE_URL: &str = "http://localhost:3000/api";
const DEFAULT_AGENT: &str = "default";
const VERBOSE_FILTER: &str = "tern=debug,tern_chat=debug,tern_wire=debug";

/// tern - chat with a streaming assistant
#[derive(Parser, Debug)]
#[command(name = "tern")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Backend base URL
    #[arg(long)]
    base_url: Option<String>,

    /// Agent to talk to
    #[arg(long)]
    agent: Option<String>,

    /// Conversation id (default: a new one)
    #[arg(long)]
    chat: Option<String>,

    /// Model override
    #[arg(short, long)]
    model: Option<String>,

    /// Attach files to the first message
    #[arg(long, num_args = 1..)]
    attach: Vec<String>,

    /// Run in non-interactive mode with a single message
    #[arg(short = 'c', long)]
    command: Option<String>,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,

    /// Initialize config file
    #[arg(long)]
    init_config: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // Setup tracing
    if args.verbose {
        tracing_subscriber::fmt()
            .with_env_filter(VERBOSE_FILTER)
            .with_writer(std::io::stderr)
            .init();
    } else if std::env::var_os("RUST_LOG").is_some() {
        tracing_subscriber::fmt()
            .with_env_filter(EnvFilter::from_default_env())
            .with_writer(std::io::stderr)
            .init();
    }

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
    let base_url = args
        .base_url
        .or(cfg.base_url.clone())
        .unwrap_or_else(|| DEFAULT_BASE_URL.to_string());
    let agent_id = args
        .agent
        .or(cfg.agent_id.clone())
        .unwrap_or_else(|| DEFAULT_AGENT.to_string());
    let chat_id = args
        .chat
        .or(cfg.chat_id.clone())
        .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());

    let mut client = ChatClient::new(base_url)?;
    if let Some(key) = cfg.get_api_key() {
        client = client.with_api_key(key);
    }
    let transport = Arc::new(HttpTransport::new(client));

    let mut session_config = SessionConfig::new(agent_id, chat_id);
    session_config.model_id = args.model.or(cfg.model_id.clone());
    session_config.framing = cfg.framing;
    session_config.attachments = cfg.attachments;
    session_config.status = cfg.status;
    tracing::debug!("Session config: {:?}", session_config);

    let session = ChatSession::new(session_config, transport.clone(), transport);

    // Non-interactive mode
    if let Some(command) = args.command {
        return run_command(&session, &command, &args.attach).await;
    }

    run_interactive(&session, &args.attach).await
}

async fn run_command(session: &ChatSession, command: &str, attach: &[String]) -> anyhow::Result<()> {
    println!("tern> {}", command);
    println!();

    for path in attach {
        let report = ui::attach(session, path).await?;
        for rejected in report.rejected {
            eprintln!("Error: {}", rejected.error);
        }
    }
    session.attachments().wait_for_uploads().await;
    if let Some(error) = session.attachments().last_error() {
        eprintln!("Error: {}", error);
        session.attachments().dismiss_error();
    }

    let mut events = session.subscribe();
    let turn = session.submit(command)?;
    let mut printer = ui::Printer::new();
    loop {
        match events.recv().await {
            Ok(event) => {
                let done = matches!(
                    &event,
                    ChatEvent::StreamFinished { turn_id, .. } if *turn_id == turn
                );
                printer.handle(&event);
                if done {
                    break;
                }
            }
            Err(RecvError::Lagged(skipped)) => {
                tracing::warn!("Output fell behind, skipped {} events", skipped);
            }
            Err(RecvError::Closed) => break,
        }
    }

    if session.phase() == Phase::Error {
        std::process::exit(1);
    }
    Ok(())
}

async fn run_interactive(session: &ChatSession, attach: &[String]) -> anyhow::Result<()> {
    let printer = tokio::spawn(ui::print_events(session.subscribe()));

    if std::io::IsTerminal::is_terminal(&std::io::stderr()) {
        let config = session.config();
        eprintln!("tern ({} / {})", config.agent_id, config.chat_id);
        eprintln!("Type /help for commands.");
        eprintln!();
    }

    for path in attach {
        if let Err(e) = ui::attach(session, path).await {
            eprintln!("Error: {}: {}", path, e);
        }
    }

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        let input = line.trim();
        if input.is_empty() {
            continue;
        }

        let Some(command) = commands::parse(input) else {
            match session.submit(input) {
                Ok(turn) => tracing::debug!("Submitted turn {}", turn),
                Err(e) if e.is_user_visible() => eprintln!("Error: {}", e),
                Err(e) => tracing::debug!("Ignored send: {}", e),
            }
            continue;
        };

        match command {
            Command::Attach(path) => {
                if let Err(e) = ui::attach(session, &path).await {
                    eprintln!("Error: {}: {}", path, e);
                }
            }
            Command::Detach(key) => {
                let views = session.attachments().attachments();
                match ui::find_attachment(&views, &key) {
                    Some(view) => {
                        session.attachments().remove(&view.id);
                        println!("Removed {}", view.name);
                    }
                    None => println!("No pending attachment matches '{}'", key),
                }
            }
            Command::Files => {
                println!("{}", ui::format_attachments(&session.attachments().attachments()));
            }
            Command::Stop => {
                if !session.stop_streaming() {
                    println!("Nothing is streaming.");
                }
            }
            Command::Retry => match session.retry_last_message() {
                Ok(_) => {}
                Err(Error::NothingToRetry) => println!("Nothing to retry."),
                Err(e) => eprintln!("Error: {}", e),
            },
            Command::New => session.new_conversation(),
            Command::Help => println!("{}", commands::help_message()),
            Command::Quit => break,
            Command::Usage(usage) => println!("Usage: {}", usage),
            Command::Unknown(cmd) => {
                println!("Unknown command: /{}", cmd);
                println!("Type /help for available commands.");
            }
        }
    }

    session.stop_streaming();
    printer.abort();
    Ok(())
}
