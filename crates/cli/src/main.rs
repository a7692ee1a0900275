mod config;
mod error;
mod render;

use std::io::{self, BufRead, Write};
use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use runtime::{AnthropicBackend, Provider, Session, ToolPool};
use storage::{EventStore, SessionId};

use config::Config;
use error::{Error, Result};
use render::{ConsoleSink, print_event, to_local};

const CONFIG_FILE: &str = "switchboard.toml";
const SYSTEM_PROMPT: &str = "You are Switchboard, a helpful assistant. Use the available tools when they help answer the question, and say so when they don't.";

#[derive(Parser)]
#[command(name = "switchboard")]
#[command(about = "Chat with a model that can call tools on MCP servers", long_about = None)]
#[command(version)]
struct Cli {
    /// Path to the configuration file
    #[arg(short, long, default_value = CONFIG_FILE)]
    config: PathBuf,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Start an interactive chat session
    Chat,
    /// List every connected server and its tools
    Tools,
    /// List recorded sessions
    Sessions {
        /// Show only the last N sessions
        #[arg(short, long, default_value = "10")]
        limit: usize,
    },
    /// Show the event log of one session
    Logs {
        /// Session ID (prefix match supported)
        #[arg(short, long)]
        session: String,
        /// Filter by event kind (message, tool_call, tool_result)
        #[arg(short, long)]
        kind: Option<String>,
    },
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(io::stderr)
        .init();

    if let Err(e) = run().await {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Some(Commands::Chat) | None => cmd_chat(&cli.config).await,
        Some(Commands::Tools) => cmd_tools(&cli.config).await,
        Some(Commands::Sessions { limit }) => cmd_sessions(limit),
        Some(Commands::Logs { session, kind }) => cmd_logs(&session, kind.as_deref()),
    }
}

async fn cmd_chat(config_path: &Path) -> Result<()> {
    println!("switchboard v{}", env!("CARGO_PKG_VERSION"));

    let config = load_config(config_path)?;
    let api_key = config.api_key()?;

    let backend = AnthropicBackend::builder(api_key, &config.backend.model)
        .max_tokens(config.backend.max_tokens)
        .build();

    let dir = data_dir();
    std::fs::create_dir_all(&dir)?;
    let store = EventStore::open(dir.join("events.db"))?;

    if config.servers.is_empty() {
        println!(
            "No [[servers]] configured in {}; chatting without tools.",
            config_path.display()
        );
    }
    let pool = ToolPool::connect(&config.servers).await?;
    for provider in pool.providers() {
        println!(
            "Connected to {} ({} tools)",
            provider.name(),
            provider.tools().len()
        );
    }

    let system = config
        .system
        .clone()
        .unwrap_or_else(|| SYSTEM_PROMPT.to_string());
    let mut session = Session::new(store, backend, pool)?
        .with_system(system)
        .with_max_tool_rounds(config.max_tool_rounds);

    println!("Session ID: {}", session.id);
    println!("Model: {}", config.backend.model);
    println!("Type 'quit' or Ctrl+D to exit.\n");

    let stdin = io::stdin();
    let mut stdout = io::stdout();

    loop {
        print!("> ");
        stdout.flush()?;

        let mut line = String::new();
        if stdin.lock().read_line(&mut line)? == 0 {
            // EOF
            break;
        }

        let input = line.trim();
        if input.is_empty() {
            continue;
        }
        if input == "quit" || input == "exit" {
            break;
        }

        // The sink prints the reply as it arrives; nothing to echo here.
        if let Err(e) = session.query(input, &ConsoleSink).await {
            eprintln!("Error: {e}");
        }
        println!();
    }

    session.end().await?;
    println!("\nSession ended.");
    Ok(())
}

async fn cmd_tools(config_path: &Path) -> Result<()> {
    let config = load_config(config_path)?;

    if config.servers.is_empty() {
        println!("No [[servers]] configured in {}", config_path.display());
        return Ok(());
    }

    let mut pool = ToolPool::connect(&config.servers).await?;

    println!("{} server(s) connected\n", pool.providers().len());
    for tool in pool.tools() {
        let owner = pool.owner_of(&tool.name).unwrap_or("?");
        println!("{:<28}  @{owner}", tool.name);
        if !tool.description.is_empty() {
            println!("    {}", tool.description.lines().next().unwrap_or(""));
        }
    }

    pool.disconnect_all().await;
    Ok(())
}

fn cmd_sessions(limit: usize) -> Result<()> {
    let store = open_store()?;
    let sessions = store.list_sessions()?;

    if sessions.is_empty() {
        println!("No sessions recorded yet.");
        return Ok(());
    }

    println!("{:<36}  {:<17}  {:>4}  STATUS", "SESSION", "STARTED", "MSGS");
    for summary in sessions.into_iter().take(limit) {
        let started = to_local(summary.started_at).format("%Y-%m-%d %H:%M");
        let status = match summary.ended_at {
            Some(_) => "ended",
            None => "active",
        };
        println!(
            "{:<36}  {started}  {:>4}  {status}",
            summary.id.to_string(),
            summary.message_count
        );
    }

    Ok(())
}

fn cmd_logs(session_prefix: &str, kind_filter: Option<&str>) -> Result<()> {
    let store = open_store()?;
    let session_id = find_session(&store, session_prefix)?;

    let events = store.load_events(session_id, kind_filter)?;
    if events.is_empty() {
        println!("No events for session {session_id}");
        return Ok(());
    }

    println!("Session: {session_id}\n");
    for event in &events {
        print_event(event);
    }

    Ok(())
}

/// Resolve a session id prefix against the stored sessions; the prefix
/// must match exactly one.
fn find_session(store: &EventStore, prefix: &str) -> Result<SessionId> {
    let matching: Vec<SessionId> = store
        .list_sessions()?
        .into_iter()
        .map(|s| s.id)
        .filter(|id| id.matches_prefix(prefix))
        .collect();

    match matching.as_slice() {
        [] => Err(Error::UnknownSession {
            prefix: prefix.to_string(),
        }),
        [id] => Ok(*id),
        many => Err(Error::AmbiguousSession {
            prefix: prefix.to_string(),
            matches: many.iter().map(SessionId::to_string).collect(),
        }),
    }
}

fn open_store() -> Result<EventStore> {
    let db_path = data_dir().join("events.db");
    if !db_path.exists() {
        return Err(Error::NoEventLog { path: db_path });
    }
    Ok(EventStore::open(&db_path)?)
}

fn load_config(path: &Path) -> Result<Config> {
    if path.exists() {
        Ok(Config::load(path)?)
    } else {
        println!("No config at {}; using defaults.", path.display());
        Ok(Config::default_config())
    }
}

/// Where the event log lives: `SWITCHBOARD_DATA_DIR` when set, otherwise
/// the XDG data directory, otherwise a dot directory in the cwd.
fn data_dir() -> PathBuf {
    if let Some(dir) = std::env::var_os("SWITCHBOARD_DATA_DIR") {
        return dir.into();
    }

    std::env::var_os("XDG_DATA_HOME")
        .map(PathBuf::from)
        .or_else(|| std::env::var_os("HOME").map(|h| PathBuf::from(h).join(".local/share")))
        .map(|base| base.join("switchboard"))
        .unwrap_or_else(|| PathBuf::from(".switchboard"))
}
