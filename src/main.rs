//! amanu CLI: conversational tool-dispatch engine for a personal organizer.

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use miette::{IntoDiagnostic, Result};
use serde_json::json;

use amanu::config::EngineConfig;
use amanu::engine::Engine;
use amanu::entity::{ConversationId, UserId};
use amanu::protocol::ToolCallRequest;
use amanu::store::DurableStore;
use amanu::trace::{DurableSink, LogLevel};

#[derive(Parser)]
#[command(name = "amanu", version, about = "Conversational tool-dispatch engine")]
struct Cli {
    /// Data directory for persistent storage.
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    /// Path to a TOML config file.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// User the calls act on behalf of.
    #[arg(long, global = true, default_value = "local")]
    user: String,

    /// Conversation the calls belong to.
    #[arg(long, global = true, default_value = "cli")]
    conversation: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize an amanu data directory.
    Init,

    /// Print the tool catalog as a JSON schema array.
    Schema,

    /// Dispatch tool calls from inline JSON or a file.
    ///
    /// The input is one request object or an array of them; arrays run in
    /// order so later calls can say "it" about earlier results.
    Dispatch {
        /// Inline JSON request(s).
        #[arg(long, conflicts_with = "file")]
        json: Option<String>,

        /// Path to a JSON file with request(s).
        #[arg(long)]
        file: Option<PathBuf>,
    },

    /// Show engine info and statistics.
    Info,

    /// Print persisted trace events, optionally filtered.
    Log {
        /// Only events for this tool.
        #[arg(long)]
        tool: Option<String>,

        /// Only events for this conversation.
        #[arg(long)]
        filter_conversation: Option<String>,

        /// Only events at this level (debug, info, warning, error).
        #[arg(long)]
        level: Option<String>,
    },

    /// Create a small demo data set.
    Seed,
}

fn main() -> Result<()> {
    miette::set_hook(Box::new(|_| {
        Box::new(
            miette::MietteHandlerOpts::new()
                .terminal_links(true)
                .unicode(true)
                .context_lines(3)
                .build(),
        )
    }))
    .ok(); // Ignore error if hook already set (e.g., in tests)

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => EngineConfig::load(path).into_diagnostic()?,
        None => EngineConfig::default(),
    };
    if cli.data_dir.is_some() {
        config.data_dir = cli.data_dir.clone();
    }

    let user = UserId::new(cli.user.clone());
    let conversation = ConversationId::new(cli.conversation.clone());

    match cli.command {
        Commands::Init => {
            let data_dir = cli.data_dir.unwrap_or_else(|| PathBuf::from(".amanu"));
            config.data_dir = Some(data_dir.clone());
            let engine = Engine::new(config).into_diagnostic()?;
            engine.persist().into_diagnostic()?;
            println!("Initialized amanu at {}", data_dir.display());
            println!("{}", engine.info());
        }

        Commands::Schema => {
            let engine = Engine::new(config).into_diagnostic()?;
            let json = serde_json::to_string_pretty(&engine.catalog_json()).into_diagnostic()?;
            println!("{json}");
        }

        Commands::Dispatch { json, file } => {
            let engine = Engine::new(config).into_diagnostic()?;

            let raw = match (json, file) {
                (Some(inline), _) => inline,
                (None, Some(path)) => std::fs::read_to_string(&path).into_diagnostic()?,
                (None, None) => miette::bail!("pass --json or --file"),
            };

            let requests = parse_requests(&raw, &user, &conversation)?;
            let results = engine.dispatch_all(&requests);
            for (request, result) in requests.iter().zip(&results) {
                let rendered = serde_json::to_string_pretty(result).into_diagnostic()?;
                println!("== {} ==", request.tool_name);
                println!("{rendered}");
            }
            engine.persist().into_diagnostic()?;

            let failed = results.iter().filter(|r| !r.success).count();
            if failed > 0 {
                miette::bail!("{failed} of {} calls failed", results.len());
            }
        }

        Commands::Info => {
            let engine = Engine::new(config).into_diagnostic()?;
            println!("{}", engine.info());
        }

        Commands::Log {
            tool,
            filter_conversation,
            level,
        } => {
            let data_dir = config
                .data_dir
                .clone()
                .ok_or_else(|| miette::miette!("log inspection needs --data-dir"))?;
            let level = match level {
                Some(raw) => Some(
                    LogLevel::from_label(&raw)
                        .ok_or_else(|| miette::miette!("unknown level: {raw}"))?,
                ),
                None => None,
            };

            let store = DurableStore::open(&data_dir).into_diagnostic()?;
            let events = DurableSink::load_all(&store).into_diagnostic()?;
            let mut shown = 0usize;
            for event in &events {
                if level.is_some_and(|l| event.level != l) {
                    continue;
                }
                if tool
                    .as_deref()
                    .is_some_and(|t| event.context_str("toolName") != Some(t))
                {
                    continue;
                }
                if filter_conversation
                    .as_deref()
                    .is_some_and(|c| event.context_str("conversationId") != Some(c))
                {
                    continue;
                }
                let rendered = serde_json::to_string(event).into_diagnostic()?;
                println!("{rendered}");
                shown += 1;
            }
            eprintln!("{shown} of {} events shown", events.len());
        }

        Commands::Seed => {
            let engine = Engine::new(config).into_diagnostic()?;
            let calls = seed_requests(&user, &conversation);
            let results = engine.dispatch_all(&calls);
            engine.persist().into_diagnostic()?;
            let created = results.iter().filter(|r| r.success).count();
            println!("Seeded {created} records");
            println!("{}", engine.info());
        }
    }

    Ok(())
}

/// Parse one request object or an array of them, filling in identity fields
/// the input omits.
fn parse_requests(
    raw: &str,
    user: &UserId,
    conversation: &ConversationId,
) -> Result<Vec<ToolCallRequest>> {
    let value: serde_json::Value = serde_json::from_str(raw).into_diagnostic()?;
    let items = match value {
        serde_json::Value::Array(items) => items,
        single => vec![single],
    };

    items
        .into_iter()
        .map(|mut item| {
            let obj = item
                .as_object_mut()
                .ok_or_else(|| miette::miette!("each request must be a JSON object"))?;
            obj.entry("userId")
                .or_insert_with(|| json!(user.as_str()));
            obj.entry("conversationId")
                .or_insert_with(|| json!(conversation.as_str()));
            serde_json::from_value(item).into_diagnostic()
        })
        .collect()
}

fn seed_requests(user: &UserId, conversation: &ConversationId) -> Vec<ToolCallRequest> {
    let params = |value: serde_json::Value| value.as_object().cloned().unwrap_or_default();
    vec![
        ToolCallRequest::new(
            "create_project",
            params(json!({"name": "Apartment move", "description": "Everything for the move"})),
            user.clone(),
            conversation.clone(),
        ),
        ToolCallRequest::new(
            "create_task",
            params(json!({"title": "Book movers", "priority": "high", "project": "Apartment move"})),
            user.clone(),
            conversation.clone(),
        ),
        ToolCallRequest::new(
            "create_task",
            params(json!({"title": "Change address", "priority": "medium"})),
            user.clone(),
            conversation.clone(),
        ),
        ToolCallRequest::new(
            "create_event",
            params(json!({"title": "Key handover", "startTime": "2026-09-15"})),
            user.clone(),
            conversation.clone(),
        ),
        ToolCallRequest::new(
            "create_note",
            params(json!({"title": "Mover quotes", "content": "Acme: 900. Swift: 750."})),
            user.clone(),
            conversation.clone(),
        ),
    ]
}
