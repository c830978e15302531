use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use daz_command::config::config;
use daz_command::history::HistoryStore;
use daz_command::logging;
use daz_command::mcp::McpServer;
use daz_command::model::OpenAiCompatModel;
use daz_command::session::SessionStore;
use daz_command::state::AppState;
use daz_command::summary::SummaryService;
use daz_command::tool::Registry;
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Parser, Debug)]
#[command(name = "daz-command")]
#[command(version)]
#[command(about = "Tool server that records agent actions and keeps per-session notes")]
struct Args {
    /// Directory holding session folders
    #[arg(long, global = true)]
    sessions_dir: Option<PathBuf>,

    /// Summarization model name
    #[arg(long, global = true)]
    model: Option<String>,

    /// Base URL of the OpenAI-compatible model server
    #[arg(long, global = true)]
    base_url: Option<String>,

    /// Record events without summarizing them
    #[arg(long, global = true)]
    no_summary: bool,

    /// Write debug lines to the log file
    #[arg(long, global = true)]
    trace: bool,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Serve MCP over stdin/stdout (default)
    Serve,
}

#[tokio::main]
async fn main() -> Result<()> {
    logging::init();
    logging::cleanup_old_logs();

    let args = Args::parse();
    logging::set_trace(args.trace);
    logging::info(&format!("daz-command {} starting", env!("CARGO_PKG_VERSION")));

    match args.command {
        None | Some(Command::Serve) => serve(&args).await,
    }
}

async fn serve(args: &Args) -> Result<()> {
    let mut cfg = config().clone();
    if let Some(dir) = &args.sessions_dir {
        cfg.storage.sessions_dir = Some(dir.clone());
    }
    if let Some(model) = &args.model {
        cfg.model.name = model.clone();
    }
    if let Some(url) = &args.base_url {
        cfg.model.base_url = url.clone();
    }
    if args.no_summary {
        cfg.summary.enabled = false;
    }

    let sessions_dir = cfg.storage.resolved_sessions_dir()?;
    std::fs::create_dir_all(&sessions_dir)
        .with_context(|| format!("Failed to create {}", sessions_dir.display()))?;
    logging::info(&format!("Sessions in {}", sessions_dir.display()));

    let model = Arc::new(OpenAiCompatModel::new(&cfg.model)?);
    logging::set_model(&cfg.model.name);

    let sessions = SessionStore::new(sessions_dir);
    let summaries = SummaryService::new(&cfg.summary, model, sessions.clone());
    summaries.start();
    summaries
        .await_ready(cfg.summary.init_timeout())
        .await
        .context("Summary worker failed to start")?;
    logging::info(&format!("Summary worker {}", summaries.state().as_str()));

    let history = HistoryStore::new(sessions.clone(), cfg.storage.history_max_chars);
    let state = AppState::new(sessions, history, summaries, cfg.summary.drain_timeout());
    let server = McpServer::new(Registry::new(), state);

    server.serve_stdio().await
}
