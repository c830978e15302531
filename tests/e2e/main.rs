//! End-to-end tests for daz-command using a mock model
//!
//! These drive the summary worker and the MCP server against a scripted
//! model and a temporary sessions directory.

mod mock_model;

use anyhow::Result;
use daz_command::config::SummaryConfig;
use daz_command::event::{Event, EventKind};
use daz_command::history::HistoryStore;
use daz_command::mcp::McpServer;
use daz_command::model::LanguageModel;
use daz_command::session::SessionStore;
use daz_command::state::AppState;
use daz_command::summary::{SummaryService, WorkerError, WorkerState};
use daz_command::tool::Registry;
use mock_model::{MockModel, long_summary};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;

const WAIT: Duration = Duration::from_secs(5);

fn test_config() -> SummaryConfig {
    SummaryConfig {
        drain_poll_ms: 10,
        ..SummaryConfig::default()
    }
}

fn store_with(dir: &tempfile::TempDir, sessions: &[&str]) -> SessionStore {
    let store = SessionStore::new(dir.path().join("sessions"));
    for name in sessions {
        store.create_at(name, "e2e", dir.path()).unwrap();
    }
    store
}

fn run_event(command: &str) -> Event {
    Event::new(EventKind::Run)
        .with_context("exercise the worker", "set things up", "run a command")
        .input("command", command)
        .output("success", true)
        .output("stdout", "ok\n")
}

fn service(model: &Arc<MockModel>, store: &SessionStore) -> SummaryService {
    let model: Arc<dyn LanguageModel> = model.clone();
    SummaryService::new(&test_config(), model, store.clone())
}

fn llm_log_lines(store: &SessionStore, session: &str) -> usize {
    std::fs::read_to_string(store.session_dir(session).join("llm_summary.jsonl"))
        .map(|s| s.lines().count())
        .unwrap_or(0)
}

/// Events queued before the worker is ready go out as one batch
#[tokio::test]
async fn test_backlog_summarized_in_one_batch() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let store = store_with(&dir, &["alpha"]);
    let model = Arc::new(MockModel::new());
    model.queue_response("LLM connection test successful");
    model.queue_response(long_summary("alpha notes"));

    let summaries = service(&model, &store);
    for command in ["ls", "cargo fmt", "git status"] {
        assert!(summaries.enqueue("alpha", "old", run_event(command)));
    }
    summaries.start();
    summaries.await_ready(WAIT).await?;
    assert!(summaries.wait_until_empty(WAIT).await);

    assert_eq!(model.batch_sizes(), vec![3]);
    assert!(store.load_summary("alpha").starts_with("alpha notes"));
    assert_eq!(llm_log_lines(&store, "alpha"), 1);
    Ok(())
}

/// Batches never mix sessions and never reorder
#[tokio::test]
async fn test_interleaved_sessions_are_not_merged() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let store = store_with(&dir, &["x", "y"]);
    let model = Arc::new(MockModel::new());
    model.queue_response("ready");
    model.queue_response(long_summary("x first"));
    model.queue_response(long_summary("y only"));
    model.queue_response(long_summary("x second"));

    let summaries = service(&model, &store);
    summaries.enqueue("x", "", run_event("x1"));
    summaries.enqueue("y", "", run_event("y1"));
    summaries.enqueue("x", "", run_event("x2"));
    summaries.start();
    summaries.await_ready(WAIT).await?;
    assert!(summaries.wait_until_empty(WAIT).await);

    assert_eq!(model.batch_sizes(), vec![1, 1, 1]);
    let prompts = model.prompts();
    assert!(prompts[1].contains("x1"));
    assert!(prompts[2].contains("y1"));
    assert!(prompts[3].contains("x2"));
    assert!(store.load_summary("x").starts_with("x second"));
    assert!(store.load_summary("y").starts_with("y only"));
    Ok(())
}

/// A context-length error shrinks the budget, retries the first event
/// alone and requeues the rest ahead of everything else
#[tokio::test]
async fn test_capacity_error_shrinks_and_requeues() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let store = store_with(&dir, &["big"]);
    let model = Arc::new(MockModel::new());
    model.queue_response("ready");
    model.queue_error(CAPACITY_4096);
    model.queue_response(long_summary("after first"));
    model.queue_response(long_summary("after rest"));

    let summaries = service(&model, &store);
    for i in 1..=5 {
        summaries.enqueue("big", "", run_event(&format!("step-{i}")));
    }
    summaries.start();
    summaries.await_ready(WAIT).await?;
    assert!(summaries.wait_until_empty(WAIT).await);

    assert_eq!(model.batch_sizes(), vec![5, 1, 4]);
    assert_eq!(summaries.token_limit(), 3686);

    let prompts = model.prompts();
    assert!(prompts[2].contains("step-1"));
    assert!(!prompts[2].contains("step-2"));
    let rest = &prompts[3];
    let positions: Vec<usize> = (2..=5)
        .map(|i| rest.find(&format!("step-{i}")).unwrap())
        .collect();
    assert!(positions.windows(2).all(|w| w[0] < w[1]));

    assert!(store.load_summary("big").starts_with("after rest"));
    assert_eq!(llm_log_lines(&store, "big"), 3);
    Ok(())
}

const CAPACITY_4096: &str =
    "Trying to keep the first tokens when context the overflows. However, the model is loaded with context length of 4096 tokens, which is not enough.";

fn errors_log(store: &SessionStore, session: &str) -> String {
    std::fs::read_to_string(store.session_dir(session).join("errors.jsonl")).unwrap_or_default()
}

/// Capacity errors on every attempt exhaust the retries and leave the
/// summary as it was
#[tokio::test]
async fn test_retry_cap_gives_up_without_saving() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let store = store_with(&dir, &["stuck"]);
    let before = store.load_summary("stuck");
    let model = Arc::new(MockModel::new());
    model.queue_response("ready");
    for _ in 0..3 {
        model.queue_error(CAPACITY_4096);
    }

    let summaries = service(&model, &store);
    summaries.enqueue("stuck", &before, run_event("huge"));
    summaries.start();
    summaries.await_ready(WAIT).await?;
    assert!(summaries.wait_until_empty(WAIT).await);

    assert_eq!(model.batch_sizes(), vec![1, 1, 1]);
    assert_eq!(store.load_summary("stuck"), before);
    assert_eq!(summaries.token_limit(), 2985);
    assert!(errors_log(&store, "stuck").contains("Gave up summarizing after 3 attempts"));
    assert_eq!(llm_log_lines(&store, "stuck"), 3);
    Ok(())
}

/// After giving up on the first event, the requeued one is still summarized
#[tokio::test]
async fn test_requeued_event_processed_after_give_up() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let store = store_with(&dir, &["pair"]);
    let before = store.load_summary("pair");
    let model = Arc::new(MockModel::new());
    model.queue_response("ready");
    for _ in 0..3 {
        model.queue_error(CAPACITY_4096);
    }
    model.queue_response(long_summary("second only"));

    let summaries = service(&model, &store);
    summaries.enqueue("pair", &before, run_event("step-1"));
    summaries.enqueue("pair", &before, run_event("step-2"));
    summaries.start();
    summaries.await_ready(WAIT).await?;
    assert!(summaries.wait_until_empty(WAIT).await);

    assert_eq!(model.batch_sizes(), vec![2, 1, 1, 1]);
    assert_eq!(summaries.token_limit(), 2985);

    let prompts = model.prompts();
    for retry in &prompts[2..4] {
        assert!(retry.contains("step-1"));
        assert!(!retry.contains("step-2"));
    }
    // The last prompt still starts from the untouched summary
    assert!(prompts[4].contains("step-2"));
    assert!(!prompts[4].contains("step-1"));
    assert!(prompts[4].contains(before.trim()));

    let errors = errors_log(&store, "pair");
    assert_eq!(errors.lines().count(), 1);
    assert!(errors.contains("Gave up"));
    assert!(store.load_summary("pair").starts_with("second only"));
    Ok(())
}

/// A capacity error with no number cannot adjust the budget; the batch is
/// dropped and logged, and later events are still processed
#[tokio::test]
async fn test_capacity_error_without_number_drops_batch() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let store = store_with(&dir, &["vague"]);
    let before = store.load_summary("vague");
    let model = Arc::new(MockModel::new());
    model.queue_response("ready");
    model.queue_error("Context length exceeded");
    model.queue_response(long_summary("recovered"));

    let summaries = service(&model, &store);
    for command in ["a", "b", "c"] {
        summaries.enqueue("vague", &before, run_event(command));
    }
    summaries.start();
    summaries.await_ready(WAIT).await?;
    assert!(summaries.wait_until_empty(WAIT).await);

    assert_eq!(model.batch_sizes(), vec![3]);
    assert_eq!(summaries.token_limit(), 30_000);
    assert_eq!(store.load_summary("vague"), before);
    let errors = errors_log(&store, "vague");
    assert!(errors.contains("generate_summary"));
    assert!(errors.contains("Context length exceeded"));

    summaries.enqueue("vague", &before, run_event("d"));
    assert!(summaries.wait_until_empty(WAIT).await);
    assert_eq!(model.batch_sizes(), vec![3, 1]);
    assert!(store.load_summary("vague").starts_with("recovered"));
    Ok(())
}

/// Failures that are not about capacity are logged and the batch dropped
#[tokio::test]
async fn test_short_response_is_logged_not_saved() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let store = store_with(&dir, &["short"]);
    let before = store.load_summary("short");
    let model = Arc::new(MockModel::new());
    model.queue_response("ready");
    model.queue_response("too short");

    let summaries = service(&model, &store);
    summaries.start();
    summaries.await_ready(WAIT).await?;
    summaries.enqueue("short", &before, run_event("ls"));
    assert!(summaries.wait_until_empty(WAIT).await);

    assert_eq!(model.batch_sizes(), vec![1]);
    assert_eq!(store.load_summary("short"), before);
    let errors = std::fs::read_to_string(store.session_dir("short").join("errors.jsonl"))?;
    assert!(errors.contains("LLM response too short"));
    Ok(())
}

#[tokio::test]
async fn test_unreachable_model_skips_summaries() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let store = store_with(&dir, &["s"]);
    let model = Arc::new(MockModel::unavailable());

    let summaries = service(&model, &store);
    summaries.enqueue("s", "", run_event("early"));
    summaries.start();
    summaries.await_ready(WAIT).await?;

    assert_eq!(summaries.state(), WorkerState::Skipped);
    assert!(!summaries.enqueue("s", "", run_event("late")));
    assert!(summaries.is_queue_empty());
    assert_eq!(summaries.queue_size(), 0);
    assert!(model.prompts().is_empty());
    Ok(())
}

#[tokio::test]
async fn test_failed_smoke_test_is_reported() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let store = store_with(&dir, &["s"]);
    let model = Arc::new(MockModel::new());
    model.queue_error("model crashed");

    let summaries = service(&model, &store);
    summaries.start();
    let err = summaries.await_ready(WAIT).await.unwrap_err();
    assert!(matches!(err, WorkerError::InitFailed(ref m) if m.contains("model crashed")));
    assert!(!summaries.enqueue("s", "", run_event("ls")));
    Ok(())
}

/// Drive the server the way an agent would: create a session, run a
/// command, close the session once its summary is written
#[tokio::test]
async fn test_mcp_session_flow() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let store = store_with(&dir, &[]);
    let model = Arc::new(MockModel::new());
    model.queue_response("ready");
    model.queue_response(long_summary("flow notes"));

    let summaries = service(&model, &store);
    summaries.start();
    summaries.await_ready(WAIT).await?;

    let history = HistoryStore::new(store.clone(), 32 * 1024);
    let state = AppState::new(store.clone(), history, summaries.clone(), WAIT);
    state.set_cwd(dir.path().to_path_buf());
    let server = McpServer::new(Registry::new(), state);

    let requests = [
        r#"{"jsonrpc":"2.0","id":1,"method":"initialize","params":{"protocolVersion":"2024-11-05"}}"#,
        r#"{"jsonrpc":"2.0","method":"notifications/initialized"}"#,
        r#"{"jsonrpc":"2.0","id":2,"method":"tools/call","params":{"name":"daz_session_create","arguments":{"name":"flow","description":"end to end"}}}"#,
        r#"{"jsonrpc":"2.0","id":3,"method":"tools/call","params":{"name":"daz_command_run","arguments":{"command":"echo hello","current_task":"check echo","summary_of_what_we_just_did":"created the session","summary_of_what_we_about_to_do":"run echo"}}}"#,
        r#"{"jsonrpc":"2.0","id":4,"method":"tools/call","params":{"name":"daz_session_close","arguments":{}}}"#,
    ];
    let input = requests.join("\n") + "\n";
    let mut output = Vec::new();
    server.serve(input.as_bytes(), &mut output).await?;

    let responses: Vec<Value> = String::from_utf8(output)?
        .lines()
        .map(serde_json::from_str::<Value>)
        .collect::<Result<Vec<_>, _>>()?;
    assert_eq!(responses.len(), 4);

    let text = |i: usize| -> Value {
        let raw = responses[i]["result"]["content"][0]["text"].as_str().unwrap();
        serde_json::from_str(raw).unwrap()
    };
    assert_eq!(text(1)["success"], true);
    assert_eq!(text(2)["stdout"], "hello\n");
    assert_eq!(text(3)["success"], true);

    assert_eq!(store.event_count("flow"), 1);
    assert!(store.load_summary("flow").starts_with("flow notes"));
    assert_eq!(server.state().active_session(), None);
    Ok(())
}
