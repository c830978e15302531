use super::{TaskContext, Tool, ToolOutput, clean_result, schema_with_context};
use crate::event::{Event, EventKind};
use crate::state::AppState;
use crate::summary::truncate_with_indication;
use anyhow::Result;
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{Map, Value, json};
use std::path::Path;
use std::process::Stdio;
use std::time::{Duration, Instant};
use tokio::process::Command;
use tokio::time::timeout;

const MAX_OUTPUT_CHARS: usize = 30_000;
const DEFAULT_TIMEOUT_SECS: f64 = 60.0;
const MAX_TIMEOUT_SECS: f64 = 3600.0;

pub struct RunTool;

impl RunTool {
    pub fn new() -> Self {
        Self
    }
}

fn default_timeout() -> f64 {
    DEFAULT_TIMEOUT_SECS
}

#[derive(Deserialize)]
struct RunInput {
    command: String,
    #[serde(default = "default_timeout")]
    timeout: f64,
    #[serde(default)]
    working_directory: Option<String>,
    #[serde(flatten)]
    context: TaskContext,
}

/// What happened to one shell invocation
#[derive(Debug)]
struct RunOutcome {
    success: bool,
    stdout: String,
    stderr: String,
    exitcode: i32,
    killed: bool,
    error: String,
}

async fn run_shell(command: &str, cwd: &Path, limit: Duration) -> RunOutcome {
    let child = Command::new("bash")
        .arg("-c")
        .arg(command)
        .current_dir(cwd)
        .kill_on_drop(true)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn();

    let child = match child {
        Ok(child) => child,
        Err(e) => {
            return RunOutcome {
                success: false,
                stdout: String::new(),
                stderr: e.to_string(),
                exitcode: -1,
                killed: false,
                error: e.to_string(),
            };
        }
    };

    // Dropping the child on timeout kills it
    match timeout(limit, child.wait_with_output()).await {
        Ok(Ok(output)) => RunOutcome {
            success: true,
            stdout: truncate_output(&String::from_utf8_lossy(&output.stdout)),
            stderr: truncate_output(&String::from_utf8_lossy(&output.stderr)),
            exitcode: output.status.code().unwrap_or(-1),
            killed: false,
            error: String::new(),
        },
        Ok(Err(e)) => RunOutcome {
            success: false,
            stdout: String::new(),
            stderr: e.to_string(),
            exitcode: -1,
            killed: false,
            error: e.to_string(),
        },
        Err(_) => RunOutcome {
            success: false,
            stdout: String::new(),
            stderr: format!("Command timed out after {} seconds", limit.as_secs_f64()),
            exitcode: -1,
            killed: true,
            error: "timeout".to_string(),
        },
    }
}

fn truncate_output(text: &str) -> String {
    truncate_with_indication(text, MAX_OUTPUT_CHARS, false)
}

#[async_trait]
impl Tool for RunTool {
    fn name(&self) -> &str {
        "daz_command_run"
    }

    fn description(&self) -> &str {
        concat!(
            "Run a shell command (bash -c) for the active session. Commands exceeding the timeout are killed.",
            " CRITICAL: current_task, summary_of_what_we_just_did and summary_of_what_we_about_to_do are REQUIRED."
        )
    }

    fn parameters_schema(&self) -> Value {
        let properties = json!({
            "command": {"type": "string", "description": "The shell command to execute"},
            "timeout": {"type": "number", "description": "Timeout in seconds (default 60)"},
            "working_directory": {"type": "string", "description": "Directory to run in (default: the session directory)"}
        });
        schema_with_context(properties, &["command"])
    }

    async fn execute(&self, input: Value, state: &AppState) -> Result<ToolOutput> {
        let params: RunInput = serde_json::from_value(input)?;
        let session = state.require_active()?;
        let started = Instant::now();

        let cwd = match &params.working_directory {
            Some(dir) => state.resolve_path(dir),
            None => state.cwd(),
        };
        let secs = if params.timeout.is_finite() && params.timeout > 0.0 {
            params.timeout.min(MAX_TIMEOUT_SECS)
        } else {
            DEFAULT_TIMEOUT_SECS
        };
        let outcome = run_shell(&params.command, &cwd, Duration::from_secs_f64(secs)).await;
        let duration = started.elapsed().as_secs_f64();
        let cwd = cwd.display().to_string();

        let ctx = params.context;
        let event = Event::new(EventKind::Run)
            .with_context(ctx.current_task, ctx.summary_of_what_we_just_did, ctx.summary_of_what_we_about_to_do)
            .input("command", params.command.clone())
            .input("timeout", secs)
            .input("working_directory", cwd.clone())
            .output("success", outcome.success)
            .output("stdout", outcome.stdout.clone())
            .output("stderr", outcome.stderr.clone())
            .output("exitcode", outcome.exitcode)
            .output("killed", outcome.killed)
            .output("error", outcome.error)
            .with_duration(duration);
        state.append_event(&session, event)?;

        let mut result = Map::new();
        result.insert("success".into(), outcome.success.into());
        result.insert("session_id".into(), session.into());
        result.insert("command".into(), params.command.into());
        result.insert("stdout".into(), outcome.stdout.into());
        result.insert("stderr".into(), outcome.stderr.into());
        result.insert("exitcode".into(), outcome.exitcode.into());
        result.insert("killed".into(), outcome.killed.into());
        result.insert("duration".into(), duration.into());
        result.insert("working_directory".into(), cwd.into());
        Ok(ToolOutput::new(clean_result(result)))
    }
}
