use super::{TaskContext, Tool, ToolOutput, schema_with_context};
use crate::event::{Event, EventKind};
use crate::state::AppState;
use anyhow::Result;
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{Value, json};
use std::time::Instant;

pub struct CdTool;

impl CdTool {
    pub fn new() -> Self {
        Self
    }
}

#[derive(Deserialize)]
struct CdInput {
    directory: String,
    #[serde(flatten)]
    context: TaskContext,
}

#[async_trait]
impl Tool for CdTool {
    fn name(&self) -> &str {
        "daz_command_cd"
    }

    fn description(&self) -> &str {
        concat!(
            "Change directory for the active session. Relative paths in later commands resolve against it.",
            " CRITICAL: current_task, summary_of_what_we_just_did and summary_of_what_we_about_to_do are REQUIRED."
        )
    }

    fn parameters_schema(&self) -> Value {
        let properties = json!({
            "directory": {"type": "string", "description": "Directory to change to (absolute or relative)"}
        });
        schema_with_context(properties, &["directory"])
    }

    async fn execute(&self, input: Value, state: &AppState) -> Result<ToolOutput> {
        let params: CdInput = serde_json::from_value(input)?;
        let session = state.require_active()?;
        let started = Instant::now();

        let old_cwd = state.cwd();
        let target = state.resolve_path(&params.directory);
        let outcome = match tokio::fs::canonicalize(&target).await {
            Ok(dir) if dir.is_dir() => Ok(dir),
            Ok(dir) => Err(format!("Not a directory: {}", dir.display())),
            Err(e) => Err(format!("{}: {}", target.display(), e)),
        };

        let (success, new_cwd, error) = match &outcome {
            Ok(dir) => (true, dir.clone(), String::new()),
            Err(e) => (false, old_cwd.clone(), e.clone()),
        };
        if success {
            state.set_cwd(new_cwd.clone());
        }

        let ctx = params.context;
        let event = Event::new(EventKind::Navigate)
            .with_context(ctx.current_task, ctx.summary_of_what_we_just_did, ctx.summary_of_what_we_about_to_do)
            .input("directory", params.directory)
            .input("old_cwd", old_cwd.display().to_string())
            .output("success", success)
            .output("new_cwd", new_cwd.display().to_string())
            .output("error", error)
            .with_duration(started.elapsed().as_secs_f64());
        state.append_event(&session, event)?;

        match outcome {
            Ok(dir) => Ok(ToolOutput::new(json!({
                "success": true,
                "old_directory": old_cwd.display().to_string(),
                "new_directory": dir.display().to_string(),
            }))),
            Err(e) => anyhow::bail!("Failed to change directory: {e}"),
        }
    }
}
