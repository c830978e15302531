use super::{TaskContext, Tool, ToolOutput, schema_with_context};
use crate::event::{Event, EventKind};
use crate::state::AppState;
use anyhow::Result;
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{Value, json};
use std::path::Path;
use std::time::Instant;

pub struct WriteTool;

impl WriteTool {
    pub fn new() -> Self {
        Self
    }
}

fn default_create_dirs() -> bool {
    true
}

#[derive(Deserialize)]
struct WriteInput {
    file_path: String,
    content: String,
    #[serde(default = "default_create_dirs")]
    create_dirs: bool,
    #[serde(flatten)]
    context: TaskContext,
}

async fn write_file(path: &Path, content: &str, create_dirs: bool) -> std::io::Result<()> {
    if create_dirs {
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
    }
    tokio::fs::write(path, content).await
}

#[async_trait]
impl Tool for WriteTool {
    fn name(&self) -> &str {
        "daz_command_write"
    }

    fn description(&self) -> &str {
        concat!(
            "Write a text file for the active session, creating or overwriting it.",
            " Parent directories are created unless create_dirs is false.",
            " CRITICAL: current_task, summary_of_what_we_just_did and summary_of_what_we_about_to_do are REQUIRED."
        )
    }

    fn parameters_schema(&self) -> Value {
        let properties = json!({
            "file_path": {"type": "string", "description": "The path to the file to write (absolute or relative)"},
            "content": {"type": "string", "description": "The content to write to the file"},
            "create_dirs": {"type": "boolean", "description": "Create missing parent directories (default true)"}
        });
        schema_with_context(properties, &["file_path", "content"])
    }

    async fn execute(&self, input: Value, state: &AppState) -> Result<ToolOutput> {
        let params: WriteInput = serde_json::from_value(input)?;
        let session = state.require_active()?;
        let started = Instant::now();

        let path = state.resolve_path(&params.file_path);
        let result = write_file(&path, &params.content, params.create_dirs).await;
        let error = result.as_ref().err().map(|e| e.to_string()).unwrap_or_default();

        let ctx = params.context;
        let event = Event::new(EventKind::Write)
            .with_context(ctx.current_task, ctx.summary_of_what_we_just_did, ctx.summary_of_what_we_about_to_do)
            .input("file_path", params.file_path)
            .input("content_length", params.content.chars().count())
            .input("create_dirs", params.create_dirs)
            .output("success", result.is_ok())
            .output("absolute_path", path.display().to_string())
            .output("error", error.clone())
            .with_duration(started.elapsed().as_secs_f64());
        state.append_event(&session, event)?;

        if result.is_err() {
            anyhow::bail!("Failed to write file: {error}");
        }
        Ok(ToolOutput::new(json!({
            "success": true,
            "file_path": path.display().to_string(),
        })))
    }
}
