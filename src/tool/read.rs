use super::{TaskContext, Tool, ToolOutput, schema_with_context};
use crate::event::{Event, EventKind};
use crate::state::AppState;
use anyhow::Result;
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{Value, json};
use std::time::Instant;

pub struct ReadTool;

impl ReadTool {
    pub fn new() -> Self {
        Self
    }
}

#[derive(Deserialize)]
struct ReadInput {
    file_path: String,
    #[serde(flatten)]
    context: TaskContext,
}

#[async_trait]
impl Tool for ReadTool {
    fn name(&self) -> &str {
        "daz_command_read"
    }

    fn description(&self) -> &str {
        concat!(
            "Read a UTF-8 text file for the active session and return its full contents.",
            " CRITICAL: current_task, summary_of_what_we_just_did and summary_of_what_we_about_to_do are REQUIRED."
        )
    }

    fn parameters_schema(&self) -> Value {
        let properties = json!({
            "file_path": {"type": "string", "description": "The path to the file to read (absolute or relative)"}
        });
        schema_with_context(properties, &["file_path"])
    }

    async fn execute(&self, input: Value, state: &AppState) -> Result<ToolOutput> {
        let params: ReadInput = serde_json::from_value(input)?;
        let session = state.require_active()?;
        let started = Instant::now();

        let path = state.resolve_path(&params.file_path);
        let result = tokio::fs::read_to_string(&path).await;
        let (content, error) = match &result {
            Ok(content) => (content.as_str(), String::new()),
            Err(e) => ("", e.to_string()),
        };

        let ctx = params.context;
        let event = Event::new(EventKind::Read)
            .with_context(ctx.current_task, ctx.summary_of_what_we_just_did, ctx.summary_of_what_we_about_to_do)
            .input("file_path", params.file_path)
            .input("absolute_path", path.display().to_string())
            .output("success", result.is_ok())
            .output("content_length", content.chars().count())
            .output("error", error.clone())
            .with_duration(started.elapsed().as_secs_f64());
        state.append_event(&session, event)?;

        match result {
            Ok(content) => Ok(ToolOutput::new(json!({
                "success": true,
                "content": content,
                "file_path": path.display().to_string(),
            }))),
            Err(_) => anyhow::bail!("Failed to read file: {error}"),
        }
    }
}
