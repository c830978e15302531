mod cd;
mod instructions;
mod learning;
mod read;
mod run;
mod session;
mod write;

use crate::state::AppState;
use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};
use std::collections::HashMap;
use std::sync::Arc;

/// What a tool hands back to the caller
#[derive(Debug, Clone, PartialEq)]
pub struct ToolOutput {
    pub output: Value,
    pub is_error: bool,
}

impl ToolOutput {
    pub fn new(output: Value) -> Self {
        Self {
            output,
            is_error: false,
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            output: json!({ "error": message.into() }),
            is_error: true,
        }
    }

    /// Pretty JSON, as sent over the wire
    pub fn text(&self) -> String {
        serde_json::to_string_pretty(&self.output).unwrap_or_else(|_| self.output.to_string())
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    #[serde(rename = "inputSchema")]
    pub input_schema: Value,
}

/// A tool that can be called by the connected agent
#[async_trait]
pub trait Tool: Send + Sync {
    /// Tool name (must match what the client sends)
    fn name(&self) -> &str;

    fn description(&self) -> &str;

    /// JSON Schema for the input parameters
    fn parameters_schema(&self) -> Value;

    async fn execute(&self, input: Value, state: &AppState) -> Result<ToolOutput>;

    fn to_definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: self.name().to_string(),
            description: self.description().to_string(),
            input_schema: self.parameters_schema(),
        }
    }
}

/// The three context fields every command tool requires
#[derive(Debug, Clone, Deserialize)]
pub struct TaskContext {
    pub current_task: String,
    pub summary_of_what_we_just_did: String,
    pub summary_of_what_we_about_to_do: String,
}

/// Object schema with the task context fields added and required
fn schema_with_context(properties: Value, required: &[&str]) -> Value {
    let mut properties = match properties {
        Value::Object(map) => map,
        _ => Map::new(),
    };
    properties.insert(
        "current_task".into(),
        json!({"type": "string", "description": "The main task you are currently working on"}),
    );
    properties.insert(
        "summary_of_what_we_just_did".into(),
        json!({"type": "string", "description": "Brief summary of the last action and its outcome"}),
    );
    properties.insert(
        "summary_of_what_we_about_to_do".into(),
        json!({"type": "string", "description": "What you plan to do next"}),
    );

    let mut required: Vec<&str> = required.to_vec();
    required.extend([
        "current_task",
        "summary_of_what_we_just_did",
        "summary_of_what_we_about_to_do",
    ]);
    json!({
        "type": "object",
        "required": required,
        "properties": properties,
    })
}

/// Drop noise from a command result: blank stderr, zero exit code,
/// `killed: false`, and the echoed command and duration.
pub fn clean_result(mut result: Map<String, Value>) -> Value {
    result.remove("command");
    result.remove("duration");
    if result
        .get("stderr")
        .and_then(Value::as_str)
        .is_some_and(|s| s.trim().is_empty())
    {
        result.remove("stderr");
    }
    if result.get("exitcode").and_then(Value::as_i64) == Some(0) {
        result.remove("exitcode");
    }
    if result.get("killed").and_then(Value::as_bool) == Some(false) {
        result.remove("killed");
    }
    Value::Object(result)
}

/// Registry of available tools
#[derive(Clone)]
pub struct Registry {
    tools: Arc<HashMap<String, Arc<dyn Tool>>>,
}

impl Registry {
    pub fn new() -> Self {
        let tools: Vec<Arc<dyn Tool>> = vec![
            // File system and shell
            Arc::new(cd::CdTool::new()),
            Arc::new(read::ReadTool::new()),
            Arc::new(write::WriteTool::new()),
            Arc::new(run::RunTool::new()),
            // Session context
            Arc::new(learning::AddLearningsTool::new()),
            Arc::new(learning::RecordUserRequestTool::new()),
            // Session management
            Arc::new(session::ListSessionsTool::new()),
            Arc::new(session::CreateSessionTool::new()),
            Arc::new(session::OpenSessionTool::new()),
            Arc::new(session::CurrentSessionTool::new()),
            Arc::new(session::CloseSessionTool::new()),
            Arc::new(session::RenameSessionTool::new()),
            Arc::new(session::DeleteSessionTool::new()),
            // Instructions
            Arc::new(instructions::ReadInstructionsTool::new()),
            Arc::new(instructions::AddInstructionTool::new()),
            Arc::new(instructions::ReplaceInstructionsTool::new()),
        ];

        let tools = tools
            .into_iter()
            .map(|tool| (tool.name().to_string(), tool))
            .collect();
        Self {
            tools: Arc::new(tools),
        }
    }

    /// All tool definitions, sorted by name
    pub fn definitions(&self) -> Vec<ToolDefinition> {
        let mut defs: Vec<ToolDefinition> =
            self.tools.values().map(|tool| tool.to_definition()).collect();
        defs.sort_by(|a, b| a.name.cmp(&b.name));
        defs
    }

    pub fn tool_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.tools.keys().cloned().collect();
        names.sort();
        names
    }

    /// Run a tool. Failures become `{"error": ...}` outputs, never `Err`.
    pub async fn execute(&self, name: &str, input: Value, state: &AppState) -> ToolOutput {
        let Some(tool) = self.tools.get(name) else {
            return ToolOutput::error(format!("Unknown tool: {name}"));
        };

        let input_text = input.to_string();
        let output = match tool.execute(input, state).await {
            Ok(output) => output,
            Err(e) => ToolOutput::error(format!("{e:#}")),
        };
        crate::logging::tool_call(name, &input_text, &output.text());
        output
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use crate::config::SummaryConfig;
    use crate::history::HistoryStore;
    use crate::model::LanguageModel;
    use crate::session::SessionStore;
    use crate::state::AppState;
    use crate::summary::SummaryService;
    use async_trait::async_trait;
    use std::sync::Arc;
    use std::time::Duration;

    struct Offline;

    #[async_trait]
    impl LanguageModel for Offline {
        fn name(&self) -> &str {
            "offline"
        }
        async fn is_available(&self) -> bool {
            false
        }
        async fn complete(&self, _prompt: &str) -> anyhow::Result<String> {
            anyhow::bail!("offline")
        }
    }

    /// State rooted in a temp dir with an active "proj" session
    pub fn state_with_session() -> (tempfile::TempDir, AppState) {
        let dir = tempfile::tempdir().unwrap();
        let sessions = SessionStore::new(dir.path().join("sessions"));
        let history = HistoryStore::new(sessions.clone(), 32 * 1024);
        let summaries =
            SummaryService::new(&SummaryConfig::default(), Arc::new(Offline), sessions.clone());
        let state = AppState::new(sessions, history, summaries, Duration::from_millis(20));
        state.set_cwd(dir.path().to_path_buf());
        state.create_session("proj", "testing").unwrap();
        (dir, state)
    }

    pub fn context() -> serde_json::Value {
        serde_json::json!({
            "current_task": "exercise tools",
            "summary_of_what_we_just_did": "set up",
            "summary_of_what_we_about_to_do": "call a tool",
        })
    }

    pub fn with_context(mut input: serde_json::Value) -> serde_json::Value {
        if let (Some(obj), serde_json::Value::Object(ctx)) = (input.as_object_mut(), context()) {
            obj.extend(ctx);
        }
        input
    }
}
